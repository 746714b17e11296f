//! Property tests for pivots, trend regions and the double top scan.

use chartscan::prelude::*;
use proptest::prelude::*;

fn series(closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar::new(i as i64 * 60, c, c + 0.5, c - 0.5, c, 1.0))
        .collect();
    PriceSeries::new(bars).unwrap()
}

/// Small integer closes so ties and plateaus show up often
fn closes(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec((1u32..30).prop_map(f64::from), len)
}

/// Strictly rising for `rise` bars, `top` equal bars, then strictly falling for `fall` bars
fn mountain(rise: usize, top: usize, fall: usize) -> Vec<f64> {
    let peak = rise as f64;
    (0..rise)
        .map(|i| i as f64)
        .chain(std::iter::repeat(peak).take(top))
        .chain((1..=fall).map(|i| peak - i as f64))
        .collect()
}

proptest! {
    #[test]
    fn pivots_stay_inside_full_windows(values in closes(0..60), w in 1usize..6) {
        let s = series(&values);
        let window = Period::new(w).unwrap();
        for kind in [PivotKind::High, PivotKind::Low] {
            let found = find_pivots(&s, kind, window);
            prop_assert!(found.windows(2).all(|p| p[0] < p[1]));
            for &i in &found {
                prop_assert!(i >= w && i + w < values.len());
            }
        }
    }

    #[test]
    fn unimodal_series_has_one_pivot_high(w in 1usize..5, rise in 5usize..20, fall in 5usize..20) {
        let s = series(&mountain(rise, 1, fall));
        let highs = find_pivots(&s, PivotKind::High, Period::new(w).unwrap());
        prop_assert_eq!(highs, vec![rise]);
    }

    #[test]
    fn plateau_yields_adjacent_pivots(w in 1usize..5, top in 1usize..6, rise in 5usize..12, fall in 5usize..12) {
        let s = series(&mountain(rise, top, fall));
        let highs = find_pivots(&s, PivotKind::High, Period::new(w).unwrap());
        prop_assert_eq!(highs, (rise..rise + top).collect::<Vec<_>>());
    }

    #[test]
    fn regions_tile_from_first_pivot_to_last_bar(values in closes(10..60), w in 1usize..4) {
        let s = series(&values);
        let window = Period::new(w).unwrap();
        let highs = find_pivots(&s, PivotKind::High, window);
        let lows = find_pivots(&s, PivotKind::Low, window);

        for rule in [DowRule::SameKind, DowRule::CrossConfirmed] {
            let regions = determine_regions(&s, &highs, &lows, rule);
            prop_assert_eq!(regions.len(), highs.len() + lows.len());
            let Some(first) = regions.first() else {
                continue;
            };
            let earliest = highs.iter().chain(&lows).copied().min().unwrap();
            prop_assert_eq!(first.start_index, earliest);
            prop_assert_eq!(regions.last().unwrap().end_index, values.len() - 1);
            for pair in regions.windows(2) {
                prop_assert_eq!(pair[0].end_index, pair[1].start_index);
            }
            for r in &regions {
                prop_assert!(r.start_index <= r.end_index);
            }
        }
    }

    #[test]
    fn double_top_matches_hold_their_invariants(
        values in closes(20..80),
        tolerance in 0.0f64..0.1,
        min_separation in 1usize..10,
        trend_lookback in 1usize..10,
    ) {
        let detector = DoubleTopDetector {
            tolerance: Ratio::new(tolerance).unwrap(),
            min_separation: Period::new(min_separation).unwrap(),
            trend_lookback: Period::new(trend_lookback).unwrap(),
        };
        let s = series(&values);
        let found = detector.detect(&s);

        for m in &found {
            let (i, p, j) = (m.first_top_index, m.pivot_low_index, m.second_top_index);
            prop_assert!(i < p && p < j);
            prop_assert!(j - i >= min_separation);
            prop_assert!(i >= trend_lookback && values[i] > values[i - trend_lookback]);
            prop_assert!((values[j] - values[i]).abs() <= tolerance * values[i]);
            prop_assert!(values[p] < values[i].min(values[j]));
            prop_assert!(values[i + 1..j].iter().all(|&v| v >= values[p]));
        }
        prop_assert!(found.windows(2).all(|pair| pair[0].first_top_index < pair[1].first_top_index));

        // pure function of its input
        prop_assert_eq!(detector.detect(&s), found);
    }

    #[test]
    fn double_bottom_matches_hold_their_invariants(
        values in closes(20..80),
        tolerance in 0.0f64..0.1,
        min_separation in 1usize..10,
    ) {
        let detector = DoubleBottomDetector {
            tolerance: Ratio::new(tolerance).unwrap(),
            min_separation: Period::new(min_separation).unwrap(),
            trend_lookback: Period::new(3).unwrap(),
        };
        for m in detector.detect(&series(&values)) {
            let (i, p, j) = (m.first_bottom_index, m.pivot_high_index, m.second_bottom_index);
            prop_assert!(i < p && p < j);
            prop_assert!(values[i] < values[i - 3]);
            prop_assert!((values[j] - values[i]).abs() <= tolerance * values[i]);
            prop_assert!(values[p] > values[i].max(values[j]));
        }
    }
}
