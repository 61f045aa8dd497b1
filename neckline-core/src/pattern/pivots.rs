//! Local extrema on highs and lows.

use crate::domain::Bar;

/// Indices whose low is strictly below every low within `left` bars before
/// and `right` bars after. Bars without a full window on both sides are skipped.
pub fn local_minima(bars: &[Bar], left: usize, right: usize) -> Vec<usize> {
    scan(bars, left, right, |candidate, other| candidate.low < other.low)
}

/// Indices whose high is strictly above every high in the surrounding window.
pub fn local_maxima(bars: &[Bar], left: usize, right: usize) -> Vec<usize> {
    scan(bars, left, right, |candidate, other| candidate.high > other.high)
}

fn scan<F>(bars: &[Bar], left: usize, right: usize, dominates: F) -> Vec<usize>
where
    F: Fn(&Bar, &Bar) -> bool,
{
    let n = bars.len();
    if n < left + right + 1 {
        return Vec::new();
    }

    (left..n - right)
        .filter(|&i| {
            let candidate = &bars[i];
            bars[i - left..=i + right]
                .iter()
                .enumerate()
                .all(|(offset, other)| offset == left || dominates(candidate, other))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    fn bars_from_lows(lows: &[f64]) -> Vec<Bar> {
        let data: Vec<_> = lows
            .iter()
            .map(|&l| (l + 2.0, l + 4.0, l, l + 2.0))
            .collect();
        make_ohlc_bars(&data)
    }

    #[test]
    fn finds_strict_minimum() {
        let bars = bars_from_lows(&[10.0, 9.0, 8.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(local_minima(&bars, 2, 2), vec![3]);
        assert_eq!(local_maxima(&bars, 2, 2), Vec::<usize>::new());
    }

    #[test]
    fn equal_neighbor_is_not_a_pivot() {
        let bars = bars_from_lows(&[10.0, 9.0, 7.0, 7.0, 8.0, 9.0, 10.0]);
        assert!(local_minima(&bars, 2, 2).is_empty());
    }

    #[test]
    fn edges_need_full_window() {
        // Lowest bar at the end has no right window.
        let bars = bars_from_lows(&[10.0, 9.0, 8.0, 7.0, 6.0]);
        assert!(local_minima(&bars, 2, 2).is_empty());
    }

    #[test]
    fn finds_maximum_on_highs() {
        let bars = bars_from_lows(&[1.0, 2.0, 3.0, 2.0, 1.0]);
        assert_eq!(local_maxima(&bars, 2, 2), vec![2]);
    }

    #[test]
    fn too_short_sequence() {
        let bars = bars_from_lows(&[1.0, 2.0]);
        assert!(local_minima(&bars, 5, 5).is_empty());
    }
}
