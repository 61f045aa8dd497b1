//! Pattern detector: two equal lows separated by a neckline high.
//!
//! Search order: right low from most recent backward, then for each right
//! low the nearest admissible left low. The first pair that satisfies gap,
//! equality and neckline constraints wins.

pub mod pivots;

pub use pivots::{local_maxima, local_minima};

use tracing::{debug, warn};

use crate::config::PatternConfig;
use crate::domain::{equality_deviation_pct, Bar, Pattern, PatternPoint};

#[derive(Debug, Clone)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Scan `bars` for the most recent double bottom.
    ///
    /// Only pass closed bars. Returns `None` when no pair qualifies or the
    /// input holds a malformed bar.
    pub fn detect(&self, bars: &[Bar]) -> Option<Pattern> {
        if let Some(bad) = bars.iter().position(|b| b.is_void()) {
            warn!(index = bad, "malformed bar, pattern detection skipped");
            return None;
        }

        let cfg = &self.config;
        let minima = local_minima(bars, cfg.left_bars, cfg.right_bars);
        if minima.len() < 2 {
            return None;
        }
        let maxima = local_maxima(bars, cfg.left_bars, cfg.right_bars);
        if maxima.is_empty() {
            return None;
        }

        for (ri, &right) in minima.iter().enumerate().rev() {
            for &left in minima[..ri].iter().rev() {
                if right - left < cfg.min_bar_gap {
                    continue;
                }

                let (p1, p2) = (bars[left].low, bars[right].low);
                let deviation_pct = equality_deviation_pct(p1, p2);
                if deviation_pct > cfg.equality_tolerance_pct {
                    continue;
                }

                let Some(neck) = highest_between(bars, &maxima, left, right) else {
                    continue;
                };
                let neck_price = bars[neck].high;
                if neck_price <= p1 || neck_price <= p2 {
                    continue;
                }

                debug!(left, neck, right, deviation_pct, "double bottom detected");
                return Some(Pattern {
                    left_low: point(bars, left, p1),
                    neckline: point(bars, neck, neck_price),
                    right_low: point(bars, right, p2),
                    deviation_pct,
                    valid: true,
                });
            }
        }

        None
    }
}

fn point(bars: &[Bar], index: usize, price: f64) -> PatternPoint {
    PatternPoint {
        index,
        price,
        timestamp: bars[index].timestamp,
    }
}

/// Local maximum with the highest price strictly between `left` and `right`.
/// Ties go to the earlier bar.
fn highest_between(bars: &[Bar], maxima: &[usize], left: usize, right: usize) -> Option<usize> {
    maxima
        .iter()
        .copied()
        .filter(|&m| m > left && m < right)
        .fold(None, |best: Option<usize>, m| match best {
            Some(b) if bars[b].high >= bars[m].high => Some(b),
            _ => Some(m),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_bars;

    /// Bars whose lows follow `lows` and whose highs sit `height` above.
    fn bars_from_lows(lows: &[f64], height: f64) -> Vec<Bar> {
        let data: Vec<_> = lows
            .iter()
            .map(|&l| (l + height / 2.0, l + height, l, l + height / 2.0))
            .collect();
        make_ohlc_bars(&data)
    }

    fn v_path(points: &[(usize, f64)]) -> Vec<f64> {
        let mut out = Vec::new();
        for w in points.windows(2) {
            let (i0, p0) = w[0];
            let (i1, p1) = w[1];
            for i in i0..i1 {
                let t = (i - i0) as f64 / (i1 - i0) as f64;
                out.push(p0 + (p1 - p0) * t);
            }
        }
        out.push(points[points.len() - 1].1);
        out
    }

    fn config() -> PatternConfig {
        PatternConfig::default()
    }

    #[test]
    fn detects_equal_lows_with_neckline() {
        let lows = v_path(&[(0, 2040.0), (10, 2000.0), (17, 2035.0), (25, 2020.0), (39, 2062.0)]);
        let bars = bars_from_lows(&lows, 15.0);
        let pattern = PatternDetector::new(config()).detect(&bars).unwrap();
        assert!(pattern.valid);
        assert_eq!(pattern.left_low.index, 10);
        assert_eq!(pattern.neckline.index, 17);
        assert_eq!(pattern.right_low.index, 25);
        assert_eq!(pattern.neckline.price, 2050.0);
        assert!(pattern.is_well_formed());
    }

    #[test]
    fn rejects_lows_outside_tolerance() {
        let lows = v_path(&[(0, 2040.0), (10, 2000.0), (17, 2150.0), (25, 2100.0), (39, 2142.0)]);
        let bars = bars_from_lows(&lows, 15.0);
        assert!(PatternDetector::new(config()).detect(&bars).is_none());
    }

    #[test]
    fn rejects_lows_too_close_together() {
        let lows = v_path(&[(0, 2040.0), (10, 2000.0), (14, 2030.0), (18, 2005.0), (32, 2060.0)]);
        let bars = bars_from_lows(&lows, 15.0);
        let detector = PatternDetector::new(PatternConfig {
            left_bars: 3,
            right_bars: 3,
            ..config()
        });
        assert!(detector.detect(&bars).is_none());
    }

    #[test]
    fn prefers_most_recent_right_low() {
        // Three lows at 10, 25, 40, all equal. Right low 40 wins; its nearest
        // admissible partner is 25.
        let lows = v_path(&[
            (0, 2040.0),
            (10, 2000.0),
            (17, 2030.0),
            (25, 2001.0),
            (32, 2030.0),
            (40, 2002.0),
            (52, 2040.0),
        ]);
        let bars = bars_from_lows(&lows, 15.0);
        let pattern = PatternDetector::new(config()).detect(&bars).unwrap();
        assert_eq!(pattern.right_low.index, 40);
        assert_eq!(pattern.left_low.index, 25);
        assert_eq!(pattern.neckline.index, 32);
    }

    #[test]
    fn skips_nearer_left_low_that_breaks_tolerance() {
        // Lows at 10 (2000), 25 (2080), 40 (2005). For right low 40 the nearer
        // low at 25 is 3.8% away; the detector falls back to 10.
        let lows = v_path(&[
            (0, 2040.0),
            (10, 2000.0),
            (17, 2100.0),
            (25, 2080.0),
            (32, 2120.0),
            (40, 2005.0),
            (52, 2060.0),
        ]);
        let bars = bars_from_lows(&lows, 15.0);
        let pattern = PatternDetector::new(config()).detect(&bars).unwrap();
        assert_eq!(pattern.left_low.index, 10);
        assert_eq!(pattern.right_low.index, 40);
        // Highest max between 10 and 40 is the one at 32.
        assert_eq!(pattern.neckline.index, 32);
    }

    #[test]
    fn malformed_bar_gives_no_pattern() {
        let lows = v_path(&[(0, 2040.0), (10, 2000.0), (17, 2035.0), (25, 2020.0), (39, 2062.0)]);
        let mut bars = bars_from_lows(&lows, 15.0);
        bars[5].close = f64::NAN;
        assert!(PatternDetector::new(config()).detect(&bars).is_none());
    }

    #[test]
    fn too_few_bars_gives_no_pattern() {
        let bars = bars_from_lows(&[2000.0, 1990.0, 2000.0], 10.0);
        assert!(PatternDetector::new(config()).detect(&bars).is_none());
        assert!(PatternDetector::new(config()).detect(&[]).is_none());
    }
}
