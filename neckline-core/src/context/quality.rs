//! Entry quality score (0–10).
//!
//! Four sub-scores, each clamped to [0, 10] before weighting:
//! - pattern: low equality, depth in volatility units, position against the neckline
//! - momentum: candle body relative to the volatility range
//! - trend: ordering of price and the three averages
//! - volatility: regime x volatility compatibility

use serde::{Deserialize, Serialize};

use super::regime::{compatibility, MarketContext};
use crate::config::ScoreWeights;
use crate::domain::{Bar, Pattern};
use crate::indicators::IndicatorSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub pattern: f64,
    pub momentum: f64,
    pub trend: f64,
    pub volatility: f64,
    pub total: f64,
}

impl QualityScore {
    pub fn from_components(
        pattern: f64,
        momentum: f64,
        trend: f64,
        volatility: f64,
        weights: &ScoreWeights,
    ) -> Self {
        let (pattern, momentum, trend, volatility) = (
            clamp10(pattern),
            clamp10(momentum),
            clamp10(trend),
            clamp10(volatility),
        );
        let total = clamp10(
            pattern * weights.pattern
                + momentum * weights.momentum
                + trend * weights.trend
                + volatility * weights.volatility,
        );
        Self {
            pattern,
            momentum,
            trend,
            volatility,
            total,
        }
    }
}

/// Clamp to [0, 10]; NaN becomes 0.
pub fn clamp10(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 10.0)
    }
}

/// Volatility-range multiples of pattern depth that earn a full depth score.
const FULL_DEPTH_UNITS: f64 = 4.0;

pub fn pattern_score(
    pattern: &Pattern,
    close: f64,
    volatility: Option<f64>,
    tolerance_pct: f64,
) -> f64 {
    if !pattern.valid {
        return 0.0;
    }

    let equality = if tolerance_pct > 0.0 {
        clamp10(10.0 * (1.0 - pattern.deviation_pct / tolerance_pct))
    } else {
        0.0
    };

    let depth = match volatility {
        Some(v) if v > 0.0 => clamp10(pattern.depth() / v / FULL_DEPTH_UNITS * 10.0),
        _ => 0.0,
    };

    let right = pattern.right_low.price;
    let neck = pattern.neckline.price;
    let position = if pattern.is_breakout(close) {
        10.0
    } else if close > right && neck > right {
        clamp10(10.0 * (close - right) / (neck - right))
    } else {
        0.0
    };

    clamp10(0.5 * equality + 0.3 * depth + 0.2 * position)
}

/// Body over volatility range, scaled so a body of one full range scores 10.
/// Bearish candles count half; dojis score zero.
pub fn momentum_score(bar: &Bar, volatility: Option<f64>) -> f64 {
    let Some(v) = volatility.filter(|v| *v > 0.0) else {
        return 0.0;
    };
    let raw = clamp10(bar.body() / v * 10.0);
    if bar.is_bearish() {
        raw * 0.5
    } else {
        raw
    }
}

/// One third of the score for each satisfied link in price > fast > medium > slow.
/// A missing average contributes nothing.
pub fn trend_score(close: f64, set: &IndicatorSet) -> f64 {
    let links = [
        set.fast.map(|f| close > f),
        match (set.fast, set.medium) {
            (Some(f), Some(m)) => Some(f > m),
            _ => None,
        },
        match (set.medium, set.slow) {
            (Some(m), Some(s)) => Some(m > s),
            _ => None,
        },
    ];
    let satisfied = links.iter().filter(|l| **l == Some(true)).count();
    10.0 * satisfied as f64 / 3.0
}

pub fn volatility_score(context: &MarketContext) -> f64 {
    match (context.regime, context.volatility) {
        (Some(r), Some(v)) => compatibility(r, v),
        _ => 0.0,
    }
}
