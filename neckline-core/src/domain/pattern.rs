//! Double-bottom pattern value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single pivot referenced by a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternPoint {
    pub index: usize,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Two-low / one-high reversal structure.
///
/// A pattern is a value produced fresh by each detection pass; nothing mutates
/// or owns it afterwards. Invariants for a valid pattern:
/// - `left_low.index < neckline.index < right_low.index`
/// - the two lows differ by at most the configured equality tolerance
/// - the neckline price is above both lows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub left_low: PatternPoint,
    pub neckline: PatternPoint,
    pub right_low: PatternPoint,
    /// `|p1 - p2| / avg(p1, p2) * 100`
    pub deviation_pct: f64,
    pub valid: bool,
}

impl Pattern {
    /// Mean price of the two lows.
    pub fn base_price(&self) -> f64 {
        (self.left_low.price + self.right_low.price) / 2.0
    }

    /// Vertical distance from the average low to the neckline.
    pub fn depth(&self) -> f64 {
        self.neckline.price - self.base_price()
    }

    /// Number of bars between the two lows.
    pub fn span(&self) -> usize {
        self.right_low.index - self.left_low.index
    }

    /// True when `close` has broken above the neckline.
    pub fn is_breakout(&self, close: f64) -> bool {
        close > self.neckline.price
    }

    /// Structural check of the ordering invariants. Does not re-check tolerance.
    pub fn is_well_formed(&self) -> bool {
        self.left_low.index < self.neckline.index
            && self.neckline.index < self.right_low.index
            && self.neckline.price > self.left_low.price
            && self.neckline.price > self.right_low.price
    }
}

/// Percent difference between two prices relative to their mean.
pub fn equality_deviation_pct(p1: f64, p2: f64) -> f64 {
    let avg = (p1 + p2) / 2.0;
    if avg == 0.0 {
        return f64::INFINITY;
    }
    (p1 - p2).abs() / avg * 100.0
}
