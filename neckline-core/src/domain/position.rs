//! Position: the only entity in the core with a lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bar::Bar;
use super::ids::Ticket;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Move `distance` away from `base` in the trade's favor.
    pub fn offset(self, base: f64, distance: f64) -> f64 {
        base + self.sign() * distance
    }

    /// `price` lies strictly beyond `level` in the trade's favor.
    pub fn is_beyond(self, price: f64, level: f64) -> bool {
        match self {
            Side::Long => price > level,
            Side::Short => price < level,
        }
    }

    /// `price` lies strictly beyond `level` against the trade.
    pub fn is_adverse(self, price: f64, level: f64) -> bool {
        match self {
            Side::Long => price < level,
            Side::Short => price > level,
        }
    }

    /// The bar traded at or through `level` in the trade's favor.
    pub fn reached(self, bar: &Bar, level: f64) -> bool {
        match self {
            Side::Long => bar.high >= level,
            Side::Short => bar.low <= level,
        }
    }

    /// The tighter of two stop levels (higher for longs, lower for shorts).
    pub fn tighter(self, a: f64, b: f64) -> f64 {
        match self {
            Side::Long => a.max(b),
            Side::Short => a.min(b),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Which of the three profit targets is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TpState {
    #[serde(rename = "AT_TP1")]
    AtTp1,
    #[serde(rename = "AT_TP2")]
    AtTp2,
    #[serde(rename = "AT_TP3")]
    AtTp3,
}

impl TpState {
    /// The following state, or `None` from `AtTp3`.
    pub fn next(self) -> Option<Self> {
        match self {
            TpState::AtTp1 => Some(TpState::AtTp2),
            TpState::AtTp2 => Some(TpState::AtTp3),
            TpState::AtTp3 => None,
        }
    }
}

impl fmt::Display for TpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpState::AtTp1 => write!(f, "AT_TP1"),
            TpState::AtTp2 => write!(f, "AT_TP2"),
            TpState::AtTp3 => write!(f, "AT_TP3"),
        }
    }
}

/// Three profit targets, ordered away from entry in the trade's favor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetLevels {
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
}

impl TargetLevels {
    pub fn level(&self, state: TpState) -> f64 {
        match state {
            TpState::AtTp1 => self.tp1,
            TpState::AtTp2 => self.tp2,
            TpState::AtTp3 => self.tp3,
        }
    }

    /// Strict monotonic ordering for the given side.
    pub fn is_monotonic(&self, side: Side) -> bool {
        side.is_beyond(self.tp2, self.tp1) && side.is_beyond(self.tp3, self.tp2)
    }
}

/// An open position.
///
/// Created on an ENTER decision, mutated only by the TP engine, and removed
/// from the book exactly once when it closes. All fields of one transition
/// are replaced together; see `TpEngine::commit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub side: Side,
    pub entry_price: f64,
    pub initial_stop: f64,
    /// Current protective stop (moves only by ratchet).
    pub stop_loss: f64,
    pub targets: TargetLevels,
    pub state: TpState,
    pub moved_to_breakeven: bool,
    pub moved_to_fixed_profit: bool,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
    /// Timestamp of the last closed bar this position consumed.
    #[serde(default)]
    pub last_bar_time: Option<DateTime<Utc>>,
}

impl Position {
    /// Entry-to-initial-stop distance (one risk unit).
    pub fn risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Target price for the current state.
    pub fn active_target(&self) -> f64 {
        self.targets.level(self.state)
    }

    /// Take-profit placed with the order at open (the final target).
    pub fn original_target(&self) -> f64 {
        self.targets.tp3
    }

    /// True when the bar at `timestamp` was already consumed.
    pub fn has_consumed(&self, timestamp: DateTime<Utc>) -> bool {
        self.last_bar_time.is_some_and(|t| timestamp <= t)
    }

    /// All price fields are finite and the risk distance is positive.
    pub fn is_evaluable(&self) -> bool {
        self.entry_price.is_finite()
            && self.stop_loss.is_finite()
            && self.initial_stop.is_finite()
            && self.targets.tp1.is_finite()
            && self.targets.tp2.is_finite()
            && self.targets.tp3.is_finite()
            && self.risk() > 0.0
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.size
    }
}
