//! Closed decision vocabularies shared by the guard, TP engine and recovery.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an entry or startup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardVerdict {
    Enter,
    Hold,
    Skip,
    Exit,
}

impl fmt::Display for GuardVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardVerdict::Enter => write!(f, "ENTER"),
            GuardVerdict::Hold => write!(f, "HOLD"),
            GuardVerdict::Skip => write!(f, "SKIP"),
            GuardVerdict::Exit => write!(f, "EXIT"),
        }
    }
}

/// Why a guard decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoSetup,
    BarNotClosed,
    TickNoiseFiltered,
    EntryQualityBelowGate,
    CooldownActive,
    PyramidingLimit,
    Approved,
    /// Indicators have not accumulated enough history to be trusted.
    InsufficientData,
    InternalError,
    /// Startup check: price already beyond the stop.
    StopLossHit,
    /// Startup check: price already beyond the original target.
    TakeProfitHit,
    /// Startup check: price between stop and target.
    WithinLevels,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NoSetup => "NO_SETUP",
            ReasonCode::BarNotClosed => "BAR_NOT_CLOSED",
            ReasonCode::TickNoiseFiltered => "TICK_NOISE_FILTERED",
            ReasonCode::EntryQualityBelowGate => "ENTRY_QUALITY_BELOW_GATE",
            ReasonCode::CooldownActive => "COOLDOWN_ACTIVE",
            ReasonCode::PyramidingLimit => "PYRAMIDING_LIMIT",
            ReasonCode::Approved => "APPROVED",
            ReasonCode::InsufficientData => "INSUFFICIENT_DATA",
            ReasonCode::InternalError => "INTERNAL_ERROR",
            ReasonCode::StopLossHit => "STOP_LOSS_HIT",
            ReasonCode::TakeProfitHit => "TAKE_PROFIT_HIT",
            ReasonCode::WithinLevels => "WITHIN_LEVELS",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which retrace condition closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetraceTrigger {
    /// Close fell back through the fast average.
    FastAverageLost,
    /// Engulfing candle against the trade.
    ReversalCandle,
    /// Volatility range shrank below its contraction threshold.
    VolatilityContraction,
}

/// Why a position was (or should be) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Retrace(RetraceTrigger),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::Retrace(RetraceTrigger::FastAverageLost) => {
                write!(f, "RETRACE_FAST_AVERAGE")
            }
            ExitReason::Retrace(RetraceTrigger::ReversalCandle) => {
                write!(f, "RETRACE_REVERSAL_CANDLE")
            }
            ExitReason::Retrace(RetraceTrigger::VolatilityContraction) => {
                write!(f, "RETRACE_VOLATILITY_CONTRACTION")
            }
        }
    }
}
