//! Error types for the decision core.
//!
//! Insufficient data is never an error here: indicator and pattern code
//! return `Option`/NaN for that. These variants cover invalid input and
//! bookkeeping violations, which must fail loudly.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Side, Ticket};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("zero risk distance: entry {entry} equals stop {stop}")]
    ZeroRisk { entry: f64, stop: f64 },

    #[error("stop {stop} is on the wrong side of entry {entry} for a {side} position")]
    InvertedStop { side: Side, entry: f64, stop: f64 },

    #[error("target levels are not ordered away from entry for a {side} position")]
    InvertedTargets { side: Side },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A programmatic config that failed [`CoreConfig::validate`](crate::config::CoreConfig::validate).
    #[error("{0}")]
    Config(String),

    #[error("ticket {0} already has a live position")]
    DuplicateTicket(Ticket),

    #[error("ticket {0} has no live position")]
    UnknownTicket(Ticket),

    #[error("bar index {index} out of range for {len} bars")]
    BarOutOfRange { index: usize, len: usize },

    #[error("bar at {incoming} is not newer than last processed bar at {last}")]
    StaleBar {
        incoming: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("recovery has not completed; live evaluation is blocked")]
    RecoveryPending,
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = CoreError::ZeroRisk {
            entry: 4500.0,
            stop: 4500.0,
        };
        assert_eq!(
            err.to_string(),
            "zero risk distance: entry 4500 equals stop 4500"
        );

        let err = CoreError::InvertedStop {
            side: Side::Short,
            entry: 100.0,
            stop: 90.0,
        };
        assert!(err.to_string().contains("SHORT"));
    }
}
