//! Take-profit progression: targets, stop ratchets, the per-position state
//! machine and the book of open positions.

pub mod book;
pub mod engine;
pub mod ratchet;
pub mod targets;

pub use book::{PositionBook, SharedBook};
pub use engine::{NewPosition, TpDecision, TpEngine, TpInput, TpOutcome};
pub use ratchet::{apply_ratchets, StopMove};
pub use targets::compute_targets;
