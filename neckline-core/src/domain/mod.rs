//! Domain types: bars, pattern values, positions, identifiers, decision codes.

pub mod bar;
pub mod decision;
pub mod ids;
pub mod pattern;
pub mod position;

pub use bar::{last_closed_index, Bar};
pub use decision::{ExitReason, GuardVerdict, ReasonCode, RetraceTrigger};
pub use ids::{ConfigFingerprint, Ticket};
pub use pattern::{equality_deviation_pct, Pattern, PatternPoint};
pub use position::{Position, Side, TargetLevels, TpState};
