//! Target computation from entry and stop.

use tracing::error;

use crate::config::TargetConfig;
use crate::domain::{Side, TargetLevels};
use crate::error::{CoreError, Result};

/// Three targets at `tp1_rr`, `tp2_rr` and `tp3_rr` risk units from entry.
///
/// Fails on non-finite prices, zero risk distance, a stop on the wrong side
/// of entry, or multiples that would not order the targets away from entry.
/// There is never a partial or zero-width result.
pub fn compute_targets(
    entry: f64,
    stop: f64,
    side: Side,
    config: &TargetConfig,
) -> Result<TargetLevels> {
    if !entry.is_finite() || !stop.is_finite() {
        error!(entry, stop, %side, "non-finite entry or stop");
        return Err(CoreError::InvalidInput(format!(
            "entry {entry} and stop {stop} must be finite"
        )));
    }

    let risk = (entry - stop).abs();
    if risk == 0.0 {
        error!(entry, stop, %side, "zero risk distance, no targets");
        return Err(CoreError::ZeroRisk { entry, stop });
    }
    if !side.is_adverse(stop, entry) {
        error!(entry, stop, %side, "stop on the profit side of entry");
        return Err(CoreError::InvertedStop { side, entry, stop });
    }

    let levels = TargetLevels {
        tp1: side.offset(entry, config.tp1_rr * risk),
        tp2: side.offset(entry, config.tp2_rr * risk),
        tp3: side.offset(entry, config.tp3_rr * risk),
    };
    if !side.is_beyond(levels.tp1, entry) || !levels.is_monotonic(side) {
        error!(?levels, %side, "target multiples do not order away from entry");
        return Err(CoreError::InvertedTargets { side });
    }
    Ok(levels)
}
