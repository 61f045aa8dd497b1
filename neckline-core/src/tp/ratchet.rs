//! One-shot stop-loss ratchets.
//!
//! Entering AT_TP2 moves the stop to breakeven. Entering AT_TP3 moves it to
//! breakeven (if that has not happened) and then to a fixed profit. Each move
//! is guarded by its flag on the position and can only tighten the stop.

use crate::domain::{Position, TpState};

/// A stop adjustment made by [`apply_ratchets`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopMove {
    pub from: f64,
    pub to: f64,
}

/// Apply every ratchet due for the position's current state.
///
/// Returns `None` when nothing moved, which is always the case on a second call.
pub fn apply_ratchets(pos: &mut Position, fixed_profit_risk_units: f64) -> Option<StopMove> {
    let from = pos.stop_loss;

    if matches!(pos.state, TpState::AtTp2 | TpState::AtTp3) && !pos.moved_to_breakeven {
        pos.stop_loss = pos.side.tighter(pos.stop_loss, pos.entry_price);
        pos.moved_to_breakeven = true;
    }

    if pos.state == TpState::AtTp3 && !pos.moved_to_fixed_profit {
        let locked = pos
            .side
            .offset(pos.entry_price, fixed_profit_risk_units * pos.risk());
        pos.stop_loss = pos.side.tighter(pos.stop_loss, locked);
        pos.moved_to_fixed_profit = true;
    }

    (pos.stop_loss != from).then_some(StopMove {
        from,
        to: pos.stop_loss,
    })
}
