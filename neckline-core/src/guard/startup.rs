//! Startup-only price check for positions restored after a restart.
//!
//! Independent of the entry pipeline: it only asks whether the latest price
//! already sits beyond a position's stop or original target.

use chrono::{DateTime, Utc};

use super::{record, EntryGuard, GuardDecision};
use crate::audit::AuditLog;
use crate::domain::{ExitReason, GuardVerdict, Position, ReasonCode, Ticket};

/// A position the startup check says to close immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartupExit {
    pub ticket: Ticket,
    pub price: f64,
    pub reason: ExitReason,
}

impl EntryGuard {
    /// Check each position against `latest_price`. Positions that cannot be
    /// evaluated stay open.
    pub fn startup_check<'a, I>(
        &self,
        positions: I,
        latest_price: f64,
        timestamp: DateTime<Utc>,
        audit: &mut AuditLog,
    ) -> Vec<StartupExit>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut exits = Vec::new();
        for pos in positions {
            let (decision, exit) = startup_decision(pos, latest_price, timestamp);
            record(&decision, audit);
            exits.extend(exit);
        }
        exits
    }
}

fn startup_decision(
    pos: &Position,
    price: f64,
    timestamp: DateTime<Utc>,
) -> (GuardDecision, Option<StartupExit>) {
    let make = |verdict, reason, detail: String| GuardDecision {
        verdict,
        reason,
        detail,
        timestamp,
        bar_index: None,
        ticket: Some(pos.ticket),
    };

    if !price.is_finite() || !pos.is_evaluable() {
        let decision = make(
            GuardVerdict::Hold,
            ReasonCode::InternalError,
            format!("cannot evaluate {} at price {}", pos.ticket, price),
        );
        return (decision, None);
    }

    if pos.side.is_adverse(price, pos.stop_loss) {
        let decision = make(
            GuardVerdict::Exit,
            ReasonCode::StopLossHit,
            format!("price={} beyond stop={}", price, pos.stop_loss),
        );
        let exit = StartupExit {
            ticket: pos.ticket,
            price: pos.stop_loss,
            reason: ExitReason::StopLoss,
        };
        return (decision, Some(exit));
    }

    let target = pos.original_target();
    if pos.side.is_beyond(price, target) {
        let decision = make(
            GuardVerdict::Exit,
            ReasonCode::TakeProfitHit,
            format!("price={} beyond target={}", price, target),
        );
        let exit = StartupExit {
            ticket: pos.ticket,
            price: target,
            reason: ExitReason::TakeProfit,
        };
        return (decision, Some(exit));
    }

    let decision = make(
        GuardVerdict::Hold,
        ReasonCode::WithinLevels,
        format!("stop={} < price={} < target={}", pos.stop_loss, price, target),
    );
    (decision, None)
}
