//! Per-position TP state machine.
//!
//! Evaluation is pure: [`TpEngine::evaluate`] returns a [`TpDecision`] holding
//! the complete next value of the position, and [`TpEngine::commit`] swaps it
//! into the book in one step. A decision that the execution collaborator
//! refuses is simply never committed.
//!
//! Per closed bar, at most one action, checked in this order:
//! 1. close beyond the current stop against the trade: exit at the stop
//! 2. state transition (or, in AT_TP3, close beyond TP3: exit at TP3)
//! 3. retrace exit at the active target, in every state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::book::PositionBook;
use super::ratchet::{apply_ratchets, StopMove};
use super::targets::compute_targets;
use crate::audit::{AuditEvent, AuditLog};
use crate::config::TargetConfig;
use crate::domain::{
    Bar, ExitReason, Position, RetraceTrigger, Side, TargetLevels, Ticket, TpState,
};
use crate::error::{CoreError, Result};
use crate::indicators::IndicatorSeries;

/// Market data the engine reads for one closed bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpInput {
    pub bar: Bar,
    pub previous: Option<Bar>,
    pub fast: Option<f64>,
    pub volatility: Option<f64>,
    /// Mean volatility range over the preceding reference window.
    pub volatility_reference: Option<f64>,
}

impl TpInput {
    /// Gather the inputs for closed bar `index`.
    pub fn at(
        bars: &[Bar],
        series: &IndicatorSeries,
        index: usize,
        reference_bars: usize,
    ) -> Result<Self> {
        let bar = *bars.get(index).ok_or(CoreError::BarOutOfRange {
            index,
            len: bars.len(),
        })?;
        let set = series.at(index);
        Ok(Self {
            bar,
            previous: index.checked_sub(1).and_then(|i| bars.get(i)).copied(),
            fast: set.fast,
            volatility: set.volatility,
            volatility_reference: series.volatility_reference(index, reference_bars),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TpOutcome {
    /// Nothing to do; only the evaluation watermark advances.
    Hold,
    Advance {
        from: TpState,
        to: TpState,
        stop_move: Option<(f64, f64)>,
    },
    Exit {
        price: f64,
        reason: ExitReason,
    },
    /// The bar was already consumed by this position.
    AlreadyEvaluated,
    /// Missing or malformed data; the position stays exactly as it was.
    Unevaluable { detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TpDecision {
    pub ticket: Ticket,
    pub bar_time: DateTime<Utc>,
    pub outcome: TpOutcome,
    /// Position value after the decision. For exits, the value at close.
    pub next: Position,
}

/// What a new position needs besides a ticket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewPosition {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TpEngine {
    config: TargetConfig,
}

impl TpEngine {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn plan(&self, order: &NewPosition) -> Result<TargetLevels> {
        compute_targets(order.entry_price, order.stop_loss, order.side, &self.config)
    }

    /// Insert a position at AT_TP1 under `ticket`. The opening bar counts as consumed.
    pub fn open(
        &self,
        book: &mut PositionBook,
        ticket: Ticket,
        order: &NewPosition,
        audit: &mut AuditLog,
    ) -> Result<Position> {
        if !(order.size.is_finite() && order.size > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "position size {} must be positive",
                order.size
            )));
        }
        let targets = self.plan(order)?;
        let position = Position {
            ticket,
            side: order.side,
            entry_price: order.entry_price,
            initial_stop: order.stop_loss,
            stop_loss: order.stop_loss,
            targets,
            state: TpState::AtTp1,
            moved_to_breakeven: false,
            moved_to_fixed_profit: false,
            size: order.size,
            opened_at: order.opened_at,
            last_bar_time: Some(order.opened_at),
        };
        book.insert(position.clone())?;

        info!(
            %ticket,
            side = %order.side,
            entry = order.entry_price,
            stop = order.stop_loss,
            ?targets,
            "position opened"
        );
        audit.record(
            order.opened_at,
            AuditEvent::PositionOpened {
                ticket,
                side: order.side,
                entry_price: order.entry_price,
                stop_loss: order.stop_loss,
                targets,
            },
        );
        Ok(position)
    }

    pub fn evaluate(&self, pos: &Position, input: &TpInput) -> TpDecision {
        let bar = &input.bar;
        let decide = |outcome, next| TpDecision {
            ticket: pos.ticket,
            bar_time: bar.timestamp,
            outcome,
            next,
        };

        if pos.has_consumed(bar.timestamp) {
            return decide(TpOutcome::AlreadyEvaluated, pos.clone());
        }
        if !pos.is_evaluable() || !bar.is_sane() {
            warn!(
                ticket = %pos.ticket,
                bar = %bar.timestamp,
                "position or bar unusable, keeping open"
            );
            let detail = format!("cannot evaluate {} on bar {}", pos.ticket, bar.timestamp);
            return decide(TpOutcome::Unevaluable { detail }, pos.clone());
        }

        let side = pos.side;
        let close = bar.close;
        let mut next = pos.clone();
        next.last_bar_time = Some(bar.timestamp);

        if side.is_adverse(close, pos.stop_loss) {
            let outcome = TpOutcome::Exit {
                price: pos.stop_loss,
                reason: ExitReason::StopLoss,
            };
            return decide(outcome, next);
        }

        if let Some(to) = self.transition(pos, input) {
            next.state = to;
            let stop_move = apply_ratchets(&mut next, self.config.fixed_profit_risk_units)
                .map(|StopMove { from, to }| (from, to));
            let outcome = TpOutcome::Advance {
                from: pos.state,
                to,
                stop_move,
            };
            return decide(outcome, next);
        }

        if pos.state == TpState::AtTp3 && side.is_beyond(close, pos.targets.tp3) {
            let outcome = TpOutcome::Exit {
                price: pos.targets.tp3,
                reason: ExitReason::TakeProfit,
            };
            return decide(outcome, next);
        }

        if let Some(trigger) = self.retrace_trigger(side, input) {
            let outcome = TpOutcome::Exit {
                price: pos.active_target(),
                reason: ExitReason::Retrace(trigger),
            };
            return decide(outcome, next);
        }

        decide(TpOutcome::Hold, next)
    }

    fn transition(&self, pos: &Position, input: &TpInput) -> Option<TpState> {
        let side = pos.side;
        let bar = &input.bar;
        let close = bar.close;
        let target = pos.active_target();
        let through = side.reached(bar, target) && side.is_beyond(close, target);
        let confirmed = match pos.state {
            TpState::AtTp1 => input.fast.is_some_and(|fast| side.is_beyond(close, fast)),
            TpState::AtTp2 => input.volatility.is_some_and(|vol| bar.body() > vol),
            TpState::AtTp3 => false,
        };
        if through && confirmed {
            pos.state.next()
        } else {
            None
        }
    }

    fn retrace_trigger(&self, side: Side, input: &TpInput) -> Option<RetraceTrigger> {
        let bar = &input.bar;
        if input.fast.is_some_and(|fast| side.is_adverse(bar.close, fast)) {
            return Some(RetraceTrigger::FastAverageLost);
        }
        if input.previous.is_some_and(|prev| is_reversal_against(side, &prev, bar)) {
            return Some(RetraceTrigger::ReversalCandle);
        }
        let contracted = match (input.volatility, input.volatility_reference) {
            (Some(vol), Some(reference)) if reference > 0.0 => {
                vol < self.config.volatility_contraction_ratio * reference
            }
            _ => false,
        };
        contracted.then_some(RetraceTrigger::VolatilityContraction)
    }

    /// Apply a decision to the book as one unit. Returns the closed position on exit.
    pub fn commit(
        &self,
        book: &mut PositionBook,
        decision: TpDecision,
        audit: &mut AuditLog,
    ) -> Result<Option<Position>> {
        let TpDecision {
            ticket,
            bar_time,
            outcome,
            next,
        } = decision;

        match outcome {
            TpOutcome::AlreadyEvaluated | TpOutcome::Unevaluable { .. } => Ok(None),
            TpOutcome::Hold => {
                book.replace(next)?;
                Ok(None)
            }
            TpOutcome::Advance { from, to, .. } => {
                let before = book.replace(next.clone())?;
                info!(%ticket, %from, %to, stop = next.stop_loss, "tp state advanced");
                audit.record(
                    bar_time,
                    AuditEvent::TpTransition {
                        ticket,
                        from,
                        to,
                        stop_before: before.stop_loss,
                        stop_after: next.stop_loss,
                    },
                );
                Ok(None)
            }
            TpOutcome::Exit { price, reason } => {
                book.remove(ticket)?;
                info!(%ticket, price, %reason, "position closed");
                audit.record(bar_time, AuditEvent::PositionClosed { ticket, price, reason });
                Ok(Some(next))
            }
        }
    }
}

/// Engulfing candle against `side`: a bearish bar swallowing a bullish one for
/// longs, the mirror for shorts.
fn is_reversal_against(side: Side, prev: &Bar, bar: &Bar) -> bool {
    match side {
        Side::Long => {
            prev.is_bullish() && bar.is_bearish() && bar.open >= prev.close && bar.close < prev.open
        }
        Side::Short => {
            prev.is_bearish() && bar.is_bullish() && bar.open <= prev.close && bar.close > prev.open
        }
    }
}
