//! Recovery reconciler.
//!
//! Rebuilds indicator/pattern context from recent history and decides, for
//! each open position, whether the latest closed bar already put it beyond its
//! stop or its original target. Pattern validity is entry-only logic and plays
//! no part in these decisions.
//!
//! [`Reconciler::reconcile`] is a pure function of bars and positions.
//! [`Reconciler::run`] applies the closes through the execution collaborator
//! while holding exclusive access to the book.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::{ContextConfig, CoreConfig, IndicatorConfig};
use crate::context::{classify, MarketContext};
use crate::domain::{last_closed_index, Bar, ExitReason, Pattern, Position, Ticket};
use crate::execution::{ExecutionGateway, ExecutionReport, ExecutionRequest};
use crate::indicators::{IndicatorSeries, IndicatorSet};
use crate::pattern::PatternDetector;
use crate::tp::PositionBook;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    Close { price: f64, reason: ExitReason },
    KeepOpen,
    /// Could not be decided; the position stays open.
    Unresolved { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecovery {
    pub ticket: Ticket,
    pub action: RecoveryAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub closed_bar_index: Option<usize>,
    pub closed_bar_time: Option<DateTime<Utc>>,
    /// Enough history for the slowest average.
    pub reliable: bool,
    pub indicators: IndicatorSet,
    pub context: MarketContext,
    pub pattern: Option<Pattern>,
    /// Open time of the newest position, for the guard's cooldown.
    pub last_entry_time: Option<DateTime<Utc>>,
    /// Last replay bar at or before `last_entry_time`.
    pub last_entry_bar: Option<usize>,
    pub decisions: Vec<PositionRecovery>,
}

impl RecoveryReport {
    pub fn closes(&self) -> impl Iterator<Item = (Ticket, f64, ExitReason)> + '_ {
        self.decisions.iter().filter_map(|d| match d.action {
            RecoveryAction::Close { price, reason } => Some((d.ticket, price, reason)),
            _ => None,
        })
    }

    pub fn unresolved(&self) -> impl Iterator<Item = Ticket> + '_ {
        self.decisions
            .iter()
            .filter(|d| matches!(d.action, RecoveryAction::Unresolved { .. }))
            .map(|d| d.ticket)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    indicators: IndicatorConfig,
    context: ContextConfig,
    detector: PatternDetector,
    history_bars: usize,
}

impl Reconciler {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            indicators: config.indicators.clone(),
            context: config.context.clone(),
            detector: PatternDetector::new(config.pattern.clone()),
            history_bars: config.recovery.history_bars,
        }
    }

    /// Decide every position against the latest closed bar of `bars`.
    pub fn reconcile(&self, bars: &[Bar], positions: &[Position]) -> RecoveryReport {
        if bars.len() < self.history_bars {
            warn!(bars = bars.len(), wanted = self.history_bars, "short replay history");
        }

        let closed_index = last_closed_index(bars);
        let closed = closed_index.map_or(&bars[..0], |i| &bars[..=i]);
        let closed_bar = closed.last();

        let series = IndicatorSeries::compute(closed, &self.indicators);
        let (indicators, reliable) = match closed_index {
            Some(i) => (series.at(i), series.is_reliable(i)),
            None => (IndicatorSet::default(), false),
        };
        let context = closed_bar
            .map(|b| classify(&indicators, b.close, &self.context))
            .unwrap_or_default();
        let pattern = self.detector.detect(closed);

        let last_entry_time = positions.iter().map(|p| p.opened_at).max();
        let last_entry_bar =
            last_entry_time.and_then(|t| closed.iter().rposition(|b| b.timestamp <= t));

        let decisions = positions
            .iter()
            .map(|pos| PositionRecovery {
                ticket: pos.ticket,
                action: decide(pos, closed_bar),
            })
            .collect();

        RecoveryReport {
            closed_bar_index: closed_index,
            closed_bar_time: closed_bar.map(|b| b.timestamp),
            reliable,
            indicators,
            context,
            pattern,
            last_entry_time,
            last_entry_bar,
            decisions,
        }
    }

    /// Reconcile and apply closes. A refused close leaves the position open
    /// and marks it unresolved.
    pub fn run<G>(
        &self,
        bars: &[Bar],
        book: &mut PositionBook,
        gateway: &mut G,
        audit: &mut AuditLog,
    ) -> RecoveryReport
    where
        G: ExecutionGateway + ?Sized,
    {
        let positions = book.snapshot();
        let mut report = self.reconcile(bars, &positions);

        for (decision, pos) in report.decisions.iter_mut().zip(&positions) {
            let at = report.closed_bar_time.unwrap_or(pos.opened_at);
            if let RecoveryAction::Close { price, reason } = decision.action {
                match gateway.close(decision.ticket, price, reason) {
                    ExecutionReport::Accepted { .. } => {
                        if let Err(err) = book.remove(decision.ticket) {
                            error!(
                                ticket = %decision.ticket,
                                error = %err,
                                "closed position missing from book"
                            );
                        }
                        info!(ticket = %decision.ticket, price, %reason, "recovery closed position");
                        audit.record(
                            at,
                            AuditEvent::Recovery {
                                ticket: decision.ticket,
                                action: decision.action.clone(),
                            },
                        );
                        audit.record(
                            at,
                            AuditEvent::PositionClosed {
                                ticket: decision.ticket,
                                price,
                                reason,
                            },
                        );
                        continue;
                    }
                    ExecutionReport::Rejected { message } => {
                        error!(
                            ticket = %decision.ticket,
                            %message,
                            "recovery close rejected, keeping open"
                        );
                        audit.record(
                            at,
                            AuditEvent::ExecutionFailed {
                                request: ExecutionRequest::Close {
                                    ticket: decision.ticket,
                                    price,
                                    reason,
                                },
                                message: message.clone(),
                            },
                        );
                        decision.action = RecoveryAction::Unresolved {
                            detail: format!("close rejected: {message}"),
                        };
                    }
                }
            }
            if let RecoveryAction::Unresolved { detail } = &decision.action {
                warn!(ticket = %decision.ticket, %detail, "position left unresolved");
            }
            audit.record(
                at,
                AuditEvent::Recovery {
                    ticket: decision.ticket,
                    action: decision.action.clone(),
                },
            );
        }

        report
    }
}

fn decide(pos: &Position, closed: Option<&Bar>) -> RecoveryAction {
    let Some(bar) = closed else {
        return RecoveryAction::Unresolved {
            detail: "no closed bar in replay history".into(),
        };
    };
    if !pos.is_evaluable() {
        error!(ticket = %pos.ticket, "position levels unusable");
        return RecoveryAction::Unresolved {
            detail: format!("{} has non-finite or zero-risk levels", pos.ticket),
        };
    }
    if !bar.close.is_finite() {
        error!(ticket = %pos.ticket, bar = %bar.timestamp, "closed bar has no usable close");
        return RecoveryAction::Unresolved {
            detail: format!("bar {} has no usable close", bar.timestamp),
        };
    }

    if pos.side.is_adverse(bar.close, pos.stop_loss) {
        RecoveryAction::Close {
            price: pos.stop_loss,
            reason: ExitReason::StopLoss,
        }
    } else if pos.side.is_beyond(bar.close, pos.original_target()) {
        RecoveryAction::Close {
            price: pos.original_target(),
            reason: ExitReason::TakeProfit,
        }
    } else {
        RecoveryAction::KeepOpen
    }
}
