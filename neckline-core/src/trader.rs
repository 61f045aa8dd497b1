//! Per-bar evaluation cycle.
//!
//! A `Trader` starts in [`Phase::Recovering`] and refuses live bars until
//! [`Trader::startup`] has reconciled the book against history. Each live
//! call evaluates exactly one new closed bar: exits first, then entries.
//! A gap in the feed sends the trader back through recovery before it
//! resumes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::CoreConfig;
use crate::context::ContextScorer;
use crate::domain::{last_closed_index, Bar, Pattern, Position, ReasonCode, Side, Ticket};
use crate::error::{CoreError, Result};
use crate::execution::{ExecutionGateway, ExecutionReport, ExecutionRequest};
use crate::guard::{EntryGuard, GuardDecision, GuardInput};
use crate::indicators::{IndicatorSeries, IndicatorSet};
use crate::pattern::PatternDetector;
use crate::recovery::{Reconciler, RecoveryReport};
use crate::store::StateSnapshot;
use crate::tp::{NewPosition, PositionBook, SharedBook, TpEngine, TpInput, TpOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Recovering,
    Live,
}

/// What one call to [`Trader::on_bars`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub bar_time: Option<DateTime<Utc>>,
    /// Set when a feed gap forced a replay instead of live evaluation.
    pub recovery: Option<RecoveryReport>,
    pub tp_outcomes: Vec<(Ticket, TpOutcome)>,
    /// Positions whose decision the execution collaborator refused.
    pub refused: Vec<Ticket>,
    pub entry: Option<GuardDecision>,
    pub opened: Option<Position>,
}

pub struct Trader<G: ExecutionGateway> {
    config: CoreConfig,
    book: SharedBook,
    guard: EntryGuard,
    detector: PatternDetector,
    engine: TpEngine,
    reconciler: Reconciler,
    gateway: G,
    audit: AuditLog,
    phase: Phase,
    last_closed: Option<DateTime<Utc>>,
}

impl<G: ExecutionGateway> Trader<G> {
    /// Fails on a config that [`CoreConfig::validate`] rejects.
    pub fn new(config: CoreConfig, gateway: G) -> Result<Self> {
        config
            .validate()
            .map_err(|err| CoreError::Config(err.to_string()))?;
        let scorer = ContextScorer::new(
            config.context.clone(),
            config.pattern.equality_tolerance_pct,
        );
        Ok(Self {
            guard: EntryGuard::new(config.guard.clone(), scorer),
            detector: PatternDetector::new(config.pattern.clone()),
            engine: TpEngine::new(config.targets.clone()),
            reconciler: Reconciler::new(&config),
            audit: AuditLog::new(config.fingerprint()),
            book: SharedBook::default(),
            gateway,
            phase: Phase::Recovering,
            last_closed: None,
            config,
        })
    }

    /// Rebuild from a persisted snapshot. Recovery still has to run.
    pub fn restore(config: CoreConfig, gateway: G, snapshot: StateSnapshot) -> Result<Self> {
        let mut trader = Self::new(config, gateway)?;
        if let Some(fp) = &snapshot.fingerprint {
            if fp != trader.audit.fingerprint() {
                warn!(
                    saved = fp.short(),
                    current = trader.audit.fingerprint().short(),
                    "config changed since snapshot"
                );
            }
        }
        trader.book = SharedBook::new(PositionBook::from_positions(snapshot.positions)?);
        trader.guard.restore_last_entry(snapshot.last_entry_time);
        trader.last_closed = snapshot.last_closed_bar;
        Ok(trader)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            positions: self.book.snapshot(),
            last_entry_time: self.guard.last_entry(),
            last_closed_bar: self.last_closed,
            fingerprint: Some(self.audit.fingerprint().clone()),
            ..StateSnapshot::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Handle for display readers.
    pub fn book(&self) -> SharedBook {
        self.book.clone()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn last_closed(&self) -> Option<DateTime<Utc>> {
        self.last_closed
    }

    /// Replay `bars` against the book, then check the forming bar's price.
    /// Holds the book's write lock throughout.
    pub fn startup(&mut self, bars: &[Bar]) -> RecoveryReport {
        self.phase = Phase::Recovering;
        info!(bars = bars.len(), positions = self.book.len(), "recovery started");

        let mut book = self.book.write();
        let report = self
            .reconciler
            .run(bars, &mut book, &mut self.gateway, &mut self.audit);

        let restored = match (self.guard.last_entry(), report.last_entry_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.guard.restore_last_entry(restored);

        if let Some(forming) = bars.last() {
            let exits = self
                .guard
                .startup_check(book.iter(), forming.close, forming.timestamp, &mut self.audit);
            for exit in exits {
                match self.gateway.close(exit.ticket, exit.price, exit.reason) {
                    ExecutionReport::Accepted { .. } => {
                        if book.remove(exit.ticket).is_ok() {
                            self.audit.record(
                                forming.timestamp,
                                AuditEvent::PositionClosed {
                                    ticket: exit.ticket,
                                    price: exit.price,
                                    reason: exit.reason,
                                },
                            );
                        }
                    }
                    ExecutionReport::Rejected { message } => {
                        error!(
                            ticket = %exit.ticket,
                            %message,
                            "startup close rejected, keeping open"
                        );
                        self.audit.record(
                            forming.timestamp,
                            AuditEvent::ExecutionFailed {
                                request: ExecutionRequest::Close {
                                    ticket: exit.ticket,
                                    price: exit.price,
                                    reason: exit.reason,
                                },
                                message,
                            },
                        );
                    }
                }
            }
        }
        drop(book);

        if report.closed_bar_time.is_some() {
            self.last_closed = report.closed_bar_time;
        }
        self.phase = Phase::Live;
        info!(
            closed = report.closes().count(),
            unresolved = report.unresolved().count(),
            open = self.book.len(),
            "recovery complete"
        );
        report
    }

    /// Evaluate the newest closed bar of `bars` (the last element is forming).
    pub fn on_bars(&mut self, bars: &[Bar]) -> Result<CycleReport> {
        if self.phase != Phase::Live {
            return Err(CoreError::RecoveryPending);
        }
        let Some(index) = last_closed_index(bars) else {
            return Ok(CycleReport::default());
        };
        let bar = bars[index];

        if let Some(last) = self.last_closed {
            if bar.timestamp <= last {
                return Err(CoreError::StaleBar {
                    incoming: bar.timestamp,
                    last,
                });
            }
            if self.is_gap(&bars[..index], bar.timestamp, last) {
                warn!(last = %last, incoming = %bar.timestamp, "feed gap, replaying history");
                let recovery = self.startup(bars);
                return Ok(CycleReport {
                    bar_time: Some(bar.timestamp),
                    recovery: Some(recovery),
                    ..CycleReport::default()
                });
            }
        }

        let closed = &bars[..=index];
        let series = IndicatorSeries::compute(closed, &self.config.indicators);
        let mut report = CycleReport {
            bar_time: Some(bar.timestamp),
            ..CycleReport::default()
        };

        self.evaluate_exits(closed, &series, index, &mut report)?;
        self.evaluate_entry(bars, &series, index, &mut report);

        self.last_closed = Some(bar.timestamp);
        Ok(report)
    }

    /// More than one closed bar arrived since the last call, or the interval
    /// between them exceeds the configured maximum.
    fn is_gap(&self, earlier: &[Bar], incoming: DateTime<Utc>, last: DateTime<Utc>) -> bool {
        let delivered_in_order = earlier.last().is_some_and(|b| b.timestamp == last);
        if !delivered_in_order {
            return true;
        }
        match self.config.recovery.max_bar_interval_secs {
            Some(secs) => incoming - last > Duration::seconds(secs),
            None => false,
        }
    }

    fn evaluate_exits(
        &mut self,
        closed: &[Bar],
        series: &IndicatorSeries,
        index: usize,
        report: &mut CycleReport,
    ) -> Result<()> {
        let input = TpInput::at(
            closed,
            series,
            index,
            self.config.targets.volatility_reference_bars,
        )?;
        let mut book = self.book.write();

        for pos in book.snapshot() {
            let decision = self.engine.evaluate(&pos, &input);
            let reply = match decision.outcome {
                TpOutcome::Exit { price, reason } => Some((
                    ExecutionRequest::Close {
                        ticket: pos.ticket,
                        price,
                        reason,
                    },
                    self.gateway.close(pos.ticket, price, reason),
                )),
                TpOutcome::Advance {
                    stop_move: Some((_, to)),
                    ..
                } => Some((
                    ExecutionRequest::MoveStop {
                        ticket: pos.ticket,
                        stop_loss: to,
                    },
                    self.gateway.move_stop(pos.ticket, to),
                )),
                _ => None,
            };
            if let Some((request, ExecutionReport::Rejected { message })) = reply {
                error!(ticket = %pos.ticket, %message, "execution refused, position unchanged");
                self.audit
                    .record(decision.bar_time, AuditEvent::ExecutionFailed { request, message });
                report.refused.push(pos.ticket);
                continue;
            }

            report.tp_outcomes.push((pos.ticket, decision.outcome.clone()));
            self.engine.commit(&mut book, decision, &mut self.audit)?;
        }
        Ok(())
    }

    fn evaluate_entry(
        &mut self,
        bars: &[Bar],
        series: &IndicatorSeries,
        index: usize,
        report: &mut CycleReport,
    ) {
        let closed = &bars[..=index];
        let bar = bars[index];
        let indicators = series.at(index);
        let pattern = self.detector.detect(closed);

        let decision = if pattern.is_some() && !series.is_reliable(index) {
            self.guard.hold(
                ReasonCode::InsufficientData,
                format!("{} bars, need {}", closed.len(), self.config.min_reliable_bars()),
                bar.timestamp,
                Some(index),
                &mut self.audit,
            )
        } else {
            let previous_entry = self.guard.last_entry();
            let input = GuardInput {
                bars,
                index,
                pattern: pattern.as_ref(),
                indicators,
                open_positions: self.book.len(),
            };
            let decision = self.guard.check(&input, &mut self.audit);
            match (&pattern, decision.is_enter()) {
                (Some(p), true) => match self.enter(p, &bar, &indicators) {
                    Ok(Some(position)) => {
                        report.opened = Some(position);
                        decision
                    }
                    Ok(None) => {
                        self.guard.restore_last_entry(previous_entry);
                        decision
                    }
                    Err(err) => {
                        self.guard.restore_last_entry(previous_entry);
                        self.guard
                            .hold_on_error(&err, bar.timestamp, Some(index), &mut self.audit)
                    }
                },
                _ => decision,
            }
        };
        report.entry = Some(decision);
    }

    /// Open a long at the closed bar's close with the stop under the right low.
    /// `Ok(None)` means the execution collaborator refused.
    fn enter(
        &mut self,
        pattern: &Pattern,
        bar: &Bar,
        indicators: &IndicatorSet,
    ) -> Result<Option<Position>> {
        let volatility = indicators.volatility.ok_or_else(|| {
            CoreError::InvalidInput("volatility range unavailable for stop placement".into())
        })?;
        let order = NewPosition {
            side: Side::Long,
            entry_price: bar.close,
            stop_loss: pattern.right_low.price - self.config.entry.stop_buffer_vol * volatility,
            size: self.config.entry.size,
            opened_at: bar.timestamp,
        };
        let targets = self.engine.plan(&order)?;

        match self
            .gateway
            .open(order.side, order.entry_price, order.stop_loss, targets.tp3, order.size)
        {
            ExecutionReport::Accepted { ticket } => {
                let mut book = self.book.write();
                let position = self.engine.open(&mut book, ticket, &order, &mut self.audit)?;
                Ok(Some(position))
            }
            ExecutionReport::Rejected { message } => {
                error!(%message, "open refused");
                self.audit.record(
                    bar.timestamp,
                    AuditEvent::ExecutionFailed {
                        request: ExecutionRequest::Open {
                            side: order.side,
                            entry_price: order.entry_price,
                            stop_loss: order.stop_loss,
                            take_profit: targets.tp3,
                            size: order.size,
                        },
                        message,
                    },
                );
                Ok(None)
            }
        }
    }
}
