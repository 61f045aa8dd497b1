//! Entry guard: a fixed-order veto pipeline.
//!
//! 1. setup exists            -> HOLD  NO_SETUP
//! 2. bar is closed           -> SKIP  BAR_NOT_CLOSED
//! 3. close-to-close movement -> SKIP  TICK_NOISE_FILTERED
//! 4. quality score           -> HOLD  ENTRY_QUALITY_BELOW_GATE
//! 5. cooldown                -> HOLD  COOLDOWN_ACTIVE
//! 6. pyramid limit           -> HOLD  PYRAMIDING_LIMIT (one position without pyramiding)
//!
//! The first failing check wins. All six passing gives ENTER / APPROVED.
//! Every call is written to the audit log regardless of outcome.

pub mod startup;

pub use startup::StartupExit;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::GuardConfig;
use crate::context::{ContextScorer, Regime};
use crate::domain::{Bar, GuardVerdict, Pattern, ReasonCode, Ticket};
use crate::error::CoreError;
use crate::indicators::IndicatorSet;

/// One audit-trail entry from the guard. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardDecision {
    pub verdict: GuardVerdict,
    pub reason: ReasonCode,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub bar_index: Option<usize>,
    /// Set for startup checks, which are per position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

impl GuardDecision {
    fn new(
        verdict: GuardVerdict,
        reason: ReasonCode,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
        bar_index: Option<usize>,
    ) -> Self {
        Self {
            verdict,
            reason,
            detail: detail.into(),
            timestamp,
            bar_index,
            ticket: None,
        }
    }

    pub fn is_enter(&self) -> bool {
        self.verdict == GuardVerdict::Enter
    }
}

/// Everything one entry check looks at.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput<'a> {
    /// Full sequence; the last element is the forming bar.
    pub bars: &'a [Bar],
    /// Bar under evaluation.
    pub index: usize,
    pub pattern: Option<&'a Pattern>,
    pub indicators: IndicatorSet,
    pub open_positions: usize,
}

impl GuardInput<'_> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.bars
            .get(self.index)
            .or_else(|| self.bars.last())
            .map(|b| b.timestamp)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone)]
pub struct EntryGuard {
    config: GuardConfig,
    scorer: ContextScorer,
    last_entry: Option<DateTime<Utc>>,
}

impl EntryGuard {
    pub fn new(config: GuardConfig, scorer: ContextScorer) -> Self {
        Self {
            config,
            scorer,
            last_entry: None,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn scorer(&self) -> &ContextScorer {
        &self.scorer
    }

    /// Time of the bar on which the last ENTER was issued.
    pub fn last_entry(&self) -> Option<DateTime<Utc>> {
        self.last_entry
    }

    /// Restore the cooldown anchor, e.g. after recovery or a rejected open.
    pub fn restore_last_entry(&mut self, at: Option<DateTime<Utc>>) {
        self.last_entry = at;
    }

    /// Closed bars in `bars[..=index]` that came after the last entry bar.
    pub fn bars_since_entry(&self, bars: &[Bar], index: usize) -> Option<usize> {
        let last = self.last_entry?;
        let end = index.min(bars.len().saturating_sub(1));
        Some(
            bars.get(..=end)
                .unwrap_or_default()
                .iter()
                .filter(|b| b.timestamp > last)
                .count(),
        )
    }

    /// Run the pipeline, record the outcome and, on ENTER, the entry bar.
    pub fn check(&mut self, input: &GuardInput<'_>, audit: &mut AuditLog) -> GuardDecision {
        let decision = self.evaluate(input);
        if decision.is_enter() {
            self.last_entry = Some(decision.timestamp);
        }
        record(&decision, audit);
        decision
    }

    /// HOLD with a caller-supplied reason, recorded like any other decision.
    pub fn hold(
        &self,
        reason: ReasonCode,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
        bar_index: Option<usize>,
        audit: &mut AuditLog,
    ) -> GuardDecision {
        let decision = GuardDecision::new(GuardVerdict::Hold, reason, detail, timestamp, bar_index);
        record(&decision, audit);
        decision
    }

    /// Convert an internal failure into the safest entry verdict.
    pub fn hold_on_error(
        &self,
        err: &CoreError,
        timestamp: DateTime<Utc>,
        bar_index: Option<usize>,
        audit: &mut AuditLog,
    ) -> GuardDecision {
        error!(error = %err, "entry evaluation failed, holding");
        self.hold(ReasonCode::InternalError, err.to_string(), timestamp, bar_index, audit)
    }

    fn evaluate(&self, input: &GuardInput<'_>) -> GuardDecision {
        let ts = input.timestamp();
        let index = input.index;
        let at = Some(index);
        let cfg = &self.config;

        let Some(pattern) = input.pattern.filter(|p| p.valid) else {
            return GuardDecision::new(
                GuardVerdict::Hold,
                ReasonCode::NoSetup,
                "no valid pattern",
                ts,
                at,
            );
        };

        if index + 1 >= input.bars.len() {
            return GuardDecision::new(
                GuardVerdict::Skip,
                ReasonCode::BarNotClosed,
                format!("index {} of {} bars is not a closed bar", index, input.bars.len()),
                ts,
                at,
            );
        }
        let bar = &input.bars[index];

        if index == 0 {
            return GuardDecision::new(
                GuardVerdict::Skip,
                ReasonCode::TickNoiseFiltered,
                "no previous close to measure movement against",
                ts,
                at,
            );
        }
        let movement_pips = (bar.close - input.bars[index - 1].close).abs() / cfg.pip_size;
        if movement_pips.is_nan() || movement_pips <= cfg.noise_min_pips {
            return GuardDecision::new(
                GuardVerdict::Skip,
                ReasonCode::TickNoiseFiltered,
                format!("movement={:.1} pips, min={:.1}", movement_pips, cfg.noise_min_pips),
                ts,
                at,
            );
        }

        let score = match self.scorer.score(pattern, bar, &input.indicators) {
            Ok(score) => score,
            Err(err) => {
                error!(error = %err, index, "quality scoring failed");
                return GuardDecision::new(
                    GuardVerdict::Hold,
                    ReasonCode::InternalError,
                    err.to_string(),
                    ts,
                    at,
                );
            }
        };
        if score.total < cfg.min_quality_score {
            return GuardDecision::new(
                GuardVerdict::Hold,
                ReasonCode::EntryQualityBelowGate,
                format!("score={:.2}, gate={:.2}", score.total, cfg.min_quality_score),
                ts,
                at,
            );
        }

        let regime = self.scorer.classify(&input.indicators, bar.close).regime;
        let cooldown_override = cfg.pyramiding_enabled && regime == Some(Regime::Bull);
        if !cooldown_override {
            if let Some(since) = self.bars_since_entry(input.bars, index) {
                if since < cfg.cooldown_bars {
                    return GuardDecision::new(
                        GuardVerdict::Hold,
                        ReasonCode::CooldownActive,
                        format!("bars_since_entry={}, cooldown={}", since, cfg.cooldown_bars),
                        ts,
                        at,
                    );
                }
            }
        }

        let max_open = if cfg.pyramiding_enabled {
            cfg.max_pyramid_positions
        } else {
            1
        };
        if input.open_positions >= max_open {
            return GuardDecision::new(
                GuardVerdict::Hold,
                ReasonCode::PyramidingLimit,
                format!("open={}, max={}", input.open_positions, max_open),
                ts,
                at,
            );
        }

        GuardDecision::new(
            GuardVerdict::Enter,
            ReasonCode::Approved,
            format!("score={:.2}", score.total),
            ts,
            at,
        )
    }
}

fn record(decision: &GuardDecision, audit: &mut AuditLog) {
    info!(
        verdict = %decision.verdict,
        reason = %decision.reason,
        bar_index = ?decision.bar_index,
        ticket = ?decision.ticket,
        detail = %decision.detail,
        "guard decision"
    );
    audit.record(decision.timestamp, AuditEvent::Guard(decision.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, GuardConfig};
    use crate::domain::{equality_deviation_pct, ConfigFingerprint, PatternPoint};
    use chrono::{Duration, TimeZone};

    fn bars(n: usize) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                // alternate 20-point moves so the noise filter passes
                let close = 2030.0 + if i % 2 == 0 { 0.0 } else { 20.0 };
                let open = close - 15.0;
                Bar::new(base + Duration::hours(i as i64), open, close + 1.0, open - 1.0, close)
            })
            .collect()
    }

    fn pattern() -> Pattern {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let p = |index, price| PatternPoint {
            index,
            price,
            timestamp: t,
        };
        Pattern {
            left_low: p(1, 2000.0),
            neckline: p(5, 2048.0),
            right_low: p(9, 2000.0),
            deviation_pct: equality_deviation_pct(2000.0, 2000.0),
            valid: true,
        }
    }

    fn bullish() -> IndicatorSet {
        IndicatorSet {
            fast: Some(2035.0),
            medium: Some(2020.0),
            slow: Some(1990.0),
            volatility: Some(12.0),
        }
    }

    fn guard(config: GuardConfig) -> EntryGuard {
        EntryGuard::new(config, ContextScorer::new(ContextConfig::default(), 2.0))
    }

    fn audit() -> AuditLog {
        AuditLog::new(ConfigFingerprint::from_bytes(b"test"))
    }

    #[test]
    fn approves_and_records_entry_bar() {
        let bars = bars(30);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let mut log = audit();
        let input = GuardInput {
            bars: &bars,
            index: 27,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut log);
        assert_eq!(d.verdict, GuardVerdict::Enter, "{}", d.detail);
        assert_eq!(d.reason, ReasonCode::Approved);
        assert_eq!(g.last_entry(), Some(bars[27].timestamp));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn no_setup_short_circuits_everything() {
        let bars = bars(30);
        let mut g = guard(GuardConfig::default());
        g.restore_last_entry(Some(bars[28].timestamp));
        let mut log = audit();
        // forming bar, no pattern, no indicators, cooldown active
        let input = GuardInput {
            bars: &bars,
            index: 29,
            pattern: None,
            indicators: IndicatorSet::default(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut log);
        assert_eq!(d.verdict, GuardVerdict::Hold);
        assert_eq!(d.reason, ReasonCode::NoSetup);
    }

    #[test]
    fn forming_bar_is_skipped() {
        let bars = bars(30);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let input = GuardInput {
            bars: &bars,
            index: 29,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut audit());
        assert_eq!(d.verdict, GuardVerdict::Skip);
        assert_eq!(d.reason, ReasonCode::BarNotClosed);
        assert_eq!(g.last_entry(), None);
    }

    #[test]
    fn small_moves_are_noise() {
        let mut bars = bars(30);
        bars[27].close = bars[26].close + 0.3; // 3 pips at 0.1
        bars[27].low = bars[27].low.min(bars[27].close);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let input = GuardInput {
            bars: &bars,
            index: 27,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut audit());
        assert_eq!(d.reason, ReasonCode::TickNoiseFiltered);
        assert_eq!(d.verdict, GuardVerdict::Skip);
    }

    #[test]
    fn first_bar_has_no_movement_reference() {
        let bars = bars(5);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let input = GuardInput {
            bars: &bars,
            index: 0,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        assert_eq!(g.check(&input, &mut audit()).reason, ReasonCode::TickNoiseFiltered);
    }

    #[test]
    fn weak_score_holds() {
        let bars = bars(30);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let input = GuardInput {
            bars: &bars,
            index: 27,
            pattern: Some(&p),
            indicators: IndicatorSet::default(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut audit());
        assert_eq!(d.reason, ReasonCode::EntryQualityBelowGate);
    }

    #[test]
    fn cooldown_blocks_then_expires() {
        let bars = bars(40);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let mut log = audit();
        g.restore_last_entry(Some(bars[20].timestamp));

        let at = |index| GuardInput {
            bars: &bars,
            index,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        assert_eq!(g.check(&at(29), &mut log).reason, ReasonCode::CooldownActive);
        assert_eq!(g.check(&at(30), &mut log).reason, ReasonCode::Approved);
    }

    #[test]
    fn without_pyramiding_one_open_position_blocks_reentry() {
        let bars = bars(40);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        // last entry long past the cooldown
        g.restore_last_entry(Some(bars[5].timestamp));
        let mut log = audit();
        let input = GuardInput {
            bars: &bars,
            index: 37,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 1,
        };
        let d = g.check(&input, &mut log);
        assert_eq!(d.verdict, GuardVerdict::Hold);
        assert_eq!(d.reason, ReasonCode::PyramidingLimit);
        assert_eq!(g.last_entry(), Some(bars[5].timestamp));

        let flat = GuardInput {
            open_positions: 0,
            ..input
        };
        assert_eq!(g.check(&flat, &mut log).reason, ReasonCode::Approved);
    }

    #[test]
    fn bull_pyramiding_overrides_cooldown_but_respects_limit() {
        let bars = bars(40);
        let p = pattern();
        let mut g = guard(GuardConfig {
            pyramiding_enabled: true,
            max_pyramid_positions: 2,
            ..GuardConfig::default()
        });
        g.restore_last_entry(Some(bars[25].timestamp));
        let mut log = audit();

        let input = GuardInput {
            bars: &bars,
            index: 27,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 1,
        };
        assert_eq!(g.check(&input, &mut log).reason, ReasonCode::Approved);

        let full = GuardInput {
            open_positions: 2,
            index: 37,
            ..input
        };
        assert_eq!(g.check(&full, &mut log).reason, ReasonCode::PyramidingLimit);
    }

    #[test]
    fn scoring_failure_becomes_internal_error_hold() {
        let mut bars = bars(30);
        let p = pattern();
        bars[27].open = f64::NAN;
        let mut g = guard(GuardConfig::default());
        let input = GuardInput {
            bars: &bars,
            index: 27,
            pattern: Some(&p),
            indicators: bullish(),
            open_positions: 0,
        };
        let d = g.check(&input, &mut audit());
        assert_eq!(d.verdict, GuardVerdict::Hold);
        assert_eq!(d.reason, ReasonCode::InternalError);
        assert_eq!(g.last_entry(), None);
    }

    #[test]
    fn every_call_is_audited() {
        let bars = bars(30);
        let p = pattern();
        let mut g = guard(GuardConfig::default());
        let mut log = audit();
        for index in [5, 27, 29] {
            let input = GuardInput {
                bars: &bars,
                index,
                pattern: Some(&p),
                indicators: bullish(),
                open_positions: 0,
            };
            g.check(&input, &mut log);
        }
        g.hold_on_error(&CoreError::RecoveryPending, bars[0].timestamp, None, &mut log);
        assert_eq!(log.guard_decisions().count(), 4);
    }
}
