//! Serializable configuration for every threshold the core uses.
//!
//! Nothing in the decision logic hard-codes a threshold; each component reads
//! its section of `CoreConfig`. TOML files override only the keys they name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ConfigFingerprint;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub indicators: IndicatorConfig,
    pub pattern: PatternConfig,
    pub context: ContextConfig,
    pub guard: GuardConfig,
    pub entry: EntryConfig,
    pub targets: TargetConfig,
    pub recovery: RecoveryConfig,
}

/// Periods for the trend averages and the volatility range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub fast_period: usize,
    pub medium_period: usize,
    pub slow_period: usize,
    pub volatility_period: usize,
    /// Extra bars beyond the slowest period before values are considered reliable.
    pub warmup_buffer: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            medium_period: 50,
            slow_period: 200,
            volatility_period: 14,
            warmup_buffer: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Bars to the left a pivot must dominate.
    pub left_bars: usize,
    /// Bars to the right a pivot must dominate.
    pub right_bars: usize,
    /// Minimum index separation between the two lows.
    pub min_bar_gap: usize,
    /// Maximum `|p1 - p2| / avg * 100` between the lows.
    pub equality_tolerance_pct: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            left_bars: 5,
            right_bars: 5,
            min_bar_gap: 10,
            equality_tolerance_pct: 2.0,
        }
    }
}

/// Sub-score weights for the quality score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub pattern: f64,
    pub momentum: f64,
    pub trend: f64,
    pub volatility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pattern: 0.35,
            momentum: 0.25,
            trend: 0.25,
            volatility: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.pattern + self.momentum + self.trend + self.volatility
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Medium/slow separation (percent of price) below which the regime is RANGE.
    pub regime_threshold_pct: f64,
    /// Volatility range (percent of price) below which volatility is LOW.
    pub volatility_low_pct: f64,
    /// Volatility range (percent of price) above which volatility is HIGH.
    pub volatility_high_pct: f64,
    pub weights: ScoreWeights,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            regime_threshold_pct: 0.3,
            volatility_low_pct: 0.5,
            volatility_high_pct: 2.0,
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Admission threshold on the 0–10 quality score.
    pub min_quality_score: f64,
    /// Close-to-close movement (in pips) that must be exceeded.
    pub noise_min_pips: f64,
    /// Price value of one pip.
    pub pip_size: f64,
    /// Bars after an entry during which new entries are blocked.
    pub cooldown_bars: usize,
    pub pyramiding_enabled: bool,
    pub max_pyramid_positions: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_quality_score: 6.5,
            noise_min_pips: 5.0,
            pip_size: 0.1,
            cooldown_bars: 10,
            pyramiding_enabled: false,
            max_pyramid_positions: 3,
        }
    }
}

/// How an approved entry is turned into an open request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    /// Stop distance below the right low, in volatility-range units.
    pub stop_buffer_vol: f64,
    pub size: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            stop_buffer_vol: 0.5,
            size: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// TP1 multiple. The walkthrough scenario with entry 4500 / stop 4400
    /// and TP1 = 4570 uses 0.7; the default 1.4 puts TP1 at 4640.
    pub tp1_rr: f64,
    pub tp2_rr: f64,
    /// Caller-supplied multiple for the final target.
    pub tp3_rr: f64,
    /// Profit locked in (risk units) when AT_TP3 is reached.
    pub fixed_profit_risk_units: f64,
    /// Retrace exit fires when volatility drops below this fraction of its reference.
    pub volatility_contraction_ratio: f64,
    /// Bars averaged to form the volatility reference.
    pub volatility_reference_bars: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            tp1_rr: 1.4,
            tp2_rr: 1.9,
            tp3_rr: 2.0,
            fixed_profit_risk_units: 0.5,
            volatility_contraction_ratio: 0.5,
            volatility_reference_bars: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Bars requested from the feed for a replay.
    pub history_bars: usize,
    /// A closed bar arriving more than this many seconds after its predecessor
    /// counts as a feed gap and triggers recovery. `None` disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bar_interval_secs: Option<i64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            history_bars: 250,
            max_bar_interval_secs: None,
        }
    }
}

impl CoreConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the canonical JSON encoding.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        // Struct fields serialize in declaration order, so the encoding is stable.
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigFingerprint::from_bytes(json.as_bytes())
    }

    /// Minimum bars needed before the slowest indicator is reliable.
    pub fn min_reliable_bars(&self) -> usize {
        self.indicators.slow_period + self.indicators.warmup_buffer
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ind = &self.indicators;
        for (field, period) in [
            ("indicators.fast_period", ind.fast_period),
            ("indicators.medium_period", ind.medium_period),
            ("indicators.slow_period", ind.slow_period),
            ("indicators.volatility_period", ind.volatility_period),
        ] {
            if period == 0 {
                return Err(invalid(field, "period must be >= 1"));
            }
        }
        if !(ind.fast_period < ind.medium_period && ind.medium_period < ind.slow_period) {
            return Err(invalid(
                "indicators",
                format!(
                    "periods must be strictly increasing fast < medium < slow, got {} / {} / {}",
                    ind.fast_period, ind.medium_period, ind.slow_period
                ),
            ));
        }

        let pat = &self.pattern;
        if pat.left_bars == 0 || pat.right_bars == 0 {
            return Err(invalid("pattern", "pivot windows must be >= 1"));
        }
        if pat.min_bar_gap == 0 {
            return Err(invalid("pattern.min_bar_gap", "must be >= 1"));
        }
        if !pat.equality_tolerance_pct.is_finite() || pat.equality_tolerance_pct <= 0.0 {
            return Err(invalid(
                "pattern.equality_tolerance_pct",
                format!("must be > 0, got {}", pat.equality_tolerance_pct),
            ));
        }

        let ctx = &self.context;
        if ctx.regime_threshold_pct < 0.0 {
            return Err(invalid("context.regime_threshold_pct", "must be >= 0"));
        }
        if !(ctx.volatility_low_pct >= 0.0 && ctx.volatility_low_pct < ctx.volatility_high_pct) {
            return Err(invalid(
                "context",
                format!(
                    "volatility thresholds must satisfy 0 <= low < high, got {} / {}",
                    ctx.volatility_low_pct, ctx.volatility_high_pct
                ),
            ));
        }
        let w = &ctx.weights;
        if [w.pattern, w.momentum, w.trend, w.volatility]
            .iter()
            .any(|v| *v < 0.0)
        {
            return Err(invalid("context.weights", "weights must be >= 0"));
        }
        if (w.sum() - 1.0).abs() > 1e-9 {
            return Err(invalid(
                "context.weights",
                format!("weights must sum to 1, got {}", w.sum()),
            ));
        }

        let guard = &self.guard;
        if !(0.0..=10.0).contains(&guard.min_quality_score) {
            return Err(invalid("guard.min_quality_score", "must be within [0, 10]"));
        }
        if guard.noise_min_pips < 0.0 {
            return Err(invalid("guard.noise_min_pips", "must be >= 0"));
        }
        if !guard.pip_size.is_finite() || guard.pip_size <= 0.0 {
            return Err(invalid("guard.pip_size", "must be > 0"));
        }
        if guard.pyramiding_enabled && guard.max_pyramid_positions == 0 {
            return Err(invalid("guard.max_pyramid_positions", "must be >= 1"));
        }

        if self.entry.stop_buffer_vol < 0.0 {
            return Err(invalid("entry.stop_buffer_vol", "must be >= 0"));
        }
        if !self.entry.size.is_finite() || self.entry.size <= 0.0 {
            return Err(invalid("entry.size", "must be > 0"));
        }

        let t = &self.targets;
        if !(t.tp1_rr > 0.0 && t.tp1_rr < t.tp2_rr && t.tp2_rr < t.tp3_rr) {
            return Err(invalid(
                "targets",
                format!(
                    "multiples must satisfy 0 < tp1 < tp2 < tp3, got {} / {} / {}",
                    t.tp1_rr, t.tp2_rr, t.tp3_rr
                ),
            ));
        }
        if t.fixed_profit_risk_units < 0.0 {
            return Err(invalid("targets.fixed_profit_risk_units", "must be >= 0"));
        }
        if !(t.volatility_contraction_ratio > 0.0 && t.volatility_contraction_ratio <= 1.0) {
            return Err(invalid(
                "targets.volatility_contraction_ratio",
                "must be within (0, 1]",
            ));
        }
        if t.volatility_reference_bars == 0 {
            return Err(invalid("targets.volatility_reference_bars", "must be >= 1"));
        }

        if self.recovery.history_bars < 2 {
            return Err(invalid("recovery.history_bars", "must be >= 2"));
        }
        if let Some(secs) = self.recovery.max_bar_interval_secs {
            if secs <= 0 {
                return Err(invalid("recovery.max_bar_interval_secs", "must be > 0"));
            }
        }
        Ok(())
    }
}
