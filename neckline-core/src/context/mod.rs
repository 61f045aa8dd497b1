//! Context scorer: regime classification and the 0–10 entry-quality score.
//!
//! This component only scores. Admission against the minimum score is the
//! entry guard's job.

pub mod quality;
pub mod regime;

pub use quality::{
    clamp10, momentum_score, pattern_score, trend_score, volatility_score, QualityScore,
};
pub use regime::{
    classify, classify_regime, classify_volatility, compatibility, MarketContext, Regime,
    VolatilityRegime,
};

use tracing::debug;

use crate::config::ContextConfig;
use crate::domain::{Bar, Pattern};
use crate::error::{CoreError, Result};
use crate::indicators::IndicatorSet;

#[derive(Debug, Clone)]
pub struct ContextScorer {
    config: ContextConfig,
    /// Equality tolerance the detector used; the equality sub-score is relative to it.
    tolerance_pct: f64,
}

impl ContextScorer {
    pub fn new(config: ContextConfig, tolerance_pct: f64) -> Self {
        Self {
            config,
            tolerance_pct,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn classify(&self, set: &IndicatorSet, price: f64) -> MarketContext {
        classify(set, price, &self.config)
    }

    /// Score a setup on the closed `bar`.
    ///
    /// Errors only on malformed input (void bar, pattern breaking its ordering
    /// invariants). Missing indicator values lower the score instead.
    pub fn score(&self, pattern: &Pattern, bar: &Bar, set: &IndicatorSet) -> Result<QualityScore> {
        if bar.is_void() {
            return Err(CoreError::InvalidInput(format!(
                "bar at {} has non-finite prices",
                bar.timestamp
            )));
        }
        if !pattern.is_well_formed() {
            return Err(CoreError::InvalidInput(format!(
                "pattern points out of order: left {} neck {} right {}",
                pattern.left_low.index, pattern.neckline.index, pattern.right_low.index
            )));
        }

        let context = self.classify(set, bar.close);
        let score = QualityScore::from_components(
            pattern_score(pattern, bar.close, set.volatility, self.tolerance_pct),
            momentum_score(bar, set.volatility),
            trend_score(bar.close, set),
            volatility_score(&context),
            &self.config.weights,
        );

        debug!(
            total = score.total,
            pattern = score.pattern,
            momentum = score.momentum,
            trend = score.trend,
            volatility = score.volatility,
            regime = ?context.regime,
            "quality scored"
        );
        Ok(score)
    }
}
