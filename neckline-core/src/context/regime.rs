//! Trend regime and volatility regime classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ContextConfig;
use crate::indicators::IndicatorSet;

/// Directional bias from medium/slow average separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Bull,
    Bear,
    Range,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Bull => write!(f, "BULL"),
            Regime::Bear => write!(f, "BEAR"),
            Regime::Range => write!(f, "RANGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityRegime::Low => write!(f, "LOW"),
            VolatilityRegime::Normal => write!(f, "NORMAL"),
            VolatilityRegime::High => write!(f, "HIGH"),
        }
    }
}

/// Regime and volatility classification at one bar. `None` means not enough data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketContext {
    pub regime: Option<Regime>,
    pub volatility: Option<VolatilityRegime>,
}

fn usable_price(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// RANGE when `|medium - slow|` is under `regime_threshold_pct` of price,
/// otherwise BULL if medium is above slow and BEAR if not.
pub fn classify_regime(set: &IndicatorSet, price: f64, config: &ContextConfig) -> Option<Regime> {
    let price = usable_price(price)?;
    let (medium, slow) = (set.medium?, set.slow?);
    let separation_pct = (medium - slow).abs() / price * 100.0;
    if separation_pct < config.regime_threshold_pct {
        Some(Regime::Range)
    } else if medium > slow {
        Some(Regime::Bull)
    } else {
        Some(Regime::Bear)
    }
}

/// Volatility range as a percent of price against the LOW/HIGH thresholds.
pub fn classify_volatility(
    set: &IndicatorSet,
    price: f64,
    config: &ContextConfig,
) -> Option<VolatilityRegime> {
    let price = usable_price(price)?;
    let vol_pct = set.volatility? / price * 100.0;
    if vol_pct < config.volatility_low_pct {
        Some(VolatilityRegime::Low)
    } else if vol_pct > config.volatility_high_pct {
        Some(VolatilityRegime::High)
    } else {
        Some(VolatilityRegime::Normal)
    }
}

pub fn classify(set: &IndicatorSet, price: f64, config: &ContextConfig) -> MarketContext {
    MarketContext {
        regime: classify_regime(set, price, config),
        volatility: classify_volatility(set, price, config),
    }
}

/// How well a long reversal entry suits each regime/volatility combination (0–10).
pub fn compatibility(regime: Regime, volatility: VolatilityRegime) -> f64 {
    match (regime, volatility) {
        (Regime::Bull, VolatilityRegime::Normal) => 10.0,
        (Regime::Bull, VolatilityRegime::Low) => 6.0,
        (Regime::Bull, VolatilityRegime::High) => 5.0,
        (Regime::Range, VolatilityRegime::Normal) => 7.0,
        (Regime::Range, VolatilityRegime::Low) => 5.0,
        (Regime::Range, VolatilityRegime::High) => 3.0,
        (Regime::Bear, VolatilityRegime::Normal) => 4.0,
        (Regime::Bear, VolatilityRegime::Low) => 3.0,
        (Regime::Bear, VolatilityRegime::High) => 1.0,
    }
}
