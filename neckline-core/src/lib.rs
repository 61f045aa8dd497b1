//! Neckline core: the decision engine of a single-instrument trading agent.
//!
//! Given completed price bars, this crate:
//! - derives trend averages and a volatility range
//! - finds double-bottom setups and scores their quality
//! - gates entries through a fixed-order veto pipeline
//! - walks open positions through three profit targets with stop ratchets
//! - reconciles open positions against recent history after a restart
//!
//! Broker transport, persistence format and presentation are collaborators
//! behind the `execution` and `store` seams.

pub mod audit;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod execution;
pub mod guard;
pub mod indicators;
pub mod pattern;
pub mod recovery;
pub mod store;
pub mod tp;
pub mod trader;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use trader::{CycleReport, Phase, Trader};
