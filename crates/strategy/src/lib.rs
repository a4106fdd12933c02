pub mod config;
pub mod decision;
pub mod focus;
pub mod indicators;
pub mod registry;
pub mod snapshot;
pub mod state;

pub use config::StrategyConfig;
pub use decision::{momentum_condition, SignalDecisionEngine};
pub use focus::{FocusChange, FocusEvaluator, FocusTracker};
pub use registry::{RegistrySettings, StateRegistry};
pub use snapshot::IndicatorEngine;
pub use state::{SymbolState, MAX_BARS, MAX_TICKS};
