pub mod config;
pub mod error;
pub mod market;
pub mod push;
pub mod scoring;
pub mod session;
pub mod types;

pub use config::Config;
pub use error::{DeliveryError, Error, Result};
pub use market::MarketDataSource;
pub use push::{
    token_fingerprint, DispatchReport, Notifier, PushClient, PushMessage, SubscriberStore,
};
pub use scoring::{NeutralScorer, ScoreResult, Scorer, NEUTRAL_SCORE};
pub use session::MarketSession;
pub use types::*;
