pub mod consumer;
pub mod lifecycle;
pub mod polygon;
pub mod queue;
pub mod store;
pub mod subscription;

pub use consumer::{Consumer, ConsumerSettings};
pub use lifecycle::{Engine, EngineHandle, EngineSettings, StreamState};
pub use polygon::{ConnectionHandle, PolygonRest};
pub use queue::StreamQueue;
pub use store::Store;
pub use subscription::{diff, RegistryCommand, SubscriptionDiff, SubscriptionManager, SubscriptionSettings};
