pub mod auth;
pub mod dispatcher;
pub mod fcm;
pub mod webhook;

pub use auth::{ServiceAccountAuth, ServiceAccountKey};
pub use dispatcher::{message_for, NotificationDispatcher};
pub use fcm::{classify_failure, FcmClient};
pub use webhook::WebhookNotifier;
