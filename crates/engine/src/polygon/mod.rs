pub mod protocol;
pub mod rest;
pub mod stream;

pub use protocol::{bar_topics, parse_frame, quote_topics, Action, ControlFrame};
pub use rest::PolygonRest;
pub use stream::{connect, ConnectionHandle, Outbound, DEFAULT_STREAM_URL};
