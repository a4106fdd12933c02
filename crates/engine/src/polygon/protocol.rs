use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{AggregateKind, Bar, Error, Quote, Result, StreamEvent, Tick};

/// Status literal the server sends once a session is authenticated.
pub const AUTH_SUCCESS: &str = "auth_success";
/// Status literal the server sends right after the socket opens.
pub const CONNECTED: &str = "connected";

// ─── Control frames ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Auth,
    Subscribe,
    Unsubscribe,
}

/// A client → server control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFrame {
    pub action: Action,
    pub params: String,
}

impl ControlFrame {
    pub fn auth(api_key: &str) -> Self {
        Self { action: Action::Auth, params: api_key.to_string() }
    }

    pub fn subscribe(topics: &[String]) -> Self {
        Self { action: Action::Subscribe, params: topics.join(",") }
    }

    pub fn unsubscribe(topics: &[String]) -> Self {
        Self { action: Action::Unsubscribe, params: topics.join(",") }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Minute-aggregate and trade topics for one symbol.
pub fn bar_topics(symbol: &str) -> Vec<String> {
    vec![format!("AM.{symbol}"), format!("T.{symbol}")]
}

/// Quote topic for a focused symbol.
pub fn quote_topics(symbol: &str) -> Vec<String> {
    vec![format!("Q.{symbol}")]
}

// ─── Inbound events ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "ev")]
enum WireEvent {
    #[serde(rename = "A")]
    Second(WireAggregate),
    #[serde(rename = "AM")]
    Minute(WireAggregate),
    #[serde(rename = "T")]
    Trade(WireTrade),
    #[serde(rename = "Q")]
    Quote(WireQuote),
    #[serde(rename = "status")]
    Status(WireStatus),
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct WireAggregate {
    sym: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    /// Window start, epoch milliseconds.
    s: i64,
}

#[derive(Deserialize)]
struct WireTrade {
    sym: String,
    p: f64,
    #[serde(default)]
    s: f64,
    t: i64,
}

#[derive(Deserialize)]
struct WireQuote {
    sym: String,
    #[serde(default)]
    bp: f64,
    #[serde(default)]
    bs: f64,
    #[serde(default)]
    ap: f64,
    #[serde(default, rename = "as")]
    ask_size: f64,
    t: i64,
}

#[derive(Deserialize)]
struct WireStatus {
    status: String,
    #[serde(default)]
    message: String,
}

fn millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::MalformedMessage(format!("timestamp out of range: {ms}")))
}

impl WireEvent {
    fn into_event(self) -> Result<Option<StreamEvent>> {
        let event = match self {
            WireEvent::Second(a) => aggregate(AggregateKind::Second, a)?,
            WireEvent::Minute(a) => aggregate(AggregateKind::Minute, a)?,
            WireEvent::Trade(t) => StreamEvent::Trade(Tick {
                timestamp: millis(t.t)?,
                symbol: t.sym,
                price: t.p,
                size: t.s,
            }),
            WireEvent::Quote(q) => StreamEvent::Quote(Quote {
                timestamp: millis(q.t)?,
                symbol: q.sym,
                bid: q.bp,
                bid_size: q.bs,
                ask: q.ap,
                ask_size: q.ask_size,
            }),
            WireEvent::Status(s) => StreamEvent::Status { status: s.status, message: s.message },
            WireEvent::Unknown => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn aggregate(kind: AggregateKind, a: WireAggregate) -> Result<StreamEvent> {
    Ok(StreamEvent::Aggregate {
        kind,
        bar: Bar {
            open_time: millis(a.s)?,
            symbol: a.sym,
            open: a.o,
            high: a.h,
            low: a.l,
            close: a.c,
            volume: a.v,
        },
    })
}

/// Decode one text frame. Frames are usually arrays of events; a bare
/// object is accepted too. Individual events that fail to decode are
/// skipped; a frame that is not JSON at all is an error.
pub fn parse_frame(text: &str) -> Result<Vec<StreamEvent>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedMessage(format!("not JSON: {e}")))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        other => return Err(Error::MalformedMessage(format!("unexpected frame: {other}"))),
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<WireEvent>(item).map_err(Error::from).and_then(WireEvent::into_event) {
            Ok(Some(ev)) => events.push(ev),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Skipping undecodable event"),
        }
    }
    Ok(events)
}

/// Status events in a frame, as `(status, message)` pairs.
pub fn statuses(events: &[StreamEvent]) -> impl Iterator<Item = (&str, &str)> {
    events.iter().filter_map(|e| match e {
        StreamEvent::Status { status, message } => Some((status.as_str(), message.as_str())),
        _ => None,
    })
}
