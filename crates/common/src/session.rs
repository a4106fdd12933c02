use chrono::{DateTime, Timelike, Utc};
use chrono_tz::US::Eastern;
use serde::{Deserialize, Serialize};

/// US equity trading session, evaluated in New York local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSession {
    Premarket,
    Regular,
    Aftermarket,
    Closed,
}

impl MarketSession {
    pub fn at(now: DateTime<Utc>) -> Self {
        let local = now.with_timezone(&Eastern).time();
        let minutes = local.hour() * 60 + local.minute();
        match minutes {
            m if (4 * 60..9 * 60 + 30).contains(&m) => MarketSession::Premarket,
            m if (9 * 60 + 30..16 * 60).contains(&m) => MarketSession::Regular,
            m if (16 * 60..20 * 60).contains(&m) => MarketSession::Aftermarket,
            _ => MarketSession::Closed,
        }
    }
}

impl std::fmt::Display for MarketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketSession::Premarket => write!(f, "premarket"),
            MarketSession::Regular => write!(f, "regular"),
            MarketSession::Aftermarket => write!(f, "aftermarket"),
            MarketSession::Closed => write!(f, "closed"),
        }
    }
}
