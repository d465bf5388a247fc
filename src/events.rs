//! Persisted Records
//!
//! Channel events (join, quit, kick, message) and the conversational edges
//! inferred between two pseudos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a persisted channel event
///
/// The discriminants are the values stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EventKind {
    Join = 0,
    Quit = 1,
    Kick = 2,
    Msg = 3,
}

impl EventKind {
    pub fn as_code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EventKind::Join),
            1 => Some(EventKind::Quit),
            2 => Some(EventKind::Kick),
            3 => Some(EventKind::Msg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Quit => "quit",
            EventKind::Kick => "kick",
            EventKind::Msg => "msg",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted channel event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub pseudo: String,
    pub kind: EventKind,
}

impl Event {
    /// Build an unsaved event row (id 0), used for in-memory aggregation
    pub fn at(pseudo: &str, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            timestamp,
            pseudo: pseudo.to_string(),
            kind,
        }
    }
}

/// A conversational relationship between two pseudos
///
/// `pseudo_a <= pseudo_b` always holds, so the pair is direction-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub pseudo_a: String,
    pub pseudo_b: String,
}

impl Edge {
    /// Build an unsaved, canonicalized edge
    pub fn new(first: &str, second: &str) -> Self {
        let (pseudo_a, pseudo_b) = canonical_pair(first, second);
        Self {
            id: 0,
            timestamp: Utc::now(),
            pseudo_a: pseudo_a.to_string(),
            pseudo_b: pseudo_b.to_string(),
        }
    }

    /// Canonical pair key
    pub fn pair(&self) -> (&str, &str) {
        (&self.pseudo_a, &self.pseudo_b)
    }

    /// True if either slot holds `pseudo`
    pub fn touches(&self, pseudo: &str) -> bool {
        self.pseudo_a == pseudo || self.pseudo_b == pseudo
    }
}

/// Order two pseudos lexicographically
pub fn canonical_pair<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str) {
    if first <= second {
        (first, second)
    } else {
        (second, first)
    }
}
