//! Chanstat Bot
//!
//! Observes one chat channel, logs its activity, infers who talks to whom,
//! and aggregates the log into time-windowed statistics and a social graph.
//!
//! # Features
//!
//! - **Event logging**: joins, parts, kicks and messages in SQLite
//! - **Relationships**: `nick: message` addressing becomes a graph edge
//! - **Admin commands**: whitelist, purge and backup over CTCP, nick + host gated
//! - **Analytics**: top posters, hourly histograms, weekday averages
//! - **Graph**: deduplicated, weighted DOT text
//! - **Report cache**: background refresh with atomic snapshot swap
//!
//! # Architecture
//!
//! ```text
//! transport ──► ChannelBot ──┬── EventStore (SQLite)
//!  (JSON lines)              ├── relations (edge extraction)
//!                            └── AdminDispatcher ── Whitelist
//!
//! RefreshWorker ──► Report (analytics + graph) ──► SnapshotCache ──► report server
//! ```

pub mod admin;
pub mod analytics;
pub mod bot;
pub mod config;
pub mod dialog;
pub mod events;
pub mod graph;
pub mod refresh;
pub mod relations;
pub mod report;
pub mod report_server;
pub mod store;
pub mod transport;
pub mod whitelist;

pub use admin::{AdminCode, AdminDispatcher, AdminError, AdminRoster, Dispatch};
pub use bot::{BotIdentity, ChannelBot, ConnectionState};
pub use config::Config;
pub use events::{Edge, Event, EventKind};
pub use graph::SocialGraph;
pub use refresh::{RefreshWorker, ReportSource, SnapshotCache};
pub use report::Report;
pub use store::{EventStore, Session};
pub use transport::{ChatEvent, LineTransport, Outbound, RecordingTransport, Transport, TransportError};
pub use whitelist::Whitelist;
