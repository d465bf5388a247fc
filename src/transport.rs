//! Transport Seam
//!
//! The chat connection itself lives outside this crate. It hands the bot
//! already-decoded [`ChatEvent`] values and receives [`Outbound`] commands
//! through the [`Transport`] trait.
//!
//! [`LineTransport`] is the adapter used by the binary: events arrive as JSON
//! lines on stdin, commands leave as JSON lines on stdout.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Error types for outbound transport calls
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One classified event delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Server accepted the connection
    Welcome,
    /// Connection lost; the transport reconnects on its own
    Disconnect,
    Join {
        actor: String,
    },
    /// Part and quit are handled identically
    #[serde(alias = "quit")]
    Part {
        actor: String,
    },
    Kick {
        kicker: String,
        victim: String,
    },
    Pubmsg {
        actor: String,
        text: String,
        /// Channel membership when the message was received
        #[serde(default)]
        roster: Vec<String>,
    },
    Ctcp {
        actor: String,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        args: Vec<String>,
    },
    Whoisuser {
        nick: String,
        host: String,
    },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Welcome => "welcome",
            ChatEvent::Disconnect => "disconnect",
            ChatEvent::Join { .. } => "join",
            ChatEvent::Part { .. } => "part",
            ChatEvent::Kick { .. } => "kick",
            ChatEvent::Pubmsg { .. } => "pubmsg",
            ChatEvent::Ctcp { .. } => "ctcp",
            ChatEvent::Whoisuser { .. } => "whoisuser",
        }
    }
}

/// One command sent back to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Join { channel: String },
    Privmsg { channel: String, text: String },
    Action { channel: String, text: String },
}

/// Outbound capabilities the control loop depends on
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, channel: &str) -> Result<(), TransportError>;

    async fn privmsg(&self, channel: &str, text: &str) -> Result<(), TransportError>;

    /// Third-person "action" message (`/me ...`)
    async fn action(&self, channel: &str, text: &str) -> Result<(), TransportError>;
}

/// JSON-lines transport over any async writer
pub struct LineTransport<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> LineTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    async fn write(&self, command: &Outbound) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(command)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.map_err(closed_or_io)?;
        writer.flush().await.map_err(closed_or_io)?;

        debug!("Outbound: {}", line.trim_end());
        Ok(())
    }
}

impl LineTransport<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> Transport for LineTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.write(&Outbound::Join {
            channel: channel.to_string(),
        })
        .await
    }

    async fn privmsg(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.write(&Outbound::Privmsg {
            channel: channel.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn action(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.write(&Outbound::Action {
            channel: channel.to_string(),
            text: text.to_string(),
        })
        .await
    }
}

fn closed_or_io(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

/// Transport that keeps every outbound command in memory
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands sent so far, oldest first
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    /// Text of every action sent so far
    pub fn actions(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                Outbound::Action { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.sent.lock().push(Outbound::Join {
            channel: channel.to_string(),
        });
        Ok(())
    }

    async fn privmsg(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push(Outbound::Privmsg {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn action(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push(Outbound::Action {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
