//! Channel Bot
//!
//! The control loop: receives classified transport events one at a time,
//! filters the bot's own echoes, persists channel activity, extracts
//! relationships and routes admin commands.
//!
//! ```text
//! Disconnected --welcome--> Connected --join sent--> JoinedChannel --own join--> Active
//!       ^                                                                        |
//!       +------------------------------- disconnect ------------------------------+
//! ```
//!
//! The bot owns its write session, whitelist and host cache exclusively;
//! nothing here is shared with other threads.

use anyhow::Result;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::admin::{AdminContext, AdminDispatcher, Dispatch};
use crate::config::Config;
use crate::dialog;
use crate::events::EventKind;
use crate::relations::{self, Extraction};
use crate::store::EventStore;
use crate::transport::{ChatEvent, Transport};
use crate::whitelist::Whitelist;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Welcomed by the server, channel not joined yet
    Connected,
    /// Join requested, waiting for our own join echo
    JoinedChannel,
    Active,
}

/// Identity and texts the bot needs at runtime
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub nick: String,
    pub channel: String,
    pub announcement: String,
    pub website_url: String,
}

impl From<&Config> for BotIdentity {
    fn from(config: &Config) -> Self {
        Self {
            nick: config.nick.clone(),
            channel: config.channel.clone(),
            announcement: config.announcement.clone(),
            website_url: config.website_url.clone(),
        }
    }
}

pub struct ChannelBot<T> {
    identity: BotIdentity,
    state: ConnectionState,
    store: EventStore,
    whitelist: Whitelist,
    admin: AdminDispatcher,
    /// nick -> host, learned from whois replies
    hosts: HashMap<String, String>,
    transport: T,
}

impl<T: Transport> ChannelBot<T> {
    pub fn new(
        identity: BotIdentity,
        store: EventStore,
        whitelist: Whitelist,
        admin: AdminDispatcher,
        transport: T,
    ) -> Self {
        Self {
            identity,
            state: ConnectionState::Disconnected,
            store,
            whitelist,
            admin,
            hosts: HashMap::new(),
            transport,
        }
    }

    /// Open the store and whitelist named by `config`
    pub fn from_config(config: &Config, transport: T) -> Result<Self> {
        let store = EventStore::open(&config.db_path)?;
        let whitelist = Whitelist::load(&config.whitelist_path, config.whitelist_enabled)?;
        let admin = AdminDispatcher::new(config.admin_roster());

        if admin.roster().is_empty() {
            warn!("No admin configured - control commands are disabled");
        }

        Ok(Self::new(
            BotIdentity::from(config),
            store,
            whitelist,
            admin,
            transport,
        ))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn is_self(&self, nick: &str) -> bool {
        nick == self.identity.nick
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!("Connection: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Handle one classified event
    pub async fn handle(&mut self, event: ChatEvent) -> Result<()> {
        debug!("Event: {}", event.name());

        match event {
            ChatEvent::Welcome => self.on_welcome().await,
            ChatEvent::Disconnect => self.on_disconnect(),
            ChatEvent::Join { actor } => self.on_join(&actor).await,
            ChatEvent::Part { actor } => self.on_part(&actor),
            ChatEvent::Kick { kicker, victim } => self.on_kick(&kicker, &victim),
            ChatEvent::Pubmsg { actor, text, roster } => self.on_pubmsg(&actor, &text, &roster).await,
            ChatEvent::Ctcp { actor, host, args } => self.on_ctcp(&actor, host, &args).await,
            ChatEvent::Whoisuser { nick, host } => {
                debug!("Whois: {} is {}", nick, host);
                self.hosts.insert(nick, host);
                Ok(())
            }
        }
    }

    async fn on_welcome(&mut self) -> Result<()> {
        info!("Connected as <{}>", self.identity.nick);
        self.transition(ConnectionState::Connected);

        self.transport.join(&self.identity.channel).await?;
        self.transition(ConnectionState::JoinedChannel);
        Ok(())
    }

    fn on_disconnect(&mut self) -> Result<()> {
        warn!("Disconnected from server");
        self.transition(ConnectionState::Disconnected);
        self.store.checkpoint()
    }

    async fn on_join(&mut self, actor: &str) -> Result<()> {
        if self.is_self(actor) {
            info!("Joined {}", self.identity.channel);
            self.transition(ConnectionState::Active);
            self.transport
                .action(&self.identity.channel, &self.identity.announcement)
                .await?;
            return Ok(());
        }

        debug!("<{}> joined the channel", actor);
        self.store.insert_event(actor, EventKind::Join)?;
        Ok(())
    }

    fn on_part(&mut self, actor: &str) -> Result<()> {
        if self.is_self(actor) {
            return Ok(());
        }

        debug!("<{}> left the channel", actor);
        self.store.insert_event(actor, EventKind::Quit)?;
        Ok(())
    }

    fn on_kick(&mut self, kicker: &str, victim: &str) -> Result<()> {
        if self.is_self(kicker) {
            return self.store.checkpoint();
        }

        debug!("<{}> kicked by <{}>", victim, kicker);
        if self.is_self(victim) {
            warn!("Kicked from {} by {}", self.identity.channel, kicker);
            self.transition(ConnectionState::Connected);
        }

        self.store.insert_event(victim, EventKind::Kick)?;
        Ok(())
    }

    async fn on_pubmsg(&mut self, actor: &str, text: &str, roster: &[String]) -> Result<()> {
        if self.is_self(actor) {
            return Ok(());
        }

        if !self.whitelist.permits(actor) {
            debug!("Dropping message from non-whitelisted <{}>", actor);
            return Ok(());
        }

        match relations::extract(actor, text, &self.identity.nick, roster) {
            Extraction::ToBot(rest) => self.on_dialog(actor, &rest).await,
            Extraction::Relationship(edge) => {
                // A lost edge never blocks the message row
                if let Err(e) = self.store.insert_edge(&edge) {
                    warn!("Edge {} <-> {} not stored: {:#}", edge.pseudo_a, edge.pseudo_b, e);
                }
            }
            Extraction::MicroMessage { dest } => debug!("Micro message from {} to {}", actor, dest),
            Extraction::AbsentDest { dest } => debug!("{} addressed absent {}", actor, dest),
            Extraction::NotAddressed => {}
        }

        self.store.insert_event(actor, EventKind::Msg)?;
        Ok(())
    }

    async fn on_dialog(&self, actor: &str, text: &str) {
        let Some(lines) = dialog::reply(text, &self.identity.website_url) else {
            return;
        };

        debug!("Answering {} ({:?})", actor, text);
        for line in lines {
            if let Err(e) = self.transport.privmsg(&self.identity.channel, &line).await {
                warn!("Dialog reply failed: {}", e);
                return;
            }
        }
    }

    async fn on_ctcp(&mut self, actor: &str, host: Option<String>, args: &[String]) -> Result<()> {
        let host = host.or_else(|| self.hosts.get(actor).cloned());

        let outcome = {
            let mut ctx = AdminContext {
                whitelist: &mut self.whitelist,
                store: &mut self.store,
            };
            self.admin.dispatch(&mut ctx, actor, host.as_deref(), args)
        };

        if let Dispatch::Handled {
            confirmation: Some(text),
            ..
        } = outcome
        {
            self.transport.action(&self.identity.channel, &text).await?;
        }
        Ok(())
    }

    /// Feed JSON-lines events from `reader` until EOF or shutdown
    ///
    /// Invalid UTF-8 is replaced, not rejected. Undecodable lines and failing
    /// events are logged and skipped.
    pub async fn run_lines<R>(&mut self, mut reader: R, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        info!("Waiting for transport events");

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read,
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    break;
                }
            };

            match read {
                Ok(0) => {
                    info!("Event stream closed");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read transport event: {}", e);
                    continue;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: ChatEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping malformed event {:?}: {}", line, e);
                    continue;
                }
            };

            if let Err(e) = self.handle(event).await {
                warn!("Event handling failed: {:#}", e);
            }
        }

        self.store.checkpoint()
    }
}
