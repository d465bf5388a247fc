//! Configuration management

use anyhow::{Context, Result};
use regex::Regex;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::admin::AdminRoster;

/// Matches no host at all; admin commands stay disabled until configured
const NO_HOST_PATTERN: &str = r"^\b$";

/// Bot + report configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite store holding events and edges
    pub db_path: PathBuf,

    /// Whitelist flat file
    pub whitelist_path: PathBuf,

    /// Initial whitelist enforcement flag
    pub whitelist_enabled: bool,

    /// The one channel the bot monitors
    pub channel: String,

    /// Bot's own nick
    pub nick: String,

    /// Action sent when the bot enters the channel
    pub announcement: String,

    /// Admin roster nicks
    pub admins: Vec<String>,

    /// Host every admin must connect from
    pub admin_host: Regex,

    /// Public URL of the report page (dialog `website` command)
    pub website_url: String,

    /// Route prefix of the report endpoint
    pub path_prefix: String,

    /// Report server bind address
    pub report_addr: SocketAddr,

    /// Delay between two snapshot refreshes
    pub refresh_delay: Duration,

    /// Recompute the report on every request instead of serving the cache
    pub realtime: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/bdd.sqlite"),
            whitelist_path: PathBuf::from("data/whitelist.txt"),
            whitelist_enabled: false,
            channel: "#big_rennes".to_string(),
            nick: "pirc_bt".to_string(),
            announcement: "is logging this channel - say \"pirc_bt: help\" for details".to_string(),
            admins: Vec::new(),
            admin_host: Regex::new(NO_HOST_PATTERN).expect("static pattern is valid"),
            website_url: "http://localhost:8080/pirc_bot".to_string(),
            path_prefix: "/pirc_bot".to_string(),
            report_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            refresh_delay: Duration::from_secs(30),
            realtime: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let db_path = std::env::var("CHANSTAT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let whitelist_path = std::env::var("CHANSTAT_WHITELIST_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.whitelist_path);

        let whitelist_enabled = env_flag("CHANSTAT_WHITELIST_ENABLED", defaults.whitelist_enabled);

        let channel = std::env::var("CHANSTAT_CHANNEL").unwrap_or(defaults.channel);
        let nick = std::env::var("CHANSTAT_NICK").unwrap_or(defaults.nick);
        let announcement = std::env::var("CHANSTAT_ANNOUNCEMENT").unwrap_or(defaults.announcement);

        let admins = std::env::var("CHANSTAT_ADMINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let admin_host = match std::env::var("CHANSTAT_ADMIN_HOST") {
            Ok(pattern) => Regex::new(&pattern)
                .with_context(|| format!("invalid CHANSTAT_ADMIN_HOST pattern {:?}", pattern))?,
            Err(_) => defaults.admin_host,
        };

        let website_url = std::env::var("CHANSTAT_WEBSITE_URL").unwrap_or(defaults.website_url);
        let path_prefix = std::env::var("CHANSTAT_PATH_PREFIX").unwrap_or(defaults.path_prefix);

        let report_addr = match std::env::var("CHANSTAT_REPORT_ADDR") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("invalid CHANSTAT_REPORT_ADDR {:?}", addr))?,
            Err(_) => defaults.report_addr,
        };

        let refresh_delay = std::env::var("CHANSTAT_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.refresh_delay);

        let realtime = env_flag("CHANSTAT_REALTIME", defaults.realtime);

        Ok(Self {
            db_path,
            whitelist_path,
            whitelist_enabled,
            channel,
            nick,
            announcement,
            admins,
            admin_host,
            website_url,
            path_prefix,
            report_addr,
            refresh_delay,
            realtime,
        })
    }

    pub fn admin_roster(&self) -> AdminRoster {
        AdminRoster::new(self.admins.iter().cloned(), self.admin_host.clone())
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_authorizes_nobody() {
        let mut config = Config::default();
        config.admins = vec!["root".to_string()];

        let roster = config.admin_roster();
        assert!(!roster.authorizes("root", Some("localhost")));
        assert!(!roster.authorizes("root", Some("")));
    }

    #[test]
    fn test_configured_roster() {
        let mut config = Config::default();
        config.admins = vec!["root".to_string()];
        config.admin_host = Regex::new(r"^.*\.example\.org$").unwrap();

        let roster = config.admin_roster();
        assert!(roster.authorizes("root", Some("admin.example.org")));
        assert!(!roster.authorizes("alice", Some("admin.example.org")));
    }
}
