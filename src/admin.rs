//! Admin Command Dispatch
//!
//! Numeric control codes received over CTCP from an admin. A sender is
//! authorized only when the nick is on the roster AND the host matches the
//! configured pattern. Anything else is dropped without feedback.
//!
//! | Code | Command |
//! |------|---------|
//! | 31 | toggle whitelist enforcement (`1` enables) |
//! | 32 | add a pseudo to the whitelist |
//! | 33 | remove a pseudo from the whitelist |
//! | 34 | purge a pseudo's events |
//! | 35 | purge a pseudo's edges |
//! | 36 | purge both |
//! | 37 | back up the store |
//!
//! A handler that fails is called a second time with no parameter before
//! the dispatcher gives up. For every handler but the backup this second
//! call is a no-op.

use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::store::EventStore;
use crate::whitelist::Whitelist;

/// Errors raised while routing an admin command
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("missing admin code")]
    MissingCode,

    #[error("unknown admin code: {0}")]
    UnknownCode(String),

    #[error("{code} failed: {message}")]
    Handler { code: AdminCode, message: String },
}

/// Admin control codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminCode {
    ToggleWhitelist,
    AddUser,
    BanUser,
    PurgeLogs,
    PurgeEdges,
    PurgeAll,
    BackupDatabase,
}

impl AdminCode {
    pub const ALL: [AdminCode; 7] = [
        AdminCode::ToggleWhitelist,
        AdminCode::AddUser,
        AdminCode::BanUser,
        AdminCode::PurgeLogs,
        AdminCode::PurgeEdges,
        AdminCode::PurgeAll,
        AdminCode::BackupDatabase,
    ];

    pub fn code(&self) -> u8 {
        match self {
            AdminCode::ToggleWhitelist => 31,
            AdminCode::AddUser => 32,
            AdminCode::BanUser => 33,
            AdminCode::PurgeLogs => 34,
            AdminCode::PurgeEdges => 35,
            AdminCode::PurgeAll => 36,
            AdminCode::BackupDatabase => 37,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCode::ToggleWhitelist => "toggle_whitelist",
            AdminCode::AddUser => "add_user",
            AdminCode::BanUser => "ban_user",
            AdminCode::PurgeLogs => "purge_logs",
            AdminCode::PurgeEdges => "purge_edges",
            AdminCode::PurgeAll => "purge_all",
            AdminCode::BackupDatabase => "backup_database",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AdminError> {
        let code: u8 = s
            .trim()
            .parse()
            .map_err(|_| AdminError::UnknownCode(s.to_string()))?;

        Self::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| AdminError::UnknownCode(s.to_string()))
    }

    fn handler(&self) -> Handler {
        match self {
            AdminCode::ToggleWhitelist => toggle_whitelist,
            AdminCode::AddUser => add_user,
            AdminCode::BanUser => ban_user,
            AdminCode::PurgeLogs => purge_logs,
            AdminCode::PurgeEdges => purge_edges,
            AdminCode::PurgeAll => purge_all,
            AdminCode::BackupDatabase => backup_database,
        }
    }
}

impl fmt::Display for AdminCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.as_str())
    }
}

/// Static set of privileged nicks plus the host they must connect from
#[derive(Debug, Clone)]
pub struct AdminRoster {
    nicks: HashSet<String>,
    host_pattern: Regex,
}

impl AdminRoster {
    pub fn new<I, S>(nicks: I, host_pattern: Regex) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nicks: nicks.into_iter().map(Into::into).collect(),
            host_pattern,
        }
    }

    /// Both checks are required
    pub fn authorizes(&self, nick: &str, host: Option<&str>) -> bool {
        let Some(host) = host else {
            return false;
        };
        self.nicks.contains(nick) && self.host_pattern.is_match(host)
    }

    pub fn len(&self) -> usize {
        self.nicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nicks.is_empty()
    }
}

/// State the handlers act on, borrowed from the control loop
pub struct AdminContext<'a> {
    pub whitelist: &'a mut Whitelist,
    pub store: &'a mut EventStore,
}

/// Returns the confirmation to announce, if any
type Handler = fn(&mut AdminContext<'_>, Option<&str>) -> Result<Option<String>>;

/// Outcome of one dispatch
#[derive(Debug)]
pub enum Dispatch {
    /// Sender failed the roster or host check
    Denied,
    /// Authorized, but no handler could be located
    Ignored(AdminError),
    Handled {
        code: AdminCode,
        confirmation: Option<String>,
        /// The first call failed and the parameterless retry ran
        fallback: bool,
    },
}

impl Dispatch {
    pub fn confirmation(&self) -> Option<&str> {
        match self {
            Dispatch::Handled { confirmation, .. } => confirmation.as_deref(),
            _ => None,
        }
    }
}

pub struct AdminDispatcher {
    roster: AdminRoster,
}

impl AdminDispatcher {
    pub fn new(roster: AdminRoster) -> Self {
        Self { roster }
    }

    pub fn roster(&self) -> &AdminRoster {
        &self.roster
    }

    /// Authorize and run one command; `args` is `[code, parameter?]`
    pub fn dispatch(
        &self,
        ctx: &mut AdminContext<'_>,
        nick: &str,
        host: Option<&str>,
        args: &[String],
    ) -> Dispatch {
        if !self.roster.authorizes(nick, host) {
            debug!("Ignoring admin command from unauthorized {} ({:?})", nick, host);
            return Dispatch::Denied;
        }

        let code = match args.first() {
            Some(raw) => AdminCode::parse(raw),
            None => Err(AdminError::MissingCode),
        };
        let code = match code {
            Ok(code) => code,
            Err(e) => {
                warn!("Admin command from {} dropped: {}", nick, e);
                return Dispatch::Ignored(e);
            }
        };

        let param = args.get(1).map(String::as_str);
        info!("Admin {} issued {} with {:?}", nick, code, param);

        let handler = code.handler();
        match handler(ctx, param) {
            Ok(confirmation) => Dispatch::Handled {
                code,
                confirmation,
                fallback: false,
            },
            Err(e) => {
                let error = AdminError::Handler {
                    code,
                    message: format!("{:#}", e),
                };
                warn!("{}; retrying without parameter", error);

                let confirmation = match handler(ctx, None) {
                    Ok(confirmation) => confirmation,
                    Err(e) => {
                        warn!("{} fallback failed: {:#}", code, e);
                        None
                    }
                };

                Dispatch::Handled {
                    code,
                    confirmation,
                    fallback: true,
                }
            }
        }
    }
}

/// Run `f` only when a non-empty parameter is present
fn with_param<F>(param: Option<&str>, f: F) -> Result<Option<String>>
where
    F: FnOnce(&str) -> Result<String>,
{
    match param.filter(|p| !p.is_empty()) {
        Some(p) => f(p).map(Some),
        None => Ok(None),
    }
}

fn toggle_whitelist(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |p| {
        let enable = p == "1";
        ctx.whitelist.set_enabled(enable);
        Ok(format!(
            "whitelist {}",
            if enable { "enabled" } else { "disabled" }
        ))
    })
}

fn add_user(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |pseudo| {
        ctx.whitelist.add(pseudo)?;
        Ok(format!("{} added to the whitelist", pseudo))
    })
}

fn ban_user(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |pseudo| {
        ctx.whitelist.remove(pseudo)?;
        Ok(format!("{} removed from the whitelist", pseudo))
    })
}

fn purge_logs(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |pseudo| {
        let count = ctx.store.delete_events_by_pseudo(pseudo)?;
        info!("Purged {} event(s) of {}", count, pseudo);
        Ok(format!("{} log(s) deleted for {}", count, pseudo))
    })
}

fn purge_edges(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |pseudo| {
        let count = ctx.store.delete_edges_by_pseudo(pseudo)?;
        info!("Purged {} edge(s) of {}", count, pseudo);
        Ok(format!("{} relation(s) deleted for {}", count, pseudo))
    })
}

fn purge_all(ctx: &mut AdminContext<'_>, param: Option<&str>) -> Result<Option<String>> {
    with_param(param, |pseudo| {
        let logs = ctx.store.delete_events_by_pseudo(pseudo)?;
        let edges = ctx.store.delete_edges_by_pseudo(pseudo)?;
        info!("Purged {} event(s) and {} edge(s) of {}", logs, edges, pseudo);
        Ok(format!(
            "{} log(s) and {} relation(s) deleted for {}",
            logs, edges, pseudo
        ))
    })
}

fn backup_database(ctx: &mut AdminContext<'_>, _param: Option<&str>) -> Result<Option<String>> {
    let target = ctx.store.backup()?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.display().to_string());
    Ok(Some(format!("database saved as {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Edge, EventKind};

    fn dispatcher() -> AdminDispatcher {
        let host = Regex::new(r"^admin\.example\.org$").unwrap();
        AdminDispatcher::new(AdminRoster::new(["root"], host))
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_code_table() {
        assert_eq!(AdminCode::parse("31").unwrap(), AdminCode::ToggleWhitelist);
        assert_eq!(AdminCode::parse("37").unwrap(), AdminCode::BackupDatabase);
        assert!(matches!(AdminCode::parse("38"), Err(AdminError::UnknownCode(_))));
        assert!(matches!(AdminCode::parse("help"), Err(AdminError::UnknownCode(_))));
    }

    #[test]
    fn test_roster_requires_nick_and_host() {
        let roster = dispatcher().roster;
        assert!(roster.authorizes("root", Some("admin.example.org")));
        assert!(!roster.authorizes("root", Some("evil.example.org")));
        assert!(!roster.authorizes("mallory", Some("admin.example.org")));
        assert!(!roster.authorizes("root", None));
    }

    #[test]
    fn test_unauthorized_is_noop() {
        let mut whitelist = Whitelist::in_memory(false);
        let mut store = EventStore::open_in_memory().unwrap();
        store.insert_event("alice", EventKind::Msg).unwrap();

        let d = dispatcher();
        for (nick, host) in [("mallory", "admin.example.org"), ("root", "evil.example.org")] {
            let mut ctx = AdminContext {
                whitelist: &mut whitelist,
                store: &mut store,
            };
            let outcome = d.dispatch(&mut ctx, nick, Some(host), &args(&["34", "alice"]));
            assert!(matches!(outcome, Dispatch::Denied));
            let outcome = d.dispatch(&mut ctx, nick, Some(host), &args(&["31", "1"]));
            assert!(matches!(outcome, Dispatch::Denied));
        }

        assert!(!whitelist.is_enabled());
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn test_whitelist_commands() {
        let mut whitelist = Whitelist::in_memory(false);
        let mut store = EventStore::open_in_memory().unwrap();
        let d = dispatcher();
        let host = Some("admin.example.org");

        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };
        let outcome = d.dispatch(&mut ctx, "root", host, &args(&["31", "1"]));
        assert_eq!(outcome.confirmation(), Some("whitelist enabled"));
        d.dispatch(&mut ctx, "root", host, &args(&["32", "alice"]));
        d.dispatch(&mut ctx, "root", host, &args(&["32", "bob"]));
        d.dispatch(&mut ctx, "root", host, &args(&["33", "bob"]));
        // Removing an absent pseudo is fine
        let outcome = d.dispatch(&mut ctx, "root", host, &args(&["33", "nobody"]));
        assert!(matches!(outcome, Dispatch::Handled { fallback: false, .. }));

        assert!(whitelist.is_enabled());
        assert!(whitelist.contains("alice"));
        assert!(!whitelist.contains("bob"));

        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };
        let outcome = d.dispatch(&mut ctx, "root", host, &args(&["31", "0"]));
        assert_eq!(outcome.confirmation(), Some("whitelist disabled"));
        assert!(!whitelist.is_enabled());
    }

    #[test]
    fn test_missing_parameter_is_noop() {
        let mut whitelist = Whitelist::in_memory(false);
        let mut store = EventStore::open_in_memory().unwrap();
        store.insert_event("alice", EventKind::Msg).unwrap();
        let d = dispatcher();
        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };

        for code in ["31", "32", "33", "34", "35", "36"] {
            let outcome = d.dispatch(&mut ctx, "root", Some("admin.example.org"), &args(&[code]));
            assert!(matches!(outcome, Dispatch::Handled { confirmation: None, .. }));
            let outcome =
                d.dispatch(&mut ctx, "root", Some("admin.example.org"), &args(&[code, ""]));
            assert!(matches!(outcome, Dispatch::Handled { confirmation: None, .. }));
        }

        assert!(!whitelist.is_enabled());
        assert!(whitelist.is_empty());
        assert_eq!(store.count_events().unwrap(), 1);
    }

    #[test]
    fn test_purge_reports_counts() {
        let mut whitelist = Whitelist::in_memory(false);
        let mut store = EventStore::open_in_memory().unwrap();
        store.insert_event("alice", EventKind::Msg).unwrap();
        store.insert_event("alice", EventKind::Join).unwrap();
        store.insert_event("bob", EventKind::Msg).unwrap();
        store.insert_edge(&Edge::new("alice", "bob")).unwrap();

        let d = dispatcher();
        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };
        let outcome = d.dispatch(&mut ctx, "root", Some("admin.example.org"), &args(&["36", "alice"]));
        assert_eq!(
            outcome.confirmation(),
            Some("2 log(s) and 1 relation(s) deleted for alice")
        );

        assert_eq!(store.count_events().unwrap(), 1);
        assert_eq!(store.count_edges().unwrap(), 0);
    }

    #[test]
    fn test_unknown_code_ignored() {
        let mut whitelist = Whitelist::in_memory(false);
        let mut store = EventStore::open_in_memory().unwrap();
        let d = dispatcher();
        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };

        let outcome = d.dispatch(&mut ctx, "root", Some("admin.example.org"), &args(&["99", "x"]));
        assert!(matches!(outcome, Dispatch::Ignored(AdminError::UnknownCode(_))));
        let outcome = d.dispatch(&mut ctx, "root", Some("admin.example.org"), &[]);
        assert!(matches!(outcome, Dispatch::Ignored(AdminError::MissingCode)));
    }

    #[test]
    fn test_failing_handler_retried_without_parameter() {
        let mut whitelist = Whitelist::in_memory(false);
        // In-memory stores cannot be backed up, so both calls fail
        let mut store = EventStore::open_in_memory().unwrap();
        let d = dispatcher();
        let mut ctx = AdminContext {
            whitelist: &mut whitelist,
            store: &mut store,
        };

        let outcome = d.dispatch(&mut ctx, "root", Some("admin.example.org"), &args(&["37"]));
        assert!(matches!(
            outcome,
            Dispatch::Handled {
                code: AdminCode::BackupDatabase,
                confirmation: None,
                fallback: true,
            }
        ));
    }
}
