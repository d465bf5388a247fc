//! Event Store
//!
//! SQLite persistence for channel events and conversational edges.
//!
//! Writes go through a scoped [`Session`]: committing flushes everything
//! written in it, dropping it (or any error inside [`EventStore::with_session`])
//! rolls it back. Every single-row insert runs in its own session, so each
//! channel event is committed on its own.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::events::{Edge, Event, EventKind};

/// How long a connection waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Event + edge store with SQLite backend
pub struct EventStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl EventStore {
    /// Open or create the store file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening store {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // Readers (refresh worker, report server) use their own connections
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!("Store journal mode: {}", mode);

        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;

        info!("Event store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory store (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        // No uniqueness on edges: every observation is its own row
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                pseudo TEXT NOT NULL CHECK(length(pseudo) > 0),
                kind INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_log_kind_timestamp ON log(kind, timestamp);
            CREATE INDEX IF NOT EXISTS idx_log_pseudo ON log(pseudo);

            CREATE TABLE IF NOT EXISTS edge (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                pseudo_a TEXT NOT NULL,
                pseudo_b TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edge_a ON edge(pseudo_a);
            CREATE INDEX IF NOT EXISTS idx_edge_b ON edge(pseudo_b);
            "#,
        )?;

        Ok(())
    }

    /// Path of the backing file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire a write session
    pub fn session(&mut self) -> Result<Session<'_>> {
        let tx = self.conn.transaction()?;
        Ok(Session { tx })
    }

    /// Run `f` inside a session: commit on `Ok`, roll back on `Err`
    pub fn with_session<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let session = self.session()?;
        match f(&session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!("Rolling back session: {:#}", e);
                session.rollback()?;
                Err(e)
            }
        }
    }

    /// Insert one event and commit it
    pub fn insert_event(&mut self, pseudo: &str, kind: EventKind) -> Result<i64> {
        self.with_session(|s| s.add_event(pseudo, kind))
    }

    /// Insert one edge and commit it
    pub fn insert_edge(&mut self, edge: &Edge) -> Result<i64> {
        self.with_session(|s| s.add_edge(edge))
    }

    /// Delete every event of `pseudo`, returning the number of rows removed
    pub fn delete_events_by_pseudo(&mut self, pseudo: &str) -> Result<usize> {
        self.with_session(|s| s.delete_events(pseudo))
    }

    /// Delete every edge touching `pseudo`, returning the number of rows removed
    pub fn delete_edges_by_pseudo(&mut self, pseudo: &str) -> Result<usize> {
        self.with_session(|s| s.delete_edges(pseudo))
    }

    /// Flush committed pages from the WAL into the main file
    pub fn checkpoint(&self) -> Result<()> {
        // Outside WAL mode the pragma is a harmless no-op
        let (busy, log, checkpointed): (i64, i64, i64) = self.conn.query_row(
            "PRAGMA wal_checkpoint(PASSIVE)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        debug!(
            "Checkpoint: busy={} log={} checkpointed={}",
            busy, log, checkpointed
        );
        Ok(())
    }

    /// Copy the store next to itself under a timestamped name
    pub fn backup(&self) -> Result<PathBuf> {
        let Some(path) = self.path.as_deref() else {
            bail!("in-memory store cannot be backed up");
        };

        let target = backup_path(path, Utc::now());
        if target.exists() {
            bail!("backup {} already exists", target.display());
        }

        self.conn
            .execute(
                "VACUUM INTO ?1",
                params![target.to_string_lossy().into_owned()],
            )
            .with_context(|| format!("writing backup {}", target.display()))?;

        info!("Store backed up to {}", target.display());
        Ok(target)
    }

    /// All MSG events in `[start, end)`
    pub fn messages_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, pseudo, kind
            FROM log
            WHERE kind = ?1 AND timestamp >= ?2 AND timestamp < ?3
            ORDER BY timestamp, id
            "#,
        )?;

        let events = stmt
            .query_map(
                params![EventKind::Msg.as_code(), start.timestamp(), end.timestamp()],
                event_from_row,
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok(events)
    }

    /// Every MSG event ever recorded
    pub fn messages(&self) -> Result<Vec<Event>> {
        self.events_of_kind(EventKind::Msg)
    }

    /// Every event of one kind
    pub fn events_of_kind(&self, kind: EventKind) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, pseudo, kind
            FROM log
            WHERE kind = ?1
            ORDER BY timestamp, id
            "#,
        )?;

        let events = stmt
            .query_map(params![kind.as_code()], event_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(events)
    }

    /// Every edge row
    pub fn edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, pseudo_a, pseudo_b
            FROM edge
            ORDER BY id
            "#,
        )?;

        let edges = stmt
            .query_map([], |row| {
                Ok(Edge {
                    id: row.get(0)?,
                    timestamp: timestamp_from_secs(row.get(1)?),
                    pseudo_a: row.get(2)?,
                    pseudo_b: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(edges)
    }

    /// Number of event rows
    pub fn count_events(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of edge rows
    pub fn count_edges(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edge", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Scoped write session over one SQLite transaction
///
/// Dropped without [`Session::commit`] it rolls back.
pub struct Session<'a> {
    tx: Transaction<'a>,
}

impl Session<'_> {
    /// Insert an event stamped with the current time
    pub fn add_event(&self, pseudo: &str, kind: EventKind) -> Result<i64> {
        self.add_event_at(pseudo, kind, Utc::now())
    }

    /// Insert an event with an explicit timestamp (imports, tests)
    pub fn add_event_at(&self, pseudo: &str, kind: EventKind, at: DateTime<Utc>) -> Result<i64> {
        if pseudo.is_empty() {
            bail!("event pseudo must not be empty");
        }

        self.tx.execute(
            "INSERT INTO log (timestamp, pseudo, kind) VALUES (?1, ?2, ?3)",
            params![at.timestamp(), pseudo, kind.as_code()],
        )?;

        let id = self.tx.last_insert_rowid();
        debug!("Stored {} event for {} (#{})", kind, pseudo, id);
        Ok(id)
    }

    /// Insert an edge stamped with the current time
    pub fn add_edge(&self, edge: &Edge) -> Result<i64> {
        // Re-canonicalize: callers may have built the struct by hand
        let (a, b) = crate::events::canonical_pair(&edge.pseudo_a, &edge.pseudo_b);

        self.tx.execute(
            "INSERT INTO edge (timestamp, pseudo_a, pseudo_b) VALUES (?1, ?2, ?3)",
            params![Utc::now().timestamp(), a, b],
        )?;

        let id = self.tx.last_insert_rowid();
        debug!("Stored edge {} <-> {} (#{})", a, b, id);
        Ok(id)
    }

    pub fn delete_events(&self, pseudo: &str) -> Result<usize> {
        let rows = self
            .tx
            .execute("DELETE FROM log WHERE pseudo = ?1", params![pseudo])?;
        Ok(rows)
    }

    pub fn delete_edges(&self, pseudo: &str) -> Result<usize> {
        let rows = self.tx.execute(
            "DELETE FROM edge WHERE pseudo_a = ?1 OR pseudo_b = ?1",
            params![pseudo],
        )?;
        Ok(rows)
    }

    /// Flush and commit
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let code: i64 = row.get(3)?;
    let kind = EventKind::from_code(code).ok_or(rusqlite::Error::IntegralValueOutOfRange(3, code))?;

    Ok(Event {
        id: row.get(0)?,
        timestamp: timestamp_from_secs(row.get(1)?),
        pseudo: row.get(2)?,
        kind,
    })
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// `data/bdd.sqlite` -> `data/bdd_2024-03-01_18-04-59.sqlite`
fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let stamp = at.format("%Y-%m-%d_%H-%M-%S");

    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };

    path.with_file_name(name)
}
