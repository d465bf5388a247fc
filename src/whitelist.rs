//! Whitelist
//!
//! Pseudos allowed to be logged when enforcement is on. The set is mirrored
//! to a plain text file (one pseudo per line) that is rewritten in full on
//! every change.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Whitelist {
    path: Option<PathBuf>,
    members: BTreeSet<String>,
    enabled: bool,
}

impl Whitelist {
    /// Load from `path`; a missing file is an empty whitelist
    pub fn load(path: &Path, enabled: bool) -> Result<Self> {
        let members = match std::fs::read_to_string(path) {
            Ok(content) => parse_members(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading whitelist {}", path.display()))
            }
        };

        info!(
            "Whitelist loaded: {} pseudo(s), enforcement {}",
            members.len(),
            if enabled { "on" } else { "off" }
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            members,
            enabled,
        })
    }

    /// Whitelist without a backing file
    pub fn in_memory(enabled: bool) -> Self {
        Self {
            path: None,
            members: BTreeSet::new(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!("Whitelist enforcement {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn contains(&self, pseudo: &str) -> bool {
        self.members.contains(pseudo)
    }

    /// Whether `pseudo` may be logged under the current enforcement setting
    pub fn permits(&self, pseudo: &str) -> bool {
        !self.enabled || self.contains(pseudo)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Add a pseudo and rewrite the file; returns false if already present
    ///
    /// The in-memory set only changes once the file is written.
    pub fn add(&mut self, pseudo: &str) -> Result<bool> {
        if self.members.contains(pseudo) {
            self.save(&self.members)?;
            return Ok(false);
        }

        let mut next = self.members.clone();
        next.insert(pseudo.to_string());
        self.save(&next)?;
        self.members = next;
        Ok(true)
    }

    /// Remove a pseudo and rewrite the file; absent pseudos are not an error
    pub fn remove(&mut self, pseudo: &str) -> Result<bool> {
        if !self.members.contains(pseudo) {
            self.save(&self.members)?;
            return Ok(false);
        }

        let mut next = self.members.clone();
        next.remove(pseudo);
        self.save(&next)?;
        self.members = next;
        Ok(true)
    }

    fn save(&self, members: &BTreeSet<String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let mut content = String::new();
        for pseudo in members {
            content.push_str(pseudo);
            content.push('\n');
        }

        std::fs::write(path, content)
            .with_context(|| format!("writing whitelist {}", path.display()))?;
        debug!("Whitelist saved: {} pseudo(s)", members.len());
        Ok(())
    }
}

fn parse_members(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
