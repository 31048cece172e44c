//! Brand roster.
//!
//! An allow-list of `handle,id` pairs read from CSV. A user counts as a brand
//! when either its id or its handle is on the roster.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::models::Author;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandRoster {
    handles: HashSet<String>,
    ids: HashSet<String>,
    len: usize,
}

impl BrandRoster {
    pub fn from_entries(entries: impl IntoIterator<Item = Author>) -> Self {
        let mut roster = Self::default();
        for author in entries {
            roster.handles.insert(author.handle.to_lowercase());
            roster.ids.insert(author.id);
            roster.len += 1;
        }
        roster
    }

    /// Parse `handle,id` lines. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((handle, id)) = line.split_once(',') else {
                bail!("brand roster line {}: expected 'handle,id'", n + 1);
            };
            entries.push(Author::new(handle.trim().to_lowercase(), id.trim()));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read brand roster: {}", path.display()))?;
        let roster = Self::parse(&text)
            .with_context(|| format!("Invalid brand roster: {}", path.display()))?;
        debug!(brands = roster.len(), path = %path.display(), "loaded brand roster");
        Ok(roster)
    }

    pub fn is_brand(&self, author: &Author) -> bool {
        self.ids.contains(&author.id) || self.handles.contains(&author.handle)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Load the roster named on the command line, else the configured one.
pub fn resolve(cli_path: Option<&Path>, config_path: Option<&Path>) -> Result<Option<BrandRoster>> {
    cli_path.or(config_path).map(BrandRoster::load).transpose()
}
