//! In-memory reply-link index.
//!
//! Holds one lightweight entry per ingested message (author and reply
//! target, never the body) and groups children by reply target as records
//! stream in, so [`ReplyIndex::children_of`] is a map lookup.

use std::collections::HashMap;

use crate::models::{Author, Message, ReplyTarget};

/// Lightweight per-message entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub author: Author,
    pub reply_target: Option<ReplyTarget>,
}

/// Result of [`ReplyIndex::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// The id was already present; the earlier record wins.
    Duplicate,
    /// Placeholders are not records and cannot be indexed.
    Rejected,
}

#[derive(Debug, Default)]
pub struct ReplyIndex {
    entries: HashMap<String, IndexEntry>,
    children: HashMap<String, Vec<String>>,
    top_level: Vec<String>,
    target_authors: HashMap<String, Author>,
}

impl ReplyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, message: &Message) -> PutOutcome {
        if message.is_missing() {
            return PutOutcome::Rejected;
        }
        let id = message.id();
        if self.entries.contains_key(id) {
            return PutOutcome::Duplicate;
        }

        let reply_target = message.reply_target().cloned();
        match &reply_target {
            Some(target) => {
                self.children
                    .entry(target.id.clone())
                    .or_default()
                    .push(id.to_string());
                self.target_authors
                    .entry(target.id.clone())
                    .or_insert_with(|| target.author.clone());
            }
            None => self.top_level.push(id.to_string()),
        }

        self.entries.insert(
            id.to_string(),
            IndexEntry {
                author: message.author(),
                reply_target,
            },
        );
        PutOutcome::Inserted
    }

    /// Ids replying to `id`, in insertion order. Unknown ids have no children.
    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records that reply to nothing.
    pub fn top_level(&self) -> &[String] {
        &self.top_level
    }

    /// Every id that some record replies to, whether or not it is itself a
    /// record.
    pub fn reply_targets(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Author of a reply target as reported by the first record replying
    /// to it.
    pub fn target_author(&self, id: &str) -> Option<&Author> {
        self.target_authors.get(id)
    }
}
