//! In-memory [`MessageStore`] for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Message;

use super::MessageStore;

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let map = messages
            .into_iter()
            .map(|m| (m.id().to_string(), m))
            .collect();
        Self {
            messages: RwLock::new(map),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_messages(&self, messages: &[Message]) -> Result<u64> {
        let mut stored = self.messages.write().unwrap();
        let mut written = 0;
        for m in messages {
            if !stored.contains_key(m.id()) {
                stored.insert(m.id().to_string(), m.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn get_bodies(&self, ids: &[String]) -> Result<HashMap<String, Message>> {
        let stored = self.messages.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.messages.read().unwrap().len() as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.messages.write().unwrap().clear();
        Ok(())
    }
}
