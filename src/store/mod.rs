//! Raw message body storage.
//!
//! The [`MessageStore`] trait is the body lookup used by hydration: write
//! bodies once during ingest, then bulk-load them by id set one shard at a
//! time. Ids the store does not hold are simply absent from the result.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`SqliteMessageStore`] | scratch database for `build` runs |
//! | [`InMemoryMessageStore`] | tests |

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Message;

pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert full messages. Ids already stored are left untouched.
    ///
    /// Returns the number of rows actually written.
    async fn insert_messages(&self, messages: &[Message]) -> Result<u64>;

    /// Bulk lookup. Missing ids are omitted, not an error.
    async fn get_bodies(&self, ids: &[String]) -> Result<HashMap<String, Message>>;

    async fn count(&self) -> Result<u64>;

    /// Drop every stored body.
    async fn clear(&self) -> Result<()>;
}
