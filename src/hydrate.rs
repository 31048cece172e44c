//! Hydration: attaching message bodies to tree nodes.
//!
//! One shard at a time, every node id in the shard is looked up in the body
//! store in a single bulk call. Nodes with no stored body become missing
//! placeholders carrying the best-known author of that id.

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::conversation::Conversation;
use crate::graph::ConversationTree;
use crate::models::{Author, Message, MissingPlaceholder};
use crate::reply_index::ReplyIndex;
use crate::store::MessageStore;

pub struct Hydrator<'a> {
    store: &'a dyn MessageStore,
    index: &'a ReplyIndex,
}

impl<'a> Hydrator<'a> {
    pub fn new(store: &'a dyn MessageStore, index: &'a ReplyIndex) -> Self {
        Self { store, index }
    }

    /// Hydrate every tree of a shard, one payload per tree, in tree order.
    pub async fn hydrate_shard(&self, trees: &[ConversationTree]) -> Result<Vec<Conversation>> {
        let ids: Vec<String> = trees
            .iter()
            .flat_map(|t| t.nodes.iter().map(|n| n.id.clone()))
            .collect();
        let mut bodies = self.store.get_bodies(&ids).await?;
        debug!(
            trees = trees.len(),
            nodes = ids.len(),
            found = bodies.len(),
            "hydrating shard"
        );

        trees
            .iter()
            .map(|tree| assemble(tree, &mut bodies, self.index))
            .collect()
    }
}

/// Build one time-sorted payload from a tree, taking bodies out of `bodies`.
pub fn assemble(
    tree: &ConversationTree,
    bodies: &mut HashMap<String, Message>,
    index: &ReplyIndex,
) -> Result<Conversation> {
    let entries = tree
        .nodes
        .iter()
        .map(|node| {
            let message = bodies.remove(&node.id).unwrap_or_else(|| {
                let author = index
                    .target_author(&node.id)
                    .cloned()
                    .unwrap_or_else(Author::unavailable);
                Message::Missing(MissingPlaceholder::new(node.id.clone(), &author))
            });
            (message, node.depth)
        })
        .collect();
    Conversation::from_entries(entries)
}
