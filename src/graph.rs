//! Reply graph builder.
//!
//! Turns a [`ReplyIndex`] into a forest of conversation trees. Roots are
//! records that reply to nothing plus reply targets that are not records
//! themselves. Each tree is walked with an explicit stack and a visited set,
//! so arbitrarily deep chains and reply cycles both terminate.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::reply_index::ReplyIndex;
use crate::snowflake;

/// One node of a conversation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: i64,
}

/// A rooted tree, nodes ordered by depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTree {
    pub root: String,
    pub nodes: Vec<TreeNode>,
}

impl ConversationTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Root ids in id-clock order.
pub fn find_roots(index: &ReplyIndex) -> Vec<String> {
    let mut roots: Vec<String> = index
        .top_level()
        .iter()
        .cloned()
        .chain(
            index
                .reply_targets()
                .filter(|target| !index.contains(target))
                .map(str::to_string),
        )
        .collect();
    roots.sort_by_key(|id| snowflake::sort_key(id));
    roots.dedup();
    roots
}

/// Walk every node reachable from `root`. Ids already in `visited` are
/// terminal.
fn walk(root: &str, index: &ReplyIndex, visited: &mut HashSet<String>) -> ConversationTree {
    let mut nodes = Vec::new();
    let mut stack: Vec<(String, Option<String>, i64)> = vec![(root.to_string(), None, 0)];

    while let Some((id, parent_id, depth)) = stack.pop() {
        if !visited.insert(id.clone()) {
            warn!(id = %id, root = %root, "reply cycle detected; not descending");
            continue;
        }
        // Reverse so children pop in insertion order.
        for child in index.children_of(&id).iter().rev() {
            stack.push((child.clone(), Some(id.clone()), depth + 1));
        }
        nodes.push(TreeNode {
            id,
            parent_id,
            depth,
        });
    }

    nodes.sort_by_key(|n| n.depth);
    ConversationTree {
        root: root.to_string(),
        nodes,
    }
}

/// Walk a single tree from `root`.
pub fn walk_tree(root: &str, index: &ReplyIndex) -> ConversationTree {
    walk(root, index, &mut HashSet::new())
}

/// Build the full forest, one tree per root, in root order.
///
/// Records caught in a pure reply cycle are unreachable from any root; each
/// such component is walked from its earliest record so nothing is lost.
pub fn build_forest(index: &ReplyIndex) -> Vec<ConversationTree> {
    let mut visited = HashSet::new();
    let mut forest: Vec<ConversationTree> = find_roots(index)
        .iter()
        .map(|root| walk(root, index, &mut visited))
        .collect();

    let mut orphans: Vec<&str> = index.ids().filter(|id| !visited.contains(*id)).collect();
    if !orphans.is_empty() {
        orphans.sort_by_key(|id| snowflake::sort_key(id));
        for id in orphans {
            if visited.contains(id) {
                continue;
            }
            warn!(id = %id, "record is only reachable through a reply cycle; rooting a tree at it");
            forest.push(walk(id, index, &mut visited));
        }
    }

    debug!(
        trees = forest.len(),
        nodes = forest.iter().map(ConversationTree::len).sum::<usize>(),
        "built conversation forest"
    );
    forest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::original;
    use crate::snowflake::testing::id_at;

    fn index_of(records: &[(String, Option<String>)]) -> ReplyIndex {
        let mut index = ReplyIndex::new();
        for (id, target) in records {
            let reply = target.as_deref().map(|t| (t, "someone", "1"));
            index.put(&original(id, "user", "2", reply));
        }
        index
    }

    fn depths_of(tree: &ConversationTree) -> Vec<(String, i64)> {
        tree.nodes.iter().map(|n| (n.id.clone(), n.depth)).collect()
    }

    #[test]
    fn non_replies_are_roots_at_depth_zero() {
        let (a, b, c) = (id_at(0), id_at(10), id_at(20));
        let index = index_of(&[
            (a.clone(), None),
            (b.clone(), Some(a.clone())),
            (c.clone(), Some(b.clone())),
        ]);

        let forest = build_forest(&index);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].root, a);
        assert_eq!(
            depths_of(&forest[0]),
            vec![(a.clone(), 0), (b.clone(), 1), (c.clone(), 2)]
        );
        assert_eq!(forest[0].nodes[2].parent_id.as_deref(), Some(b.as_str()));
        assert!(forest[0].nodes[0].parent_id.is_none());
    }

    #[test]
    fn absent_reply_target_becomes_root() {
        let (ghost, b, c) = (id_at(0), id_at(10), id_at(20));
        let index = index_of(&[(b.clone(), Some(ghost.clone())), (c.clone(), Some(ghost.clone()))]);

        let roots = find_roots(&index);
        assert_eq!(roots, vec![ghost.clone()]);
        let tree = walk_tree(&ghost, &index);
        assert_eq!(depths_of(&tree), vec![(ghost, 0), (b, 1), (c, 1)]);
    }

    #[test]
    fn separate_threads_are_separate_trees_in_time_order() {
        let (late, early, reply) = (id_at(100), id_at(5), id_at(200));
        let index = index_of(&[
            (late.clone(), None),
            (early.clone(), None),
            (reply.clone(), Some(late.clone())),
        ]);
        let forest = build_forest(&index);
        let roots: Vec<_> = forest.iter().map(|t| t.root.clone()).collect();
        assert_eq!(roots, vec![early, late]);
        assert_eq!(forest[1].len(), 2);
    }

    #[test]
    fn cycles_terminate_and_keep_every_record() {
        let (x, y, z) = (id_at(1), id_at(2), id_at(3));
        // x -> y -> z -> x, plus a self loop on w
        let w = id_at(4);
        let index = index_of(&[
            (x.clone(), Some(z.clone())),
            (y.clone(), Some(x.clone())),
            (z.clone(), Some(y.clone())),
            (w.clone(), Some(w.clone())),
        ]);

        assert!(find_roots(&index).is_empty());
        let forest = build_forest(&index);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].root, x);
        assert_eq!(depths_of(&forest[0]), vec![(x, 0), (y, 1), (z, 2)]);
        assert_eq!(depths_of(&forest[1]), vec![(w, 0)]);

        let total: usize = forest.iter().map(ConversationTree::len).sum();
        assert_eq!(total, index.len());
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let ids: Vec<String> = (0..20_000).map(id_at).collect();
        let mut records = vec![(ids[0].clone(), None)];
        for pair in ids.windows(2) {
            records.push((pair[1].clone(), Some(pair[0].clone())));
        }
        let index = index_of(&records);
        let forest = build_forest(&index);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].nodes.last().unwrap().depth, 19_999);
    }
}
