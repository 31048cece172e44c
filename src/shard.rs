//! Shard planning.
//!
//! Groups consecutive trees of the forest into shards whose total node count
//! stays within the in-memory budget, so hydration only ever loads one
//! shard's bodies at a time.

use std::ops::Range;

use crate::graph::ConversationTree;

/// A contiguous run of trees hydrated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Index range into the forest.
    pub trees: Range<usize>,
    pub node_count: usize,
}

/// Partition `forest` into shards of at most `budget` nodes.
///
/// Trees are never split. A tree larger than the budget gets a shard of its
/// own. The plan depends only on the forest order and the budget.
pub fn plan_shards(forest: &[ConversationTree], budget: usize) -> Vec<Shard> {
    let mut shards = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (i, tree) in forest.iter().enumerate() {
        if count > 0 && count + tree.len() > budget {
            shards.push(Shard {
                trees: start..i,
                node_count: count,
            });
            start = i;
            count = 0;
        }
        count += tree.len();
    }
    if start < forest.len() {
        shards.push(Shard {
            trees: start..forest.len(),
            node_count: count,
        });
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TreeNode;

    fn tree_of(size: usize, tag: usize) -> ConversationTree {
        ConversationTree {
            root: format!("{}", tag),
            nodes: (0..size)
                .map(|i| TreeNode {
                    id: format!("{}{:04}", tag, i),
                    parent_id: None,
                    depth: i as i64,
                })
                .collect(),
        }
    }

    fn forest_of(sizes: &[usize]) -> Vec<ConversationTree> {
        sizes.iter().enumerate().map(|(i, s)| tree_of(*s, i + 1)).collect()
    }

    #[test]
    fn packs_trees_up_to_budget() {
        let forest = forest_of(&[3, 4, 2, 5, 1]);
        let shards = plan_shards(&forest, 7);
        assert_eq!(
            shards,
            vec![
                Shard { trees: 0..2, node_count: 7 },
                Shard { trees: 2..4, node_count: 7 },
                Shard { trees: 4..5, node_count: 1 },
            ]
        );
    }

    #[test]
    fn oversized_tree_gets_its_own_shard() {
        let forest = forest_of(&[12, 2, 30, 1]);
        let shards = plan_shards(&forest, 10);
        assert_eq!(shards[0], Shard { trees: 0..1, node_count: 12 });
        assert_eq!(shards[1], Shard { trees: 1..2, node_count: 2 });
        assert_eq!(shards[2], Shard { trees: 2..3, node_count: 30 });
        assert_eq!(shards[3], Shard { trees: 3..4, node_count: 1 });
    }

    #[test]
    fn shards_cover_forest_without_splitting() {
        let sizes = [5, 1, 9, 9, 2, 2, 2, 17, 3, 8, 1, 1, 6];
        let forest = forest_of(&sizes);
        for budget in [1, 3, 8, 10, 25, 1000] {
            let shards = plan_shards(&forest, budget);
            let mut next = 0;
            for shard in &shards {
                assert_eq!(shard.trees.start, next, "shards must be contiguous");
                assert!(!shard.trees.is_empty());
                let nodes: usize = forest[shard.trees.clone()].iter().map(|t| t.len()).sum();
                assert_eq!(nodes, shard.node_count);
                assert!(shard.node_count <= budget || shard.trees.len() == 1);
                next = shard.trees.end;
            }
            assert_eq!(next, forest.len());
            let total: usize = shards.iter().map(|s| s.node_count).sum();
            assert_eq!(total, sizes.iter().sum::<usize>());
            assert_eq!(shards, plan_shards(&forest, budget));
        }
    }

    #[test]
    fn empty_forest_has_no_shards() {
        assert!(plan_shards(&[], 10).is_empty());
    }
}
