//! `convtree build`: raw messages in, conversation payloads out.
//!
//! Ingest streams every message into the reply index and the scratch body
//! store. The forest is then built from the index alone, split into shards
//! by node budget, and each shard is hydrated, enriched and written before
//! the next is loaded. The scratch store is emptied at both ends of the run.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::brands::{self, BrandRoster};
use crate::config::{BuildConfig, Config};
use crate::db;
use crate::graph;
use crate::hydrate::Hydrator;
use crate::ingest::{ingest_messages, IngestReport};
use crate::migrate;
use crate::pipe;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::reply_index::ReplyIndex;
use crate::shard;
use crate::stats;
use crate::store::{MessageStore, SqliteMessageStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub ingest: IngestReport,
    pub trees: u64,
    pub shards: u64,
    pub nodes: u64,
    pub missing: u64,
}

/// Run the whole pipeline over `reader`, writing one payload per line.
pub async fn build_conversations<R: BufRead>(
    reader: R,
    writer: &mut dyn Write,
    store: &dyn MessageStore,
    config: &BuildConfig,
    brands: Option<&BrandRoster>,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let leftover = store.count().await?;
    if leftover > 0 {
        warn!(
            rows = leftover,
            "scratch store held messages from an earlier run; clearing"
        );
        store.clear().await?;
    }

    let mut index = ReplyIndex::new();
    let ingest = ingest_messages(reader, &mut index, store, config.write_batch, progress).await?;

    let forest = graph::build_forest(&index);
    let shards = shard::plan_shards(&forest, config.max_in_memory_nodes);
    let hydrator = Hydrator::new(store, &index);

    let mut report = BuildReport {
        ingest,
        trees: forest.len() as u64,
        shards: shards.len() as u64,
        ..BuildReport::default()
    };

    for (i, plan) in shards.iter().enumerate() {
        progress.report(ProgressEvent::Hydrating {
            shard: i as u64 + 1,
            total: shards.len() as u64,
            nodes: plan.node_count as u64,
        });
        for mut conversation in hydrator.hydrate_shard(&forest[plan.trees.clone()]).await? {
            stats::enrich(&mut conversation, brands);
            report.nodes += conversation.len() as u64;
            report.missing += conversation.missing_ids().len() as u64;
            writeln!(writer, "{}", conversation.to_line()?)?;
        }
    }
    writer.flush()?;

    store.clear().await?;
    Ok(report)
}

/// CLI entry point for `convtree build`.
pub async fn run_build(
    config: &Config,
    input: Option<&Path>,
    output: Option<&Path>,
    brands_path: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let roster = brands::resolve(brands_path, config.brands.path.as_deref())?;

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = SqliteMessageStore::new(pool.clone());

    let reader = pipe::open_input(input)?;
    let mut writer = pipe::open_output(output)?;
    let report = build_conversations(
        reader,
        &mut *writer,
        &store,
        &config.build,
        roster.as_ref(),
        progress,
    )
    .await?;
    pool.close().await;

    info!(
        lines = report.ingest.lines,
        messages = report.ingest.inserted,
        duplicates = report.ingest.duplicates,
        malformed = report.ingest.malformed,
        conversations = report.trees,
        shards = report.shards,
        missing = report.missing,
        "build complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::models::fixtures::original;
    use crate::models::Message;
    use crate::progress::testing::RecordingProgress;
    use crate::snowflake::testing::id_at;
    use crate::snowflake;
    use crate::store::InMemoryMessageStore;
    use serde_json::Value;
    use std::io::Cursor;

    fn line(message: Message) -> String {
        serde_json::to_string(&message).unwrap()
    }

    async fn run(input: String, store: &InMemoryMessageStore, budget: usize) -> (BuildReport, Vec<Conversation>) {
        let mut out = Vec::new();
        let config = BuildConfig {
            max_in_memory_nodes: budget,
            write_batch: 2,
        };
        let report = build_conversations(
            Cursor::new(input),
            &mut out,
            store,
            &config,
            None,
            &crate::progress::NoProgress,
        )
        .await
        .unwrap();
        let payloads = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| Conversation::parse_line(l).unwrap())
            .collect();
        (report, payloads)
    }

    #[tokio::test]
    async fn builds_time_ordered_payloads_per_tree() {
        let (a, b, c) = (id_at(0), id_at(10), id_at(20));
        let (x, y) = (id_at(5), id_at(50));
        let ghost = id_at(1);
        let orphan = id_at(30);
        let input = [
            line(original(&c, "carol", "3", Some((b.as_str(), "bob", "2")))),
            line(original(&a, "alice", "1", None)),
            line(original(&y, "yan", "5", Some((x.as_str(), "xia", "4")))),
            line(original(&b, "bob", "2", Some((a.as_str(), "alice", "1")))),
            line(original(&x, "xia", "4", None)),
            line(original(&orphan, "olga", "6", Some((ghost.as_str(), "Gus", "7")))),
        ]
        .join("\n");

        let store = InMemoryMessageStore::new();
        let (report, payloads) = run(input, &store, 4).await;

        assert_eq!(report.trees, 3);
        assert_eq!(report.shards, 2);
        assert_eq!(report.ingest.inserted, 6);
        assert_eq!(report.missing, 1);
        assert_eq!(store.count().await.unwrap(), 0);

        let roots: Vec<String> = payloads.iter().map(|p| p.ids()[0].clone()).collect();
        assert_eq!(roots, vec![a.clone(), ghost.clone(), x.clone()]);
        assert_eq!(payloads[0].ids(), vec![a, b, c]);
        assert_eq!(payloads[0].depths, vec![0, 1, 2]);
        assert_eq!(payloads[1].ids_of_missing_tweets, Some(vec![ghost]));
        assert_eq!(
            payloads[1].tweets[0].as_missing().unwrap().author_handle,
            "gus"
        );

        for p in &payloads {
            let keys: Vec<_> = p.tweets.iter().map(|t| snowflake::sort_key(t.id())).collect();
            assert!(keys.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(p.extra["size_of_conversation"], Value::from(p.len()));
        }
    }

    #[tokio::test]
    async fn clears_leftovers_before_ingesting() {
        let stale = original(&id_at(99), "stale", "9", None);
        let store = InMemoryMessageStore::with_messages([stale]);
        let input = line(original(&id_at(0), "fresh", "1", None));

        let (report, payloads) = run(input, &store, 10).await;
        assert_eq!(report.trees, 1);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].tweets[0].author().handle, "fresh");
    }

    #[tokio::test]
    async fn reports_each_shard() {
        let input = (0..4)
            .map(|n| line(original(&id_at(n), "u", "1", None)))
            .collect::<Vec<_>>()
            .join("\n");
        let store = InMemoryMessageStore::new();
        let progress = RecordingProgress::default();
        let mut out = Vec::new();
        let config = BuildConfig {
            max_in_memory_nodes: 2,
            write_batch: 10,
        };
        build_conversations(Cursor::new(input), &mut out, &store, &config, None, &progress)
            .await
            .unwrap();

        let hydrating: Vec<_> = progress
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Hydrating { .. }))
            .cloned()
            .collect();
        assert_eq!(
            hydrating,
            vec![
                ProgressEvent::Hydrating { shard: 1, total: 2, nodes: 2 },
                ProgressEvent::Hydrating { shard: 2, total: 2, nodes: 2 },
            ]
        );
    }
}
