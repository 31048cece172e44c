//! Missing-node recovery.
//!
//! One recovery round over a stream of payloads:
//!
//! 1. [`MissingCollector`] groups payloads into batches whose placeholder
//!    ids fit one lookup call, holding at most a bounded number of payloads.
//! 2. Each batch's ids go through the [`RateLimitedFetcher`].
//! 3. [`splice_recovered`] swaps found placeholders for their bodies and
//!    registers the new gaps they expose.
//!
//! New placeholders are left for a later round.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::brands::{self, BrandRoster};
use crate::config::{Config, RecoveryConfig};
use crate::conversation::Conversation;
use crate::fetcher::RateLimitedFetcher;
use crate::lookup::{HttpLookup, LookupService};
use crate::models::{Message, MissingPlaceholder};
use crate::pipe::{self, RawLines};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::snowflake;
use crate::stats;

/// Payloads fetched together, with their distinct placeholder ids.
#[derive(Debug, Default)]
pub struct RecoveryBatch {
    pub ids: Vec<String>,
    pub conversations: Vec<Conversation>,
}

/// Groups payloads into lookup-sized batches.
pub struct MissingCollector {
    ids_per_call: usize,
    max_held: usize,
    pending: RecoveryBatch,
    seen: HashSet<String>,
}

impl MissingCollector {
    pub fn new(ids_per_call: usize, max_held: usize) -> Self {
        Self {
            ids_per_call,
            max_held,
            pending: RecoveryBatch::default(),
            seen: HashSet::new(),
        }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(config.ids_per_call, config.max_conversations_in_memory)
    }

    /// Add one payload; returns the batches that became ready.
    pub fn push(&mut self, conversation: Conversation) -> Vec<RecoveryBatch> {
        let mut missing = conversation.missing_ids();
        let mut distinct = HashSet::new();
        missing.retain(|id| distinct.insert(id.clone()));
        if missing.is_empty() {
            return vec![RecoveryBatch {
                ids: Vec::new(),
                conversations: vec![conversation],
            }];
        }

        let mut ready = Vec::new();
        let fresh = missing.iter().filter(|id| !self.seen.contains(*id)).count();
        if !self.pending.conversations.is_empty()
            && self.pending.ids.len() + fresh > self.ids_per_call
        {
            ready.push(self.take());
        }

        for id in missing {
            if self.seen.insert(id.clone()) {
                self.pending.ids.push(id);
            }
        }
        self.pending.conversations.push(conversation);

        if self.pending.ids.len() >= self.ids_per_call
            || self.pending.conversations.len() >= self.max_held
        {
            ready.push(self.take());
        }
        ready
    }

    /// Flush whatever is still held.
    pub fn finish(&mut self) -> Option<RecoveryBatch> {
        if self.pending.conversations.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> RecoveryBatch {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}

/// Splice recovered bodies into a payload.
///
/// A payload with no placeholders comes back unchanged. Otherwise every
/// found placeholder becomes its body at the same depth; if that body
/// replies to something not already in the payload, a new placeholder for
/// it is added one level up. Entries are re-sorted by id time.
pub fn splice_recovered(
    conversation: Conversation,
    recovered: &HashMap<String, Message>,
) -> Conversation {
    if !conversation.has_missing() {
        return conversation;
    }

    let Conversation {
        tweets,
        depths,
        extra,
        ..
    } = conversation;

    let mut present: HashSet<String> = tweets.iter().map(|t| t.id().to_string()).collect();
    let mut entries = Vec::with_capacity(tweets.len());
    let mut recovered_ids = Vec::new();
    let mut new_missing = Vec::new();
    let mut unrecoverable = Vec::new();

    for (tweet, depth) in tweets.into_iter().zip(depths) {
        let placeholder = match tweet {
            Message::Missing(placeholder) => placeholder,
            other => {
                entries.push((other, depth));
                continue;
            }
        };

        match recovered.get(&placeholder.id) {
            Some(body) => {
                recovered_ids.push(placeholder.id.clone());
                if let Some(target) = body.reply_target() {
                    if present.insert(target.id.clone()) {
                        entries.push((
                            Message::Missing(MissingPlaceholder::new(
                                target.id.clone(),
                                &target.author,
                            )),
                            depth - 1,
                        ));
                        new_missing.push(target.id.clone());
                    }
                }
                entries.push((body.clone(), depth));
            }
            None => {
                unrecoverable.push(placeholder.id.clone());
                entries.push((Message::Missing(placeholder), depth));
            }
        }
    }

    entries.sort_by_key(|(m, _)| snowflake::sort_key(m.id()));
    let (tweets, depths): (Vec<Message>, Vec<i64>) = entries.into_iter().unzip();

    let mut still_missing: Vec<String> = new_missing
        .iter()
        .chain(unrecoverable.iter())
        .cloned()
        .collect();
    still_missing.sort_by_key(|id| snowflake::sort_key(id));
    still_missing.dedup();

    Conversation {
        tweets,
        depths,
        ids_of_missing_tweets: Some(still_missing),
        recovered_tweets: Some(recovered_ids),
        new_missing_tweets: Some(new_missing),
        unrecoverable_tweets: Some(unrecoverable),
        extra,
    }
}

/// Counters for one recovery round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoverReport {
    pub payloads: u64,
    pub skipped: u64,
    pub batches: u64,
    pub recovered: u64,
    pub new_missing: u64,
    pub unrecoverable: u64,
    pub lookup_calls: u64,
}

/// Options for [`recover_stream`].
pub struct RecoverOptions<'a> {
    pub enrich: bool,
    pub brands: Option<&'a BrandRoster>,
}

/// Run one recovery round from `reader` to `writer`.
pub async fn recover_stream<S: LookupService, R: BufRead>(
    reader: R,
    writer: &mut dyn Write,
    fetcher: &RateLimitedFetcher<S>,
    config: &RecoveryConfig,
    options: &RecoverOptions<'_>,
    progress: &dyn ProgressReporter,
) -> Result<RecoverReport> {
    let mut report = RecoverReport::default();
    let mut collector = MissingCollector::from_config(config);

    let mut lines = RawLines::new(reader);
    while let Some((n, line)) = lines.next_line()? {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(line = n, error = %e, "skipping payload line that is not UTF-8");
                report.skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let conversation = match Conversation::parse_line(line) {
            Ok(c) => c,
            Err(e) => {
                warn!(line = n, error = %e, "skipping bad conversation payload");
                report.skipped += 1;
                continue;
            }
        };
        for batch in collector.push(conversation) {
            process_batch(batch, writer, fetcher, config, options, progress, &mut report).await?;
        }
    }
    if let Some(batch) = collector.finish() {
        process_batch(batch, writer, fetcher, config, options, progress, &mut report).await?;
    }

    writer.flush()?;
    report.lookup_calls = fetcher.calls();
    Ok(report)
}

async fn process_batch<S: LookupService>(
    batch: RecoveryBatch,
    writer: &mut dyn Write,
    fetcher: &RateLimitedFetcher<S>,
    config: &RecoveryConfig,
    options: &RecoverOptions<'_>,
    progress: &dyn ProgressReporter,
    report: &mut RecoverReport,
) -> Result<()> {
    let mut recovered = HashMap::new();
    if !batch.ids.is_empty() {
        report.batches += 1;
        progress.report(ProgressEvent::Recovering {
            batch: report.batches,
            payloads: batch.conversations.len() as u64,
            ids: batch.ids.len() as u64,
        });
        for chunk in batch.ids.chunks(config.ids_per_call) {
            let found = fetcher
                .fetch(chunk)
                .await
                .with_context(|| format!("Recovery lookup failed for ids: {}", chunk.join(",")))?;
            recovered.extend(found);
        }
        debug!(
            requested = batch.ids.len(),
            found = recovered.len(),
            "recovery batch fetched"
        );
    }

    for conversation in batch.conversations {
        let mut spliced = splice_recovered(conversation, &recovered);
        if options.enrich {
            stats::enrich(&mut spliced, options.brands);
        }
        report.payloads += 1;
        report.recovered += spliced.recovered_tweets.as_ref().map_or(0, Vec::len) as u64;
        report.new_missing += spliced.new_missing_tweets.as_ref().map_or(0, Vec::len) as u64;
        report.unrecoverable += spliced.unrecoverable_tweets.as_ref().map_or(0, Vec::len) as u64;
        writeln!(writer, "{}", spliced.to_line()?)?;
    }
    Ok(())
}

/// CLI entry point for `convtree recover`.
pub async fn run_recover(
    config: &Config,
    input: Option<&Path>,
    output: Option<&Path>,
    enrich: bool,
    brands_path: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let roster = if enrich {
        brands::resolve(brands_path, config.brands.path.as_deref())?
    } else {
        None
    };
    let fetcher = RateLimitedFetcher::from_config(HttpLookup::from_config(config)?, &config.lookup);

    let reader = pipe::open_input(input)?;
    let mut writer = pipe::open_output(output)?;
    let options = RecoverOptions {
        enrich,
        brands: roster.as_ref(),
    };
    let report = recover_stream(
        reader,
        &mut *writer,
        &fetcher,
        &config.recovery,
        &options,
        progress,
    )
    .await?;

    info!(
        payloads = report.payloads,
        skipped = report.skipped,
        recovered = report.recovered,
        new_missing = report.new_missing,
        unrecoverable = report.unrecoverable,
        lookup_calls = report.lookup_calls,
        "recovery round complete"
    );
    Ok(())
}
