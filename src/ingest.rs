//! Message ingestion.
//!
//! Streams input lines into the [`ReplyIndex`] and the body store. Only the
//! lightweight index entry stays in memory; bodies are written to the store
//! in batches of `write_batch` messages.

use std::io::BufRead;

use anyhow::Result;
use tracing::{debug, warn};

use crate::models::Message;
use crate::pipe::RawLines;
use crate::progress::{ProgressEvent, ProgressReporter, INGEST_REPORT_EVERY};
use crate::reply_index::{PutOutcome, ReplyIndex};
use crate::store::MessageStore;

/// Counters for one ingest pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub lines: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub malformed: u64,
}

/// Read every line of `reader`, indexing and storing each message.
///
/// Blank lines are ignored. Lines that are not valid UTF-8, lines that do
/// not parse as a message, and placeholder lines are counted as malformed
/// and skipped. A repeated id is
/// counted as a duplicate; the first occurrence wins in both the index and
/// the store.
pub async fn ingest_messages<R: BufRead>(
    reader: R,
    index: &mut ReplyIndex,
    store: &dyn MessageStore,
    write_batch: usize,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut pending: Vec<Message> = Vec::with_capacity(write_batch);

    let mut lines = RawLines::new(reader);
    while let Some((n, line)) = lines.next_line()? {
        report.lines += 1;
        if report.lines % INGEST_REPORT_EVERY == 0 {
            progress.report(ProgressEvent::Ingesting {
                lines: report.lines,
            });
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!(line = n, error = %e, "skipping input line that is not UTF-8");
                report.malformed += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match Message::parse_line(line) {
            Ok(m) => m,
            Err(e) => {
                debug!(line = n, error = %e, "skipping malformed input line");
                report.malformed += 1;
                continue;
            }
        };

        match index.put(&message) {
            PutOutcome::Inserted => {
                report.inserted += 1;
                pending.push(message);
                if pending.len() >= write_batch {
                    store.insert_messages(&pending).await?;
                    pending.clear();
                }
            }
            PutOutcome::Duplicate => {
                warn!(id = %message.id(), line = n, "duplicate message id; keeping first occurrence");
                report.duplicates += 1;
            }
            PutOutcome::Rejected => {
                debug!(id = %message.id(), line = n, "placeholder in message input; skipping");
                report.malformed += 1;
            }
        }
    }

    if !pending.is_empty() {
        store.insert_messages(&pending).await?;
    }

    progress.report(ProgressEvent::Ingesting {
        lines: report.lines,
    });
    Ok(report)
}
