//! Pipeline progress reporting.
//!
//! Reports observable progress during `convtree build` and `convtree recover`
//! so users see how many lines have been ingested, which shard is being
//! hydrated and how many recovery batches have gone out. Progress is emitted
//! on **stderr** so stdout remains a clean payload stream.

use std::io::Write;

/// Lines between two ingest progress events.
pub const INGEST_REPORT_EVERY: u64 = 10_000;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Input lines read so far. Total unknown while streaming.
    Ingesting { lines: u64 },
    /// Shard `shard` of `total` is being hydrated.
    Hydrating { shard: u64, total: u64, nodes: u64 },
    /// A recovery batch is being fetched.
    Recovering { batch: u64, payloads: u64, ids: u64 },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "build  hydrating  shard 3 / 12  (9,800 nodes)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Ingesting { lines } => {
                format!("build  ingesting  {} lines\n", format_number(*lines))
            }
            ProgressEvent::Hydrating {
                shard,
                total,
                nodes,
            } => format!(
                "build  hydrating  shard {} / {}  ({} nodes)\n",
                format_number(*shard),
                format_number(*total),
                format_number(*nodes)
            ),
            ProgressEvent::Recovering {
                batch,
                payloads,
                ids,
            } => format!(
                "recover  batch {}  {} payloads  {} missing ids\n",
                format_number(*batch),
                format_number(*payloads),
                format_number(*ids)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Ingesting { lines } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "lines": lines
            }),
            ProgressEvent::Hydrating {
                shard,
                total,
                nodes,
            } => serde_json::json!({
                "event": "progress",
                "phase": "hydrating",
                "n": shard,
                "total": total,
                "nodes": nodes
            }),
            ProgressEvent::Recovering {
                batch,
                payloads,
                ids,
            } => serde_json::json!({
                "event": "progress",
                "phase": "recovering",
                "batch": batch,
                "payloads": payloads,
                "ids": ids
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn off_mode_is_silent() {
        // Smoke test: must not panic or write.
        ProgressMode::Off
            .reporter()
            .report(ProgressEvent::Ingesting { lines: 5 });
    }
}
