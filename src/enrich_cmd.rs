//! `convtree enrich`: recompute statistics on existing payload lines.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::brands::{self, BrandRoster};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::pipe::{self, RawLines};
use crate::stats;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub payloads: u64,
    pub skipped: u64,
}

/// Enrich every valid payload; lines that are not payloads, or not UTF-8,
/// are skipped.
pub fn enrich_stream<R: BufRead>(
    reader: R,
    writer: &mut dyn Write,
    brands: Option<&BrandRoster>,
) -> Result<EnrichReport> {
    let mut report = EnrichReport::default();
    let mut lines = RawLines::new(reader);
    while let Some((n, line)) = lines.next_line()? {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(line = n, error = %e, "payload line is not UTF-8; skipping");
                report.skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let mut conversation = match Conversation::parse_line(line) {
            Ok(c) => c,
            Err(e) => {
                warn!(line = n, error = %e, "not a valid conversation payload; skipping");
                report.skipped += 1;
                continue;
            }
        };
        stats::enrich(&mut conversation, brands);
        writeln!(writer, "{}", conversation.to_line()?)?;
        report.payloads += 1;
    }
    writer.flush()?;
    Ok(report)
}

/// CLI entry point for `convtree enrich`.
pub fn run_enrich(
    config: &Config,
    input: Option<&Path>,
    output: Option<&Path>,
    brands_path: Option<&Path>,
) -> Result<()> {
    let roster = brands::resolve(brands_path, config.brands.path.as_deref())?;
    let reader = pipe::open_input(input)?;
    let mut writer = pipe::open_output(output)?;
    let report = enrich_stream(reader, &mut *writer, roster.as_ref())?;
    info!(
        payloads = report.payloads,
        skipped = report.skipped,
        brands = roster.as_ref().map_or(0, BrandRoster::len),
        "enrich complete"
    );
    Ok(())
}
