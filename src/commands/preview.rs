use anyhow::Result;

use crate::boxd::config::{self, load_config};
use crate::boxd::feed::{feed_source, load_feed};
use crate::boxd::reconcile::{normalize_all, order_records, render_diary_entries};
use crate::commands::{CommandReport, ConfigOverrides};

#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub report: CommandReport,
    /// Rendered entries joined the way the diary would hold them.
    pub text: String,
}

/// Render the feed as diary entries without reading or writing any document.
/// Entries are unlinked to film notes since no note merge happens here.
pub fn run(opts: &PreviewOptions) -> Result<Preview> {
    let mut report = CommandReport::new("preview");
    let mut cfg = load_config()?;
    opts.overrides.apply(&mut cfg);
    let sync_cfg = config::sync_config(&cfg)?;
    let source = feed_source(&cfg.feed)?;

    let items = load_feed(&source)?;
    let (mut records, skipped) = normalize_all(&items, sync_cfg.timezone);
    order_records(&mut records, sync_cfg.merge.sort);
    let entries = render_diary_entries(&records, &sync_cfg.render, &[]);

    report.detail(format!("feed={source}"));
    report.detail(format!("records={}", records.len()));
    for item in skipped {
        report.detail(format!("skipped {}: {}", item.id, item.reason));
    }

    let mut text = entries.join(sync_cfg.render.variant.entry_separator());
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(Preview { report, text })
}
