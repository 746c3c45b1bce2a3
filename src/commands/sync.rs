use anyhow::Result;

use crate::boxd::audit;
use crate::boxd::config::{self, load_config};
use crate::boxd::feed::{feed_source, load_feed};
use crate::boxd::lock::SyncLock;
use crate::boxd::paths::resolve_paths;
use crate::boxd::reconcile::reconcile;
use crate::boxd::state::{self, BoxdState, content_hash};
use crate::boxd::store::{FsStore, apply_requests};
use crate::boxd::util::{now_epoch_secs, truncate_with_ellipsis};
use crate::boxd::warn::{self, WarnEvent};
use crate::commands::{CommandReport, ConfigOverrides};
use crate::error::BoxdErrorCode;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub overrides: ConfigOverrides,
    pub dry_run: bool,
}

pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("sync");

    let mut cfg = load_config()?;
    opts.overrides.apply(&mut cfg);
    let sync_cfg = config::sync_config(&cfg)?;
    let source = feed_source(&cfg.feed)?;

    report.detail(format!("vault_dir={}", paths.vault_dir.display()));
    report.detail(format!("feed={source}"));
    report.detail(format!(
        "diary={} sort={} variant={}",
        sync_cfg.merge.diary_path.display(),
        sync_cfg.merge.sort.label(),
        sync_cfg.render.variant.label()
    ));

    let items = match load_feed(&source) {
        Ok(items) => items,
        Err(err) => {
            let err_text = format!("{err:#}");
            warn::emit(&WarnEvent {
                code: BoxdErrorCode::E002FeedUnavailable.as_str(),
                stage: "fetch",
                action: "abort-sync",
                path: &source,
                err: &err_text,
                ..WarnEvent::default()
            });
            if !opts.dry_run {
                audit::append_or_warn(&paths, "sync", "failed", &err_text);
            }
            return Err(err);
        }
    };
    report.detail(format!("items={}", items.len()));

    let lock = if opts.dry_run {
        None
    } else {
        Some(SyncLock::acquire(&paths)?)
    };
    if let Some(lock) = &lock {
        report.detail(format!("lock={}", lock.path().display()));
    }

    let store = FsStore::new(&paths.vault_dir);
    let plan = reconcile(&items, &sync_cfg, &store)?;
    report.detail(format!("records={}", plan.records));
    report.detail(format!("diary_added={}", plan.diary_added));
    for skipped in &plan.skipped {
        report.detail(format!(
            "skipped {}: {}",
            skipped.id,
            truncate_with_ellipsis(&skipped.reason, 120)
        ));
    }
    for issue in &plan.issues {
        report.issue(issue.clone());
    }
    for request in plan.requests() {
        report.detail(format!("{} {}", request.action.label(), request.path.display()));
    }

    if opts.dry_run {
        report.detail("dry-run: no documents written");
        return Ok(report);
    }

    let written = match apply_requests(&store, plan.requests()) {
        Ok(written) => written,
        Err(err) => {
            let err_text = err.to_string();
            warn::emit(&WarnEvent {
                code: BoxdErrorCode::E006WriteFailed.as_str(),
                stage: "apply",
                action: "abort-sync",
                err: &err_text,
                ..WarnEvent::default()
            });
            audit::append_or_warn(&paths, "sync", "failed", &err_text);
            return Err(err.into());
        }
    };
    for path in &written {
        audit::append_event(&paths, "write", "ok", &path.display().to_string())?;
    }
    report.detail(format!("written={}", written.len()));

    let snapshot = BoxdState {
        last_sync_epoch_secs: now_epoch_secs()?,
        last_item_count: items.len(),
        last_written: written.iter().map(|p| p.display().to_string()).collect(),
        diary_sha256: Some(content_hash(&plan.diary.text)),
        ..BoxdState::default()
    };
    let state_file = state::save(&paths, &snapshot)?;
    report.detail(format!("state={}", state_file.display()));

    let status = if report.ok { "ok" } else { "partial" };
    audit::append_event(
        &paths,
        "sync",
        status,
        &format!(
            "items={} diary_added={} written={}",
            items.len(),
            plan.diary_added,
            written.len()
        ),
    )?;

    Ok(report)
}
