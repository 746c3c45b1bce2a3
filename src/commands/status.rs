use anyhow::Result;
use std::env;
use std::fs;

use crate::boxd::config::{self, load_config, resolve_config_path};
use crate::boxd::feed::feed_source;
use crate::boxd::lock;
use crate::boxd::paths::resolve_paths;
use crate::boxd::state::{self, content_hash};
use crate::boxd::util::pid_alive;
use crate::commands::CommandReport;
use crate::error::BoxdErrorCode;

include!(concat!(env!("OUT_DIR"), "/boxd_env_allowlist.rs"));

/// `BOXD_*` variables set in the environment that no code path reads.
pub fn unknown_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut unknown: Vec<String> = keys
        .into_iter()
        .filter(|key| key.starts_with("BOXD_"))
        .filter(|key| !GENERATED_BOXD_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect();
    unknown.sort();
    unknown
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("boxd_home={}", paths.boxd_home.display()));
    report.detail(format!("vault_dir={}", paths.vault_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config={}", path.display())),
        Some(path) => report.detail(format!("config={} (not found, using defaults)", path.display())),
        None => report.detail("config=unresolved (using defaults)"),
    }

    if !paths.vault_dir.exists() {
        report.issue(format!("vault dir missing ({})", paths.vault_dir.display()));
    }

    let cfg = match load_config().and_then(|cfg| Ok((config::sync_config(&cfg)?, cfg))) {
        Ok(pair) => Some(pair),
        Err(err) => {
            report.issue(format!("{}: {err:#}", BoxdErrorCode::E005ConfigInvalid.as_str()));
            None
        }
    };

    let saved = state::load(&paths)?;
    if saved.last_sync_epoch_secs == 0 {
        report.detail("last_sync=never");
    } else {
        report.detail(format!("last_sync_epoch_secs={}", saved.last_sync_epoch_secs));
        report.detail(format!("last_item_count={}", saved.last_item_count));
        report.detail(format!("last_written={}", saved.last_written.len()));
    }

    if let Some((sync_cfg, cfg)) = &cfg {
        match feed_source(&cfg.feed) {
            Ok(source) => report.detail(format!("feed={source}")),
            Err(_) => report.detail("feed=unset"),
        }
        report.detail(format!(
            "diary={} sort={} variant={} stars={}",
            sync_cfg.merge.diary_path.display(),
            sync_cfg.merge.sort.label(),
            sync_cfg.render.variant.label(),
            sync_cfg.render.stars.label()
        ));
        match &sync_cfg.merge.notes_folder {
            Some(folder) => report.detail(format!("notes=enabled folder={}", folder.display())),
            None => report.detail("notes=disabled"),
        }

        let diary = paths.vault_dir.join(&sync_cfg.merge.diary_path);
        let drift = match (fs::read_to_string(&diary), &saved.diary_sha256) {
            (Err(_), _) => "missing",
            (Ok(_), None) => "unknown",
            (Ok(text), Some(hash)) if content_hash(&text) == *hash => "none",
            (Ok(_), Some(_)) => "edited-since-last-sync",
        };
        report.detail(format!("diary.drift={drift}"));
    }

    match lock::read_holder(&paths) {
        Ok(None) => report.detail("lock=free"),
        Ok(Some(holder)) => {
            let alive = pid_alive(holder.pid);
            report.detail(format!(
                "lock=held pid={} since={} alive={alive}",
                holder.pid, holder.start_time
            ));
            if holder.build_uuid != env!("BUILD_UUID") {
                report.detail(format!("lock.build_mismatch={}", holder.build_uuid));
            }
        }
        Err(err) => report.issue(format!("lock unreadable: {err:#}")),
    }

    for key in unknown_env_keys(env::vars().map(|(key, _)| key)) {
        report.issue(format!("env.unknown={key} (not read by this build)"));
    }

    Ok(report)
}
