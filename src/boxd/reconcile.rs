use crate::boxd::diary::{SortMode, merge_diary};
use crate::boxd::document::WriteAction;
use crate::boxd::entity_note::{NoteSeed, merge_entity_note, note_link, note_stem};
use crate::boxd::feed::RawFeedItem;
use crate::boxd::normalize::{ActivityRecord, normalize};
use crate::boxd::render::{RenderConfig, render_activity_line, render_entry};
use crate::boxd::store::{DocumentReader, WriteRequest};
use crate::boxd::warn::{self, WarnEvent};
use crate::error::{BoxdErrorCode, SyncError};
use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    pub sort: SortMode,
    /// Vault-relative path of the diary document.
    pub diary_path: PathBuf,
    /// Vault-relative folder for film notes; `None` disables them.
    pub notes_folder: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub render: RenderConfig,
    pub merge: MergeConfig,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub diary: WriteRequest,
    pub notes: Vec<WriteRequest>,
    pub diary_added: usize,
    pub records: usize,
    pub skipped: Vec<SkippedItem>,
    pub issues: Vec<String>,
}

impl SyncPlan {
    /// Every request in the order it must be applied: notes first, diary last.
    pub fn requests(&self) -> impl Iterator<Item = &WriteRequest> {
        self.notes.iter().chain(std::iter::once(&self.diary))
    }
}

pub fn normalize_all(items: &[RawFeedItem], tz: Tz) -> (Vec<ActivityRecord>, Vec<SkippedItem>) {
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    for item in items {
        match normalize(item, tz) {
            Ok(record) => records.push(record),
            Err(SyncError::Validation { id, reason }) => {
                warn::emit(&WarnEvent {
                    code: BoxdErrorCode::E003ItemRejected.as_str(),
                    stage: "normalize",
                    action: "skip-item",
                    item: &id,
                    reason: &reason,
                    ..WarnEvent::default()
                });
                skipped.push(SkippedItem { id, reason });
            }
            Err(other) => skipped.push(SkippedItem {
                id: item.guid.clone(),
                reason: other.to_string(),
            }),
        }
    }
    (records, skipped)
}

/// Stable sort into display order: ascending dates for `Old`, descending for `New`.
pub fn order_records(records: &mut [ActivityRecord], sort: SortMode) {
    match sort {
        SortMode::Old => records.sort_by_key(|r| r.effective_date()),
        SortMode::New => records.sort_by(|a, b| b.effective_date().cmp(&a.effective_date())),
    }
}

/// Outcome of the film-note pass: one request per note path plus the
/// backlink for every record whose note merge succeeded.
#[derive(Debug, Default)]
pub struct NotePass {
    pub requests: Vec<WriteRequest>,
    pub backlinks: Vec<Option<String>>,
    pub issues: Vec<String>,
}

/// Merge each record into its film note, in order. Several records for the
/// same film merge into one pending text, so a rewatch in the same batch
/// sees the note created by the earlier watch.
pub fn merge_entity_notes(
    records: &[ActivityRecord],
    render: &RenderConfig,
    folder: &std::path::Path,
    reader: &dyn DocumentReader,
) -> NotePass {
    let mut pass = NotePass::default();
    let mut pending: BTreeMap<PathBuf, usize> = BTreeMap::new();

    for record in records {
        let path = folder.join(format!("{}.md", note_stem(&record.title, record.year)));
        let existing = match pending.get(&path) {
            Some(&idx) => Some(pass.requests[idx].text.clone()),
            None => match reader.read(&path) {
                Ok(text) => text,
                Err(err) => {
                    let err_text = format!("{err:#}");
                    warn::emit(&WarnEvent {
                        code: BoxdErrorCode::E004NoteUnreadable.as_str(),
                        stage: "entity-note",
                        action: "keep-external-link",
                        item: &record.id,
                        path: &path.display().to_string(),
                        err: &err_text,
                        ..WarnEvent::default()
                    });
                    pass.issues.push(format!(
                        "note {} unreadable, {} keeps its external link: {err_text}",
                        path.display(),
                        record.id
                    ));
                    pass.backlinks.push(None);
                    continue;
                }
            },
        };

        let outcome = merge_entity_note(
            existing.as_deref(),
            &render_activity_line(record, render),
            record.review.as_deref(),
            &NoteSeed::from_record(record),
        );
        match pending.get(&path) {
            Some(&idx) => {
                let slot = &mut pass.requests[idx];
                if outcome.action != WriteAction::Unchanged {
                    slot.text = outcome.text;
                    if slot.action == WriteAction::Unchanged {
                        slot.action = WriteAction::Replace;
                    }
                }
            }
            None => {
                pending.insert(path.clone(), pass.requests.len());
                pass.requests.push(WriteRequest {
                    path,
                    action: outcome.action,
                    text: outcome.text,
                });
            }
        }
        pass.backlinks.push(Some(note_link(&record.title, record.year)));
    }
    pass
}

pub fn render_diary_entries(
    records: &[ActivityRecord],
    render: &RenderConfig,
    backlinks: &[Option<String>],
) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let backlink = backlinks.get(idx).and_then(|b| b.as_deref());
            render_entry(record, render, backlink)
        })
        .collect()
}

/// Plan one sync: normalize, merge film notes, then merge the diary once.
/// Nothing is written; the caller applies `SyncPlan::requests` in order.
pub fn reconcile(
    items: &[RawFeedItem],
    cfg: &SyncConfig,
    reader: &dyn DocumentReader,
) -> Result<SyncPlan> {
    let (mut records, skipped) = normalize_all(items, cfg.timezone);
    order_records(&mut records, cfg.merge.sort);

    // film notes must be merged before rendering: a diary entry only links
    // to its note once that note's merge went through
    let notes = match &cfg.merge.notes_folder {
        Some(folder) => merge_entity_notes(&records, &cfg.render, folder, reader),
        None => NotePass::default(),
    };

    let entries = render_diary_entries(&records, &cfg.render, &notes.backlinks);
    let existing = reader
        .read(&cfg.merge.diary_path)
        .with_context(|| format!("failed to read diary {}", cfg.merge.diary_path.display()))?;
    let outcome = merge_diary(
        existing.as_deref(),
        &entries,
        cfg.merge.sort,
        cfg.render.variant.entry_separator(),
    );

    Ok(SyncPlan {
        diary: WriteRequest {
            path: cfg.merge.diary_path.clone(),
            action: outcome.action,
            text: outcome.text,
        },
        notes: notes.requests,
        diary_added: outcome.added,
        records: records.len(),
        skipped,
        issues: notes.issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxd::render::Variant;
    use crate::boxd::store::MemoryStore;
    use serde_json::json;
    use std::path::Path;

    fn raw(guid: &str, film: &str, year: i64, watched: Option<&str>, pub_date: &str) -> RawFeedItem {
        RawFeedItem {
            title: format!("{film}, {year}"),
            link: format!("https://letterboxd.com/u/film/{}/", film.to_lowercase()),
            guid: guid.to_string(),
            pub_date: pub_date.to_string(),
            watched_date: watched.map(str::to_string),
            rewatch: Some(json!("No")),
            film_title: Some(film.to_string()),
            film_year: Some(json!(year)),
            member_rating: None,
            description: "<p>Watched on Friday.</p>".to_string(),
        }
    }

    fn config(sort: SortMode, notes: bool) -> SyncConfig {
        SyncConfig {
            render: RenderConfig::default(),
            merge: MergeConfig {
                sort,
                diary_path: PathBuf::from("Diary.md"),
                notes_folder: notes.then(|| PathBuf::from("Films")),
            },
            timezone: Tz::UTC,
        }
    }

    fn feed() -> Vec<RawFeedItem> {
        // feeds arrive newest first
        vec![
            raw("letterboxd-watch-3", "Alien", 1979, Some("2024-01-03"), "Wed, 3 Jan 2024 20:00:00 +0000"),
            raw("letterboxd-watch-2", "Heat", 1995, None, "Tue, 2 Jan 2024 20:00:00 +0000"),
            raw("letterboxd-watch-1", "Ran", 1985, Some("2024-01-01"), "Mon, 1 Jan 2024 20:00:00 +0000"),
        ]
    }

    #[test]
    fn empty_diary_single_record_renders_one_bullet() {
        let mut item = raw(
            "letterboxd-watch-9",
            "Title",
            2023,
            Some("2024-01-05"),
            "Fri, 5 Jan 2024 10:00:00 +0000",
        );
        item.link = "url".to_string();
        let items = vec![item];
        let plan = reconcile(&items, &config(SortMode::Old, false), &MemoryStore::default())
            .expect("plan");
        assert_eq!(plan.diary.action, WriteAction::Create);
        assert_eq!(plan.diary.text, "- Watched [Title](url)  on [[2024-01-05]]\n");
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn old_sort_appends_in_ascending_date_order() {
        let plan = reconcile(&feed(), &config(SortMode::Old, false), &MemoryStore::default())
            .expect("plan");
        let lines: Vec<&str> = plan.diary.text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[Ran]"));
        assert!(lines[1].starts_with("- Marked as watched [Heat]"));
        assert!(lines[2].contains("[Alien]"));
    }

    #[test]
    fn new_sort_prepends_in_descending_date_order() {
        let store = MemoryStore::default().with("Diary.md", "- older entry\n");
        let plan = reconcile(&feed(), &config(SortMode::New, false), &store).expect("plan");
        let lines: Vec<&str> = plan.diary.text.lines().collect();
        assert!(lines[0].contains("[Alien]"));
        assert!(lines[2].contains("[Ran]"));
        assert_eq!(lines[3], "- older entry");
    }

    #[test]
    fn second_reconcile_over_applied_plan_is_a_no_op() {
        let cfg = config(SortMode::Old, true);
        let mut store = MemoryStore::default();
        let first = reconcile(&feed(), &cfg, &store).expect("first plan");
        for request in first.requests() {
            store.apply(request);
        }

        let second = reconcile(&feed(), &cfg, &store).expect("second plan");
        assert!(second.requests().all(|r| r.action == WriteAction::Unchanged));
        assert_eq!(second.diary.text, first.diary.text);
        assert_eq!(second.diary_added, 0);
    }

    #[test]
    fn entity_notes_replace_external_links_in_diary() {
        let plan = reconcile(&feed(), &config(SortMode::Old, true), &MemoryStore::default())
            .expect("plan");
        assert_eq!(plan.notes.len(), 3);
        assert!(plan.notes.iter().all(|n| n.action == WriteAction::Create));
        assert!(plan.diary.text.contains("- Watched [[Alien (1979)]]  on [[2024-01-03]]"));
        assert!(!plan.diary.text.contains("https://"));
        assert_eq!(plan.notes[0].path, Path::new("Films/Ran (1985).md"));
    }

    #[test]
    fn unreadable_note_keeps_external_link_for_that_record_only() {
        let mut store = MemoryStore::default();
        store.unreadable.insert(PathBuf::from("Films/Heat (1995).md"));
        let plan = reconcile(&feed(), &config(SortMode::Old, true), &store).expect("plan");
        assert_eq!(plan.notes.len(), 2);
        assert_eq!(plan.issues.len(), 1);
        assert!(plan.diary.text.contains("[Heat](https://letterboxd.com/u/film/heat/)"));
        assert!(plan.diary.text.contains("[[Ran (1985)]]"));
    }

    #[test]
    fn rewatches_in_one_batch_share_a_single_note_request() {
        let mut items = feed();
        let mut again = raw(
            "letterboxd-watch-4",
            "Ran",
            1985,
            Some("2024-01-04"),
            "Thu, 4 Jan 2024 20:00:00 +0000",
        );
        again.rewatch = Some(json!("Yes"));
        items.insert(0, again);

        let plan = reconcile(&items, &config(SortMode::Old, true), &MemoryStore::default())
            .expect("plan");
        let ran: Vec<&WriteRequest> = plan
            .notes
            .iter()
            .filter(|n| n.path == Path::new("Films/Ran (1985).md"))
            .collect();
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].action, WriteAction::Create);
        assert!(ran[0].text.contains("- Watched on [[2024-01-01]]\n- Rewatched on [[2024-01-04]]\n"));
    }

    #[test]
    fn invalid_items_are_skipped_without_failing_the_batch() {
        let mut items = feed();
        items[1].film_year = None;
        let plan = reconcile(&items, &config(SortMode::Old, false), &MemoryStore::default())
            .expect("plan");
        assert_eq!(plan.records, 2);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].id, "letterboxd-watch-2");
        assert_eq!(plan.diary.text.lines().count(), 2);
    }

    fn reviewed_feed() -> Vec<RawFeedItem> {
        let mut items = feed();
        items[0].description = "<p><img src=\"https://a.ltrbxd.com/alien.jpg\"/></p><p>Loved it.</p><p># 10/10</p><p>#1 of the year.</p>".to_string();
        items[0].member_rating = Some(json!("4.5"));
        items[2].description = "<p>Slow &amp; grand.</p>".to_string();
        items
    }

    /// Apply each plan to the store and return the stored documents after every run.
    fn run_repeatedly(
        items: &[RawFeedItem],
        cfg: &SyncConfig,
        runs: usize,
    ) -> Vec<BTreeMap<PathBuf, String>> {
        let mut store = MemoryStore::default();
        let mut snapshots = Vec::new();
        for run in 0..runs {
            let plan = reconcile(items, cfg, &store).expect("plan");
            if run > 0 {
                assert!(
                    plan.requests().all(|r| r.action == WriteAction::Unchanged),
                    "run {run} wanted to write"
                );
                assert_eq!(plan.diary_added, 0);
            }
            for request in plan.requests() {
                store.apply(request);
            }
            snapshots.push(store.docs.clone());
        }
        snapshots
    }

    #[test]
    fn new_sort_reconcile_twice_is_a_no_op() {
        let cfg = config(SortMode::New, true);
        let mut store =
            MemoryStore::default().with("Diary.md", "---\ntitle: Diary\n---\n\n- older entry\n");
        let first = reconcile(&feed(), &cfg, &store).expect("first plan");
        for request in first.requests() {
            store.apply(request);
        }
        assert!(first.diary.text.starts_with("---\ntitle: Diary\n---\n\n- Watched [[Alien (1979)]]"));

        let second = reconcile(&feed(), &cfg, &store).expect("second plan");
        assert!(second.requests().all(|r| r.action == WriteAction::Unchanged));
        assert_eq!(second.diary.text, first.diary.text);
        assert_eq!(second.diary_added, 0);
    }

    #[test]
    fn list_review_entries_and_notes_are_stable_across_runs() {
        let mut cfg = config(SortMode::Old, true);
        cfg.render.variant = Variant::ListReview;
        let snapshots = run_repeatedly(&reviewed_feed(), &cfg, 3);
        assert_eq!(snapshots[0], snapshots[2]);

        let diary = &snapshots[2][Path::new("Diary.md")];
        assert_eq!(diary.matches("    > Loved it.").count(), 1);
        assert_eq!(diary.matches("    > # 10/10").count(), 1);

        let note = &snapshots[2][Path::new("Films/Alien (1979).md")];
        assert!(note.contains("### Review\nLoved it.\n\n\\# 10/10\n\n#1 of the year.\n\n### Activity"));
        assert_eq!(note.matches("## Letterboxd").count(), 1);
    }

    #[test]
    fn callout_poster_entries_are_stable_across_runs() {
        let mut cfg = config(SortMode::New, true);
        cfg.render.variant = Variant::CalloutPoster;
        cfg.render.reference_id = true;
        let snapshots = run_repeatedly(&reviewed_feed(), &cfg, 3);
        assert_eq!(snapshots[0], snapshots[2]);

        let diary = &snapshots[2][Path::new("Diary.md")];
        assert_eq!(diary.matches("> ![200](https://a.ltrbxd.com/alien.jpg)").count(), 1);
        assert_eq!(diary.matches("> [!review] Review:").count(), 2);
        assert_eq!(diary.matches("> [!watched] Watched:").count(), 1);
    }

    #[test]
    fn callout_variant_separates_entries_with_blank_lines() {
        let mut cfg = config(SortMode::Old, false);
        cfg.render.variant = Variant::Callout;
        let plan = reconcile(&feed(), &cfg, &MemoryStore::default()).expect("plan");
        assert_eq!(plan.diary.text.matches("\n\n").count(), 2);
    }
}
