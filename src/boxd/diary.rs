use crate::boxd::document::{MergeOutcome, WriteAction};
use crate::boxd::frontmatter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Where new diary entries go relative to the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Oldest first: new entries are appended.
    #[default]
    Old,
    /// Newest first: new entries are prepended.
    New,
}

impl SortMode {
    pub fn label(self) -> &'static str {
        match self {
            SortMode::Old => "old",
            SortMode::New => "new",
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "old" | "asc" | "oldest" => Ok(SortMode::Old),
            "new" | "desc" | "newest" => Ok(SortMode::New),
            other => Err(format!("unknown sort `{other}`; use old or new")),
        }
    }
}

/// An entry is present when its lines occur contiguously in the body.
/// Single-line entries reduce to a set lookup.
fn contains_entry(body_lines: &[&str], seen: &HashSet<&str>, entry: &str) -> bool {
    let entry_lines: Vec<&str> = entry.lines().collect();
    let Some(first) = entry_lines.first() else {
        return true;
    };
    if !seen.contains(*first) {
        return false;
    }
    if entry_lines.len() == 1 {
        return true;
    }
    body_lines
        .windows(entry_lines.len())
        .any(|window| window == entry_lines.as_slice())
}

fn fresh_entries<'e>(body: &str, entries: &'e [String]) -> Vec<&'e str> {
    let body_lines: Vec<&str> = body.lines().collect();
    let seen: HashSet<&str> = body_lines.iter().copied().collect();
    let mut batch: HashSet<&str> = HashSet::new();

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.trim_end_matches(['\n', '\r']);
        if entry.trim().is_empty() || contains_entry(&body_lines, &seen, entry) {
            continue;
        }
        if batch.insert(entry) {
            out.push(entry);
        }
    }
    out
}

/// Merge rendered entries into the diary text.
///
/// `entries` must already be in display order for `sort`. Dedup is by
/// exact line content, so two records that render identically collapse
/// into one entry.
pub fn merge_diary(
    existing: Option<&str>,
    entries: &[String],
    sort: SortMode,
    separator: &str,
) -> MergeOutcome {
    let Some(existing) = existing else {
        let fresh = fresh_entries("", entries);
        let mut text = fresh.join(separator);
        if !text.is_empty() {
            text.push('\n');
        }
        return MergeOutcome {
            action: WriteAction::Create,
            text,
            added: fresh.len(),
        };
    };

    let doc = frontmatter::split(existing);
    let fresh = fresh_entries(doc.body, entries);
    if fresh.is_empty() {
        return MergeOutcome::unchanged(existing);
    }

    let block = fresh.join(separator);
    let merged_body = match sort {
        SortMode::Old => {
            let kept = doc.body.trim_end_matches(['\n', '\r']);
            if kept.trim().is_empty() {
                format!("{block}\n")
            } else {
                format!("{kept}{separator}{block}\n")
            }
        }
        SortMode::New => {
            // blank lines between the frontmatter and the first entry stay put
            let kept = doc.body.trim_start_matches(['\n', '\r']);
            let leading = &doc.body[..doc.body.len() - kept.len()];
            if kept.trim().is_empty() {
                format!("{leading}{block}\n")
            } else if kept.ends_with('\n') {
                format!("{leading}{block}{separator}{kept}")
            } else {
                format!("{leading}{block}{separator}{kept}\n")
            }
        }
    };

    let head = match &doc.frontmatter {
        Some(fm) => frontmatter::serialize(fm),
        None => doc.head.to_string(),
    };

    MergeOutcome {
        action: WriteAction::Replace,
        text: format!("{head}{merged_body}"),
        added: fresh.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_diary_is_created_from_new_entries() {
        let out = merge_diary(
            None,
            &lines(&["- Watched [Title](url)  on [[2024-01-05]]"]),
            SortMode::Old,
            "\n",
        );
        assert_eq!(out.action, WriteAction::Create);
        assert_eq!(out.text, "- Watched [Title](url)  on [[2024-01-05]]\n");
    }

    #[test]
    fn existing_lines_are_not_duplicated() {
        let existing = "- Watched A on 2024-01-01\n- Watched B on 2024-01-02\n";
        let out = merge_diary(
            Some(existing),
            &lines(&["- Watched B on 2024-01-02", "- Watched C on 2024-01-03"]),
            SortMode::Old,
            "\n",
        );
        assert_eq!(out.action, WriteAction::Replace);
        assert_eq!(out.added, 1);
        assert_eq!(
            out.text,
            "- Watched A on 2024-01-01\n- Watched B on 2024-01-02\n- Watched C on 2024-01-03\n"
        );
    }

    #[test]
    fn new_sort_prepends_batch_in_given_order() {
        let existing = "- Watched A on 2024-01-01\n";
        let out = merge_diary(
            Some(existing),
            &lines(&["- Watched C on 2024-01-03", "- Watched B on 2024-01-02"]),
            SortMode::New,
            "\n",
        );
        assert_eq!(
            out.text,
            "- Watched C on 2024-01-03\n- Watched B on 2024-01-02\n- Watched A on 2024-01-01\n"
        );
    }

    #[test]
    fn second_merge_is_a_byte_identical_no_op() {
        let batch = lines(&["- Watched A on 2024-01-01", "- Watched B on 2024-01-02"]);
        let first = merge_diary(Some("---\ntags: [] \n---\n"), &batch, SortMode::Old, "\n");
        let second = merge_diary(Some(&first.text), &batch, SortMode::Old, "\n");
        assert_eq!(second.action, WriteAction::Unchanged);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn frontmatter_is_reserialized_ahead_of_body() {
        let existing = "---\ntitle: Diary\ntags:\n  - films\n---\n# Log\n- Watched A on 2024-01-01\n";
        let out = merge_diary(
            Some(existing),
            &lines(&["- Watched B on 2024-01-02"]),
            SortMode::New,
            "\n",
        );
        assert_eq!(
            out.text,
            "---\ntitle: Diary\ntags:\n  - films\n---\n- Watched B on 2024-01-02\n# Log\n- Watched A on 2024-01-01\n"
        );
    }

    #[test]
    fn new_sort_keeps_blank_line_after_frontmatter() {
        let existing = "---\ntitle: D\n---\n\n- Watched A on 2024-01-01\n";
        let batch = lines(&["- Watched B on 2024-01-02"]);
        let first = merge_diary(Some(existing), &batch, SortMode::New, "\n");
        assert_eq!(
            first.text,
            "---\ntitle: D\n---\n\n- Watched B on 2024-01-02\n- Watched A on 2024-01-01\n"
        );
        let again = merge_diary(Some(&first.text), &batch, SortMode::New, "\n");
        assert_eq!(again.action, WriteAction::Unchanged);
    }

    #[test]
    fn frontmatter_lines_never_count_as_existing_entries() {
        let existing = "---\nnote: - Watched A on 2024-01-01\n---\n";
        let out = merge_diary(
            Some(existing),
            &lines(&["note: - Watched A on 2024-01-01"]),
            SortMode::Old,
            "\n",
        );
        assert_eq!(out.added, 1);
    }

    #[test]
    fn multi_line_callouts_dedup_as_blocks() {
        let a = "> [!review] Review: Watched [A](a) ★★ on 2024-01-01\n> Fine.".to_string();
        let b = "> [!review] Review: Watched [B](b) ★★ on 2024-01-02\n> Fine.".to_string();
        let first = merge_diary(None, &[a.clone()], SortMode::Old, "\n\n");
        let second = merge_diary(Some(&first.text), &[a.clone(), b.clone()], SortMode::Old, "\n\n");
        assert_eq!(second.added, 1);
        assert_eq!(second.text, format!("{a}\n\n{b}\n"));
        assert_eq!(second.text.matches("> Fine.").count(), 2);
    }

    #[test]
    fn identical_entries_within_batch_collapse() {
        let out = merge_diary(
            Some(""),
            &lines(&["- Watched A on 2024-01-01", "- Watched A on 2024-01-01"]),
            SortMode::Old,
            "\n",
        );
        assert_eq!(out.added, 1);
        assert_eq!(out.text, "- Watched A on 2024-01-01\n");
    }
}
