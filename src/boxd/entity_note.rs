use crate::boxd::document::{MergeOutcome, WriteAction, collapse_blank_runs};
use crate::boxd::frontmatter::{self, Frontmatter};
use crate::boxd::normalize::ActivityRecord;

pub const MANAGED_HEADING: &str = "## Letterboxd";
const REVIEW_HEADING: &str = "### Review";
const ACTIVITY_HEADING: &str = "### Activity";

/// Characters that break file names or wikilinks.
const UNSAFE_NAME_CHARS: &[char] = &[
    '\\', '/', ':', '*', '?', '"', '<', '>', '|', '#', '^', '[', ']',
];

/// Frontmatter for a film note created from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSeed {
    pub title: String,
    pub url: String,
    pub year: i32,
    pub score: Option<f32>,
}

impl NoteSeed {
    pub fn from_record(record: &ActivityRecord) -> Self {
        Self {
            title: record.title.clone(),
            url: record.source_url.clone(),
            year: record.year,
            score: record.rating,
        }
    }

    fn frontmatter(&self) -> Frontmatter {
        let mut fm = Frontmatter::new();
        fm.insert_scalar("title", self.title.as_str());
        fm.insert_scalar("url", self.url.as_str());
        fm.insert_scalar("year", self.year.to_string());
        if let Some(score) = self.score {
            fm.insert_scalar("score", score.to_string());
        }
        fm
    }
}

/// File stem shared by the note's file name and the wikilinks pointing at it.
pub fn note_stem(title: &str, year: i32) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if UNSAFE_NAME_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let name = collapsed.trim_matches('.');
    if name.is_empty() {
        format!("Untitled ({year})")
    } else {
        format!("{name} ({year})")
    }
}

pub fn note_link(title: &str, year: i32) -> String {
    format!("[[{}]]", note_stem(title, year))
}

fn is_section_boundary(line: &str) -> bool {
    let line = line.trim_end();
    line == "#" || line == "##" || line.starts_with("# ") || line.starts_with("## ")
}

/// ATX heading: one to six `#` followed by a space or the end of the line.
fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes)
        && trimmed[hashes..]
            .chars()
            .next()
            .is_none_or(|c| c == ' ' || c == '\t')
}

/// Review lines that would read back as headings get a leading `\`.
fn escape_review_line(line: &str) -> String {
    let body = line.trim_start();
    if is_heading(body) || body.starts_with("\\#") {
        let indent = &line[..line.len() - body.len()];
        format!("{indent}\\{body}")
    } else {
        line.to_string()
    }
}

fn unescape_review_line(line: &str) -> String {
    let body = line.trim_start();
    match body.strip_prefix('\\') {
        Some(rest) if rest.starts_with('#') => {
            format!("{}{rest}", &line[..line.len() - body.len()])
        }
        _ => line.to_string(),
    }
}

fn subsection_lines<'a>(section: &[&'a str], heading: &str) -> Option<Vec<&'a str>> {
    let start = section.iter().position(|l| l.trim_end() == heading)?;
    Some(
        section[start + 1..]
            .iter()
            .take_while(|l| !is_heading(l))
            .copied()
            .collect(),
    )
}

fn existing_activity(section: &[&str]) -> Vec<String> {
    subsection_lines(section, ACTIVITY_HEADING)
        .unwrap_or_default()
        .into_iter()
        .map(str::trim)
        .filter(|l| l.starts_with("- "))
        .map(ToOwned::to_owned)
        .collect()
}

fn existing_review(section: &[&str]) -> Option<String> {
    let lines = subsection_lines(section, REVIEW_HEADING)?;
    let first = lines.iter().position(|l| !l.trim().is_empty())?;
    let last = lines.iter().rposition(|l| !l.trim().is_empty())?;
    Some(
        lines[first..=last]
            .iter()
            .map(|l| unescape_review_line(l.trim_end()))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn build_section(review: Option<&str>, activity: &[String]) -> String {
    let mut out = format!("{MANAGED_HEADING}\n\n");
    if let Some(review) = review.map(str::trim).filter(|r| !r.is_empty()) {
        out.push_str(REVIEW_HEADING);
        out.push('\n');
        for line in review.lines() {
            out.push_str(&escape_review_line(line.trim_end()));
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(ACTIVITY_HEADING);
    out.push('\n');
    for line in activity {
        out.push_str(line);
        out.push('\n');
    }
    out
}

struct Span<'a> {
    start: usize,
    text: &'a str,
}

fn line_spans(text: &str) -> Vec<Span<'_>> {
    let mut offset = 0usize;
    text.split_inclusive('\n')
        .map(|raw| {
            let span = Span {
                start: offset,
                text: raw.trim_end_matches(['\n', '\r']),
            };
            offset += raw.len();
            span
        })
        .collect()
}

/// Merge one activity line (and optionally a review) into a film note.
///
/// Only the `## Letterboxd` section is rewritten; text before its heading
/// and from the next level-1/level-2 heading onward is returned untouched.
pub fn merge_entity_note(
    existing: Option<&str>,
    activity_line: &str,
    review: Option<&str>,
    seed: &NoteSeed,
) -> MergeOutcome {
    let activity_line = activity_line.trim();

    let Some(existing) = existing else {
        let text = format!(
            "{}\n{}",
            frontmatter::serialize(&seed.frontmatter()),
            build_section(review, &[activity_line.to_string()])
        );
        return MergeOutcome {
            action: WriteAction::Create,
            text,
            added: 1,
        };
    };

    let body_offset = frontmatter::split(existing).head.len();
    let spans = line_spans(&existing[body_offset..]);
    let heading = spans
        .iter()
        .position(|span| span.text.trim_end() == MANAGED_HEADING);

    let Some(heading) = heading else {
        let mut text = existing.to_string();
        if !text.is_empty() {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            if !text.ends_with("\n\n") {
                text.push('\n');
            }
        }
        text.push_str(&build_section(review, &[activity_line.to_string()]));
        return MergeOutcome {
            action: WriteAction::Replace,
            text,
            added: 1,
        };
    };

    let end = spans[heading + 1..]
        .iter()
        .position(|span| is_section_boundary(span.text))
        .map(|idx| heading + 1 + idx)
        .unwrap_or(spans.len());
    let section_start = body_offset + spans[heading].start;
    let section_end = spans
        .get(end)
        .map(|span| body_offset + span.start)
        .unwrap_or(existing.len());
    let prefix = &existing[..section_start];
    let suffix = &existing[section_end..];

    let section: Vec<&str> = spans[heading + 1..end].iter().map(|s| s.text).collect();
    let mut activity = existing_activity(&section);
    let mut added = 0usize;
    if !activity.iter().any(|line| line == activity_line) {
        activity.push(activity_line.to_string());
        added = 1;
    }
    let review = match review {
        Some(fresh) => Some(fresh.to_string()),
        None => existing_review(&section),
    };

    let mut rebuilt = build_section(review.as_deref(), &activity);
    if !suffix.is_empty() {
        rebuilt.push('\n');
    }
    let text = format!("{prefix}{}{suffix}", collapse_blank_runs(&rebuilt));
    if text == existing {
        return MergeOutcome::unchanged(existing);
    }
    MergeOutcome {
        action: WriteAction::Replace,
        text,
        added,
    }
}
