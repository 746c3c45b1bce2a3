use crate::boxd::feed::{RawFeedItem, value_text};
use crate::error::SyncError;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

/// Paragraph text the site injects for plain diary entries without a review.
const WATCHED_NOTICE: &str = "Watched on";

const ENTITIES: [(&str, &str); 9] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#039;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
    ("&#8217;", "'"),
    ("\u{2019}", "'"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub source_url: String,
    pub watched_date: Option<NaiveDate>,
    pub fallback_date: NaiveDate,
    pub rating: Option<f32>,
    pub is_rewatch: bool,
    pub review: Option<String>,
    pub poster_url: Option<String>,
}

impl ActivityRecord {
    /// Date the record sorts by: the watch date when known, else the publish date.
    pub fn effective_date(&self) -> NaiveDate {
        self.watched_date.unwrap_or(self.fallback_date)
    }
}

pub fn decode_entities(input: &str) -> String {
    let mut out = input.to_string();
    for (entity, plain) in ENTITIES {
        out = out.replace(entity, plain);
    }
    // last, so `&amp;lt;` stays `&lt;`
    out.replace("&amp;", "&")
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=");
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let quote = rest.chars().next()?;
    if quote == '"' || quote == '\'' {
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        Some(&inner[..end])
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        Some(&rest[..end])
    }
}

/// Source of the first `<img>` tag in the markup.
pub fn first_image_src(markup: &str) -> Option<String> {
    let start = markup.find("<img")?;
    let rest = &markup[start..];
    let end = rest.find('>').unwrap_or(rest.len());
    attribute_value(&rest[..end], "src")
        .map(decode_entities)
        .filter(|src| !src.trim().is_empty())
}

/// Contents of each `<p>` block, tag-stripped and entity-decoded.
/// Markup with no paragraph tags is treated as one block.
pub fn paragraph_blocks(markup: &str) -> Vec<String> {
    let mut raw_blocks = Vec::new();
    let mut cursor = markup;
    while let Some(open) = cursor.find("<p") {
        let after_open = &cursor[open..];
        let Some(tag_end) = after_open.find('>') else {
            break;
        };
        // `<pre>`, `<param>` and friends are not paragraphs
        let tag_name = &after_open[2..tag_end];
        if !(tag_name.is_empty() || tag_name.starts_with(char::is_whitespace)) {
            cursor = &after_open[2..];
            continue;
        }
        let content = &after_open[tag_end + 1..];
        let close = content.find("</p>").unwrap_or(content.len());
        raw_blocks.push(&content[..close]);
        cursor = &content[close..];
    }
    if raw_blocks.is_empty() {
        raw_blocks.push(markup);
    }

    raw_blocks
        .into_iter()
        .map(|block| {
            let with_breaks = block
                .replace("<br />", "\n")
                .replace("<br/>", "\n")
                .replace("<br>", "\n");
            decode_entities(strip_tags(&with_breaks).trim())
        })
        .filter(|block| !block.trim().is_empty())
        .collect()
}

pub fn extract_review(markup: &str) -> Option<String> {
    let blocks = paragraph_blocks(markup);
    if blocks.is_empty() || blocks.iter().any(|b| b.contains(WATCHED_NOTICE)) {
        return None;
    }
    Some(blocks.join("\n\n"))
}

/// Round to the nearest half point and clamp into the 0..=5 scale.
pub fn round_rating(raw: f32) -> f32 {
    ((raw * 2.0).round() / 2.0).clamp(0.0, 5.0)
}

fn parse_rewatch(item: &RawFeedItem) -> bool {
    item.rewatch
        .as_ref()
        .and_then(value_text)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "yes" | "true" | "1"))
        .unwrap_or(false)
}

fn parse_fallback_date(raw: &str, tz: Tz) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.with_timezone(&tz).date_naive());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&tz).date_naive());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

pub fn normalize(item: &RawFeedItem, tz: Tz) -> Result<ActivityRecord, SyncError> {
    let id = if item.guid.trim().is_empty() {
        item.link.trim().to_string()
    } else {
        item.guid.trim().to_string()
    };
    let label = if id.is_empty() { item.title.trim() } else { id.as_str() };

    let title = item
        .film_title
        .as_deref()
        .map(decode_entities)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::validation(label, "missing film title"))?;
    let year = item
        .film_year
        .as_ref()
        .and_then(value_text)
        .ok_or_else(|| SyncError::validation(label, "missing film year"))?;
    let year = year
        .parse::<i32>()
        .map_err(|_| SyncError::validation(label, format!("film year `{year}` is not a number")))?;
    let fallback_date = parse_fallback_date(&item.pub_date, tz).ok_or_else(|| {
        SyncError::validation(label, format!("publish date `{}` unparseable", item.pub_date))
    })?;

    let watched_date = item
        .watched_date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok());
    let rating = item
        .member_rating
        .as_ref()
        .and_then(value_text)
        .and_then(|raw| raw.parse::<f32>().ok())
        .filter(|r| r.is_finite())
        .map(round_rating);

    Ok(ActivityRecord {
        id,
        title,
        year,
        source_url: item.link.trim().to_string(),
        watched_date,
        fallback_date,
        rating,
        is_rewatch: parse_rewatch(item),
        review: extract_review(&item.description),
        poster_url: first_image_src(&item.description),
    })
}
