use crate::boxd::normalize::ActivityRecord;
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

pub const ISO_DATE: &str = "%Y-%m-%d";
const POSTER_WIDTH: u32 = 200;
const REFERENCE_PREFIX: &str = "^letterboxd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    #[default]
    List,
    ListReview,
    Callout,
    CalloutPoster,
}

impl Variant {
    pub fn label(self) -> &'static str {
        match self {
            Variant::List => "list",
            Variant::ListReview => "list-review",
            Variant::Callout => "callout",
            Variant::CalloutPoster => "callout-poster",
        }
    }

    pub fn is_callout(self) -> bool {
        matches!(self, Variant::Callout | Variant::CalloutPoster)
    }

    /// Joiner between rendered entries; callouts need a blank line or they fuse.
    pub fn entry_separator(self) -> &'static str {
        if self.is_callout() { "\n\n" } else { "\n" }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "list" => Ok(Variant::List),
            "list-review" | "listreview" => Ok(Variant::ListReview),
            "callout" => Ok(Variant::Callout),
            "callout-poster" | "calloutposter" => Ok(Variant::CalloutPoster),
            other => Err(format!(
                "unknown variant `{other}`; use list, list-review, callout or callout-poster"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StarStyle {
    Numeric,
    #[default]
    Plain,
    Colored,
}

impl StarStyle {
    pub fn label(self) -> &'static str {
        match self {
            StarStyle::Numeric => "numeric",
            StarStyle::Plain => "plain",
            StarStyle::Colored => "colored",
        }
    }
}

impl FromStr for StarStyle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "numeric" | "number" => Ok(StarStyle::Numeric),
            "plain" | "star" => Ok(StarStyle::Plain),
            "colored" | "coloured" | "emoji" => Ok(StarStyle::Colored),
            other => Err(format!(
                "unknown star style `{other}`; use numeric, plain or colored"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub variant: Variant,
    pub stars: StarStyle,
    pub link_date: bool,
    pub reference_id: bool,
    pub link_date_format: String,
    pub display_date_format: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            variant: Variant::List,
            stars: StarStyle::Plain,
            link_date: true,
            reference_id: false,
            link_date_format: String::new(),
            display_date_format: String::new(),
        }
    }
}

/// Format `date` with a strftime pattern; an empty pattern means ISO.
/// Patterns the date cannot satisfy (time fields, bad specifiers) also fall back to ISO.
pub fn format_date(date: NaiveDate, fmt: &str) -> String {
    if fmt.trim().is_empty() {
        return date.format(ISO_DATE).to_string();
    }
    let mut out = String::new();
    if write!(out, "{}", date.format(fmt)).is_err() {
        return date.format(ISO_DATE).to_string();
    }
    out
}

pub fn is_valid_date_format(fmt: &str) -> bool {
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return false;
    }
    let probe = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    let mut out = String::new();
    write!(out, "{}", probe.format(fmt)).is_ok()
}

struct DatePhrase {
    verb: &'static str,
    date: String,
}

fn date_phrase(record: &ActivityRecord, cfg: &RenderConfig) -> DatePhrase {
    let Some(watched) = record.watched_date else {
        return DatePhrase {
            verb: "Marked as watched",
            date: format_date(record.fallback_date, &cfg.display_date_format),
        };
    };

    let display = format_date(watched, &cfg.display_date_format);
    let date = if cfg.link_date {
        let target = format_date(watched, &cfg.link_date_format);
        if target == display {
            format!("[[{target}]]")
        } else {
            format!("[[{target}|{display}]]")
        }
    } else {
        display
    };
    let verb = if record.is_rewatch {
        "Rewatched"
    } else {
        "Watched"
    };
    DatePhrase { verb, date }
}

pub fn star_phrase(rating: Option<f32>, style: StarStyle) -> String {
    let Some(rating) = rating else {
        return String::new();
    };
    let halves = (rating * 2.0).round().clamp(0.0, 10.0) as usize;
    let glyph = match style {
        StarStyle::Numeric => return format!("({}/5)", halves as f32 / 2.0),
        StarStyle::Plain => "★",
        StarStyle::Colored => "⭐",
    };
    let mut out = glyph.repeat(halves / 2);
    if halves % 2 == 1 {
        out.push('½');
    }
    out
}

fn film_link(record: &ActivityRecord, backlink: Option<&str>) -> String {
    match backlink {
        Some(link) => link.to_string(),
        None => format!("[{}]({})", record.title, record.source_url),
    }
}

fn head_line(record: &ActivityRecord, cfg: &RenderConfig, backlink: Option<&str>) -> String {
    let phrase = date_phrase(record, cfg);
    format!(
        "{} {} {} on {}",
        phrase.verb,
        film_link(record, backlink),
        star_phrase(record.rating, cfg.stars),
        phrase.date
    )
}

/// Third `-` segment of ids like `letterboxd-review-1234`, else the whole id.
pub fn reference_suffix(id: &str) -> &str {
    id.split('-').nth(2).filter(|s| !s.is_empty()).unwrap_or(id)
}

fn push_quoted(out: &mut String, prefix: &str, text: &str) {
    for line in text.lines() {
        out.push('\n');
        if line.trim().is_empty() {
            out.push_str(prefix.trim_end());
        } else {
            out.push_str(prefix);
            out.push_str(line);
        }
    }
}

fn render_callout(
    record: &ActivityRecord,
    cfg: &RenderConfig,
    backlink: Option<&str>,
    with_poster: bool,
) -> String {
    let heading = if record.rating.is_some() || record.review.is_some() {
        "> [!review] Review:"
    } else {
        "> [!watched] Watched:"
    };
    let mut out = format!("{heading} {}", head_line(record, cfg, backlink));
    if with_poster && let Some(poster) = &record.poster_url {
        out.push_str(&format!("\n> ![{POSTER_WIDTH}]({poster})"));
    }
    if let Some(review) = &record.review {
        push_quoted(&mut out, "> ", review);
    }
    if cfg.reference_id {
        out.push_str(&format!(
            "\n> {REFERENCE_PREFIX}{}",
            reference_suffix(&record.id)
        ));
    }
    out
}

/// Render one diary entry. Output is a pure function of the inputs.
pub fn render_entry(record: &ActivityRecord, cfg: &RenderConfig, backlink: Option<&str>) -> String {
    match cfg.variant {
        Variant::List => format!("- {}", head_line(record, cfg, backlink)),
        Variant::ListReview => {
            let mut out = format!("- {}", head_line(record, cfg, backlink));
            if let Some(review) = &record.review {
                push_quoted(&mut out, "    > ", review);
            }
            out
        }
        Variant::Callout => render_callout(record, cfg, backlink, false),
        Variant::CalloutPoster => render_callout(record, cfg, backlink, true),
    }
}

/// Activity bullet for a film note, where the film link would be redundant.
pub fn render_activity_line(record: &ActivityRecord, cfg: &RenderConfig) -> String {
    let phrase = date_phrase(record, cfg);
    let stars = star_phrase(record.rating, cfg.stars);
    if stars.is_empty() {
        format!("- {} on {}", phrase.verb, phrase.date)
    } else {
        format!("- {} {} on {}", phrase.verb, stars, phrase.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ActivityRecord {
        ActivityRecord {
            id: "letterboxd-review-987".to_string(),
            title: "Title".to_string(),
            year: 2023,
            source_url: "url".to_string(),
            watched_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            fallback_date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            rating: None,
            is_rewatch: false,
            review: None,
            poster_url: None,
        }
    }

    #[test]
    fn list_entry_without_rating_keeps_double_space() {
        let line = render_entry(&record(), &RenderConfig::default(), None);
        assert_eq!(line, "- Watched [Title](url)  on [[2024-01-05]]");
    }

    #[test]
    fn fallback_date_is_never_linked() {
        let mut rec = record();
        rec.watched_date = None;
        let line = render_entry(&rec, &RenderConfig::default(), None);
        assert_eq!(line, "- Marked as watched [Title](url)  on 2024-01-06");
    }

    #[test]
    fn distinct_link_and_display_formats_use_alias_link() {
        let cfg = RenderConfig {
            display_date_format: "%b %-d, %Y".to_string(),
            ..RenderConfig::default()
        };
        let line = render_entry(&record(), &cfg, Some("[[Title (2023)]]"));
        assert_eq!(
            line,
            "- Watched [[Title (2023)]]  on [[2024-01-05|Jan 5, 2024]]"
        );
    }

    #[test]
    fn star_styles_render_half_points() {
        assert_eq!(star_phrase(Some(3.5), StarStyle::Plain), "★★★½");
        assert_eq!(star_phrase(Some(4.0), StarStyle::Colored), "⭐⭐⭐⭐");
        assert_eq!(star_phrase(Some(2.5), StarStyle::Numeric), "(2.5/5)");
        assert_eq!(star_phrase(Some(5.0), StarStyle::Numeric), "(5/5)");
        assert_eq!(star_phrase(None, StarStyle::Plain), "");
    }

    #[test]
    fn list_review_indents_quoted_review() {
        let mut rec = record();
        rec.rating = Some(4.5);
        rec.review = Some("First.\n\nSecond.".to_string());
        let cfg = RenderConfig {
            variant: Variant::ListReview,
            link_date: false,
            ..RenderConfig::default()
        };
        assert_eq!(
            render_entry(&rec, &cfg, None),
            "- Watched [Title](url) ★★★★½ on 2024-01-05\n    > First.\n    >\n    > Second."
        );
    }

    #[test]
    fn callout_heading_depends_on_rating_or_review() {
        let cfg = RenderConfig {
            variant: Variant::Callout,
            reference_id: true,
            ..RenderConfig::default()
        };
        let plain = render_entry(&record(), &cfg, None);
        assert_eq!(
            plain,
            "> [!watched] Watched: Watched [Title](url)  on [[2024-01-05]]\n> ^letterboxd987"
        );

        let mut rec = record();
        rec.review = Some("Loved it.".to_string());
        let reviewed = render_entry(&rec, &cfg, None);
        assert!(reviewed.starts_with("> [!review] Review: Watched"));
        assert!(reviewed.contains("\n> Loved it.\n> ^letterboxd987"));
    }

    #[test]
    fn callout_poster_puts_image_before_review() {
        let mut rec = record();
        rec.review = Some("Loved it.".to_string());
        rec.poster_url = Some("https://img/p.jpg".to_string());
        let cfg = RenderConfig {
            variant: Variant::CalloutPoster,
            ..RenderConfig::default()
        };
        let out = render_entry(&rec, &cfg, None);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "> ![200](https://img/p.jpg)");
        assert_eq!(lines[2], "> Loved it.");
    }

    #[test]
    fn rendering_is_deterministic() {
        let cfg = RenderConfig {
            variant: Variant::CalloutPoster,
            ..RenderConfig::default()
        };
        let rec = record();
        assert_eq!(render_entry(&rec, &cfg, None), render_entry(&rec, &cfg, None));
    }

    #[test]
    fn activity_line_omits_link_and_empty_stars() {
        let cfg = RenderConfig {
            link_date: false,
            ..RenderConfig::default()
        };
        assert_eq!(render_activity_line(&record(), &cfg), "- Watched on 2024-01-05");

        let mut rec = record();
        rec.rating = Some(3.0);
        rec.is_rewatch = true;
        assert_eq!(render_activity_line(&rec, &cfg), "- Rewatched ★★★ on 2024-01-05");
    }

    #[test]
    fn reference_suffix_falls_back_to_whole_id() {
        assert_eq!(reference_suffix("letterboxd-watch-42"), "42");
        assert_eq!(reference_suffix("custom"), "custom");
    }

    #[test]
    fn date_format_validation_rejects_time_fields() {
        assert!(is_valid_date_format("%Y-%m-%d"));
        assert!(!is_valid_date_format("%H:%M"));
        assert!(!is_valid_date_format("%Q"));
    }

    #[test]
    fn variant_parses_loose_spellings() {
        assert_eq!("Callout_Poster".parse::<Variant>(), Ok(Variant::CalloutPoster));
        assert!("table".parse::<Variant>().is_err());
    }
}
