use crate::boxd::diary::SortMode;
use crate::boxd::reconcile::{MergeConfig, SyncConfig};
use crate::boxd::render::{RenderConfig, StarStyle, Variant, is_valid_date_format};
use crate::error::SyncError;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxdFeedConfig {
    /// JSON feed URL or local JSON path.
    pub url: Option<String>,
    pub timezone: String,
}

impl Default for BoxdFeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxdDiaryConfig {
    pub path: String,
    pub sort: String,
    pub variant: String,
    pub stars: String,
    pub link_date: bool,
    pub reference_id: bool,
    pub link_date_format: String,
    pub display_date_format: String,
}

impl Default for BoxdDiaryConfig {
    fn default() -> Self {
        Self {
            path: "Letterboxd Diary.md".to_string(),
            sort: SortMode::default().label().to_string(),
            variant: Variant::default().label().to_string(),
            stars: StarStyle::default().label().to_string(),
            link_date: true,
            reference_id: false,
            link_date_format: String::new(),
            display_date_format: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxdNotesConfig {
    pub enabled: bool,
    pub folder: String,
}

impl Default for BoxdNotesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: "Films".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BoxdConfig {
    pub feed: BoxdFeedConfig,
    pub diary: BoxdDiaryConfig,
    pub notes: BoxdNotesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialBoxdConfig {
    feed: Option<BoxdFeedConfig>,
    diary: Option<BoxdDiaryConfig>,
    notes: Option<BoxdNotesConfig>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_option(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz, SyncError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| SyncError::Config(format!("invalid timezone `{}`", raw.trim())))
}

pub fn validate(cfg: &BoxdConfig) -> Result<(), SyncError> {
    parse_timezone(&cfg.feed.timezone)?;
    cfg.diary.sort.parse::<SortMode>().map_err(SyncError::Config)?;
    cfg.diary
        .variant
        .parse::<Variant>()
        .map_err(SyncError::Config)?;
    cfg.diary
        .stars
        .parse::<StarStyle>()
        .map_err(SyncError::Config)?;
    if !cfg.diary.path.trim().ends_with(".md") {
        return Err(SyncError::Config(format!(
            "invalid diary path `{}`: must end in .md",
            cfg.diary.path
        )));
    }
    if Path::new(cfg.diary.path.trim()).is_absolute() {
        return Err(SyncError::Config(
            "invalid diary path: must be relative to the vault".to_string(),
        ));
    }
    for (name, fmt) in [
        ("link_date_format", &cfg.diary.link_date_format),
        ("display_date_format", &cfg.diary.display_date_format),
    ] {
        if !fmt.is_empty() && !is_valid_date_format(fmt) {
            return Err(SyncError::Config(format!(
                "invalid {name} `{fmt}`: not a date-only strftime pattern"
            )));
        }
    }
    if cfg.notes.enabled && cfg.notes.folder.trim().is_empty() {
        return Err(SyncError::Config(
            "invalid notes folder: cannot be empty when notes are enabled".to_string(),
        ));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("BOXD_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".boxdsync").join("config.toml"))
}

fn merge_file_text(base: &mut BoxdConfig, raw: &str, path: &Path) -> Result<(), SyncError> {
    let parsed: PartialBoxdConfig = toml::from_str(raw).map_err(|err| {
        SyncError::Config(format!("failed to parse config {}: {err}", path.display()))
    })?;
    if let Some(feed) = parsed.feed {
        base.feed = feed;
    }
    if let Some(diary) = parsed.diary {
        base.diary = diary;
    }
    if let Some(notes) = parsed.notes {
        base.notes = notes;
    }
    Ok(())
}

fn merge_file_config(base: &mut BoxdConfig) -> Result<()> {
    match resolve_config_path() {
        Some(path) => merge_file_config_at(base, &path),
        None => Ok(()),
    }
}

fn merge_file_config_at(base: &mut BoxdConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    merge_file_text(base, &raw, path)?;
    Ok(())
}

fn apply_env_overrides(cfg: &mut BoxdConfig) {
    cfg.feed.url = env_or_option("BOXD_FEED_URL", cfg.feed.url.take());
    cfg.feed.timezone = env_or_string("BOXD_TIMEZONE", &cfg.feed.timezone);

    cfg.diary.path = env_or_string("BOXD_DIARY_PATH", &cfg.diary.path);
    cfg.diary.sort = env_or_string("BOXD_SORT", &cfg.diary.sort);
    cfg.diary.variant = env_or_string("BOXD_VARIANT", &cfg.diary.variant);
    cfg.diary.stars = env_or_string("BOXD_STARS", &cfg.diary.stars);
    cfg.diary.link_date = env_or_bool("BOXD_LINK_DATE", cfg.diary.link_date);
    cfg.diary.reference_id = env_or_bool("BOXD_REFERENCE_ID", cfg.diary.reference_id);
    cfg.diary.link_date_format =
        env_or_string("BOXD_LINK_DATE_FORMAT", &cfg.diary.link_date_format);
    cfg.diary.display_date_format =
        env_or_string("BOXD_DISPLAY_DATE_FORMAT", &cfg.diary.display_date_format);

    cfg.notes.enabled = env_or_bool("BOXD_NOTES_ENABLED", cfg.notes.enabled);
    cfg.notes.folder = env_or_string("BOXD_NOTES_FOLDER", &cfg.notes.folder);
}

/// Defaults, then the TOML file, then `BOXD_*` overrides. CLI flags are
/// applied by the caller before [`sync_config`].
pub fn load_config() -> Result<BoxdConfig> {
    let mut cfg = BoxdConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

/// Typed view used by the sync engine. Re-validates, since CLI flags may
/// have changed fields after [`load_config`].
pub fn sync_config(cfg: &BoxdConfig) -> Result<SyncConfig, SyncError> {
    validate(cfg)?;
    let render = RenderConfig {
        variant: cfg.diary.variant.parse().map_err(SyncError::Config)?,
        stars: cfg.diary.stars.parse().map_err(SyncError::Config)?,
        link_date: cfg.diary.link_date,
        reference_id: cfg.diary.reference_id,
        link_date_format: cfg.diary.link_date_format.clone(),
        display_date_format: cfg.diary.display_date_format.clone(),
    };
    let merge = MergeConfig {
        sort: cfg.diary.sort.parse().map_err(SyncError::Config)?,
        diary_path: PathBuf::from(cfg.diary.path.trim()),
        notes_folder: cfg
            .notes
            .enabled
            .then(|| PathBuf::from(cfg.notes.folder.trim())),
    };
    Ok(SyncConfig {
        render,
        merge,
        timezone: parse_timezone(&cfg.feed.timezone)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_and_convert() {
        let cfg = BoxdConfig::default();
        let sync = sync_config(&cfg).expect("defaults are valid");
        assert_eq!(sync.merge.sort, SortMode::Old);
        assert_eq!(sync.merge.diary_path, PathBuf::from("Letterboxd Diary.md"));
        assert_eq!(sync.merge.notes_folder, None);
        assert_eq!(sync.render, RenderConfig::default());
        assert_eq!(sync.timezone, Tz::UTC);
    }

    #[test]
    fn file_sections_replace_defaults_per_section() {
        let mut cfg = BoxdConfig::default();
        let raw = r#"
[feed]
url = "https://example.com/cinephile.json"
timezone = "Pacific/Auckland"

[notes]
enabled = true
"#;
        merge_file_text(&mut cfg, raw, Path::new("config.toml")).expect("parse");
        assert_eq!(cfg.feed.url.as_deref(), Some("https://example.com/cinephile.json"));
        assert!(cfg.notes.enabled);
        assert_eq!(cfg.notes.folder, "Films");
        assert_eq!(cfg.diary.path, "Letterboxd Diary.md");

        let sync = sync_config(&cfg).expect("valid");
        assert_eq!(sync.timezone, chrono_tz::Pacific::Auckland);
        assert_eq!(sync.merge.notes_folder, Some(PathBuf::from("Films")));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut cfg = BoxdConfig::default();
        let err = merge_file_text(&mut cfg, "[diary\npath = 1", Path::new("/tmp/boxd.toml"))
            .expect_err("malformed");
        assert!(err.to_string().contains("/tmp/boxd.toml"));
    }

    #[test]
    fn unreadable_config_is_a_read_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut cfg = BoxdConfig::default();
        merge_file_config_at(&mut cfg, &tmp.path().join("absent.toml")).expect("missing is fine");

        // a directory exists but cannot be read as text
        let err = merge_file_config_at(&mut cfg, tmp.path()).expect_err("directory");
        let msg = format!("{err:#}");
        assert!(msg.contains("failed to read config"));
        assert!(!msg.contains("failed to write"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = BoxdConfig::default();
        cfg.feed.timezone = "Mars/Olympus".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = BoxdConfig::default();
        cfg.diary.variant = "table".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = BoxdConfig::default();
        cfg.diary.path = "Diary.txt".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = BoxdConfig::default();
        cfg.diary.display_date_format = "%H:%M".to_string();
        assert!(validate(&cfg).is_err());
    }
}
