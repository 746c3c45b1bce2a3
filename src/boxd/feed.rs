use crate::boxd::config::BoxdFeedConfig;
use crate::error::SyncError;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One item of the diary feed as exported to JSON.
///
/// Field names follow the RSS element names (`letterboxd:filmTitle`, ...)
/// as well as snake_case spellings, so both raw conversions and hand-written
/// fixtures deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    #[serde(alias = "id")]
    pub guid: String,
    #[serde(alias = "pubDate")]
    pub pub_date: String,
    #[serde(alias = "letterboxd:watchedDate", alias = "watchedDate")]
    pub watched_date: Option<String>,
    #[serde(alias = "letterboxd:rewatch")]
    pub rewatch: Option<Value>,
    #[serde(alias = "letterboxd:filmTitle", alias = "filmTitle")]
    pub film_title: Option<String>,
    #[serde(alias = "letterboxd:filmYear", alias = "filmYear")]
    pub film_year: Option<Value>,
    #[serde(alias = "letterboxd:memberRating", alias = "memberRating")]
    pub member_rating: Option<Value>,
    pub description: String,
}

/// Render a loosely typed JSON scalar as trimmed text.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

pub fn feed_source(cfg: &BoxdFeedConfig) -> Result<String> {
    if let Some(url) = cfg.url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(url.to_string());
    }
    Err(SyncError::Config(
        "no feed configured: set [feed] url, BOXD_FEED_URL, or pass --feed".to_string(),
    )
    .into())
}

pub fn parse_feed_json(raw: &str) -> Result<Vec<RawFeedItem>, SyncError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|err| SyncError::Feed(format!("feed is not a JSON export: {err}")))?;
    let items = match parsed {
        Value::Array(_) => parsed,
        Value::Object(mut map) => map
            .remove("items")
            .ok_or_else(|| SyncError::Feed("feed object has no `items` array".to_string()))?,
        _ => {
            return Err(SyncError::Feed(
                "feed must be an array or an object with `items`".to_string(),
            ));
        }
    };
    serde_json::from_value(items)
        .map_err(|err| SyncError::Feed(format!("feed items malformed: {err}")))
}

fn fetch_remote(url: &str) -> Result<String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build http client")?;
    let response = client
        .get(url)
        .send()
        .map_err(|err| SyncError::Feed(format!("request to {url} failed: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Feed(format!("{url} answered {status}")).into());
    }
    let body = response
        .text()
        .map_err(|err| SyncError::Feed(format!("failed to read body from {url}: {err}")))?;
    Ok(body)
}

/// Load feed items from an `http(s)` URL or a local JSON file.
pub fn load_feed(source: &str) -> Result<Vec<RawFeedItem>> {
    let trimmed = source.trim();
    let raw = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        fetch_remote(trimmed)?
    } else {
        let path = Path::new(trimmed);
        fs::read_to_string(path)
            .map_err(|err| SyncError::Feed(format!("failed to read {}: {err}", path.display())))?
    };
    let items = parse_feed_json(&raw).with_context(|| format!("failed to load feed {trimmed}"))?;
    Ok(items)
}
