use crate::error::SyncError;
use serde_yaml::Value;

pub const DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterValue {
    Scalar(String),
    List(Vec<String>),
}

/// Ordered key/value metadata block. Keys keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    entries: Vec<(String, FrontmatterValue)>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: FrontmatterValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn insert_scalar(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, FrontmatterValue::Scalar(value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrontmatterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A document cut at its frontmatter boundary.
///
/// `head` is the raw frontmatter text (delimiters included) when the block
/// is closed, else empty. `frontmatter` is `None` when there is no block or
/// it is not a flat YAML mapping of scalars and scalar lists.
#[derive(Debug, Clone)]
pub struct SplitDocument<'a> {
    pub frontmatter: Option<Frontmatter>,
    pub head: &'a str,
    pub body: &'a str,
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Byte offset just past the closing delimiter line, if the text opens with
/// a frontmatter block that closes.
fn block_end(text: &str) -> Result<Option<usize>, SyncError> {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    if strip_eol(first) != DELIMITER {
        return Ok(None);
    }
    let mut offset = first.len();
    for line in lines {
        offset += line.len();
        if strip_eol(line) == DELIMITER {
            return Ok(Some(offset));
        }
    }
    Err(SyncError::Format("frontmatter block never closes".to_string()))
}

/// Text form of a YAML scalar; `None` for sequences, mappings and tagged values.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn parse_inner(inner: &str) -> Result<Frontmatter, SyncError> {
    if inner.trim().is_empty() {
        return Ok(Frontmatter::new());
    }
    let parsed: Value =
        serde_yaml::from_str(inner).map_err(|err| SyncError::Format(err.to_string()))?;
    let mapping = match parsed {
        Value::Null => return Ok(Frontmatter::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err(SyncError::Format("block is not a key/value mapping".to_string())),
    };

    let mut fm = Frontmatter::new();
    for (key, value) in mapping {
        let key = scalar_text(&key)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SyncError::Format("keys must be plain scalars".to_string()))?;
        let value = match value {
            Value::Sequence(items) => FrontmatterValue::List(
                items
                    .iter()
                    .map(|item| {
                        scalar_text(item).ok_or_else(|| {
                            SyncError::Format(format!("nested list item under `{key}`"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            other => FrontmatterValue::Scalar(
                scalar_text(&other)
                    .ok_or_else(|| SyncError::Format(format!("nested value under `{key}`")))?,
            ),
        };
        fm.insert(key, value);
    }
    Ok(fm)
}

/// Parse the leading block. `Ok(None)` when the text has no frontmatter;
/// an unclosed or malformed block is a `SyncError::Format`.
pub fn parse(text: &str) -> Result<Option<(Frontmatter, usize)>, SyncError> {
    let Some(end) = block_end(text)? else {
        return Ok(None);
    };
    let first_len = text.split_inclusive('\n').next().map_or(0, str::len);
    let closing_start = text[..end]
        .trim_end_matches(['\n', '\r'])
        .len()
        .saturating_sub(DELIMITER.len());
    let inner = &text[first_len..closing_start.max(first_len)];
    Ok(Some((parse_inner(inner)?, end)))
}

pub fn split(text: &str) -> SplitDocument<'_> {
    match block_end(text) {
        Ok(Some(end)) => SplitDocument {
            frontmatter: parse(text).ok().flatten().map(|(fm, _)| fm),
            head: &text[..end],
            body: &text[end..],
        },
        _ => SplitDocument {
            frontmatter: None,
            head: "",
            body: text,
        },
    }
}

fn yaml_quote(value: &str) -> String {
    if value.chars().any(char::is_control) {
        let escaped: String = value
            .chars()
            .map(|c| match c {
                '\\' => "\\\\".to_string(),
                '"' => "\\\"".to_string(),
                '\n' => "\\n".to_string(),
                '\r' => "\\r".to_string(),
                '\t' => "\\t".to_string(),
                c if c.is_control() => format!("\\u{:04x}", c as u32),
                c => c.to_string(),
            })
            .collect();
        return format!("\"{escaped}\"");
    }
    format!("'{}'", value.replace('\'', "''"))
}

/// A value may be written bare only if YAML reads it back as the same text.
fn emit_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value.chars().any(char::is_control)
        && serde_yaml::from_str::<Value>(value)
            .ok()
            .and_then(|parsed| scalar_text(&parsed))
            .is_some_and(|text| text == value);
    if plain {
        value.to_string()
    } else {
        yaml_quote(value)
    }
}

pub fn serialize(fm: &Frontmatter) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in fm.iter() {
        let key = emit_value(key);
        match value {
            FrontmatterValue::Scalar(s) => {
                out.push_str(&format!("{key}: {}\n", emit_value(s)));
            }
            FrontmatterValue::List(items) if items.is_empty() => {
                out.push_str(&format!("{key}: []\n"));
            }
            FrontmatterValue::List(items) => {
                out.push_str(&format!("{key}:\n"));
                for item in items {
                    out.push_str(&format!("  - {}\n", emit_value(item)));
                }
            }
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out
}
