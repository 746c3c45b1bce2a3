use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Create,
    Replace,
    Unchanged,
}

impl WriteAction {
    pub fn label(self) -> &'static str {
        match self {
            WriteAction::Create => "create",
            WriteAction::Replace => "replace",
            WriteAction::Unchanged => "unchanged",
        }
    }
}

/// Result of merging new content into one document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub action: WriteAction,
    pub text: String,
    pub added: usize,
}

impl MergeOutcome {
    pub fn unchanged(text: &str) -> Self {
        Self {
            action: WriteAction::Unchanged,
            text: text.to_string(),
            added: 0,
        }
    }
}

/// Collapse every run of three or more newlines to a single blank line.
pub fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::collapse_blank_runs;

    #[test]
    fn collapse_keeps_single_blank_lines() {
        assert_eq!(collapse_blank_runs("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_runs("a\n\n\n\n\nb\n"), "a\n\nb\n");
        assert_eq!(collapse_blank_runs("a\nb\n\n\n"), "a\nb\n\n");
    }
}
