//! Coarse log severity and the heuristic message classifier.

use serde::{Deserialize, Serialize};

/// Log severity used for filtering. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Lowercase wire name (`"debug"`, `"info"`, `"warn"`, `"error"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    /// Parse an upstream-supplied level. Accepts the common aliases
    /// (`warning`, `err`, `fatal`, `critical`, `trace`) case-insensitively.
    pub fn parse(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Severity::Debug),
            "info" | "notice" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warn),
            "error" | "err" | "fatal" | "critical" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ERROR_KEYWORDS: &[&str] = &["error"];
const WARN_KEYWORDS: &[&str] = &["warn", "approaching"];
const DEBUG_KEYWORDS: &[&str] = &["debug", "connected clients"];

/// Derive a severity from free-form message text.
///
/// Best-effort heuristic: the lowercased message is checked for error
/// keywords first, then warn, then debug; anything else is `Info`.
/// Matching is plain substring search with no word boundaries, so
/// `"Error-free run"` classifies as `Error`. Failure wording without the
/// word "error" (`"Request failed"`) is not recognised and reads as `Info`.
pub fn classify(message: &str) -> Severity {
    let lower = message.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if hit(ERROR_KEYWORDS) {
        Severity::Error
    } else if hit(WARN_KEYWORDS) {
        Severity::Warn
    } else if hit(DEBUG_KEYWORDS) {
        Severity::Debug
    } else {
        Severity::Info
    }
}
