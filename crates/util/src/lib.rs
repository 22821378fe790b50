//! Helpers shared by the Railyard engine and CLI.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub mod config;
mod path_processing;

pub use config::{ConfigError, EngineConfig};
pub use path_processing::expand_tilde;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)((?:bearer|basic)\s+)?[\w\-\.=:/+]+",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)[^\s&]+",
        r"(?i)(DATABASE_URL=)[^\s]+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("sensitive pattern is a valid regex"))
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Handler errors often echo request details back; this keeps credentials out
/// of progress events and logs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for regex in SENSITIVE_PATTERNS.iter() {
        redacted = regex
            .replace_all(&redacted, |captures: &Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}
