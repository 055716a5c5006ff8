//! Utility functions

use regex::{Captures, Regex};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{(\w+)\}").expect("placeholder pattern is valid"));

/// Resolve a program name (or path) to the executable that would be run.
///
/// Returns `None` when it isn't installed, which callers treat as a
/// disabled test rather than an error.
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Quote a string for a POSIX shell
pub fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Join arguments into a single shell-safe command line (for display)
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_escape(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substitute `%{name}` placeholders in a command template.
///
/// Values are inserted verbatim; placeholders without a value are left as-is.
pub fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Convert a duration to milliseconds, truncated (not rounded) to two decimals
pub fn truncate_ms(duration: Duration) -> f64 {
    let hundredths = duration.as_nanos() / 10_000;
    hundredths as f64 / 100.0
}
