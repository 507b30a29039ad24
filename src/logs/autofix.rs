//! Detection of the backend's self-healing loop from system log text.
//!
//! The backend does not send a structured field for this, so the phrasing
//! of its `system` lines is matched instead:
//! - "Auto-fix attempt 2 of 3" (also `2/3`) → an attempt is underway
//! - "Running health checks" / "Starting dev server" → healing finished

use regex::Regex;
use std::sync::LazyLock;

static ATTEMPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)auto[- ]?fix(?:ing)?\s+attempt\s+#?(\d+)\s*(?:of|/)\s*(\d+)").unwrap()
});

static CLEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:running\s+health\s+checks?|health\s+checks?\s+(?:starting|running|started)|starting\s+(?:the\s+)?dev\s+server|dev\s+server\s+starting)",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFixSignal {
    Attempt { attempt: u32, max: u32 },
    Cleared,
}

/// Classify one system line. Attempt wording wins if both appear.
pub fn detect(text: &str) -> Option<AutoFixSignal> {
    if let Some(cap) = ATTEMPT_REGEX.captures(text) {
        let attempt = cap.get(1)?.as_str().parse().ok()?;
        let max = cap.get(2)?.as_str().parse().ok()?;
        return Some(AutoFixSignal::Attempt { attempt, max });
    }
    if CLEAR_REGEX.is_match(text) {
        return Some(AutoFixSignal::Cleared);
    }
    None
}
