//! Plain-text rendering of controller state.

use console::style;

use crate::models::{JobStatus, LogLine, LogSource};
use crate::preview::{PreviewPhase, PreviewState};
use crate::status::StatusTracker;
use crate::ui::icons::{AUTO_FIX, BLOCKED, CLOCK, CROSS, LINK_DOWN, PAUSED, PREVIEW, SYSTEM};

const DEFAULT_WIDTH: usize = 100;
/// Width of the `HH:MM:SS ` prefix in front of each log line.
const TIME_PREFIX: usize = 9;

/// Current terminal width, or a fixed fallback when not attached to one.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Format a duration in seconds as `Xs`, `Xm Ys` or `Xh Ym`.
pub fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// One log line, wrapped to `width` with continuation lines indented under
/// the text.
pub fn format_log_line(line: &LogLine, width: usize) -> String {
    let time = line.timestamp.format("%H:%M:%S").to_string();
    let marker = match line.source {
        LogSource::System => format!("{}", SYSTEM),
        _ => String::new(),
    };
    let indent = " ".repeat(TIME_PREFIX);
    let options = textwrap::Options::new(width.max(TIME_PREFIX + 20))
        .initial_indent(&indent)
        .subsequent_indent(&indent);
    let body = format!("{}{}", marker, line.text);
    let filled = textwrap::fill(&body, options);
    // The first line's indent is where the timestamp goes.
    let wrapped = filled.strip_prefix(indent.as_str()).unwrap_or(&filled).to_string();

    let styled = match line.source {
        LogSource::Stdout => wrapped,
        LogSource::Stderr => style(wrapped).red().to_string(),
        LogSource::System => style(wrapped).cyan().to_string(),
    };
    format!("{} {}", style(time).dim(), styled)
}

/// Message shown next to the stage bar.
pub fn stage_message(status: &StatusTracker) -> String {
    if status.connection_failed {
        return format!("{}{}", LINK_DOWN, style("Connection lost, retrying...").yellow());
    }
    if !status.has_data {
        return style("Waiting for status...").dim().to_string();
    }
    let label = if status.label.is_empty() {
        status.status.as_str().to_string()
    } else {
        status.label.clone()
    };
    match status.status {
        JobStatus::Failed => {
            let mut msg = format!("{}{}", CROSS, style(label).red());
            if let Some(error) = &status.error {
                msg.push_str(&format!(": {}", error));
            }
            if let Some(debug_id) = &status.debug_id {
                msg.push_str(&format!(" {}", style(format!("(debug id {})", debug_id)).dim()));
            }
            msg
        }
        JobStatus::Ready => style(label).green().to_string(),
        _ => label,
    }
}

/// Auto-fix indicator, when an attempt is in progress.
pub fn auto_fix_message(attempt: Option<u32>, max: Option<u32>) -> Option<String> {
    let attempt = attempt?;
    let text = match max {
        Some(max) => format!("Auto-fix attempt {} of {}", attempt, max),
        None => format!("Auto-fix attempt {}", attempt),
    };
    Some(format!("{}{}", AUTO_FIX, style(text).yellow()))
}

/// One-line summary of the preview lifecycle.
pub fn preview_message(state: &PreviewState) -> String {
    let url = state.active_preview_url.as_deref().unwrap_or("-");
    match state.phase {
        PreviewPhase::Checking => style("Checking preview...").dim().to_string(),
        PreviewPhase::Loading => format!("{}Loading {}", PREVIEW, url),
        PreviewPhase::Active => match state.time_remaining_seconds {
            Some(secs) => format!(
                "{}{} {}{} left",
                PREVIEW,
                style(url).green(),
                CLOCK,
                format_remaining(secs)
            ),
            None => format!("{}{}", PREVIEW, style(url).green()),
        },
        PreviewPhase::Blocked => format!(
            "{}Preview cannot be embedded: {}",
            BLOCKED,
            state.block_reason.as_deref().unwrap_or("no reason given")
        ),
        PreviewPhase::Expired => format!("{}{}", CROSS, style("Preview sandbox expired").red()),
        PreviewPhase::Paused => format!("{}Preview sandbox is paused", PAUSED),
        PreviewPhase::Resuming => format!("{}Resuming sandbox...", PAUSED),
        PreviewPhase::ResumeFailed => {
            let why = match state.resume_error_kind {
                Some(kind) => kind.as_str(),
                None => "unknown",
            };
            format!("{}{} ({})", CROSS, style("Could not resume sandbox").red(), why)
        }
        PreviewPhase::Error => format!(
            "{}{}",
            CROSS,
            style(state.error_message.as_deref().unwrap_or("Preview failed")).red()
        ),
    }
}
