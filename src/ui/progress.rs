use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::models::LogLine;
use crate::preview::PreviewState;
use crate::status::StatusTracker;
use crate::ui::format;
use crate::ui::icons::{CHECK, CROSS, WARN};

/// Terminal UI for a watched job, rendered via `indicatif` progress bars.
///
/// Two bars are stacked under the scrolling log output:
/// - Stage bar: position of the job in the build pipeline
/// - Preview bar: one-line summary of the preview lifecycle
///
/// Log lines and notices are printed above the bars.
pub struct WatchUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    preview_bar: ProgressBar,
    width: usize,
}

impl WatchUI {
    /// Create the UI. `with_preview` adds the preview bar.
    pub fn new(total_stages: usize, with_preview: bool) -> Self {
        Self::with_target(total_stages, with_preview, ProgressDrawTarget::stderr())
    }

    /// UI that draws nothing, for non-interactive output.
    pub fn hidden(total_stages: usize) -> Self {
        Self::with_target(total_stages, false, ProgressDrawTarget::hidden())
    }

    fn with_target(total_stages: usize, with_preview: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:28.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓░");
        let stage_bar = multi.add(ProgressBar::new(total_stages as u64));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("  Build");
        stage_bar.enable_steady_tick(Duration::from_millis(120));

        let preview_bar = if with_preview {
            let preview_style = ProgressStyle::default_spinner()
                .template("{prefix:.bold.dim} {msg}")
                .expect("progress bar template is a valid static string");
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(preview_style);
            bar.set_prefix("Preview");
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            multi,
            stage_bar,
            preview_bar,
            width: format::terminal_width(),
        }
    }

    /// Print a line above the bars, falling back to `eprintln!` if drawing fails.
    /// With no terminal attached the bars are hidden and lines go to stdout.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() {
            println!("{}", msg.as_ref());
        } else if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn update_status(&self, status: &StatusTracker) {
        // Position is 1-based so `ready` fills the bar.
        let pos = if status.has_data {
            status.stage_index as u64 + 1
        } else {
            0
        };
        self.stage_bar.set_length(status.total_stages as u64);
        self.stage_bar.set_position(pos);
        self.stage_bar.set_message(format::stage_message(status));
    }

    pub fn update_preview(&self, state: &PreviewState) {
        self.preview_bar.set_message(format::preview_message(state));
    }

    pub fn log_line(&self, line: &LogLine) {
        self.print_line(format::format_log_line(line, self.width));
    }

    pub fn auto_fix(&self, attempt: Option<u32>, max: Option<u32>) {
        if let Some(msg) = format::auto_fix_message(attempt, max) {
            self.print_line(msg);
        }
    }

    pub fn warning(&self, msg: &str) {
        self.print_line(format!("{}{}", WARN, style(msg).yellow()));
    }

    /// Stop the bars and print a final summary line.
    pub fn finish(&self, success: bool, msg: &str) {
        self.stage_bar.disable_steady_tick();
        self.stage_bar.abandon();
        self.preview_bar.abandon();
        let icon = if success { &CHECK } else { &CROSS };
        let text = if success {
            style(msg).green().bold()
        } else {
            style(msg).red().bold()
        };
        self.print_line(format!("{}{}", icon, text));
    }
}
