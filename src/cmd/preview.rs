//! Preview lifecycle command (`buildwatch preview`).

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use buildwatch::config::WatchConfig;
use buildwatch::models::STAGES;
use buildwatch::preview::{PreviewController, PreviewNotice, PreviewParams, PreviewPhase, PreviewState};
use buildwatch::ui::WatchUI;
use buildwatch::ui::format::format_remaining;

use super::{build_api, interrupted};

/// What the terminal does in place of an embedding surface.
///
/// A terminal cannot render the preview, so a `loading` preview counts as
/// loaded once its URL has been shown (and opened, with `--open`). A paused
/// sandbox is resumed once per run; a failed resume is left for the user.
pub struct PreviewHost {
    open_browser: bool,
    resume_requested: bool,
    opened: Option<String>,
}

impl PreviewHost {
    pub fn new(open_browser: bool) -> Self {
        Self {
            open_browser,
            resume_requested: false,
            opened: None,
        }
    }

    pub fn react(&mut self, preview: &PreviewController, state: &PreviewState, ui: &WatchUI) {
        match state.phase {
            PreviewPhase::Paused if !self.resume_requested => {
                self.resume_requested = true;
                ui.print_line("Sandbox is paused, resuming...");
                preview.resume();
            }
            PreviewPhase::Loading => {
                let Some(url) = state.active_preview_url.clone() else {
                    preview.report_error("No preview URL available");
                    return;
                };
                if self.open_browser && self.opened.as_deref() != Some(url.as_str()) {
                    if let Err(e) = open::that(&url) {
                        warn!(url = %url, error = %e, "could not open browser");
                        preview.report_error(format!("Could not open browser: {}", e));
                        return;
                    }
                    self.opened = Some(url.clone());
                }
                ui.print_line(format!("Preview: {}", url));
                preview.mark_loaded();
            }
            _ => {}
        }
    }
}

/// Terminal phases of a preview run, where the command stops waiting.
pub fn is_settled(phase: PreviewPhase) -> bool {
    matches!(
        phase,
        PreviewPhase::Blocked
            | PreviewPhase::Expired
            | PreviewPhase::ResumeFailed
            | PreviewPhase::Error
    )
}

pub fn notice_text(notice: &PreviewNotice) -> String {
    match notice {
        PreviewNotice::ExpiryWarning {
            remaining_seconds, ..
        } => format!(
            "Preview sandbox expires in {}",
            format_remaining(*remaining_seconds)
        ),
    }
}

pub async fn cmd_preview(config: &WatchConfig, job_id: &str, open_browser: bool) -> Result<()> {
    let api = build_api(config)?;
    let status = api
        .fetch_status(job_id)
        .await
        .with_context(|| format!("Failed to fetch status for job {}", job_id))?;
    if status.preview_url.is_none() && !status.status.is_terminal() {
        bail!(
            "Job {} has no preview yet (status: {})",
            job_id,
            status.status
        );
    }

    let mut preview = PreviewController::new(api, config.timing.session_timing().preview);
    let mut rx = preview.subscribe();
    let mut notices = preview.notices();
    preview.start(
        job_id,
        PreviewParams {
            preview_url: status.preview_url,
            sandbox_expires_at: status.sandbox_expires_at,
            sandbox_paused: status.sandbox_paused,
        },
    );

    let ui = WatchUI::new(STAGES.len(), true);
    let mut host = PreviewHost::new(open_browser);
    let mut last_phase = None;

    loop {
        let state = rx.borrow_and_update().clone();
        ui.update_preview(&state);
        if last_phase != Some(state.phase) {
            last_phase = Some(state.phase);
            host.react(&preview, &state, &ui);
        }
        if is_settled(state.phase) {
            preview.dispose();
            let ok = state.phase == PreviewPhase::Expired;
            ui.finish(ok, &format!("Preview {}", state.phase));
            if ok {
                return Ok(());
            }
            bail!("Preview for job {} ended in {}", job_id, state.phase);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    bail!("Preview controller stopped unexpectedly");
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => ui.warning(&notice_text(&notice)),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("Preview controller stopped unexpectedly"),
            },
            _ = interrupted() => {
                preview.dispose();
                ui.finish(true, "Stopped");
                return Ok(());
            }
        }
    }
}
