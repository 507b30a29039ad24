//! Combined job view (`buildwatch watch`).

use anyhow::{Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use buildwatch::BuildSession;
use buildwatch::config::WatchConfig;
use buildwatch::models::{JobStatus, STAGES};
use buildwatch::ui::WatchUI;

use super::preview::{PreviewHost, notice_text};
use super::{build_api, interrupted};

pub async fn cmd_watch(config: &WatchConfig, job_id: &str) -> Result<()> {
    let session_id = Uuid::new_v4();
    let span = info_span!("watch", session = %session_id, job_id = %job_id);
    run(config, job_id).instrument(span).await
}

async fn run(config: &WatchConfig, job_id: &str) -> Result<()> {
    let api = build_api(config)?;
    let mut session = BuildSession::new(api, config.timing.session_timing());
    let mut status_rx = session.status().subscribe();
    let mut logs_rx = session.logs().subscribe();
    let mut preview_rx = session.preview().subscribe();
    let mut notices = session.preview().notices();
    session.switch_job(Some(job_id.to_string()));
    info!("watch session started");

    let ui = WatchUI::new(STAGES.len(), true);
    let mut host = PreviewHost::new(false);
    let mut printed = 0;
    let mut auto_fix = None;
    let mut last_phase = None;
    let mut offline_reported = false;

    loop {
        let status = status_rx.borrow_and_update().clone();
        ui.update_status(&status);
        if status.connection_failed && !offline_reported {
            ui.warning("Lost connection to the build service; still retrying");
        }
        offline_reported = status.connection_failed;
        session.sync_preview();

        let logs = logs_rx.borrow_and_update().clone();
        for line in logs.lines.iter().skip(printed) {
            ui.log_line(line);
        }
        printed = logs.lines.len();
        if logs.auto_fix_attempt != auto_fix {
            auto_fix = logs.auto_fix_attempt;
            ui.auto_fix(logs.auto_fix_attempt, logs.auto_fix_max);
        }

        let preview = preview_rx.borrow_and_update().clone();
        if preview.job_id.is_some() {
            ui.update_preview(&preview);
            if last_phase != Some(preview.phase) {
                last_phase = Some(preview.phase);
                host.react(session.preview(), &preview, &ui);
            }
        }

        if status.is_terminal && logs.is_closed() {
            session.dispose();
            info!(status = %status.status, "watch session finished");
            if status.status == JobStatus::Failed {
                ui.finish(false, "Build failed");
                bail!(
                    "Job {} failed: {}",
                    job_id,
                    status.error.as_deref().unwrap_or("no error message")
                );
            }
            ui.finish(true, "Build ready");
            if let Some(url) = preview.active_preview_url.or(status.preview_url) {
                ui.print_line(format!("Preview: {}", url));
            }
            return Ok(());
        }

        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    bail!("Status poller stopped unexpectedly");
                }
            }
            changed = logs_rx.changed() => {
                if changed.is_err() {
                    bail!("Log consumer stopped unexpectedly");
                }
            }
            changed = preview_rx.changed() => {
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
                session.dispose();
                ui.finish(true, "Stopped");
                return Ok(());
            }
        }
    }
}
