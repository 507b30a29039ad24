//! Job status command (`buildwatch status`).

use anyhow::{Context, Result, bail};
use console::style;

use buildwatch::config::WatchConfig;
use buildwatch::models::{JobStatus, STAGES, StatusResponse};
use buildwatch::status::StatusPoller;
use buildwatch::ui::WatchUI;
use buildwatch::ui::format::format_remaining;

use super::{build_api, interrupted};

pub async fn cmd_status(config: &WatchConfig, job_id: &str, follow: bool) -> Result<()> {
    let api = build_api(config)?;

    if !follow {
        let resp = api
            .fetch_status(job_id)
            .await
            .with_context(|| format!("Failed to fetch status for job {}", job_id))?;
        print_status(job_id, &resp);
        return Ok(());
    }

    let mut poller = StatusPoller::new(api, config.timing.session_timing().poll);
    let mut rx = poller.subscribe();
    poller.start(job_id);
    let ui = WatchUI::new(STAGES.len(), false);

    loop {
        let status = rx.borrow_and_update().clone();
        ui.update_status(&status);
        if status.is_terminal {
            poller.dispose();
            return match status.status {
                JobStatus::Ready => {
                    ui.finish(true, "Build ready");
                    if let Some(url) = &status.preview_url {
                        ui.print_line(format!("Preview: {}", url));
                    }
                    Ok(())
                }
                _ => {
                    ui.finish(false, "Build failed");
                    bail!(
                        "Job {} failed: {}",
                        job_id,
                        status.error.as_deref().unwrap_or("no error message")
                    )
                }
            };
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    bail!("Status poller stopped unexpectedly");
                }
            }
            _ = interrupted() => {
                poller.dispose();
                ui.finish(false, "Interrupted");
                return Ok(());
            }
        }
    }
}

fn print_status(job_id: &str, resp: &StatusResponse) {
    let position = resp.status.stage_index() + 1;
    println!();
    println!("Job {}", style(job_id).bold());
    println!(
        "  Status:   {} ({}/{})",
        style(resp.status.as_str()).cyan(),
        position,
        STAGES.len()
    );
    if !resp.stage_label.is_empty() {
        println!("  Stage:    {}", resp.stage_label);
    }
    if let Some(version) = &resp.build_version {
        println!("  Version:  {}", version);
    }
    if let Some(url) = &resp.preview_url {
        println!("  Preview:  {}", url);
    }
    if let Some(expires) = resp.sandbox_expires_at {
        let remaining = (expires - chrono::Utc::now()).num_seconds();
        println!(
            "  Sandbox:  {}expires in {}",
            if resp.sandbox_paused { "paused, " } else { "" },
            format_remaining(remaining)
        );
    } else if resp.sandbox_paused {
        println!("  Sandbox:  paused");
    }
    if let Some(error) = &resp.error_message {
        println!("  Error:    {}", style(error).red());
    }
    if let Some(debug_id) = &resp.debug_id {
        println!("  Debug id: {}", debug_id);
    }
    println!();
}
