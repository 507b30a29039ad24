//! Build log command (`buildwatch logs`).

use anyhow::{Context, Result, bail};
use tracing::debug;

use buildwatch::BuildApi;
use buildwatch::config::WatchConfig;
use buildwatch::logs::{LogEvent, LogStreamConsumer, LogStreamState};
use buildwatch::models::{DoneStatus, STAGES};
use buildwatch::ui::WatchUI;

use super::{build_api, interrupted};

pub async fn cmd_logs(
    config: &WatchConfig,
    job_id: &str,
    earlier_pages: usize,
    follow: bool,
) -> Result<()> {
    let api = build_api(config)?;
    let ui = WatchUI::hidden(STAGES.len());
    let page_limit = config.timing.backfill_limit;

    if !follow {
        let state = fetch_stored(&api, job_id, earlier_pages.max(1), page_limit).await?;
        for line in &state.lines {
            ui.log_line(line);
        }
        if state.has_earlier_lines {
            ui.warning("Earlier lines exist; pass --earlier N to load more pages");
        }
        return Ok(());
    }

    let mut consumer = LogStreamConsumer::with_backfill_limit(api, page_limit);
    let mut rx = consumer.subscribe();
    consumer.start(job_id);

    for _ in 0..earlier_pages {
        if !consumer.snapshot().has_earlier_lines {
            break;
        }
        let added = consumer
            .load_earlier()
            .await
            .context("Failed to load earlier log lines")?;
        debug!(added, "loaded earlier page");
    }

    let mut printed = 0;
    let mut auto_fix = None;
    loop {
        let state = rx.borrow_and_update().clone();
        for line in state.lines.iter().skip(printed) {
            ui.log_line(line);
        }
        printed = state.lines.len();

        if state.auto_fix_attempt != auto_fix {
            auto_fix = state.auto_fix_attempt;
            ui.auto_fix(state.auto_fix_attempt, state.auto_fix_max);
        }

        if state.is_done {
            consumer.dispose();
            return match state.done_status {
                Some(DoneStatus::Failed) => bail!("Build {} failed", job_id),
                Some(DoneStatus::Ready) => {
                    ui.finish(true, "Build ready");
                    Ok(())
                }
                None => {
                    ui.finish(true, "Log stream finished");
                    Ok(())
                }
            };
        }
        if state.is_closed() {
            bail!("Log stream for job {} closed before the build finished", job_id);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    bail!("Log consumer stopped unexpectedly");
                }
            }
            _ = interrupted() => {
                consumer.dispose();
                return Ok(());
            }
        }
    }
}

/// Page backwards through stored lines without opening the live stream.
async fn fetch_stored(
    api: &BuildApi,
    job_id: &str,
    pages: usize,
    limit: usize,
) -> Result<LogStreamState> {
    let mut state = LogStreamState::for_job(job_id);
    for _ in 0..pages {
        let page = api
            .fetch_logs(job_id, state.backfill_cursor(), limit)
            .await
            .with_context(|| format!("Failed to fetch logs for job {}", job_id))?;
        state.apply(LogEvent::Backfill(page));
        if !state.has_earlier_lines {
            break;
        }
    }
    Ok(state)
}
