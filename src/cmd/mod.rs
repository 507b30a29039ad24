//! CLI command implementations.
//!
//! | Module    | Commands handled     |
//! |-----------|----------------------|
//! | `status`  | `Status`             |
//! | `logs`    | `Logs`               |
//! | `preview` | `Preview`            |
//! | `watch`   | `Watch`              |
//! | `config`  | `Config`             |

pub mod config;
pub mod logs;
pub mod preview;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use buildwatch::BuildApi;
use buildwatch::config::WatchConfig;
use buildwatch::transport::{ReqwestTransport, StaticToken};

pub use config::{cmd_config, cmd_config_init};
pub use logs::cmd_logs;
pub use preview::cmd_preview;
pub use status::cmd_status;
pub use watch::cmd_watch;

/// Build the API client from the effective configuration.
pub fn build_api(config: &WatchConfig) -> Result<BuildApi> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("buildwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let transport = ReqwestTransport::new(
        client,
        config.api.base_url.clone(),
        Arc::new(StaticToken(config.api.token.clone())),
    )
    .with_request_timeout(config.request_timeout());
    Ok(BuildApi::new(Arc::new(transport)))
}

/// Resolves when the user presses Ctrl-C. Never resolves if the handler
/// cannot be installed.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
