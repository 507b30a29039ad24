//! Configuration view and setup commands (`buildwatch config`).

use anyhow::{Context, Result};
use std::path::Path;

use buildwatch::config::{CONFIG_FILE, PROJECT_DIR, WatchConfig};

use super::super::ConfigCommands;

pub fn cmd_config(
    config: &WatchConfig,
    source: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Buildwatch Configuration");
            println!("========================");
            println!();
            match source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No config file found; using defaults"),
            }
            println!("Effective values (file, env and CLI overrides applied):");
            println!();
            let shown = toml::to_string_pretty(&config.redacted())
                .context("Failed to serialize configuration")?;
            println!("{}", shown);
            print_warnings(config);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid");
            } else {
                print_warnings(config);
            }
        }
        Some(ConfigCommands::Init { force }) => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            cmd_config_init(source, &cwd, force)?;
        }
    }
    Ok(())
}

/// Write a default config file to `target`, or the project location under `cwd`.
pub fn cmd_config_init(target: Option<&Path>, cwd: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let path = match target {
        Some(path) => path.to_path_buf(),
        None => cwd.join(PROJECT_DIR).join(CONFIG_FILE),
    };

    if path.exists() && !force {
        let confirm = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Init cancelled");
            return Ok(());
        }
    }

    WatchConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn print_warnings(config: &WatchConfig) {
    let warnings = config.validate();
    if warnings.is_empty() {
        return;
    }
    println!("Warnings:");
    for warning in warnings {
        println!("  - {}", warning);
    }
}
