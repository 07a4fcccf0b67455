//! Configuration view and validation commands: `slotboard config`.

use std::path::Path;

use anyhow::Result;

use slotboard::config::SlotboardConfig;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = SlotboardConfig::project_path(project_dir);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No slotboard.toml found at {}", config_path.display());
                println!("Run 'slotboard config init' to create one.");
            }
            println!();

            let config = cli.config(project_dir)?;
            println!("Effective values (with env/CLI overrides):");
            println!("[server]");
            println!("  api_url = \"{}\"", config.server.api_url);
            println!("  ws_url = \"{}\"", config.server.ws_url);
            println!("  port = {}", config.server.port);
            println!("  db_path = \"{}\"", config.server.db_path.display());
            println!("[board]");
            println!("  hide_waitlist = {}", config.board.hide_waitlist);
            println!("[reconnect]");
            println!("  backoff_ms = {}", config.reconnect.backoff_ms);
            println!("  max_retries = {}", config.reconnect.max_retries);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No slotboard.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = SlotboardConfig::load(&config_path)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("slotboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            SlotboardConfig::default().save(&config_path)?;
            println!("Created slotboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] api_url, ws_url, port, db_path");
            println!("  - [board] hide_waitlist");
            println!("  - [reconnect] backoff_ms, max_retries");
            println!();
        }
    }

    Ok(())
}
