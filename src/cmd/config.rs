//! Configuration view and validation commands, `garden config`.

use anyhow::{Context, Result};

use garden::config::Config;

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Garden Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No garden.toml found at {}", config_path.display());
                println!("Using default configuration. Run 'garden init' to create one.");
            }
            println!();

            let rendered = toml::to_string_pretty(&config.settings)
                .context("Failed to render configuration")?;
            println!("Effective values (with env/CLI overrides):");
            println!();
            println!("{}", rendered.trim_end());
            println!();

            let key_var = &config.settings.oracle.api_key_env;
            let key_state = if std::env::var(key_var).is_ok_and(|v| !v.trim().is_empty()) {
                console::style("set").green()
            } else {
                console::style("missing").red()
            };
            println!("{}: {}", key_var, key_state);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No garden.toml found. Using defaults (valid).");
                return Ok(());
            }

            let mut warnings = config.validate();
            if let Err(e) = config.settings.stage_plan() {
                warnings.push(format!("{:#}", e));
            }

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
    }

    Ok(())
}
