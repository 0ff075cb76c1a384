//! Config validation CLI tool
//!
//! Validates a machine-reaper configuration file and reports any errors.

use reaper_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a machine-reaper configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match reaper_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", reaper_config::CURRENT_CONFIG_VERSION);
            println!("  Endpoint:       {}", config.cloud.sdc_url);
            println!("  Account:        {}", config.cloud.account);
            println!(
                "  Key:            {} ({})",
                config.cloud.key_id,
                config.cloud.key_path.display()
            );
            println!("  Pause:          {}s", config.pause.as_secs());
            println!("  Stop timeout:   {}s", config.stop_timeout.as_secs());
            println!("  Dry run:        {}", config.dry_run);
            println!(
                "  Notify:         {}",
                config.notify_address.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  Notify URL:     {}",
                config.notify_url.as_deref().unwrap_or("(not set)")
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                reaper_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                reaper_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                reaper_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                reaper_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        reaper_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
