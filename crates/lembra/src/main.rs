// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lembra - a multi-channel personal memory assistant.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod serve;

use clap::{Parser, Subcommand};

/// Lembra - a multi-channel personal memory assistant.
#[derive(Parser, Debug)]
#[command(name = "lembra", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the assistant: channels, gateway, and dispatcher.
    Serve,
    /// Check configuration, storage, and channel credentials.
    Doctor,
    /// Validate the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match lembra_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            lembra_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Doctor) => {
            let healthy = doctor::run_doctor(&config).await;
            std::process::exit(if healthy { 0 } else { 1 });
        }
        Some(Commands::Config) => {
            println!(
                "lembra: config ok (agent.name={}, storage={})",
                config.agent.name, config.storage.database_path
            );
        }
        None => {
            println!("lembra: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn default_config_is_valid() {
        let config = lembra_config::load_config_from_str("").expect("defaults deserialize");
        assert!(lembra_config::validation::validate_config(&config).is_ok());
        assert_eq!(config.agent.name, "lembra");
    }
}
