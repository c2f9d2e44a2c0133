// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Taskpilot - a natural-language todo assistant.
//!
//! Binary entry point: loads and validates configuration, then dispatches
//! to the selected subcommand.

use clap::{Parser, Subcommand};

mod serve;

/// Taskpilot - a natural-language todo assistant.
#[derive(Parser, Debug)]
#[command(name = "taskpilot", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Taskpilot HTTP server.
    Serve,
    /// Delete audit records older than the retention window.
    Cleanup {
        /// Override the configured retention window in days.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Mint a JWT for the given user, printed to stdout.
    Token {
        /// Subject claim for the token.
        user: String,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 86_400)]
        ttl_secs: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match taskpilot_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("taskpilot: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(errors) = taskpilot_config::validate(&config) {
        for error in &errors {
            eprintln!("{error}");
        }
        std::process::exit(1);
    }

    let result = match cli.command {
        Some(Commands::Serve) | None => serve::run_serve(config).await,
        Some(Commands::Cleanup { days }) => serve::run_cleanup(config, days).await,
        Some(Commands::Token { user, ttl_secs }) => serve::run_token(&config, &user, ttl_secs),
    };

    if let Err(e) = result {
        eprintln!("taskpilot: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn defaults_to_serve_when_no_subcommand() {
        let cli = Cli::parse_from(["taskpilot"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cleanup_accepts_days_override() {
        let cli = Cli::parse_from(["taskpilot", "cleanup", "--days", "7"]);
        match cli.command {
            Some(Commands::Cleanup { days }) => assert_eq!(days, Some(7)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn token_has_a_day_long_default_ttl() {
        let cli = Cli::parse_from(["taskpilot", "token", "alice"]);
        match cli.command {
            Some(Commands::Token { user, ttl_secs }) => {
                assert_eq!(user, "alice");
                assert_eq!(ttl_secs, 86_400);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
