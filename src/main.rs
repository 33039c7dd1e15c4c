use clap::Parser;
use colored::*;
use ipam_loadtest::cli::Cli;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging with IPAM_LOADTEST_LOG environment variable support
    let log_level = std::env::var("IPAM_LOADTEST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = ipam_loadtest::cli::run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<ipam_loadtest::LoadtestError>() {
            Some(ipam_loadtest::LoadtestError::Config(_)) => 2,
            Some(ipam_loadtest::LoadtestError::Io(_)) => 3,
            Some(ipam_loadtest::LoadtestError::Network(_)) => 4,
            Some(ipam_loadtest::LoadtestError::Api(_)) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}
