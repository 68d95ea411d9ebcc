use std::path::{Path, PathBuf};

use clap::Parser;
use jarpatch::cli::commands::{init, patch, watch};
use jarpatch::cli::{Cli, Commands};
use jarpatch::config::{CONFIG_FILE_NAME, Settings};

/// Directory that relative payload paths are resolved against.
fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    let settings = match Settings::load(Some(config_path.as_path())) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    jarpatch::logging::init_with_config(&settings.logging);

    let base_dir = base_dir(&config_path);
    let result = match cli.command {
        Commands::Watch { dirs, recurse } => {
            watch::run_watch(settings, dirs, recurse, &base_dir).await
        }
        Commands::Patch { archives } => patch::run_patch(&settings, &archives, &base_dir),
        Commands::Init { force } => init::run_init(&config_path, force),
        Commands::Config => init::run_config(&settings),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}
