//! Init and Config commands.

use std::path::Path;

use crate::config::Settings;

/// Run init command - create configuration file.
pub fn run_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    match Settings::init_config_file(config_path, force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(())
        }
        Err(e) => anyhow::bail!("{e}"),
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
