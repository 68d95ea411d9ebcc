//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Quick Start:
  $ jarpatch init                     # Write a default jarpatch.toml
  $ jarpatch watch /data              # Patch archives written into /data
  $ jarpatch watch --recurse /srv     # ...and every directory below /srv
  $ jarpatch patch build/app.jar      # Patch one archive right now
  $ kill -USR1 <pid>                  # Let a running watcher re-patch archives";

#[derive(Parser, Debug)]
#[command(
    name = "jarpatch",
    version,
    about = "Inject entries into ZIP/JAR archives as soon as they are written",
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to the configuration file (default: ./jarpatch.toml)
    #[arg(short, long, global = true, env = "JARPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch directories and patch archives as they are written
    Watch {
        /// Directories to watch (overrides `watch.roots` from config)
        dirs: Vec<PathBuf>,

        /// Recursively add watches to all subdirectories
        #[arg(short, long)]
        recurse: bool,
    },

    /// Patch archives once, without watching
    Patch {
        /// Archives to patch
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch() {
        let cli = Cli::parse_from(["jarpatch", "watch", "--recurse", "/data", "/srv"]);
        match cli.command {
            Commands::Watch { dirs, recurse } => {
                assert!(recurse);
                assert_eq!(dirs, vec![PathBuf::from("/data"), PathBuf::from("/srv")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_patch_requires_archive() {
        assert!(Cli::try_parse_from(["jarpatch", "patch"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["jarpatch", "config", "--config", "/etc/jarpatch.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/jarpatch.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
