//! CLI argument definitions using clap derive macros.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use archiver_core::config::{ConfigOverrides, MAX_RETRY_ATTEMPTS};
use archiver_core::ledger::EntryStatus;

/// Incrementally archive saved articles into local Markdown.
///
/// Archiver pages through a bookmark folder, converts every article it has
/// not archived yet, and records each outcome in a manifest so interrupted
/// runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to <config dir>/archiver/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Archive every new item in a folder
    Sync(SyncArgs),

    /// Show manifest counts per status
    Status(StatusArgs),

    /// Remove manifest entries so the items are processed again
    Forget(ForgetArgs),
}

/// Arguments for `archiver sync`.
#[derive(clap::Args, Debug, Default)]
pub struct SyncArgs {
    /// Folder name or id (unread, starred, archive, or a folder title)
    #[arg(short, long)]
    pub folder: Option<String>,

    /// Directory for the Markdown documents
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Manifest file path
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Attempts per API call for transient failures (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RETRY_ATTEMPTS)))]
    pub max_retries: Option<u32>,

    /// Pause after each article fetch in milliseconds (0 to disable, max 60000)
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub delay_ms: Option<u64>,
}

impl SyncArgs {
    /// Converts the flags into configuration overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            folder: self.folder.clone(),
            output_dir: self.output_dir.clone(),
            manifest: self.manifest.clone(),
            max_retries: self.max_retries,
            item_delay_ms: self.delay_ms,
        }
    }
}

/// Arguments for `archiver status`.
#[derive(clap::Args, Debug, Default)]
pub struct StatusArgs {
    /// Manifest file path
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,
}

/// Arguments for `archiver forget`.
#[derive(clap::Args, Debug, Default)]
pub struct ForgetArgs {
    /// Manifest file path
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Forget every entry with this status (repeatable)
    #[arg(short, long = "status", value_name = "STATUS")]
    pub statuses: Vec<EntryStatus>,

    /// Forget this item id (repeatable)
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<u64>,

    /// Forget successful entries whose document no longer exists
    #[arg(long)]
    pub missing_files: bool,
}

impl ForgetArgs {
    /// True if no selector was given.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.ids.is_empty() && !self.missing_files
    }
}

/// Overrides that only carry a manifest path.
pub fn manifest_overrides(manifest: Option<&Path>) -> ConfigOverrides {
    ConfigOverrides {
        manifest: manifest.map(Path::to_path_buf),
        ..ConfigOverrides::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_sync_defaults() {
        let args = Args::try_parse_from(["archiver", "sync"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        let Command::Sync(sync) = args.command else {
            panic!("expected sync");
        };
        assert!(sync.folder.is_none());
        assert!(sync.max_retries.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["archiver", "-vv", "status"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["archiver", "status", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["archiver", "-q", "status"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_requires_command() {
        let err = Args::try_parse_from(["archiver"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["archiver", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["archiver", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_sync_flags_become_overrides() {
        let args = Args::try_parse_from([
            "archiver",
            "--config",
            "/tmp/a.toml",
            "sync",
            "--folder",
            "Research",
            "-o",
            "/tmp/vault",
            "--max-retries",
            "3",
            "--delay-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/a.toml")));
        let Command::Sync(sync) = args.command else {
            panic!("expected sync");
        };
        let overrides = sync.overrides();
        assert_eq!(overrides.folder.as_deref(), Some("Research"));
        assert_eq!(overrides.output_dir, Some(PathBuf::from("/tmp/vault")));
        assert_eq!(overrides.max_retries, Some(3));
        assert_eq!(overrides.item_delay_ms, Some(0));
    }

    #[test]
    fn test_cli_max_retries_range() {
        assert!(Args::try_parse_from(["archiver", "sync", "-r", "0"]).is_err());
        assert!(Args::try_parse_from(["archiver", "sync", "-r", "11"]).is_err());
        assert!(Args::try_parse_from(["archiver", "sync", "-r", "10"]).is_ok());
    }

    #[test]
    fn test_cli_delay_range() {
        assert!(Args::try_parse_from(["archiver", "sync", "-d", "60001"]).is_err());
    }

    #[test]
    fn test_cli_forget_selectors() {
        let args = Args::try_parse_from([
            "archiver",
            "forget",
            "--status",
            "text_fetch_failed",
            "--status",
            "markdown_conversion_failed",
            "--id",
            "42",
            "--missing-files",
        ])
        .unwrap();
        let Command::Forget(forget) = args.command else {
            panic!("expected forget");
        };
        assert_eq!(
            forget.statuses,
            vec![
                EntryStatus::TextFetchFailed,
                EntryStatus::MarkdownConversionFailed
            ]
        );
        assert_eq!(forget.ids, vec![42]);
        assert!(forget.missing_files);
        assert!(!forget.is_empty());
    }

    #[test]
    fn test_cli_forget_rejects_unknown_status() {
        assert!(Args::try_parse_from(["archiver", "forget", "--status", "pending"]).is_err());
    }

    #[test]
    fn test_cli_forget_without_selectors_is_empty() {
        let args = Args::try_parse_from(["archiver", "forget"]).unwrap();
        let Command::Forget(forget) = args.command else {
            panic!("expected forget");
        };
        assert!(forget.is_empty());
    }
}
