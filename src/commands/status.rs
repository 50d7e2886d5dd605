//! Status command handler: summarize the manifest.

use std::path::Path;

use anyhow::{Context, Result};
use archiver_core::config::ArchiverConfig;
use archiver_core::ledger::{EntryStatus, LedgerSummary, ManifestStore};

use crate::cli::{StatusArgs, manifest_overrides};

pub fn run_status_command(config_path: Option<&Path>, args: &StatusArgs) -> Result<LedgerSummary> {
    let config = ArchiverConfig::load(config_path, &manifest_overrides(args.manifest.as_deref()))
        .context("failed to load configuration")?;
    let store = ManifestStore::new(&config.manifest_path);
    let ledger = store.load()?;
    let summary = ledger.summary();

    println!("Manifest: {}", store.path().display());
    if ledger.is_empty() {
        println!("No items recorded yet.");
        return Ok(summary);
    }
    println!("  {:<28} {}", EntryStatus::Success.as_str(), summary.success);
    println!("  {:<28} {}", EntryStatus::TextFetchFailed.as_str(), summary.text_fetch_failed);
    println!(
        "  {:<28} {}",
        EntryStatus::MarkdownConversionFailed.as_str(),
        summary.markdown_conversion_failed
    );
    println!("  {:<28} {}", "total", summary.total());
    Ok(summary)
}
