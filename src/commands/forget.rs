//! Forget command handler: drop manifest entries so items are reprocessed.

use std::path::Path;

use anyhow::{Context, Result, bail};
use archiver_core::config::ArchiverConfig;
use archiver_core::ledger::{EntryStatus, LedgerEntry, ManifestStore};
use tracing::info;

use crate::cli::{ForgetArgs, manifest_overrides};

pub fn run_forget_command(config_path: Option<&Path>, args: &ForgetArgs) -> Result<Vec<String>> {
    if args.is_empty() {
        bail!("nothing selected: pass --status, --id, or --missing-files");
    }

    let config = ArchiverConfig::load(config_path, &manifest_overrides(args.manifest.as_deref()))
        .context("failed to load configuration")?;
    let store = ManifestStore::new(&config.manifest_path);
    let mut ledger = store.load()?;

    let removed = ledger.forget_where(|key, entry| is_selected(args, key, entry));
    if !removed.is_empty() {
        store.persist(&ledger)?;
    }
    info!(removed = removed.len(), "forget complete");

    println!(
        "Forgot {} manifest entr{} in {}",
        removed.len(),
        if removed.len() == 1 { "y" } else { "ies" },
        store.path().display()
    );
    Ok(removed)
}

fn is_selected(args: &ForgetArgs, key: &str, entry: &LedgerEntry) -> bool {
    if args.statuses.contains(&entry.status) {
        return true;
    }
    if key.parse::<u64>().is_ok_and(|id| args.ids.contains(&id)) {
        return true;
    }
    args.missing_files
        && entry.status == EntryStatus::Success
        && entry.output_path.as_deref().is_none_or(|path| !path.exists())
}
