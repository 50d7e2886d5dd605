//! Sync command handler: archive new items from one folder.

use std::path::Path;

use anyhow::{Context, Result};
use archiver_core::api::{Session, build_http_client};
use archiver_core::archive::ItemTransformer;
use archiver_core::config::{ArchiverConfig, credential_from_env};
use archiver_core::ledger::ManifestStore;
use archiver_core::sync::{SyncEngine, SyncReport};
use tracing::{debug, info};

use crate::cli::SyncArgs;

pub async fn run_sync_command(config_path: Option<&Path>, args: &SyncArgs) -> Result<SyncReport> {
    let config = ArchiverConfig::load(config_path, &args.overrides())
        .context("failed to load configuration")?;
    let credential = credential_from_env()?;
    debug!(
        folder = %config.folder,
        output_dir = %config.output_dir.display(),
        manifest = %config.manifest_path.display(),
        "sync configuration"
    );

    let http = build_http_client(config.timeouts)?;
    let session = Session::establish(http, &credential, &config.api_base_url, config.retry_policy())
        .await
        .context("failed to authenticate with the bookmark service")?;
    info!("authenticated");

    let engine = SyncEngine::new(
        config.sync_options(),
        ItemTransformer::new(&config.output_dir),
        ManifestStore::new(&config.manifest_path),
    );
    let report = engine
        .run(&session, &config.folder)
        .await
        .with_context(|| format!("sync of folder '{}' failed", config.folder))?;

    println!(
        "Archived {} new item(s) from '{}' into {}",
        report.archived,
        config.folder,
        config.output_dir.display()
    );
    if report.has_failures() {
        println!(
            "Failures: {} fetch, {} conversion, {} write (write failures are retried next run)",
            report.fetch_failed, report.conversion_failed, report.persist_failed
        );
    }
    if report.skipped > 0 {
        println!("Skipped {} item(s) already in the manifest", report.skipped);
    }
    Ok(report)
}
