//! Sync command implementation.

use filenode_sync_engine::{HttpRemote, SyncConfig, SyncEngine, SyncReport};
use std::time::Duration;

/// Runs the sync command.
///
/// A one-shot run has no earlier run to cool down from, so the cooldown is
/// not applied. Fails if any file could not be downloaded.
pub async fn run(config: SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.with_cooldown(Duration::ZERO);
    let remote = HttpRemote::from_config(&config)?;
    let engine = SyncEngine::new(config, remote)?;

    let report = engine.sync().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print!("{}", render_text(&report));
        }
    }

    if !report.is_clean() {
        return Err(format!("{} file(s) failed to download", report.failures.len()).into());
    }
    Ok(())
}

fn render_text(report: &SyncReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run:        {}\n", report.run_id));
    out.push_str(&format!("Planned:    {}\n", report.attempted));
    out.push_str(&format!("Downloaded: {}\n", report.succeeded));
    out.push_str(&format!("Bytes:      {}\n", report.bytes_downloaded));
    out.push_str(&format!("Duration:   {} ms\n", report.duration_ms));
    if report.deadline_exceeded {
        out.push_str("Run deadline exceeded\n");
    }
    if !report.failures.is_empty() {
        out.push_str(&format!("Failed:     {}\n", report.failures.len()));
        for path in &report.failures {
            out.push_str(&format!("  {path}\n"));
        }
    }
    out
}
