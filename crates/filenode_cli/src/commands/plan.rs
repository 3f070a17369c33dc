//! Plan command implementation.

use filenode_protocol::DownloadTask;
use filenode_sync_engine::{HttpRemote, SyncConfig, SyncEngine};

/// Runs the plan command: prints what a sync would download right now.
pub async fn run(config: SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let remote = HttpRemote::from_config(&config)?;
    let engine = SyncEngine::new(config, remote)?;
    let tasks = engine.plan().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        _ => {
            print!("{}", render_text(&tasks));
        }
    }

    Ok(())
}

fn render_text(tasks: &[DownloadTask]) -> String {
    if tasks.is_empty() {
        return "Up to date\n".to_string();
    }
    let mut out = format!("{} file(s) to download\n", tasks.len());
    for task in tasks {
        out.push_str(&format!("  {}  {}\n", task.expected, task.path));
    }
    out
}
