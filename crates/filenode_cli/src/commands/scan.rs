//! Scan command implementation.

use filenode_protocol::Inventory;
use filenode_sync_engine::{scan, ManagedRoot, SyncConfig, TaskPool};

/// Runs the scan command.
pub async fn run(config: &SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let root = ManagedRoot::open(&config.root)?;
    let inventory = scan(&root, &TaskPool::new(config.concurrency)).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&inventory)?);
        }
        _ => {
            print!("{}", render_text(&inventory));
        }
    }

    Ok(())
}

/// One `<digest>  <path>` line per file, the layout of `sha256sum`.
fn render_text(inventory: &Inventory) -> String {
    inventory
        .iter()
        .map(|(path, digest)| format!("{digest}  {path}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filenode_protocol::{Digest, RelativePath};

    #[test]
    fn sha256sum_layout() {
        let mut inventory = Inventory::new();
        inventory.insert(RelativePath::new("b/x").unwrap(), Digest::of(b"abc"));
        assert_eq!(
            render_text(&inventory),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  b/x\n"
        );
    }

    #[tokio::test]
    async fn scans_configured_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let config = SyncConfig::new(dir.path(), "n", "http://127.0.0.1:9");
        run(&config, "json").await.unwrap();
    }
}
