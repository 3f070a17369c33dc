//! filenode CLI
//!
//! Runs a file node and its maintenance tasks.
//!
//! # Commands
//!
//! - `serve` - Serve the managed directory over HTTP and accept sync triggers
//! - `sync` - Run one sync against the central service and print the report
//! - `scan` - Print the local inventory
//! - `plan` - Print the downloads a sync would perform, without fetching

mod commands;

use clap::{Args, Parser, Subcommand};
use filenode_sync_engine::{RetryConfig, SyncConfig, DEFAULT_MAX_RETRY};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// File node: mirrors the central file directory and serves it over HTTP.
#[derive(Parser)]
#[command(name = "filenode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command.
#[derive(Args, Debug, Clone)]
struct NodeArgs {
    /// Managed directory
    #[arg(global = true, long, env = "WORKDIR", default_value = "file")]
    workdir: PathBuf,

    /// Identifier this node reports to the central service
    #[arg(global = true, long, env = "NODE_UUID", default_value = "non-official")]
    node_id: String,

    /// Base URL of the central directory service
    #[arg(
        global = true,
        long,
        env = "API_URL",
        default_value = "https://apiv3.hayfrp.com"
    )]
    api_url: String,

    /// Minimum seconds between two sync runs
    #[arg(global = true, long, env = "SYNC_COOLDOWN", default_value_t = 300)]
    cooldown: u64,

    /// Retries per file after the first attempt
    #[arg(global = true, long, env = "MAX_RETRY", default_value_t = DEFAULT_MAX_RETRY)]
    max_retry: u32,

    /// Maximum concurrent hashing and download tasks (default: CPU count)
    #[arg(global = true, long, env = "MAX_CONCURRENCY")]
    concurrency: Option<usize>,
}

impl NodeArgs {
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.workdir, &self.node_id, &self.api_url)
            .with_cooldown(Duration::from_secs(self.cooldown))
            .with_retry(RetryConfig::new(self.max_retry));
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the managed directory over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value_t = filenode_server::DEFAULT_PORT)]
        port: u16,

        /// Seconds between scheduled sync runs (0 disables the scheduler)
        #[arg(long, env = "SYNC_INTERVAL", default_value_t = 0)]
        sync_interval: u64,

        /// Base URL advertised in download links
        #[arg(long, env = "PUBLIC_URL")]
        public_url: Option<String>,
    },

    /// Run one sync and print the report
    Sync {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the local inventory
    Scan {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the downloads a sync would perform
    Plan {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.node.sync_config();
    match cli.command {
        Commands::Serve {
            host,
            port,
            sync_interval,
            public_url,
        } => {
            commands::serve::run(
                config,
                (host, port).into(),
                Duration::from_secs(sync_interval),
                public_url,
            )
            .await?;
        }
        Commands::Sync { format } => {
            commands::sync::run(config, &format).await?;
        }
        Commands::Scan { format } => {
            commands::scan::run(&config, &format).await?;
        }
        Commands::Plan { format } => {
            commands::plan::run(config, &format).await?;
        }
        Commands::Version => {
            println!("filenode v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_settings_build_the_sync_config() {
        let cli = Cli::try_parse_from([
            "filenode",
            "sync",
            "--workdir",
            "/srv/files",
            "--node-id",
            "node-7",
            "--api-url",
            "http://central.local",
            "--cooldown",
            "60",
            "--max-retry",
            "5",
            "--concurrency",
            "2",
        ])
        .unwrap();

        let config = cli.node.sync_config();
        assert_eq!(config.root, PathBuf::from("/srv/files"));
        assert_eq!(config.node_id, "node-7");
        assert_eq!(config.api_url, "http://central.local");
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.concurrency, 2);
        assert!(matches!(cli.command, Commands::Sync { .. }));
    }

    #[test]
    fn serve_accepts_host() {
        let cli = Cli::try_parse_from(["filenode", "serve", "--host", "127.0.0.1"]).unwrap();
        match cli.command {
            Commands::Serve { host, .. } => assert_eq!(host.to_string(), "127.0.0.1"),
            _ => panic!("expected serve"),
        }
    }
}
