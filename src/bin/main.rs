use std::path::PathBuf;

use clap::Parser;
use timeloom::{config, daemon, telemetry};

#[derive(Debug, Parser)]
#[command(name = "timeloom", about = "Session synchronization server for the timeline puzzle game")]
struct Cli {
    /// Listen address, e.g. 0.0.0.0:3000.
    #[arg(long)]
    listen: Option<String>,

    /// SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let mut cfg = match cli.config.as_deref() {
        Some(path) => match config::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("config load failed, using defaults: {err}");
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };
    config::apply_env_overrides(&mut cfg);
    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(db) = cli.db {
        cfg.database = db;
    }

    if let Err(e) = daemon::run(cfg).await {
        tracing::error!("error: {}", e);
        std::process::exit(1);
    }
}
