//! Goal reminder daemon.
//!
//! Loads the engine configuration, then reads newline-delimited JSON
//! commands from stdin and writes one JSON response per command to stdout.
//! Runs until stdin closes or Ctrl-C, then stops every tracker.
//!
//! All tracing output goes to stderr so that stdout remains a clean JSON
//! protocol channel.
//!
//! Usage: `goalkeeperd [config.toml]`

use goalkeeper::command::serve;
use goalkeeper::notify::build_notifier;
use goalkeeper::store::build_store;
use goalkeeper::{EngineConfig, GoalEngine};
use std::path::PathBuf;
use tokio::io::BufReader;

fn load_config() -> anyhow::Result<EngineConfig> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(EngineConfig::default_config_path);

    let config = match EngineConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config");
            config
        }
        Err(e) if explicit.is_none() => {
            tracing::info!(
                path = %path.display(),
                error = %e,
                "no usable config at default path, using defaults"
            );
            EngineConfig::default()
        }
        Err(e) => return Err(anyhow::anyhow!("cannot load {}: {e}", path.display())),
    };

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let store = build_store(&config.store)?;
    let notifier = build_notifier(&config.notifier)?;
    let engine = GoalEngine::new(config.tracker.clone(), store, notifier);

    tracing::info!(
        interval_secs = config.tracker.interval_secs,
        day_boundary = %config.tracker.day_boundary,
        "goalkeeperd starting"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = serve(&engine, stdin, stdout) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "command loop failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        }
    }

    let stopped = engine.shutdown().await;
    tracing::info!(trackers = stopped, "goalkeeperd shut down cleanly");
    Ok(())
}
