#![forbid(unsafe_code)]

use clap::Parser;
use paddock_lib::config::load_from_path;
use paddock_lib::telemetry::init_tracing;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Paddock admission gate (per-user, per-category rate limiting)")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "config/paddock.toml")]
    config: PathBuf,

    /// Emergency override secret; takes precedence over the config file
    #[arg(long, env = "PADDOCK_EMERGENCY_TOKEN", hide_env_values = true)]
    emergency_token: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    if let Some(token) = cli.emergency_token {
        cfg.admission.emergency.token = Some(token);
    }

    if let Err(err) = init_tracing(&cfg.logging, &cfg.telemetry) {
        eprintln!("failed to initialize tracing: {err}");
        std::process::exit(1);
    }

    info!(
        listen = %cfg.listen,
        routes = cfg.routes.len(),
        enabled = cfg.admission.enabled,
        override_enabled = cfg.admission.emergency.token.as_deref().is_some_and(|t| !t.is_empty()),
        "configuration loaded"
    );

    if let Err(err) = paddock_lib::run(Arc::new(cfg)).await {
        error!(%err, "admission gate exited with error");
        std::process::exit(1);
    }
}
