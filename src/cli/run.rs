use crate::config::parse::load_config;
use crate::lab::LabRegistry;
use std::path::PathBuf;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/labwatch/config.yml");
            eprintln!("  /etc/labwatch/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'labwatch config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_monitor(&config_path).await.map_err(|e| e.into())
}

async fn run_monitor(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let lab_ids: Vec<String> = {
        let mut ids: Vec<_> = config.labs.keys().cloned().collect();
        ids.sort();
        ids
    };

    let registry = LabRegistry::new(config);

    // Start every configured lab up front. Scopes failing construction are
    // skipped; the rest keep running.
    let mut started = 0usize;
    for lab_id in &lab_ids {
        match registry.get(lab_id) {
            Ok(_) => started += 1,
            Err(e) => {
                error!(lab = %lab_id, error = %e, "Failed to start lab monitoring");
            }
        }
    }
    if started == 0 {
        error!("No labs could be started");
    } else {
        info!(labs = started, "Monitoring started");
    }

    // Run until interrupted
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    registry.shutdown_all().await;
    info!("Shutdown complete");
    Ok(())
}
