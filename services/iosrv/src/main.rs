//! I/O server (`iosrv`)
//!
//! Serves the shared-memory process image to HMI clients, polls a Modbus
//! device, and sends one-shot commands or reads from either backend.

mod app;
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use common::config::{BackendConfig, IoConfig};
use common::{init_logging, spawn_shutdown_watcher};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use cli::{Cli, Commands};

/// Apply command-line overrides on top of file and environment settings
fn effective_config(cli: &Cli) -> Result<IoConfig> {
    let mut config = IoConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Commands::Serve { path, area_size } = &cli.command {
        if let Some(path) = path {
            config.shm.path = path.clone();
        }
        if let Some(area_size) = area_size {
            config.shm.area_size = *area_size;
        }
    }
    if let Commands::Poll {
        interval_ms: Some(ms),
    } = &cli.command
    {
        config.shm.poll_interval_ms = *ms;
        config.modbus.poll_interval_ms = *ms;
    }
    config.validate()?;
    Ok(config)
}

fn poll_interval(backend: &BackendConfig) -> Duration {
    match backend {
        BackendConfig::Shm(shm) => shm.poll_interval(),
        BackendConfig::Modbus(modbus) => modbus.poll_interval(),
    }
}

/// Run a blocking body off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> errors::DriverResult<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = effective_config(&cli)?;
    init_logging(&config.logging)?;

    let backend = config.backend_config();
    let result = match cli.command {
        Commands::Serve { .. } => {
            let shm = config.shm.clone();
            let stop = Arc::new(AtomicBool::new(false));
            let watcher = spawn_shutdown_watcher(Arc::clone(&stop));
            info!("Serving shm segment {:?}", shm.path);
            let result = blocking(move || app::serve(&shm, &stop)).await;
            watcher.abort();
            result
        },
        Commands::Poll { .. } => {
            let interval = poll_interval(&backend);
            let stop = Arc::new(AtomicBool::new(false));
            let watcher = spawn_shutdown_watcher(Arc::clone(&stop));
            info!("Polling {:?} every {:?}", config.backend, interval);
            let result = blocking(move || app::poll(&backend, interval, stop)).await;
            watcher.abort();
            result
        },
        Commands::Send { request } => {
            let request = request.into_request()?;
            blocking(move || app::send(&backend, &request)).await
        },
        Commands::Read {
            addresses,
            data_type,
            json,
        } => blocking(move || app::read(&backend, &addresses, data_type))
            .await
            .and_then(|readings| {
                for reading in readings {
                    if json {
                        println!("{}", serde_json::to_string(&reading)?);
                    } else {
                        println!("{} = {}", reading.address, reading.value);
                    }
                }
                Ok(())
            }),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        },
    };

    if let Err(e) = &result {
        error!("iosrv failed: {:#}", e);
    }
    result
}
