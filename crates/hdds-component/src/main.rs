// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Component Server
//!
//! Serves the bundled components on one Unix socket:
//! - `memory` pub/sub (in-process topics)
//! - `ticker` input binding (counter at a fixed interval)
//! - `echo` output binding
//!
//! # Usage
//!
//! ```bash
//! # Socket at /tmp/dapr-components-sockets/memory.sock
//! hdds-component
//!
//! # Custom name, folder and config
//! hdds-component --name local --socket-folder /var/run/components --config component.json
//! ```

use clap::Parser;
use hdds_component::components::{EchoBinding, MemoryPubSub, TickerBinding};
use hdds_component::{
    ComponentConfig, ComponentOptions, ComponentRegistry, InputBinding, OutputBinding, PubSub,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// HDDS Component Server - pluggable pub/sub and bindings over Unix sockets
#[derive(Parser, Debug)]
#[command(name = "hdds-component")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Component name (socket is <socket-folder>/<name>.sock)
    #[arg(short, long, default_value = "memory")]
    name: String,

    /// Socket folder (overrides config and environment)
    #[arg(short, long)]
    socket_folder: Option<PathBuf>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Ticker input binding interval in milliseconds
    #[arg(long, default_value = "1000")]
    tick_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load or create config
    let mut config = match &args.config {
        Some(path) => ComponentConfig::from_file(path)?,
        None => ComponentConfig::default(),
    }
    .with_env();
    if let Some(folder) = args.socket_folder {
        config.socket_folder = folder;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    // Initialize logging
    let level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded config from {:?}", path);
    }
    if args.tick_interval_ms == 0 {
        return Err("tick interval must be greater than 0".into());
    }

    let socket = config.socket_path(&args.name);
    info!("+----------------------------------------------------+");
    info!(
        "|       HDDS Component Server v{}               |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Socket: {:40} |", socket.display().to_string());
    info!(
        "|  Ticker: {:40} |",
        format!("{}ms", args.tick_interval_ms)
    );
    info!(
        "|  Acks:   {:40} |",
        format!("{}s deadline", config.dispatch_timeout_secs)
    );
    info!("+----------------------------------------------------+");

    let dispatch_timeout = config.dispatch_timeout();
    let tick_interval = Duration::from_millis(args.tick_interval_ms);

    let options = ComponentOptions::new()
        .with_pubsub(move || Ok(Arc::new(MemoryPubSub::new(dispatch_timeout)) as Arc<dyn PubSub>))
        .with_input_binding(move || {
            Ok(Arc::new(TickerBinding::new(tick_interval, dispatch_timeout)) as Arc<dyn InputBinding>)
        })
        .with_output_binding(|| Ok(Arc::new(EchoBinding::new()) as Arc<dyn OutputBinding>));

    let mut registry = ComponentRegistry::new();
    registry.register(args.name, options);

    // Handle shutdown signals
    let shutdown = CancellationToken::new();
    let _signals = hdds_component::shutdown::cancel_on_signal(shutdown.clone())?;

    hdds_component::run(registry, config, shutdown).await?;

    info!("Component server stopped");
    Ok(())
}
