//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use clap::{Arg, Command};
use config::{Config, LoggingFmtStyle};
use tokio::sync::mpsc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;
use ursa_bgp::instance;
use ursa_utils::task::Task;

fn init_tracing(config: &config::Logging) {
    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.show_thread_id)
            .with_file(config.stdout.show_source)
            .with_line_number(config.stdout.show_source)
            .with_ansi(config.stdout.colors);
        let layer = match config.stdout.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Configure the tracing fmt layer.
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("ursa=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .init();
}

#[tokio::main]
async fn main() {
    // Parse command-line parameters.
    let matches = Command::new("ursad")
        .version(env!("CARGO_PKG_VERSION"))
        .about("BGP speaker")
        .arg(
            Arg::new("config")
                .short('f')
                .long("config-file")
                .value_name("FILE")
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Read configuration file.
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let data = std::fs::read_to_string(path).unwrap_or_else(|error| {
                eprintln!("failed to read configuration file: {}", error);
                std::process::exit(1);
            });
            toml::from_str(&data).unwrap_or_else(|error| {
                eprintln!("failed to parse configuration file: {}", error);
                std::process::exit(1);
            })
        }
        None => Config::default(),
    };

    // Initialize tracing.
    init_tracing(&config.logging);

    // Spawn the BGP instance.
    let (event_txp, mut event_rxc) = mpsc::unbounded_channel();
    let (api, _instance_task) = instance::spawn(config.instance, event_txp);

    // Provision the configured neighbors.
    for (addr, nbr_config) in config.neighbors {
        api.add_neighbor(addr, nbr_config).await;
    }

    // Log session events until a routing table consumer takes their place.
    let _event_task = Task::spawn(async move {
        while let Some(event) = event_rxc.recv().await {
            info!(?event, "peer event");
        }
    });

    // Run until interrupted.
    let _ = tokio::signal::ctrl_c().await;
    info!("exiting");
}
