// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use clap::{CommandFactory, Parser};
use common::settings::{EnergySettings, GeolocatorConfig};
use geolocator::{Capabilities, Geolocator, GeolocatorHandle, SourceFactory};
use gnss::{
    gpsd_source::GpsdSourceFactory,
    replay_source::{ReplaySourceFactory, read_track_file},
};
use module_core::{Event, EventBus, EventKind, Module};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const REPLAY_VELOCITY: f64 = 10.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the gpsd daemon, e.g. 127.0.0.1:2947
    #[arg(short = 'd', long)]
    gpsd: Option<String>,
    /// CSV file (longitude, latitude) of a track to replay
    #[arg(short = 'r', long)]
    replay: Option<PathBuf>,
    /// Interval of the replayed fixes
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
    /// JSON file with the geolocator configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print a single position and exit
    #[arg(long)]
    once: bool,
    /// Timeout of the single position request
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Include the heading
    #[arg(long)]
    heading: bool,
    /// Minimum distance in meters between reported positions
    #[arg(long, default_value_t = 0.0)]
    min_distance: f64,
    /// Defer updates for the given number of seconds
    #[arg(long, value_name = "SECONDS")]
    defer: Option<u64>,
    /// Listen for significant changes only
    #[arg(long)]
    significant: bool,
}

fn load_config(cli: &Cli) -> Result<GeolocatorConfig, ()> {
    let Some(path) = &cli.config else {
        return Ok(GeolocatorConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|e| {
        error!("Failed to read config file {:?}. Error: {}", path, e);
    })?;
    GeolocatorConfig::from_json(&json).map_err(|e| {
        error!("Failed to parse config file {:?}. Error: {}", path, e);
    })
}

fn create_source_factory(cli: &Cli) -> Result<(Arc<dyn SourceFactory>, Capabilities), ()> {
    if let Some(address) = &cli.gpsd {
        let factory = GpsdSourceFactory::new(address).map_err(|e| {
            error!("Invalid gpsd address {}. Error: {}", address, e);
        })?;
        Ok((Arc::new(factory), Capabilities::default()))
    } else if let Some(track_file) = &cli.replay {
        let points = read_track_file(track_file).map_err(|e| {
            error!("Failed to read track file {:?}. Error: {}", track_file, e);
        })?;
        let factory = ReplaySourceFactory::new(
            points,
            REPLAY_VELOCITY,
            Duration::from_millis(cli.interval_ms),
        )
        .map_err(|e| {
            error!("Failed to create replay source. Error: {}", e);
        })?;
        Ok((Arc::new(factory), ReplaySourceFactory::capabilities()))
    } else {
        error!("No location source specified. Use --gpsd or --replay");
        let _ = Cli::command().print_help();
        Err(())
    }
}

fn energy_settings(cli: &Cli) -> Option<EnergySettings> {
    if cli.defer.is_none() && !cli.significant {
        return None;
    }
    Some(EnergySettings {
        defer_location_updates: cli.defer.is_some(),
        listen_for_significant_changes: cli.significant,
        deferral_distance_meters: None,
        deferral_time: cli.defer.map(Duration::from_secs),
    })
}

async fn print_position(handle: &GeolocatorHandle, cli: &Cli) -> Result<(), ()> {
    let timeout = cli.timeout_ms.map(Duration::from_millis);
    match handle.get_position(timeout, None, cli.heading).await {
        Ok(position) => {
            match serde_json::to_string(&position) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to serialize position. Error: {}", e),
            }
            Ok(())
        }
        Err(e) => {
            error!("Failed to get position. Error: {}", e);
            Err(())
        }
    }
}

async fn listen(handle: &GeolocatorHandle, cli: &Cli) -> Result<(), ()> {
    let mut events = handle.subscribe();
    handle
        .start_listening(
            Duration::ZERO,
            cli.min_distance,
            cli.heading,
            energy_settings(cli),
        )
        .await
        .map_err(|e| {
            error!("Failed to start listening. Error: {}", e);
        })?;
    info!("Listening for positions, press Ctrl-C to stop");
    loop {
        match events.recv().await {
            Ok(event) => match event.kind {
                EventKind::PositionChangedEvent(position) => match serde_json::to_string(&*position) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!("Failed to serialize position. Error: {}", e),
                },
                EventKind::PositionErrorEvent(e) => warn!("Position error: {}", e),
                EventKind::QuitEvent => break,
            },
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = load_config(&cli)?;
    let (factory, capabilities) = create_source_factory(&cli)?;
    let eb = EventBus::default();
    let quit_sender = eb.context().sender;
    ctrlc::set_handler(move || {
        let _ = quit_sender.send(Event {
            kind: EventKind::QuitEvent,
        });
    })
    .map_err(|e| {
        error!("Failed to install Ctrl-C handler. Error: {}", e);
    })?;

    let (mut geolocator, handle) = Geolocator::new(eb.context(), factory, capabilities, config);
    info!("Starting geolocator...");
    let module = tokio::spawn(async move { geolocator.run().await });

    let result = if cli.once {
        print_position(&handle, &cli).await
    } else {
        listen(&handle, &cli).await
    };

    eb.publish(&Event {
        kind: EventKind::QuitEvent,
    });
    match module.await {
        Ok(module_result) => result.and(module_result),
        Err(e) => {
            error!("Geolocator task failed. Error: {}", e);
            Err(())
        }
    }
}
