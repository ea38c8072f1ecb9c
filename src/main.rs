// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod audio;
mod config;
mod controller;
mod sensor;
mod trigger;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};

use crate::config::ConfigModel;
use crate::controller::{keyboard, Controller};
use crate::trigger::Engine;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A capacitive touch sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the sample files discovered for each channel and slot.
    Assets {
        /// The path to the sample repository on disk.
        tracks: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Starts the touch player.
    Start {
        /// The path to the sample repository on disk.
        tracks: String,
        /// The sensor device name. Use "mock" for a simulated sensor.
        #[arg(long, default_value = "mpr121")]
        sensor: String,
        /// The audio output device name. Use "mock" for a simulated output.
        #[arg(long, default_value = "default")]
        audio_device: String,
        /// The configuration document to load at startup, if it exists.
        #[arg(long, default_value = "config.json")]
        config: String,
        /// The polling period in milliseconds.
        #[arg(long, default_value_t = 100)]
        period_ms: u64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Assets { tracks } => {
            let found = audio::bank::discover(
                &PathBuf::from(&tracks),
                config::NUM_CHANNELS,
                config::NUM_SLOTS,
            );

            if found.is_empty() {
                println!("No samples found in {}.", tracks.as_str());
                return Ok(());
            }

            println!("Samples (count: {}):", found.len());
            for (channel, slot, path) in found {
                println!("- E{} slot {}: {}", channel, slot, path.display());
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start {
            tracks,
            sensor,
            audio_device,
            config,
            period_ms,
        } => {
            let sensor = crate::sensor::get_device(&sensor, config::NUM_CHANNELS)?;
            let audio = audio::get_device(
                &audio_device,
                &PathBuf::from(&tracks),
                config::NUM_CHANNELS,
                config::NUM_SLOTS,
            )?;

            info!(sensor = %sensor, audio = %audio, "Devices ready.");

            let model = Arc::new(ConfigModel::new(config::NUM_CHANNELS, config::NUM_SLOTS));
            let config_path = PathBuf::from(&config);
            if config_path.exists() {
                if let Err(err) = model.load(&config_path, sensor.as_ref()) {
                    error!(
                        err = %err,
                        path = %config_path.display(),
                        "Unable to load configuration, continuing with defaults."
                    );
                }
            } else {
                model.apply_thresholds(sensor.as_ref());
            }

            let engine = Arc::new(Engine::new(
                Arc::clone(&sensor),
                Arc::clone(&audio),
                Arc::clone(&model),
                Duration::from_millis(period_ms),
            ));
            engine.start();

            let controller = Controller::new(
                engine,
                model,
                sensor,
                audio,
                Arc::new(keyboard::Driver::new()),
            );
            controller
                .join()
                .map_err(|_| "controller thread panicked")?;
        }
    }

    Ok(())
}
