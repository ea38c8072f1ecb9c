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

//! The editing surface: operator events applied to the configuration model,
//! the engine, the audio output, and the sensor.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use tracing::{error, info, span, warn, Level};

use crate::audio;
use crate::config::ConfigModel;
use crate::sensor::Sensor;
use crate::trigger::Engine;

pub mod keyboard;

/// Controller events that drive the player.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// Starts the trigger engine. Does nothing if it is already running.
    Play,

    /// Stops the trigger engine. Does nothing if it is already stopped.
    Stop,

    /// Sets a single range table cell. Edits to channel 0 propagate to the
    /// other channels when the column's sync flag is set.
    SetCell {
        channel: usize,
        column: usize,
        value: i32,
    },

    /// Enables or disables min/max synchronization for a table column.
    Sync { column: usize, enabled: bool },

    /// Sets the touch threshold in the model. Takes effect on apply.
    SetTouchThreshold(i32),

    /// Sets the release threshold in the model. Takes effect on apply.
    SetReleaseThreshold(i32),

    /// Pushes the configured thresholds to the sensor.
    Apply,

    /// Saves the configuration document to the given path.
    Save(PathBuf),

    /// Loads the configuration document from the given path.
    Load(PathBuf),

    /// Restores default thresholds and zeroes the range table.
    Reset,

    /// Sets the master volume as a percentage from 0 to 100.
    Volume(u32),

    /// Prints the per-channel diff and match state.
    Status,

    /// Stops the engine and shuts the controller down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> thread::JoinHandle<Result<(), io::Error>>;
}

/// Controls the player by dispatching driver events.
pub struct Controller {
    handle: thread::JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        engine: Arc<Engine>,
        config: Arc<ConfigModel>,
        sensor: Arc<dyn Sensor>,
        audio: Arc<dyn audio::Device>,
        driver: Arc<dyn Driver>,
    ) -> Controller {
        Controller {
            handle: thread::spawn(move || {
                Controller::dispatch(engine, config, sensor, audio, driver)
            }),
        }
    }

    /// Blocks until the controller finishes.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }

    fn dispatch(
        engine: Arc<Engine>,
        config: Arc<ConfigModel>,
        sensor: Arc<dyn Sensor>,
        audio: Arc<dyn audio::Device>,
        driver: Arc<dyn Driver>,
    ) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, events_rx) = crossbeam_channel::bounded(1);
        let _monitor = driver.monitor_events(events_tx);
        info!("Controller started.");

        loop {
            match events_rx.recv() {
                Ok(event) => {
                    info!(event = ?event, "Received event.");
                    if !Self::handle_event(event, &engine, &config, &sensor, &audio) {
                        return;
                    }
                }
                Err(_) => {
                    info!("Controller closing.");
                    return;
                }
            }
        }
    }

    /// Applies a single event. Returns false when the controller should shut
    /// down.
    fn handle_event(
        event: Event,
        engine: &Arc<Engine>,
        config: &Arc<ConfigModel>,
        sensor: &Arc<dyn Sensor>,
        audio: &Arc<dyn audio::Device>,
    ) -> bool {
        match event {
            Event::Play => engine.start(),
            Event::Stop => engine.stop(),
            Event::SetCell {
                channel,
                column,
                value,
            } => {
                if channel < config.channels() && column < config.columns() {
                    config.set_cell(channel, column, value);
                } else {
                    warn!(channel, column, "Cell is out of range.");
                }
            }
            Event::Sync { column, enabled } => {
                if column < config.columns() {
                    config.set_sync(column, enabled);
                } else {
                    warn!(column, "Column is out of range.");
                }
            }
            Event::SetTouchThreshold(value) => config.set_touch_threshold(value),
            Event::SetReleaseThreshold(value) => config.set_release_threshold(value),
            Event::Apply => config.apply_thresholds(sensor.as_ref()),
            Event::Save(path) => {
                if let Err(err) = config.save(&path) {
                    error!(err = %err, path = %path.display(), "Unable to save configuration.");
                }
            }
            Event::Load(path) => {
                if let Err(err) = config.load(&path, sensor.as_ref()) {
                    error!(err = %err, path = %path.display(), "Unable to load configuration.");
                }
            }
            Event::Reset => config.reset(sensor.as_ref()),
            Event::Volume(percent) => {
                audio.set_master_volume(percent.min(100) as f32 / 100.0);
            }
            Event::Status => {
                println!(
                    "Engine: {}",
                    if engine.is_running() { "running" } else { "stopped" }
                );
                for (channel, status) in engine.status().iter().enumerate() {
                    match status.matched {
                        Some(slot) => {
                            println!("E{}: diff={} slot={}", channel, status.diff, slot)
                        }
                        None => println!("E{}: diff={}", channel, status.diff),
                    }
                }
            }
            Event::Quit => {
                engine.stop();
                return false;
            }
        }
        true
    }
}
