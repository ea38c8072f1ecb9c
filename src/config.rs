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

//! The live configuration model: detection thresholds, the per-channel range
//! table, and per-column sync flags, plus the persisted JSON document.
//!
//! The model is shared between the trigger engine (read-only every tick) and
//! the editing surface (read-write). Cells are independent atomic scalars; a
//! tick that races an edit reads a value at most one cycle stale.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sensor::Sensor;

mod error;

pub use error::ConfigError;

/// The number of sensing channels in the reference deployment.
pub const NUM_CHANNELS: usize = 12;

/// The number of sound slots per channel.
pub const NUM_SLOTS: usize = 12;

/// Default sensor touch detection threshold.
pub const DEFAULT_TOUCH_THRESHOLD: i32 = 40;

/// Default sensor release detection threshold.
pub const DEFAULT_RELEASE_THRESHOLD: i32 = 20;

/// The persisted configuration document. Each `plages` row flattens one
/// channel's min/max pairs into a single sequence in slot order:
/// `[min0, max0, min1, max1, ...]`. The field name is part of the on-disk
/// format. Unknown keys are ignored; missing thresholds fall back to the
/// defaults.
#[derive(Deserialize, Serialize, Debug)]
pub struct ConfigDocument {
    #[serde(default = "default_touch_threshold")]
    touch_threshold: i32,

    #[serde(default = "default_release_threshold")]
    release_threshold: i32,

    #[serde(default)]
    plages: Vec<Vec<i32>>,
}

fn default_touch_threshold() -> i32 {
    DEFAULT_TOUCH_THRESHOLD
}

fn default_release_threshold() -> i32 {
    DEFAULT_RELEASE_THRESHOLD
}

/// The live configuration model. A single instance is created at startup and
/// handed to both the engine and the editing surface.
pub struct ConfigModel {
    slots: usize,
    touch_threshold: AtomicI32,
    release_threshold: AtomicI32,
    /// channels x (2 * slots) grid. Column 2i holds slot i's min, column
    /// 2i + 1 its max.
    cells: Vec<Vec<AtomicI32>>,
    /// Per-column sync flags. While set, edits to channel 0 in that column
    /// propagate to every channel.
    sync: Vec<AtomicBool>,
}

impl ConfigModel {
    /// Creates a new model. Column c of every channel starts at c + 1, the
    /// out-of-box ramp operators expect to see in a fresh table.
    pub fn new(channels: usize, slots: usize) -> ConfigModel {
        ConfigModel {
            slots,
            touch_threshold: AtomicI32::new(DEFAULT_TOUCH_THRESHOLD),
            release_threshold: AtomicI32::new(DEFAULT_RELEASE_THRESHOLD),
            cells: (0..channels)
                .map(|_| {
                    (0..slots * 2)
                        .map(|column| AtomicI32::new(column as i32 + 1))
                        .collect()
                })
                .collect(),
            sync: (0..slots * 2).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// The number of sensing channels.
    pub fn channels(&self) -> usize {
        self.cells.len()
    }

    /// The number of sound slots per channel.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// The number of flattened table columns (two per slot).
    pub fn columns(&self) -> usize {
        self.slots * 2
    }

    pub fn touch_threshold(&self) -> i32 {
        self.touch_threshold.load(Ordering::Relaxed)
    }

    /// Sets the touch threshold in the model. Not pushed to the sensor until
    /// thresholds are explicitly applied.
    pub fn set_touch_threshold(&self, value: i32) {
        self.touch_threshold.store(value, Ordering::Relaxed);
    }

    pub fn release_threshold(&self) -> i32 {
        self.release_threshold.load(Ordering::Relaxed)
    }

    /// Sets the release threshold in the model. Not pushed to the sensor
    /// until thresholds are explicitly applied.
    pub fn set_release_threshold(&self, value: i32) {
        self.release_threshold.store(value, Ordering::Relaxed);
    }

    /// The value of a single table cell.
    pub fn cell(&self, channel: usize, column: usize) -> i32 {
        self.cells[channel][column].load(Ordering::Relaxed)
    }

    /// Sets a single table cell, effective on the next tick. An edit to
    /// channel 0 propagates to the other channels when the column's sync
    /// flag is set.
    pub fn set_cell(&self, channel: usize, column: usize, value: i32) {
        self.cells[channel][column].store(value, Ordering::Relaxed);
        if channel == 0 {
            self.sync_column(column);
        }
    }

    /// The (min, max) range for a channel's slot. `min > max` is structurally
    /// valid and never matches anything.
    pub fn range(&self, channel: usize, slot: usize) -> (i32, i32) {
        (self.cell(channel, 2 * slot), self.cell(channel, 2 * slot + 1))
    }

    pub fn sync_enabled(&self, column: usize) -> bool {
        self.sync[column].load(Ordering::Relaxed)
    }

    /// Enables or disables sync for a column. Enabling performs a one-shot
    /// propagation of channel 0's current value; disabling is not
    /// retroactive.
    pub fn set_sync(&self, column: usize, enabled: bool) {
        self.sync[column].store(enabled, Ordering::Relaxed);
        if enabled {
            self.sync_column(column);
        }
    }

    /// Copies channel 0's value for a column to every other channel, if the
    /// column's sync flag is set.
    pub fn sync_column(&self, column: usize) {
        if !self.sync_enabled(column) {
            return;
        }

        let value = self.cells[0][column].load(Ordering::Relaxed);
        for row in &self.cells[1..] {
            row[column].store(value, Ordering::Relaxed);
        }
    }

    /// Pushes the configured thresholds to the sensor, clamped to its
    /// register range.
    pub fn apply_thresholds(&self, sensor: &dyn Sensor) {
        let touch = self.touch_threshold().clamp(0, 255) as u8;
        let release = self.release_threshold().clamp(0, 255) as u8;
        sensor.set_touch_threshold(touch);
        sensor.set_release_threshold(release);
        info!(touch, release, "Thresholds applied.");
    }

    /// Serializes the model to the given path as a pretty-printed JSON
    /// document. Failure is reported to the caller and leaves nothing
    /// half-written in the model.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            serde_json::to_string_pretty(&self.to_document()).map_err(ConfigError::Parse)?;
        fs::write(path, contents).map_err(ConfigError::Write)?;

        info!(path = %path.display(), "Configuration saved.");
        Ok(())
    }

    /// Loads a document from the given path. A document that fails to parse
    /// leaves the live model untouched. Documents with fewer channels or
    /// shorter rows than the live table overwrite only the overlapping
    /// indices; extras in the document are ignored. Ends by applying the
    /// loaded thresholds to the sensor.
    pub fn load(&self, path: &Path, sensor: &dyn Sensor) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let document: ConfigDocument =
            serde_json::from_str(&contents).map_err(ConfigError::Parse)?;

        self.apply_document(&document);
        self.apply_thresholds(sensor);

        info!(path = %path.display(), "Configuration loaded.");
        Ok(())
    }

    /// Restores the thresholds to their defaults, zeroes every table cell,
    /// and applies the thresholds.
    pub fn reset(&self, sensor: &dyn Sensor) {
        self.set_touch_threshold(DEFAULT_TOUCH_THRESHOLD);
        self.set_release_threshold(DEFAULT_RELEASE_THRESHOLD);
        for row in &self.cells {
            for cell in row {
                cell.store(0, Ordering::Relaxed);
            }
        }
        self.apply_thresholds(sensor);

        info!("Configuration reset.");
    }

    fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            touch_threshold: self.touch_threshold(),
            release_threshold: self.release_threshold(),
            plages: self
                .cells
                .iter()
                .map(|row| row.iter().map(|cell| cell.load(Ordering::Relaxed)).collect())
                .collect(),
        }
    }

    /// Applies a parsed document to the live model. Cells are stored
    /// directly; loading never fires sync propagation.
    fn apply_document(&self, document: &ConfigDocument) {
        self.set_touch_threshold(document.touch_threshold);
        self.set_release_threshold(document.release_threshold);

        for (row, values) in self.cells.iter().zip(document.plages.iter()) {
            for (cell, &value) in row.iter().zip(values.iter()) {
                cell.store(value, Ordering::Relaxed);
            }
        }
    }
}
