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

//! MPR121 capacitive touch controller over Linux I2C.

use std::{error::Error, fmt};

use parking_lot::{Mutex, RwLock};
use rppal::i2c::I2c;
use tracing::{info, warn};

use crate::config;

/// Default I2C address of the MPR121.
const I2C_ADDRESS: u16 = 0x5A;

/// Soft reset register and its magic value.
const SOFT_RESET: u8 = 0x80;
const SOFT_RESET_VALUE: u8 = 0x63;

/// Electrode filtered data registers. Two bytes per electrode, 10 bits,
/// little endian.
const FILTERED_DATA: u8 = 0x04;

/// Electrode baseline registers. One byte per electrode holding the top 8 of
/// the 10 baseline bits.
const BASELINE_DATA: u8 = 0x1E;

/// Per-electrode touch/release threshold registers, interleaved with a stride
/// of two starting at 0x41.
const TOUCH_THRESHOLD: u8 = 0x41;
const RELEASE_THRESHOLD: u8 = 0x42;

/// Electrode configuration register. A nonzero electrode count enters run
/// mode; thresholds may only be written in stop mode.
const ELECTRODE_CONFIG: u8 = 0x5E;
const STOP_MODE: u8 = 0x00;
/// Baseline tracking enabled, all twelve electrodes active.
const RUN_MODE: u8 = 0x8F;

/// Baseline filter and analog front end configuration, datasheet defaults.
const FILTER_CONFIG: [(u8, u8); 14] = [
    (0x2B, 0x01), // MHD rising
    (0x2C, 0x01), // NHD rising
    (0x2D, 0x0E), // NCL rising
    (0x2E, 0x00), // FDL rising
    (0x2F, 0x01), // MHD falling
    (0x30, 0x05), // NHD falling
    (0x31, 0x01), // NCL falling
    (0x32, 0x00), // FDL falling
    (0x33, 0x00), // NHD touched
    (0x34, 0x00), // NCL touched
    (0x35, 0x00), // FDL touched
    (0x5B, 0x00), // Debounce
    (0x5C, 0x10), // AFE configuration 1
    (0x5D, 0x20), // AFE configuration 2
];

struct Readings {
    baseline: Vec<i32>,
    filtered: Vec<i32>,
}

/// An MPR121 touch sensor on the default I2C bus.
pub struct Device {
    channels: usize,
    bus: Mutex<I2c>,
    readings: RwLock<Readings>,
}

impl Device {
    /// Opens the MPR121, resets it, and enters run mode with the default
    /// thresholds applied.
    pub fn open(channels: usize) -> Result<Device, Box<dyn Error>> {
        let mut bus = I2c::new()?;
        bus.set_slave_address(I2C_ADDRESS)?;

        let device = Device {
            channels,
            bus: Mutex::new(bus),
            readings: RwLock::new(Readings {
                baseline: vec![0; channels],
                filtered: vec![0; channels],
            }),
        };
        device.init()?;

        info!(channels, "MPR121 initialized.");
        Ok(device)
    }

    fn init(&self) -> Result<(), Box<dyn Error>> {
        let mut bus = self.bus.lock();

        Self::write_register(&mut bus, SOFT_RESET, SOFT_RESET_VALUE)?;
        Self::write_register(&mut bus, ELECTRODE_CONFIG, STOP_MODE)?;
        for (register, value) in FILTER_CONFIG {
            Self::write_register(&mut bus, register, value)?;
        }
        Self::write_thresholds(
            &mut bus,
            self.channels,
            config::DEFAULT_TOUCH_THRESHOLD as u8,
            config::DEFAULT_RELEASE_THRESHOLD as u8,
        )?;
        Self::write_register(&mut bus, ELECTRODE_CONFIG, RUN_MODE)?;

        Ok(())
    }

    fn write_register(bus: &mut I2c, register: u8, value: u8) -> Result<(), rppal::i2c::Error> {
        bus.write(&[register, value])?;
        Ok(())
    }

    /// Writes both thresholds for every electrode. The caller is responsible
    /// for the stop/run mode dance around this.
    fn write_thresholds(
        bus: &mut I2c,
        channels: usize,
        touch: u8,
        release: u8,
    ) -> Result<(), rppal::i2c::Error> {
        for channel in 0..channels {
            Self::write_register(bus, TOUCH_THRESHOLD + 2 * channel as u8, touch)?;
            Self::write_register(bus, RELEASE_THRESHOLD + 2 * channel as u8, release)?;
        }
        Ok(())
    }

    /// Writes a single threshold register for every electrode, entering stop
    /// mode for the writes and restoring run mode afterwards.
    fn set_threshold(&self, register: u8, value: u8) {
        let mut bus = self.bus.lock();

        if let Err(err) = Self::try_set_threshold(&mut bus, self.channels, register, value) {
            warn!(err = %err, value, "Unable to write sensor threshold.");
        }
    }

    fn try_set_threshold(
        bus: &mut I2c,
        channels: usize,
        register: u8,
        value: u8,
    ) -> Result<(), rppal::i2c::Error> {
        Self::write_register(bus, ELECTRODE_CONFIG, STOP_MODE)?;
        for channel in 0..channels {
            Self::write_register(bus, register + 2 * channel as u8, value)?;
        }
        Self::write_register(bus, ELECTRODE_CONFIG, RUN_MODE)
    }
}

impl super::Sensor for Device {
    fn refresh(&self) {
        let mut filtered = vec![0u8; self.channels * 2];
        let mut baseline = vec![0u8; self.channels];

        let result = {
            let mut bus = self.bus.lock();
            bus.write_read(&[FILTERED_DATA], &mut filtered)
                .and_then(|_| bus.write_read(&[BASELINE_DATA], &mut baseline))
        };

        match result {
            Ok(()) => {
                let mut readings = self.readings.write();
                for channel in 0..self.channels {
                    readings.filtered[channel] = i32::from(u16::from_le_bytes([
                        filtered[2 * channel],
                        filtered[2 * channel + 1],
                    ]) & 0x3FF);
                    // The baseline register holds the top 8 of 10 bits.
                    readings.baseline[channel] = i32::from(baseline[channel]) << 2;
                }
            }
            // Keep the previous snapshot; the next tick will retry.
            Err(err) => warn!(err = %err, "Sensor read failed, keeping previous readings."),
        }
    }

    fn baseline(&self, channel: usize) -> i32 {
        self.readings.read().baseline[channel]
    }

    fn filtered(&self, channel: usize) -> i32 {
        self.readings.read().filtered[channel]
    }

    fn set_touch_threshold(&self, value: u8) {
        self.set_threshold(TOUCH_THRESHOLD, value);
    }

    fn set_release_threshold(&self, value: u8) {
        self.set_threshold(RELEASE_THRESHOLD, value);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mpr121 (I2C)")
    }
}
