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
use std::{collections::HashSet, error::Error, fmt};

use parking_lot::Mutex;

/// A mock audio device. Doesn't actually play anything; records the plays it
/// was asked for. Every slot has a sample unless a test marks it missing.
pub struct Device {
    name: String,
    plays: Mutex<Vec<(usize, usize)>>,
    missing: Mutex<HashSet<(usize, usize)>>,
    failing_channels: Mutex<HashSet<usize>>,
    master_volume: Mutex<f32>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            plays: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            failing_channels: Mutex::new(HashSet::new()),
            master_volume: Mutex::new(1.0),
        }
    }

    #[cfg(test)]
    /// All plays requested so far, in order.
    pub fn plays(&self) -> Vec<(usize, usize)> {
        self.plays.lock().clone()
    }

    #[cfg(test)]
    /// The number of plays requested for a (channel, slot) pair.
    pub fn play_count(&self, channel: usize, slot: usize) -> usize {
        self.plays
            .lock()
            .iter()
            .filter(|&&play| play == (channel, slot))
            .count()
    }

    #[cfg(test)]
    /// Marks a slot as having no bound sample.
    pub fn set_missing(&self, channel: usize, slot: usize) {
        self.missing.lock().insert((channel, slot));
    }

    #[cfg(test)]
    /// Makes every play on the given channel fail.
    pub fn fail_channel(&self, channel: usize) {
        self.failing_channels.lock().insert(channel);
    }

    #[cfg(test)]
    /// The current master volume.
    pub fn master_volume(&self) -> f32 {
        *self.master_volume.lock()
    }
}

impl super::Device for Device {
    fn play(&self, channel: usize, slot: usize) -> Result<(), Box<dyn Error>> {
        if self.failing_channels.lock().contains(&channel) {
            return Err("simulated playback failure".into());
        }

        self.plays.lock().push((channel, slot));
        Ok(())
    }

    fn has_sample(&self, channel: usize, slot: usize) -> bool {
        !self.missing.lock().contains(&(channel, slot))
    }

    fn set_master_volume(&self, volume: f32) {
        *self.master_volume.lock() = volume;
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
