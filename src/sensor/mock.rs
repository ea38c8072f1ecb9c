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
use std::{
    fmt,
    sync::atomic::{AtomicI32, AtomicU64, Ordering},
};

/// A mock sensor. Readings are whatever the test scripted.
pub struct Device {
    name: String,
    baseline: Vec<AtomicI32>,
    filtered: Vec<AtomicI32>,
    touch_threshold: AtomicI32,
    release_threshold: AtomicI32,
    refreshes: AtomicU64,
}

impl Device {
    /// Gets the given mock sensor. All readings start at zero.
    pub fn get(name: &str, channels: usize) -> Device {
        Device {
            name: name.to_string(),
            baseline: (0..channels).map(|_| AtomicI32::new(0)).collect(),
            filtered: (0..channels).map(|_| AtomicI32::new(0)).collect(),
            touch_threshold: AtomicI32::new(-1),
            release_threshold: AtomicI32::new(-1),
            refreshes: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    /// Scripts the baseline and filtered readings for a channel.
    pub fn set_readings(&self, channel: usize, baseline: i32, filtered: i32) {
        self.baseline[channel].store(baseline, Ordering::Relaxed);
        self.filtered[channel].store(filtered, Ordering::Relaxed);
    }

    #[cfg(test)]
    /// Scripts a channel so that its diff equals the given value.
    pub fn set_diff(&self, channel: usize, diff: i32) {
        self.set_readings(channel, diff, 0);
    }

    #[cfg(test)]
    /// The number of refresh calls made so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    /// The last touch threshold applied, if any.
    pub fn applied_touch_threshold(&self) -> Option<u8> {
        match self.touch_threshold.load(Ordering::Relaxed) {
            -1 => None,
            value => Some(value as u8),
        }
    }

    #[cfg(test)]
    /// The last release threshold applied, if any.
    pub fn applied_release_threshold(&self) -> Option<u8> {
        match self.release_threshold.load(Ordering::Relaxed) {
            -1 => None,
            value => Some(value as u8),
        }
    }
}

impl super::Sensor for Device {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    fn baseline(&self, channel: usize) -> i32 {
        self.baseline[channel].load(Ordering::Relaxed)
    }

    fn filtered(&self, channel: usize) -> i32 {
        self.filtered[channel].load(Ordering::Relaxed)
    }

    fn set_touch_threshold(&self, value: u8) {
        self.touch_threshold.store(value as i32, Ordering::Relaxed);
    }

    fn set_release_threshold(&self, value: u8) {
        self.release_threshold.store(value as i32, Ordering::Relaxed);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use crate::sensor::Sensor;

    #[test]
    fn test_diff_is_baseline_minus_filtered() {
        let device = super::Device::get("mock-sensor", 2);
        device.set_readings(0, 400, 390);
        device.set_readings(1, 380, 400);

        assert_eq!(10, device.diff(0));
        assert_eq!(-20, device.diff(1));
    }

    #[test]
    fn test_threshold_recording() {
        let device = super::Device::get("mock-sensor", 1);
        assert_eq!(None, device.applied_touch_threshold());
        assert_eq!(None, device.applied_release_threshold());

        device.set_touch_threshold(40);
        device.set_release_threshold(20);
        assert_eq!(Some(40), device.applied_touch_threshold());
        assert_eq!(Some(20), device.applied_release_threshold());
    }
}
