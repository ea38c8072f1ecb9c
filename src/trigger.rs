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

//! The trigger engine: polls the sensor, matches each channel's diff against
//! its range table, and requests playback with a per-channel debounce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, span, Level};

use crate::audio;
use crate::config::ConfigModel;
use crate::sensor::Sensor;

/// The minimum time before the same (channel, slot) match may retrigger.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Per-channel debounce state. Survives engine stop/start.
#[derive(Default)]
struct ChannelState {
    /// The last slot that matched, silent or not.
    last_slot: Option<usize>,
    /// When that match was recorded.
    last_trigger: Option<Instant>,
}

/// One channel's view of the most recent tick, published for the display
/// layer to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    /// The channel's diff at the last tick.
    pub diff: i32,
    /// The slot whose range contained the diff, if any.
    pub matched: Option<usize>,
}

/// State shared between the engine handle and its tick loop thread.
struct Shared {
    sensor: Arc<dyn Sensor>,
    audio: Arc<dyn audio::Device>,
    config: Arc<ConfigModel>,
    tick_period: Duration,
    channels: Mutex<Vec<ChannelState>>,
    status: RwLock<Vec<ChannelStatus>>,
    running: AtomicBool,
}

impl Shared {
    /// Processes one tick: refreshes the sensor once, then scans every
    /// channel. A playback failure on one channel never prevents processing
    /// of the rest.
    fn tick(&self, now: Instant) {
        self.sensor.refresh();

        let mut channels = self.channels.lock();
        let mut status = Vec::with_capacity(channels.len());

        for (channel, state) in channels.iter_mut().enumerate() {
            let diff = self.sensor.diff(channel);
            let matched = self.match_slot(channel, diff);

            if let Some(slot) = matched {
                let suppressed = state.last_slot == Some(slot)
                    && state
                        .last_trigger
                        .is_some_and(|last| now.duration_since(last) <= DEBOUNCE_WINDOW);

                if !suppressed {
                    // A silent slot still records the match so the engine
                    // neither falls through to a lower-priority slot nor
                    // retriggers when a sample is bound later mid-hold.
                    if self.audio.has_sample(channel, slot) {
                        if let Err(err) = self.audio.play(channel, slot) {
                            error!(
                                channel,
                                slot,
                                err = err.as_ref(),
                                "Unable to trigger sample."
                            );
                        } else {
                            debug!(channel, slot, diff, "Triggered.");
                        }
                    }
                    state.last_slot = Some(slot);
                    state.last_trigger = Some(now);
                }
            }

            status.push(ChannelStatus { diff, matched });
        }
        drop(channels);

        *self.status.write() = status;
    }

    /// Finds the first slot whose range contains the diff. Slot order is
    /// match priority; a slot whose min exceeds its max never matches.
    fn match_slot(&self, channel: usize, diff: i32) -> Option<usize> {
        (0..self.config.slots()).find(|&slot| {
            let (min, max) = self.config.range(channel, slot);
            min <= diff && diff <= max
        })
    }
}

/// Polls the sensor on a dedicated thread and turns range matches into
/// playback requests.
pub struct Engine {
    shared: Arc<Shared>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Engine {
    /// Creates a new engine. The engine does not tick until started.
    pub fn new(
        sensor: Arc<dyn Sensor>,
        audio: Arc<dyn audio::Device>,
        config: Arc<ConfigModel>,
        tick_period: Duration,
    ) -> Engine {
        let channels = config.channels();
        Engine {
            shared: Arc::new(Shared {
                sensor,
                audio,
                config,
                tick_period,
                channels: Mutex::new((0..channels).map(|_| ChannelState::default()).collect()),
                status: RwLock::new(vec![
                    ChannelStatus {
                        diff: 0,
                        matched: None
                    };
                    channels
                ]),
                running: AtomicBool::new(false),
            }),
            join: Mutex::new(None),
        }
    }

    /// Starts the tick loop. Starting while already running is a no-op: only
    /// one loop is ever active. Per-channel debounce state is not reset, so
    /// a touch held across a stop/start does not retrigger.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            info!("Engine is already running.");
            return;
        }

        let shared = Arc::clone(&self.shared);
        *self.join.lock() = Some(thread::spawn(move || {
            let span = span!(Level::INFO, "trigger engine");
            let _enter = span.enter();

            info!(
                period_ms = shared.tick_period.as_millis() as u64,
                "Engine started."
            );
            while shared.running.load(Ordering::SeqCst) {
                let started = Instant::now();
                shared.tick(started);

                // Sleep whatever remains of the tick budget after processing.
                if let Some(remaining) = shared.tick_period.checked_sub(started.elapsed()) {
                    spin_sleep::sleep(remaining);
                }
            }
            info!("Engine stopped.");
        }));
    }

    /// Stops the tick loop and waits for any in-flight tick to finish.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.join.lock().take() {
            if handle.join().is_err() {
                error!("Engine thread panicked.");
            }
        }
    }

    /// Returns true while the tick loop is active.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The per-channel view of the most recent tick.
    pub fn status(&self) -> Vec<ChannelStatus> {
        self.shared.status.read().clone()
    }

    #[cfg(test)]
    /// Runs a single tick at the given instant (test only).
    fn tick(&self, now: Instant) {
        self.shared.tick(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigModel;
    use crate::test::eventually;
    use crate::{audio, sensor};

    struct Fixture {
        sensor: Arc<sensor::test::Device>,
        audio: Arc<audio::test::Device>,
        config: Arc<ConfigModel>,
        engine: Arc<Engine>,
    }

    /// Builds an engine over mock devices with a table where nothing matches
    /// until a test sets a range.
    fn fixture(channels: usize, slots: usize, tick_period: Duration) -> Fixture {
        let sensor = Arc::new(sensor::test::Device::get("mock-sensor", channels));
        let audio = Arc::new(audio::test::Device::get("mock-audio"));
        let config = Arc::new(ConfigModel::new(channels, slots));

        // min > max never matches; keeps scripted zero diffs quiet.
        for channel in 0..channels {
            for slot in 0..slots {
                set_range(&config, channel, slot, 1, 0);
            }
        }

        let engine = Arc::new(Engine::new(
            sensor.clone(),
            audio.clone(),
            config.clone(),
            tick_period,
        ));
        Fixture {
            sensor,
            audio,
            config,
            engine,
        }
    }

    fn set_range(config: &ConfigModel, channel: usize, slot: usize, min: i32, max: i32) {
        config.set_cell(channel, 2 * slot, min);
        config.set_cell(channel, 2 * slot + 1, max);
    }

    #[test]
    fn test_first_match_wins() {
        let f = fixture(2, 3, Duration::from_millis(100));
        // Slots 0 and 1 both contain the diff; slot 0 must win.
        set_range(&f.config, 0, 0, 5, 15);
        set_range(&f.config, 0, 1, 0, 100);

        f.sensor.set_diff(0, 10);
        f.engine.tick(Instant::now());

        assert_eq!(vec![(0, 0)], f.audio.plays());
    }

    #[test]
    fn test_single_matching_slot_is_selected() {
        let f = fixture(1, 3, Duration::from_millis(100));
        set_range(&f.config, 0, 2, 30, 40);

        f.sensor.set_diff(0, 35);
        f.engine.tick(Instant::now());

        assert_eq!(vec![(0, 2)], f.audio.plays());
    }

    #[test]
    fn test_inverted_range_never_matches() {
        let f = fixture(1, 2, Duration::from_millis(100));
        // Slot 0 is inverted; the scan continues past it to slot 1.
        set_range(&f.config, 0, 0, 15, 5);
        set_range(&f.config, 0, 1, 5, 15);

        f.sensor.set_diff(0, 10);
        f.engine.tick(Instant::now());

        assert_eq!(vec![(0, 1)], f.audio.plays());
    }

    #[test]
    fn test_no_match_leaves_state_unchanged() {
        let f = fixture(1, 1, Duration::from_millis(100));
        set_range(&f.config, 0, 0, 5, 15);
        let base = Instant::now();

        f.sensor.set_diff(0, 10);
        f.engine.tick(base);
        assert_eq!(1, f.audio.play_count(0, 0));

        // The touch briefly leaves every range and returns to the same slot
        // within the window: no retrigger.
        f.sensor.set_diff(0, 3);
        f.engine.tick(base + Duration::from_millis(100));
        f.sensor.set_diff(0, 10);
        f.engine.tick(base + Duration::from_millis(200));

        assert_eq!(1, f.audio.play_count(0, 0));
    }

    #[test]
    fn test_debounce_suppresses_same_slot_within_window() {
        let f = fixture(1, 1, Duration::from_millis(100));
        set_range(&f.config, 0, 0, 5, 15);
        let base = Instant::now();

        f.sensor.set_diff(0, 10);
        for tick in 0..10 {
            f.engine.tick(base + Duration::from_millis(100 * tick));
        }
        // Ticks through t=900ms stay within the window of the t=0 trigger.
        assert_eq!(1, f.audio.play_count(0, 0));

        // Strictly past the window the same slot retriggers.
        f.engine.tick(base + Duration::from_millis(1050));
        assert_eq!(2, f.audio.play_count(0, 0));
    }

    #[test]
    fn test_concrete_scenario_channel_two() {
        let f = fixture(12, 12, Duration::from_millis(100));
        set_range(&f.config, 2, 0, 5, 15);
        let base = Instant::now();

        for (tick, diff) in [3, 10, 10, 10, 10].into_iter().enumerate() {
            f.sensor.set_diff(2, diff);
            f.engine.tick(base + Duration::from_millis(100 * tick as u64));
        }

        // One trigger, at the first tick where diff entered the range.
        assert_eq!(1, f.audio.play_count(2, 0));
    }

    #[test]
    fn test_different_slot_always_triggers() {
        let f = fixture(1, 2, Duration::from_millis(100));
        set_range(&f.config, 0, 0, 5, 15);
        set_range(&f.config, 0, 1, 20, 30);
        let base = Instant::now();

        f.sensor.set_diff(0, 10);
        f.engine.tick(base);
        f.sensor.set_diff(0, 25);
        f.engine.tick(base + Duration::from_millis(100));
        f.sensor.set_diff(0, 10);
        f.engine.tick(base + Duration::from_millis(200));

        // Every slot change triggers regardless of elapsed time.
        assert_eq!(vec![(0, 0), (0, 1), (0, 0)], f.audio.plays());
    }

    #[test]
    fn test_silent_slot_counts_for_debounce_without_playing() {
        let f = fixture(1, 2, Duration::from_millis(100));
        // Slot 0 has no sample but outranks slot 1, which also matches.
        f.audio.set_missing(0, 0);
        set_range(&f.config, 0, 0, 5, 15);
        set_range(&f.config, 0, 1, 0, 100);
        let base = Instant::now();

        f.sensor.set_diff(0, 10);
        f.engine.tick(base);
        f.engine.tick(base + Duration::from_millis(100));

        // No playback, and no fall-through to the lower-priority slot.
        assert!(f.audio.plays().is_empty());

        // Moving out of slot 0's range hands the match to slot 1.
        f.sensor.set_diff(0, 50);
        f.engine.tick(base + Duration::from_millis(200));
        assert_eq!(vec![(0, 1)], f.audio.plays());
    }

    #[test]
    fn test_playback_error_does_not_stop_other_channels() {
        let f = fixture(3, 1, Duration::from_millis(100));
        f.audio.fail_channel(0);
        set_range(&f.config, 0, 0, 5, 15);
        set_range(&f.config, 2, 0, 5, 15);

        f.sensor.set_diff(0, 10);
        f.sensor.set_diff(2, 10);
        f.engine.tick(Instant::now());

        assert_eq!(vec![(2, 0)], f.audio.plays());
    }

    #[test]
    fn test_status_snapshot() {
        let f = fixture(2, 1, Duration::from_millis(100));
        set_range(&f.config, 0, 0, 5, 15);

        f.sensor.set_diff(0, 10);
        f.sensor.set_diff(1, -4);
        f.engine.tick(Instant::now());

        let status = f.engine.status();
        assert_eq!(
            ChannelStatus {
                diff: 10,
                matched: Some(0)
            },
            status[0]
        );
        assert_eq!(
            ChannelStatus {
                diff: -4,
                matched: None
            },
            status[1]
        );
    }

    #[test]
    fn test_loop_start_stop() {
        let f = fixture(1, 1, Duration::from_millis(10));
        set_range(&f.config, 0, 0, 5, 15);
        f.sensor.set_diff(0, 10);

        assert!(!f.engine.is_running());
        f.engine.start();
        assert!(f.engine.is_running());
        eventually(
            || f.audio.play_count(0, 0) == 1,
            "Engine never triggered playback",
        );

        // A second start is a no-op rather than a second loop.
        f.engine.start();
        assert!(f.engine.is_running());

        f.engine.stop();
        assert!(!f.engine.is_running());
        // Stop is idempotent.
        f.engine.stop();

        // The held touch stays debounced across a restart.
        let refreshes = f.sensor.refresh_count();
        f.engine.start();
        eventually(
            || f.sensor.refresh_count() > refreshes,
            "Engine never ticked after restart",
        );
        thread::sleep(Duration::from_millis(50));
        assert_eq!(1, f.audio.play_count(0, 0));
        f.engine.stop();
    }

    #[test]
    fn test_stop_before_start_is_a_no_op() {
        let f = fixture(1, 1, Duration::from_millis(10));
        f.engine.stop();
        assert!(!f.engine.is_running());
    }

    #[test]
    fn test_config_edits_take_effect_next_tick() {
        let f = fixture(1, 1, Duration::from_millis(100));
        let base = Instant::now();

        f.sensor.set_diff(0, 10);
        f.engine.tick(base);
        assert!(f.audio.plays().is_empty());

        set_range(&f.config, 0, 0, 5, 15);
        f.engine.tick(base + Duration::from_millis(100));
        assert_eq!(1, f.audio.play_count(0, 0));
    }
}
