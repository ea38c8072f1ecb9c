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

//! Sample discovery and loading.
//!
//! Slot bindings are resolved once at startup by probing the repository
//! layout `<tracks>/E<channel>/<slot>.wav` (slot zero-padded to three
//! digits). A missing file leaves the slot empty; empty slots never play.
//! Present files are decoded entirely into memory for zero-latency
//! triggering.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::WavReader;
use tracing::{info, warn};

/// The expected path for a slot's sample file.
fn slot_path(tracks: &Path, channel: usize, slot: usize) -> PathBuf {
    tracks
        .join(format!("E{}", channel))
        .join(format!("{:03}.wav", slot))
}

/// Probes the repository for sample files and returns the (channel, slot,
/// path) triples that exist.
pub fn discover(tracks: &Path, channels: usize, slots: usize) -> Vec<(usize, usize, PathBuf)> {
    let mut found = Vec::new();
    for channel in 0..channels {
        for slot in 0..slots {
            let path = slot_path(tracks, channel, slot);
            if path.exists() {
                found.push((channel, slot, path));
            }
        }
    }
    found
}

/// A sample loaded into memory as interleaved f32 data, shared between the
/// bank and any number of playing voices.
#[derive(Clone)]
pub struct LoadedSample {
    data: Arc<Vec<f32>>,
    channel_count: u16,
}

impl LoadedSample {
    /// The interleaved sample data.
    pub fn data(&self) -> Arc<Vec<f32>> {
        self.data.clone()
    }

    /// The number of audio channels in the sample.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// The memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// All sample bindings for the player, indexed by (channel, slot).
pub struct SampleBank {
    slots: Vec<Vec<Option<LoadedSample>>>,
}

impl SampleBank {
    /// Discovers and loads every bound sample, resampled to the output rate.
    /// A file that fails to decode is reported and leaves its slot empty.
    pub fn load(
        tracks: &Path,
        channels: usize,
        slots: usize,
        target_sample_rate: u32,
    ) -> SampleBank {
        let mut bank = SampleBank {
            slots: vec![vec![None; slots]; channels],
        };

        for (channel, slot, path) in discover(tracks, channels, slots) {
            match load_wav(&path, target_sample_rate) {
                Ok(sample) => {
                    info!(
                        channel,
                        slot,
                        path = %path.display(),
                        memory_kb = sample.memory_size() / 1024,
                        "Sample loaded."
                    );
                    bank.slots[channel][slot] = Some(sample);
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        err = err.as_ref(),
                        "Unable to load sample, leaving slot empty."
                    );
                }
            }
        }

        info!(
            samples = bank.sample_count(),
            memory_kb = bank.total_memory_usage() / 1024,
            "Sample bank loaded."
        );
        bank
    }

    /// The sample bound to a (channel, slot) pair, if any.
    pub fn get(&self, channel: usize, slot: usize) -> Option<&LoadedSample> {
        self.slots.get(channel)?.get(slot)?.as_ref()
    }

    /// Returns true if a sample is bound to the given channel and slot.
    pub fn has_sample(&self, channel: usize, slot: usize) -> bool {
        self.get(channel, slot).is_some()
    }

    /// The number of bound samples.
    pub fn sample_count(&self) -> usize {
        self.slots
            .iter()
            .map(|row| row.iter().filter(|slot| slot.is_some()).count())
            .sum()
    }

    /// The total memory used by loaded samples.
    pub fn total_memory_usage(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .flatten()
            .map(|sample| sample.memory_size())
            .sum()
    }
}

/// Decodes a WAV file to interleaved f32, resampling if the file's rate
/// differs from the output rate.
fn load_wav(path: &Path, target_sample_rate: u32) -> Result<LoadedSample, Box<dyn Error>> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 / scale))
                .collect::<Result<Vec<f32>, hound::Error>>()?
        }
    };

    let data = if spec.sample_rate != target_sample_rate {
        resample(&samples, spec.channels, spec.sample_rate, target_sample_rate)
    } else {
        samples
    };

    Ok(LoadedSample {
        data: Arc::new(data),
        channel_count: spec.channels,
    })
}

/// Resamples interleaved audio with linear interpolation. Sufficient quality
/// for one-shot trigger samples.
fn resample(samples: &[f32], channel_count: u16, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_test_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("unable to create wav");
        for i in 0..frames {
            let sample =
                (16384.0 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin()) as i16;
            writer.write_sample(sample).expect("unable to write sample");
        }
        writer.finalize().expect("unable to finalize wav");
    }

    #[test]
    fn test_discover_and_load() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let tracks = dir.path();

        std::fs::create_dir_all(tracks.join("E0")).expect("unable to create dir");
        std::fs::create_dir_all(tracks.join("E2")).expect("unable to create dir");
        write_test_wav(&tracks.join("E0/000.wav"), 100);
        write_test_wav(&tracks.join("E0/003.wav"), 100);
        write_test_wav(&tracks.join("E2/011.wav"), 100);

        let found = discover(tracks, 12, 12);
        assert_eq!(3, found.len());
        assert_eq!((0, 0), (found[0].0, found[0].1));
        assert_eq!((0, 3), (found[1].0, found[1].1));
        assert_eq!((2, 11), (found[2].0, found[2].1));

        let bank = SampleBank::load(tracks, 12, 12, 44100);
        assert_eq!(3, bank.sample_count());
        assert!(bank.has_sample(0, 0));
        assert!(bank.has_sample(2, 11));
        // Missing files leave the slot empty.
        assert!(!bank.has_sample(0, 1));
        assert!(!bank.has_sample(5, 5));

        let sample = bank.get(0, 0).expect("sample must be present");
        assert_eq!(1, sample.channel_count());
        assert_eq!(100, sample.data().len());
    }

    #[test]
    fn test_corrupt_file_leaves_slot_empty() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let tracks = dir.path();
        std::fs::create_dir_all(tracks.join("E0")).expect("unable to create dir");
        std::fs::write(tracks.join("E0/000.wav"), b"not a wav file").expect("unable to write");

        let bank = SampleBank::load(tracks, 1, 1, 44100);
        assert_eq!(0, bank.sample_count());
        assert!(!bank.has_sample(0, 0));
    }

    #[test]
    fn test_load_resamples_to_output_rate() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let tracks = dir.path();
        std::fs::create_dir_all(tracks.join("E0")).expect("unable to create dir");
        write_test_wav(&tracks.join("E0/000.wav"), 4410);

        let bank = SampleBank::load(tracks, 1, 1, 48000);
        let sample = bank.get(0, 0).expect("sample must be present");
        let expected = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(expected, sample.data().len());
    }

    #[test]
    fn test_resample_preserves_interleaving() {
        // Stereo: L=1.0, R=-1.0 throughout.
        let samples = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

        let output = resample(&samples, 2, 44100, 48000);
        assert!(output.len() >= samples.len());
        assert!((output[0] - 1.0).abs() < 0.1);
        assert!((output[1] + 1.0).abs() < 0.1);
    }

    #[test]
    fn test_int_samples_scaled_to_unit_range() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let tracks = dir.path();
        std::fs::create_dir_all(tracks.join("E0")).expect("unable to create dir");
        write_test_wav(&tracks.join("E0/000.wav"), 200);

        let bank = SampleBank::load(tracks, 1, 1, 44100);
        let sample = bank.get(0, 0).expect("sample must be present");
        let peak = sample
            .data()
            .iter()
            .fold(0.0f32, |acc, &sample| acc.max(sample.abs()));
        assert!(peak > 0.3 && peak <= 1.0, "peak was {}", peak);
    }
}
