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

//! cpal-backed sample playback.
//!
//! The output stream lives on a dedicated audio thread. Triggered voices are
//! handed to the stream callback through a channel so the callback never
//! takes a lock. Playback is polyphonic: retriggering a slot overlaps with
//! its still-playing voices.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use super::bank::SampleBank;

/// Maximum simultaneous voices. The oldest voice is stolen beyond this.
const MAX_VOICES: usize = 64;

/// One playing instance of a loaded sample.
struct Voice {
    data: Arc<Vec<f32>>,
    channel_count: usize,
    /// Current frame position within the sample data.
    position: usize,
}

impl Voice {
    /// Mixes this voice into an interleaved output buffer. Returns true once
    /// the voice has played to completion.
    fn mix_into(&mut self, buffer: &mut [f32], output_channels: usize, volume: f32) -> bool {
        let frames = buffer.len() / output_channels;
        let source_frames = self.data.len() / self.channel_count;

        for frame in 0..frames {
            if self.position >= source_frames {
                return true;
            }
            for output_channel in 0..output_channels {
                let source_channel = output_channel % self.channel_count;
                let sample = self.data[self.position * self.channel_count + source_channel];
                buffer[frame * output_channels + output_channel] += sample * volume;
            }
            self.position += 1;
        }

        self.position >= source_frames
    }
}

/// Accepts a newly triggered voice, stealing the oldest if the global limit
/// has been reached.
fn admit_voice(voices: &mut Vec<Voice>, voice: Voice) {
    if voices.len() >= MAX_VOICES {
        voices.remove(0);
    }
    voices.push(voice);
}

/// Renders one callback buffer: drains newly triggered voices, zeroes the
/// buffer, and mixes every active voice into it.
fn render(
    voices: &mut Vec<Voice>,
    incoming: &Receiver<Voice>,
    buffer: &mut [f32],
    output_channels: usize,
    volume: f32,
) {
    while let Ok(voice) = incoming.try_recv() {
        admit_voice(voices, voice);
    }

    buffer.fill(0.0);
    voices.retain_mut(|voice| !voice.mix_into(buffer, output_channels, volume));
}

/// A cpal sampler playing the discovered sample bank.
pub struct Device {
    name: String,
    bank: SampleBank,
    voice_tx: Sender<Voice>,
    /// Master volume as f32 bits, read by the audio callback every buffer.
    master_volume: Arc<AtomicU32>,
}

impl Device {
    /// Opens the named output device ("default" for the system default),
    /// loads the sample repository at the output's sample rate, and starts
    /// the stream.
    pub fn open(
        name: &str,
        tracks: &Path,
        channels: usize,
        slots: usize,
    ) -> Result<Device, Box<dyn Error>> {
        let host = cpal::default_host();
        let output = if name == "default" {
            host.default_output_device()
        } else {
            host.output_devices()?
                .find(|device| device.name().is_ok_and(|n| n == name))
        }
        .ok_or_else(|| format!("no audio output device named {}", name))?;

        let supported = output.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(format!(
                "audio output device {} does not support f32 output",
                name
            )
            .into());
        }
        let config = supported.config();
        let sample_rate = config.sample_rate;
        let output_channels = config.channels as usize;

        let bank = SampleBank::load(tracks, channels, slots, sample_rate);
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let master_volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        // The stream is not Send, so it is built and parked on its own
        // thread; startup failures are reported back through a channel.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        {
            let master_volume = master_volume.clone();
            thread::Builder::new().name("audio output".into()).spawn(move || {
                let mut voices: Vec<Voice> = Vec::new();
                let callback_volume = master_volume;
                let stream = output.build_output_stream(
                    &config,
                    move |buffer: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let volume = f32::from_bits(callback_volume.load(Ordering::Relaxed));
                        render(&mut voices, &voice_rx, buffer, output_channels, volume);
                    },
                    |err| error!(err = %err, "Audio stream error."),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive for the life of the process.
                loop {
                    thread::park();
                }
            })?;
        }
        ready_rx.recv()??;

        info!(
            device = name,
            sample_rate,
            output_channels,
            samples = bank.sample_count(),
            "Audio output started."
        );

        Ok(Device {
            name: name.to_string(),
            bank,
            voice_tx,
            master_volume,
        })
    }
}

/// Lists the names of the available output devices.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.output_devices()? {
        names.push(device.name()?);
    }
    Ok(names)
}

impl super::Device for Device {
    fn play(&self, channel: usize, slot: usize) -> Result<(), Box<dyn Error>> {
        let sample = match self.bank.get(channel, slot) {
            Some(sample) => sample,
            None => return Ok(()),
        };

        self.voice_tx
            .send(Voice {
                data: sample.data(),
                channel_count: sample.channel_count() as usize,
                position: 0,
            })
            .map_err(|_| "audio stream is not running")?;

        debug!(channel, slot, "Sample triggered.");
        Ok(())
    }

    fn has_sample(&self, channel: usize, slot: usize) -> bool {
        self.bank.has_sample(channel, slot)
    }

    fn set_master_volume(&self, volume: f32) {
        self.master_volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        info!(volume, "Master volume set.");
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Sampler)", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn voice(frames: usize, channel_count: usize) -> Voice {
        Voice {
            data: Arc::new(vec![0.5; frames * channel_count]),
            channel_count,
            position: 0,
        }
    }

    #[test]
    fn test_mix_mono_voice_into_stereo_buffer() {
        let mut voice = voice(4, 1);
        let mut buffer = vec![0.0f32; 8];

        let finished = voice.mix_into(&mut buffer, 2, 1.0);
        assert!(finished);
        // The mono sample lands on both output channels.
        assert!(buffer.iter().all(|&sample| (sample - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_mix_applies_volume_and_accumulates() {
        let mut first = voice(2, 1);
        let mut second = voice(2, 1);
        let mut buffer = vec![0.0f32; 4];

        first.mix_into(&mut buffer, 2, 0.5);
        second.mix_into(&mut buffer, 2, 0.5);
        // Two voices at half volume sum to the original level.
        assert!(buffer.iter().all(|&sample| (sample - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_voice_spans_multiple_buffers() {
        let mut voice = voice(6, 1);
        let mut buffer = vec![0.0f32; 8];

        assert!(!voice.mix_into(&mut buffer, 2, 1.0));
        assert_eq!(4, voice.position);
        assert!(voice.mix_into(&mut buffer, 2, 1.0));
    }

    #[test]
    fn test_admit_voice_steals_oldest_at_limit() {
        let mut voices = Vec::new();
        for i in 0..MAX_VOICES {
            let mut incoming = voice(8, 1);
            incoming.position = i;
            admit_voice(&mut voices, incoming);
        }
        assert_eq!(MAX_VOICES, voices.len());
        assert_eq!(0, voices[0].position);

        admit_voice(&mut voices, voice(8, 1));
        assert_eq!(MAX_VOICES, voices.len());
        // The oldest voice (position 0) was stolen.
        assert_eq!(1, voices[0].position);
    }

    #[test]
    fn test_render_drains_incoming_and_drops_finished() {
        let (tx, rx) = crossbeam_channel::unbounded::<Voice>();
        let mut voices = Vec::new();
        let mut buffer = vec![0.0f32; 8];

        tx.send(voice(4, 1)).expect("unable to send voice");
        tx.send(voice(100, 1)).expect("unable to send voice");
        render(&mut voices, &rx, &mut buffer, 2, 1.0);

        // The 4-frame voice finished within the buffer; the long one remains.
        assert_eq!(1, voices.len());
        assert!((buffer[0] - 1.0).abs() < f32::EPSILON);
    }
}
