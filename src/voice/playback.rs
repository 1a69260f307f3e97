//! Reply audio playback to speakers
//!
//! Replies arrive as MP3 or WAV bytes. Each playback runs on its own OS thread
//! (cpal streams are not `Send`) and can be stopped at any time; completion is
//! reported back over a channel.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Completion report for one playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio played to the end
    Finished { id: u64 },
    /// Audio could not be decoded or played
    Failed { id: u64, error: String },
}

/// Owner of the audio output
///
/// Only the talk loop drives a player. A stopped playback reports nothing.
pub trait Player {
    /// Start playing encoded audio, reporting completion on `events`
    ///
    /// # Errors
    ///
    /// Returns error if playback cannot be started at all
    fn play(
        &mut self,
        id: u64,
        audio: Vec<u8>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<()>;

    /// Stop the current playback, if any
    fn stop(&mut self);
}

/// Decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode reply audio, sniffing WAV by its `RIFF` header and treating
/// anything else as MP3
///
/// # Errors
///
/// Returns error if the bytes are not decodable audio
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)
    } else {
        decode_mp3(bytes)
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    stop: Option<Arc<AtomicBool>>,
}

impl AudioPlayback {
    /// Check for an output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { stop: None })
    }

    /// Play decoded audio on the calling thread until it finishes
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub fn play_blocking(&self, audio: DecodedAudio) -> Result<()> {
        run_stream(audio, &AtomicBool::new(false))
    }
}

impl Player for AudioPlayback {
    fn play(
        &mut self,
        id: u64,
        audio: Vec<u8>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Result<()> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Some(Arc::clone(&stop));

        std::thread::Builder::new()
            .name(format!("playback-{id}"))
            .spawn(move || {
                let outcome = decode(&audio).and_then(|decoded| run_stream(decoded, &stop));
                if stop.load(Ordering::Relaxed) {
                    tracing::debug!(id, "playback stopped");
                    return;
                }
                let event = match outcome {
                    Ok(()) => PlaybackEvent::Finished { id },
                    Err(e) => {
                        tracing::error!(id, error = %e, "playback failed");
                        PlaybackEvent::Failed {
                            id,
                            error: e.to_string(),
                        }
                    }
                };
                let _ = events.send(event);
            })?;

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pick an output config (mono, else stereo) at the audio's sample rate
fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let find = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    find(1)
        .or_else(|| find(2))
        .map(|c| c.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))
}

/// Play samples until they run out or `stop` is raised
fn run_stream(audio: DecodedAudio, stop: &AtomicBool) -> Result<()> {
    if audio.samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let config = output_config(&device, audio.sample_rate)?;
    let channels = usize::from(config.channels);

    let sample_count = audio.samples.len();
    let duration = Duration::from_millis(
        (sample_count as u64 * 1000) / u64::from(audio.sample_rate.max(1)),
    );

    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);
    let samples = audio.samples;
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or_else(|| {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    });
                    frame.fill(sample);
                    position = position.saturating_add(1);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let started = Instant::now();
    let deadline = duration + Duration::from_millis(500);
    while !finished.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed) {
        if started.elapsed() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");
    Ok(())
}

/// Decode WAV bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, usize::from(spec.channels)),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                }
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
