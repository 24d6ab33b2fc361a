//! Looping penalty soundtrack.
//!
//! The WAV file is decoded once, converted to the output device's format,
//! and played from a single cpal output stream that stays open for the
//! process lifetime and emits silence while stopped.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use tracing::{debug, error, info};

use crate::error::{GuardianError, Result};

/// A single looping audio channel.
pub trait AudioChannel {
    /// Starts playback from the beginning, looping forever.
    fn play_looped(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    /// Closes the output device. Playback cannot resume afterwards.
    fn shutdown(&mut self);
}

/// Decoded interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl Clip {
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| GuardianError::Audio(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| GuardianError::Audio(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| GuardianError::Audio(e.to_string()))?
            }
        };

        let channels = usize::from(spec.channels.max(1));
        if samples.len() < channels {
            return Err(GuardianError::Audio(format!(
                "{} contains no samples",
                path.display()
            )));
        }

        Ok(Self {
            samples,
            channels,
            sample_rate: spec.sample_rate,
        })
    }

    /// Re-lays the clip out for a device with the given channel count and rate.
    pub fn convert(&self, channels: usize, sample_rate: u32) -> Clip {
        let frames = self.samples.len() / self.channels;
        let ratio = f64::from(sample_rate) / f64::from(self.sample_rate);
        let out_frames = ((frames as f64) * ratio).round().max(1.0) as usize;

        let frame_at = |index: usize, channel: usize| -> f32 {
            let src_channel = if self.channels == 1 { 0 } else { channel.min(self.channels - 1) };
            self.samples[index * self.channels + src_channel]
        };

        let mut samples = Vec::with_capacity(out_frames * channels);
        for i in 0..out_frames {
            let src = i as f64 / ratio;
            let idx = (src.floor() as usize).min(frames - 1);
            let frac = src.fract() as f32;
            for channel in 0..channels {
                let a = frame_at(idx, channel);
                let sample = if idx + 1 < frames {
                    a * (1.0 - frac) + frame_at(idx + 1, channel) * frac
                } else {
                    a
                };
                samples.push(sample);
            }
        }

        Clip {
            samples,
            channels,
            sample_rate,
        }
    }
}

struct Playback {
    playing: AtomicBool,
    cursor: AtomicUsize,
}

impl Playback {
    /// Fills `out` from the clip, wrapping at the end, or with silence when stopped.
    fn fill(&self, clip: &[f32], out: &mut [f32]) {
        if !self.playing.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }

        let mut cursor = self.cursor.load(Ordering::Relaxed);
        for sample in out.iter_mut() {
            if cursor >= clip.len() {
                cursor = 0;
            }
            *sample = clip[cursor];
            cursor += 1;
        }
        self.cursor.store(cursor, Ordering::Relaxed);
    }
}

pub struct LoopingAudio {
    stream: Option<Stream>,
    playback: Arc<Playback>,
}

impl LoopingAudio {
    pub fn load(path: &Path) -> Result<Self> {
        let clip = Clip::from_wav(path)?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| GuardianError::Audio("no output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| GuardianError::Audio(format!("failed to get default config: {e}")))?;

        let channels = usize::from(config.channels());
        let sample_rate = config.sample_rate().0;
        let clip: Arc<[f32]> = clip.convert(channels, sample_rate).samples.into();
        info!(
            path = %path.display(),
            channels,
            sample_rate,
            "penalty audio loaded"
        );

        let playback = Arc::new(Playback {
            playing: AtomicBool::new(false),
            cursor: AtomicUsize::new(0),
        });

        let err_fn = |err: cpal::StreamError| error!("audio stream error: {}", err);
        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let playback = Arc::clone(&playback);
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _| playback.fill(&clip, data),
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let playback = Arc::clone(&playback);
                let mut scratch = Vec::new();
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [i16], _| {
                        scratch.resize(data.len(), 0.0);
                        playback.fill(&clip, &mut scratch);
                        for (out, sample) in data.iter_mut().zip(scratch.iter().copied()) {
                            *out = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(GuardianError::Audio(format!(
                    "unsupported output sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| GuardianError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| GuardianError::Audio(format!("failed to start output stream: {e}")))?;

        Ok(Self {
            stream: Some(stream),
            playback,
        })
    }
}

impl AudioChannel for LoopingAudio {
    fn play_looped(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(GuardianError::Audio("audio output already shut down".to_string()));
        }
        self.playback.cursor.store(0, Ordering::Relaxed);
        self.playback.playing.store(true, Ordering::Release);
        debug!("penalty audio playing");
        Ok(())
    }

    fn stop(&mut self) {
        self.playback.playing.store(false, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.stream.is_some() && self.playback.playing.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        self.stop();
        if self.stream.take().is_some() {
            debug!("audio output closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playback() -> Playback {
        Playback {
            playing: AtomicBool::new(true),
            cursor: AtomicUsize::new(0),
        }
    }

    #[test]
    fn fill_wraps_around_the_clip() {
        let clip = [0.1, 0.2, 0.3];
        let playback = playback();

        let mut out = [0.0; 7];
        playback.fill(&clip, &mut out);

        assert_eq!(out, [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn fill_is_silent_when_stopped() {
        let playback = playback();
        playback.playing.store(false, Ordering::Release);

        let mut out = [1.0; 4];
        playback.fill(&[0.5, 0.5], &mut out);

        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn convert_duplicates_mono_into_stereo() {
        let clip = Clip {
            samples: vec![0.25, -0.25],
            channels: 1,
            sample_rate: 8000,
        };

        let stereo = clip.convert(2, 8000);
        assert_eq!(stereo.samples, vec![0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn convert_resamples_to_device_rate() {
        let clip = Clip {
            samples: vec![0.0, 1.0],
            channels: 1,
            sample_rate: 8000,
        };

        let upsampled = clip.convert(1, 16000);
        assert_eq!(upsampled.samples, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn wav_round_trip_decodes_int_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [16384_i16, -16384, 0, 32767] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let clip = Clip::from_wav(&path).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples.len(), 4);
        assert!((clip.samples[0] - 0.5).abs() < 1e-6);
        assert!((clip.samples[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_wav_is_an_audio_error() {
        let err = Clip::from_wav(Path::new("/nonexistent/penalty.wav")).unwrap_err();
        assert!(matches!(err, GuardianError::Audio(_)));
    }
}
