//! Turns a stream of microphone chunks into finished WAV clips.
//!
//! [`Recorder`] is the [`CaptureDevice`] the composer talks to.  The
//! microphone runs continuously; samples are kept only between `start` and
//! `stop`.  On `stop` the take is length-checked and encoded as 16-bit PCM
//! WAV with `hound`.

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{AudioChunk, AudioClip, CaptureDevice, CaptureError};
use crate::config::CaptureConfig;

#[derive(Debug, Default)]
struct Take {
    samples: Vec<f32>,
    recording: bool,
    sample_rate: u32,
    channels: u16,
    truncated: bool,
    unavailable: Option<String>,
}

/// Accumulates samples while recording is active.
#[derive(Debug)]
pub struct Recorder {
    take: Mutex<Take>,
    min_recording_secs: f32,
    max_recording_secs: f32,
}

impl Recorder {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            take: Mutex::new(Take::default()),
            min_recording_secs: config.min_recording_secs,
            max_recording_secs: config.max_recording_secs,
        }
    }

    /// Mark the recorder as having no usable microphone; `start` will fail
    /// with [`CaptureError::Unavailable`] carrying `reason`.
    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        self.lock().unavailable = Some(reason.into());
    }

    /// Whether a take is in progress.
    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    /// Accept one chunk from the microphone.  Ignored unless recording.
    pub fn feed(&self, chunk: &AudioChunk) {
        let mut take = self.lock();
        if !take.recording || chunk.sample_rate == 0 || chunk.channels == 0 {
            return;
        }
        take.sample_rate = chunk.sample_rate;
        take.channels = chunk.channels;

        let max_samples = (self.max_recording_secs * chunk.sample_rate as f32) as usize
            * chunk.channels as usize;
        let room = max_samples.saturating_sub(take.samples.len());
        if chunk.samples.len() > room {
            if !take.truncated {
                log::warn!(
                    "recorder: reached {:.0}s limit, dropping further audio",
                    self.max_recording_secs
                );
                take.truncated = true;
            }
            take.samples.extend_from_slice(&chunk.samples[..room]);
        } else {
            take.samples.extend_from_slice(&chunk.samples);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Take> {
        self.take.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureDevice for Recorder {
    fn start(&self) -> Result<(), CaptureError> {
        let mut take = self.lock();
        if let Some(reason) = &take.unavailable {
            return Err(CaptureError::Unavailable(reason.clone()));
        }
        if take.recording {
            return Err(CaptureError::AlreadyRecording);
        }
        take.samples.clear();
        take.truncated = false;
        take.recording = true;
        log::debug!("recorder: started");
        Ok(())
    }

    fn stop(&self) -> Result<AudioClip, CaptureError> {
        let (samples, sample_rate, channels) = {
            let mut take = self.lock();
            if !take.recording {
                return Err(CaptureError::NotRecording);
            }
            take.recording = false;
            (
                std::mem::take(&mut take.samples),
                take.sample_rate,
                take.channels,
            )
        };

        let duration_secs = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f32 / (sample_rate as f32 * channels as f32)
        };
        log::debug!("recorder: stopped after {duration_secs:.2}s");

        // an empty take has no format to encode
        if samples.is_empty() || duration_secs < self.min_recording_secs {
            return Err(CaptureError::TooShort {
                min_secs: self.min_recording_secs,
                got_secs: duration_secs,
            });
        }

        let bytes = encode_wav(&samples, sample_rate, channels)?;
        Ok(AudioClip::new(bytes, duration_secs))
    }

    fn cancel(&self) {
        let mut take = self.lock();
        if take.recording {
            log::debug!("recorder: take cancelled");
        }
        take.recording = false;
        take.samples.clear();
    }
}

/// Encode interleaved `f32` samples in `[-1.0, 1.0]` as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        for &sample in samples {
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(value)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
