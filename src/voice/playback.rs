//! Audio playback to speakers
//!
//! Each clip plays on its own thread that owns the `cpal` stream, so the
//! stream never has to cross threads. Completion is reported through a
//! oneshot channel; halting joins the thread so the device is released before
//! `halt` returns.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Poll interval of the playback thread
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Audio ready to be played
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// MP3-encoded bytes (both TTS backends return MP3)
    Mp3(Vec<u8>),
    /// Mono f32 samples
    Pcm { samples: Vec<f32>, sample_rate: u32 },
}

impl AudioSource {
    /// Size of the payload in bytes or samples
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Mp3(bytes) => bytes.len(),
            Self::Pcm { samples, .. } => samples.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stops an in-progress playback
pub trait PlaybackControl: Send {
    /// Stop playback and release the audio resource
    ///
    /// Must be idempotent and must not fail.
    fn halt(&mut self);
}

/// A started playback: completion signal plus the control to halt it
pub struct PlaybackHandle {
    finished: oneshot::Receiver<()>,
    control: Box<dyn PlaybackControl>,
}

impl PlaybackHandle {
    /// `finished` must be completed when the audio reaches its natural end
    #[must_use]
    pub fn new(finished: oneshot::Receiver<()>, control: Box<dyn PlaybackControl>) -> Self {
        Self { finished, control }
    }

    #[must_use]
    pub fn into_parts(self) -> (oneshot::Receiver<()>, Box<dyn PlaybackControl>) {
        (self.finished, self.control)
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle").finish_non_exhaustive()
    }
}

/// Something that can open audio for playback
pub trait AudioSink: Send + Sync {
    /// Begin playing `source`
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackInit` if the audio cannot be decoded or the
    /// output device cannot be opened
    fn play(&self, source: AudioSource) -> Result<PlaybackHandle>;
}

/// Plays audio on the default output device
#[derive(Debug, Clone, Copy)]
pub struct CpalSink;

impl CpalSink {
    /// Create a sink, checking that an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio output available"
        );

        Ok(Self)
    }
}

impl AudioSink for CpalSink {
    fn play(&self, source: AudioSource) -> Result<PlaybackHandle> {
        let (samples, sample_rate) = match source {
            AudioSource::Mp3(bytes) => decode_mp3(&bytes)?,
            AudioSource::Pcm {
                samples,
                sample_rate,
            } => (samples, sample_rate),
        };

        if samples.is_empty() {
            return Err(Error::PlaybackInit("no audio samples".to_string()));
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (done_tx, done_rx) = oneshot::channel();
        let halt = Arc::new(AtomicBool::new(false));
        let thread_halt = Arc::clone(&halt);

        let thread = std::thread::Builder::new()
            .name("companion-playback".to_string())
            .spawn(move || {
                play_blocking(samples, sample_rate, &thread_halt, &ready_tx, done_tx);
            })
            .map_err(|e| Error::PlaybackInit(format!("failed to spawn playback thread: {e}")))?;

        let mut control = CpalControl {
            halt,
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(PlaybackHandle::new(done_rx, Box::new(control))),
            Ok(Err(e)) => {
                control.halt();
                Err(e)
            }
            Err(_) => {
                control.halt();
                Err(Error::PlaybackInit("playback thread exited".to_string()))
            }
        }
    }
}

struct CpalControl {
    halt: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackControl for CpalControl {
    fn halt(&mut self) {
        self.halt.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("playback thread panicked");
        }
    }
}

impl Drop for CpalControl {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Body of the playback thread
fn play_blocking(
    samples: Vec<f32>,
    sample_rate: u32,
    halt: &AtomicBool,
    ready_tx: &std::sync::mpsc::Sender<Result<()>>,
    done_tx: oneshot::Sender<()>,
) {
    let finished = Arc::new(AtomicBool::new(false));
    let sample_count = samples.len();

    let stream = match open_stream(samples, sample_rate, Arc::clone(&finished)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    while !finished.load(Ordering::SeqCst) && !halt.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);

    if halt.load(Ordering::SeqCst) {
        tracing::debug!(samples = sample_count, "playback halted");
    } else {
        tracing::debug!(samples = sample_count, "playback complete");
        // Receiver may already be gone if the session was disposed
        let _ = done_tx.send(());
    }
}

/// Open and start an output stream that plays `samples` once
fn open_stream(
    samples: Vec<f32>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::PlaybackInit("no output device".to_string()))?;

    let config = output_config(&device, sample_rate)?;
    let channels = usize::from(config.channels);
    let samples = Arc::new(samples);
    let position = AtomicUsize::new(0);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    if pos < samples.len() {
                        pos += 1;
                    } else {
                        finished.store(true, Ordering::SeqCst);
                    }
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
                position.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::PlaybackInit(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::PlaybackInit(e.to_string()))?;

    tracing::debug!(sample_rate, channels, "playback started");
    Ok(stream)
}

/// Pick an f32 output config at `sample_rate`, preferring mono
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| {
            Error::PlaybackInit(format!("no output config for {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Decode MP3 bytes to mono f32 samples and the stream's sample rate
///
/// # Errors
///
/// Returns `Error::PlaybackInit` if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }

                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::PlaybackInit(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::PlaybackInit("MP3 contained no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_source_len() {
        assert!(AudioSource::Mp3(Vec::new()).is_empty());
        let pcm = AudioSource::Pcm {
            samples: vec![0.0; 10],
            sample_rate: 24_000,
        };
        assert_eq!(pcm.len(), 10);
    }

    #[test]
    fn test_decode_garbage_is_init_error() {
        let err = decode_mp3(b"definitely not an mp3").unwrap_err();
        assert!(matches!(err, Error::PlaybackInit(_)));
    }
}
