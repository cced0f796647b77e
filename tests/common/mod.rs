//! Shared test utilities
//!
//! In-memory stand-ins for every collaborator the orchestrator drives, so the
//! loop can run under a paused clock without a screen, network or speakers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use screen_companion::capture::{ScreenCapture, Screenshot};
use screen_companion::config::TimingConfig;
use screen_companion::model::{ChatCompleter, VisionAnalyzer};
use screen_companion::voice::{
    AudioSink, AudioSource, FreeTts, PlaybackControl, PlaybackHandle, PrimaryTts, SpeechGateway,
};
use screen_companion::{
    CharacterRoster, Components, Error, Orchestrator, Perception, Result, Surface,
    builtin_characters,
};

/// Minimal PNG signature
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Default reply when a scripted model runs out of responses
pub const DEFAULT_REPLY: &str = "Still staring at that screen?";

/// Timing used by orchestrator tests
#[must_use]
pub fn test_timing() -> TimingConfig {
    TimingConfig {
        cycle_delay: Duration::from_secs(5),
        reveal_delay: Duration::ZERO,
        settle_delay: Duration::from_secs(1),
        playback_timeout: Duration::from_secs(30),
    }
}

/// Screen capture returning a fixed PNG
#[derive(Default)]
pub struct FakeCapture {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeCapture {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScreenCapture for FakeCapture {
    async fn capture(&self) -> Result<Screenshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Capture("no display".to_string()));
        }
        Ok(Screenshot::new(PNG_BYTES.to_vec()))
    }
}

/// Model that answers from a script and records its prompts
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl ScriptedModel {
    pub fn push_reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_error(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Make every call take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    async fn reply(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(DEFAULT_REPLY.to_string()))
    }
}

#[async_trait]
impl VisionAnalyzer for ScriptedModel {
    async fn analyze(&self, prompt: &str, image: &Screenshot) -> Result<String> {
        assert_eq!(image.mime_type(), "image/png");
        self.reply(prompt).await
    }
}

#[async_trait]
impl ChatCompleter for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.reply(prompt).await
    }
}

/// What the fake primary backend does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryBehavior {
    /// Report "no audio" (quota, unknown voice)
    NoAudio,
    /// Return a few bytes of audio
    Audio,
    /// Fail outright
    Fail,
}

/// Primary TTS stand-in
pub struct FakePrimaryTts {
    behavior: Mutex<PrimaryBehavior>,
    calls: AtomicUsize,
}

impl FakePrimaryTts {
    pub fn new(behavior: PrimaryBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: PrimaryBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrimaryTts for FakePrimaryTts {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            PrimaryBehavior::NoAudio => Ok(None),
            PrimaryBehavior::Audio => Ok(Some(vec![0xff, 0xfb, 0x90, 0x00])),
            PrimaryBehavior::Fail => Err(Error::Tts("quota exceeded".to_string())),
        }
    }
}

/// Free TTS stand-in producing a short PCM clip
#[derive(Default)]
pub struct FakeFreeTts {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeFreeTts {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FreeTts for FakeFreeTts {
    async fn synthesize(&self, _text: &str) -> Result<AudioSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tts("offline".to_string()));
        }
        Ok(AudioSource::Pcm {
            samples: vec![0.0; 240],
            sample_rate: 24_000,
        })
    }
}

/// Counters shared between the sink and its playback controls
#[derive(Default)]
pub struct SinkCounters {
    started: AtomicUsize,
    playing: AtomicUsize,
    max_playing: AtomicUsize,
    halted: AtomicUsize,
    mp3_sources: AtomicUsize,
}

/// Audio sink that "plays" for a fixed time, or until halted
pub struct FakeSink {
    counters: Arc<SinkCounters>,
    /// `None` plays forever
    play_for: Option<Duration>,
    fail: AtomicBool,
}

impl FakeSink {
    pub fn new(play_for: Option<Duration>) -> Self {
        Self {
            counters: Arc::new(SinkCounters::default()),
            play_for,
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.counters.started.load(Ordering::SeqCst)
    }

    pub fn playing(&self) -> usize {
        self.counters.playing.load(Ordering::SeqCst)
    }

    pub fn max_playing(&self) -> usize {
        self.counters.max_playing.load(Ordering::SeqCst)
    }

    pub fn halted(&self) -> usize {
        self.counters.halted.load(Ordering::SeqCst)
    }

    pub fn mp3_sources(&self) -> usize {
        self.counters.mp3_sources.load(Ordering::SeqCst)
    }
}

impl AudioSink for FakeSink {
    fn play(&self, source: AudioSource) -> Result<PlaybackHandle> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PlaybackInit("device busy".to_string()));
        }

        let counters = self.counters.clone();
        counters.started.fetch_add(1, Ordering::SeqCst);
        if matches!(source, AudioSource::Mp3(_)) {
            counters.mp3_sources.fetch_add(1, Ordering::SeqCst);
        }
        let now = counters.playing.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_playing.fetch_max(now, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        let active = Arc::new(AtomicBool::new(true));

        let held = match self.play_for {
            Some(duration) => {
                let active = active.clone();
                let counters = counters.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if active.swap(false, Ordering::SeqCst) {
                        counters.playing.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send(());
                    }
                });
                None
            }
            None => Some(tx),
        };

        Ok(PlaybackHandle::new(
            rx,
            Box::new(FakeControl {
                counters,
                active,
                finished: held,
            }),
        ))
    }
}

struct FakeControl {
    counters: Arc<SinkCounters>,
    active: Arc<AtomicBool>,
    finished: Option<oneshot::Sender<()>>,
}

impl PlaybackControl for FakeControl {
    fn halt(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.counters.playing.fetch_sub(1, Ordering::SeqCst);
            self.counters.halted.fetch_add(1, Ordering::SeqCst);
        }
        self.finished = None;
    }
}

/// Surface that records everything shown on it
#[derive(Default)]
pub struct RecordingSurface {
    texts: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
    thinking: AtomicBool,
}

impl RecordingSurface {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }
}

impl Surface for RecordingSurface {
    fn set_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }

    fn set_thinking(&self, thinking: bool) {
        self.thinking.store(thinking, Ordering::SeqCst);
    }

    fn show_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

/// Build a speech gateway over fakes
pub fn gateway(
    primary: &Arc<FakePrimaryTts>,
    free: &Arc<FakeFreeTts>,
    sink: &Arc<FakeSink>,
    playback_timeout: Duration,
) -> SpeechGateway {
    SpeechGateway::new(
        Some(primary.clone() as Arc<dyn PrimaryTts>),
        free.clone(),
        sink.clone(),
        playback_timeout,
    )
}

/// An orchestrator wired to fakes, with handles on each fake
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub capture: Arc<FakeCapture>,
    pub vision: Arc<ScriptedModel>,
    pub chat: Arc<ScriptedModel>,
    pub primary: Arc<FakePrimaryTts>,
    pub free: Arc<FakeFreeTts>,
    pub sink: Arc<FakeSink>,
    pub surface: Arc<RecordingSurface>,
}

impl Harness {
    /// Harness whose audio plays for `play_for` (`None`: until stopped)
    pub fn new(play_for: Option<Duration>) -> Self {
        Self::with_timing(play_for, test_timing())
    }

    pub fn with_timing(play_for: Option<Duration>, timing: TimingConfig) -> Self {
        let capture = Arc::new(FakeCapture::default());
        let vision = Arc::new(ScriptedModel::default());
        let chat = Arc::new(ScriptedModel::default());
        let primary = Arc::new(FakePrimaryTts::new(PrimaryBehavior::NoAudio));
        let free = Arc::new(FakeFreeTts::default());
        let sink = Arc::new(FakeSink::new(play_for));
        let surface = Arc::new(RecordingSurface::default());

        let roster = CharacterRoster::new(builtin_characters(), "kangel").unwrap();

        let orchestrator = Orchestrator::new(Components {
            capture: capture.clone(),
            perception: Perception::new(vision.clone(), chat.clone()),
            speech: Some(gateway(&primary, &free, &sink, timing.playback_timeout)),
            surface: surface.clone(),
            roster,
            timing,
        });

        Self {
            orchestrator,
            capture,
            vision,
            chat,
            primary,
            free,
            sink,
            surface,
        }
    }
}
