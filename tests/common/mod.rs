//! Shared test utilities: scripted stand-ins for the microphone, transcriber,
//! completion service and speech engine

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use voxloop::audio::{AudioPublisher, AudioScratch, AudioSource, samples_for, write_wav};
use voxloop::dialogue::{CompletionRequest, CompletionService};
use voxloop::stt::Transcriber;
use voxloop::tts::{SpeechEngine, Synthesizer};
use voxloop::{Dialogue, Error, Orchestrator, Result, Stages};

pub const TEST_RATE: u32 = 16000;

/// Produces silence, or fails like a missing device
pub struct FakeMicrophone {
    pub fail: bool,
}

impl AudioSource for FakeMicrophone {
    fn record(&self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>> {
        if self.fail {
            return Err(Error::Device("no input device available".to_string()));
        }
        Ok(vec![0.0; samples_for(duration, sample_rate)])
    }
}

/// Returns queued transcripts in order, remembering every clip path it was given
#[derive(Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<VecDeque<String>>,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedTranscriber {
    pub fn new(transcripts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            transcripts: Mutex::new(transcripts.iter().map(ToString::to_string).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        assert!(path.exists(), "clip should exist while transcribing");
        self.seen.lock().unwrap().push(path.to_path_buf());
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Transcription("no transcript scripted".to_string()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Answers every request with the same reply (or fails), recording requests
pub struct RecordingService {
    reply: Option<String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingService {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for RecordingService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| Error::Service("429 rate limited".to_string()))
    }
}

/// Writes a short silent WAV, or writes nothing at all when `silent`
pub struct FakeEngine {
    silent: bool,
    pub texts: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn writing() -> Arc<Self> {
        Arc::new(Self {
            silent: false,
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            silent: true,
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    async fn render(&self, text: &str, path: &Path) -> Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        if !self.silent {
            write_wav(path, &[0.0; 160], TEST_RATE)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Fakes and directories behind a test orchestrator
pub struct Fixture {
    pub transcriber: Arc<ScriptedTranscriber>,
    pub service: Arc<RecordingService>,
    pub engine: Arc<FakeEngine>,
    pub scratch_dir: TempDir,
    pub public_dir: TempDir,
}

impl Fixture {
    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.scratch_dir.path()).unwrap().count()
    }

    pub fn published_files(&self) -> usize {
        std::fs::read_dir(self.public_dir.path()).unwrap().count()
    }
}

/// An orchestrator wired to fakes
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub fixture: Fixture,
}

impl Deref for Harness {
    type Target = Fixture;

    fn deref(&self) -> &Fixture {
        &self.fixture
    }
}

impl Harness {
    pub fn new(transcripts: &[&str], service: Arc<RecordingService>, engine: Arc<FakeEngine>) -> Self {
        Self::build(transcripts, service, engine, false)
    }

    /// Microphone that always fails
    pub fn without_microphone(service: Arc<RecordingService>) -> Self {
        Self::build(&[], service, FakeEngine::writing(), true)
    }

    fn build(
        transcripts: &[&str],
        service: Arc<RecordingService>,
        engine: Arc<FakeEngine>,
        mic_fails: bool,
    ) -> Self {
        let scratch_dir = tempfile::tempdir().unwrap();
        let public_dir = tempfile::tempdir().unwrap();
        let transcriber = ScriptedTranscriber::new(transcripts);

        let orchestrator = Orchestrator::new(Stages {
            source: Arc::new(FakeMicrophone { fail: mic_fails }),
            transcriber: transcriber.clone(),
            dialogue: Dialogue::new(service.clone(), "llama3-8b-8192"),
            synthesizer: Synthesizer::new(engine.clone()).with_polling(3, Duration::from_millis(5)),
            scratch: AudioScratch::new(scratch_dir.path()).unwrap(),
            publisher: AudioPublisher::new(public_dir.path(), "/static/audio").unwrap(),
        })
        .with_capture(Duration::from_millis(10), TEST_RATE);

        Self {
            orchestrator,
            fixture: Fixture {
                transcriber,
                service,
                engine,
                scratch_dir,
                public_dir,
            },
        }
    }
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_mock(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
