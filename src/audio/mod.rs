//! Audio handling
//!
//! Microphone capture, transient scratch files and the published audio directory.

mod capture;
mod publish;
mod resource;

pub use capture::{
    AudioSource, Microphone, RECORD_DURATION, SAMPLE_RATE, capture_to, downmix, fit_clip, read_wav,
    resample, rms, samples_for, write_wav,
};
pub use publish::{AudioPublisher, PublishKind, PublishedAudio};
pub use resource::{AudioScratch, TransientAudio};
