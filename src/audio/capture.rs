//! Fixed-length audio capture from the microphone

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};
use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Sample rate for recorded and synthesized audio
pub const SAMPLE_RATE: u32 = 22050;

/// Length of one recorded utterance
pub const RECORD_DURATION: Duration = Duration::from_secs(12);

/// Extra time allowed for the device to deliver the tail of a recording
const DRAIN_GRACE: Duration = Duration::from_millis(750);

/// Resampler input block size
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Something that can record a mono clip
///
/// `record` blocks the calling thread until the clip is complete.
pub trait AudioSource: Send + Sync {
    /// Record exactly `duration` of mono audio at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the input device is unavailable
    fn record(&self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>>;
}

/// Records from the default input device
///
/// The device runs at its own default rate and sample format; the clip is
/// downmixed and resampled to the requested rate afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct Microphone;

impl Microphone {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Open the default input device with its default config
    fn open() -> Result<(Device, SupportedStreamConfig)> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let config = device
            .default_input_config()
            .map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            format = ?config.sample_format(),
            "audio capture initialized"
        );

        Ok((device, config))
    }

    fn build_stream(
        device: &Device,
        config: &SupportedStreamConfig,
        sink: Arc<Mutex<Vec<f32>>>,
    ) -> Result<Stream> {
        let stream_config: StreamConfig = config.config();

        let stream = match config.sample_format() {
            SampleFormat::F32 => input_stream::<f32>(device, &stream_config, sink),
            SampleFormat::I16 => input_stream::<i16>(device, &stream_config, sink),
            SampleFormat::U16 => input_stream::<u16>(device, &stream_config, sink),
            SampleFormat::I32 => input_stream::<i32>(device, &stream_config, sink),
            other => {
                return Err(Error::Device(format!("unsupported sample format {other:?}")));
            }
        };

        stream.map_err(|e| Error::Device(e.to_string()))
    }
}

/// Input stream converting device samples to f32 into `sink`
fn input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: Arc<Mutex<Vec<f32>>>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = sink.lock() {
                buf.extend(data.iter().map(|&s| s.to_sample::<f32>()));
            }
        },
        |err| {
            tracing::error!(error = %err, "audio capture error");
        },
        None,
    )
}

impl AudioSource for Microphone {
    fn record(&self, duration: Duration, sample_rate: u32) -> Result<Vec<f32>> {
        let (device, config) = Self::open()?;
        let channels = usize::from(config.channels());
        let device_rate = config.sample_rate().0;
        let expected = samples_for(duration, device_rate) * channels;

        let buffer = Arc::new(Mutex::new(Vec::with_capacity(expected)));
        let stream = Self::build_stream(&device, &config, Arc::clone(&buffer))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        tracing::info!(seconds = duration.as_secs_f32(), "recording");

        std::thread::sleep(duration);
        let deadline = Instant::now() + DRAIN_GRACE;
        while buffered(&buffer) < expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        drop(stream);

        let interleaved = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .map_err(|_| Error::Device("capture buffer poisoned".to_string()))?;

        let samples = fit_clip(&interleaved, channels, device_rate, sample_rate, duration)?;
        tracing::debug!(samples = samples.len(), "recording complete");
        Ok(samples)
    }
}

fn buffered(buffer: &Mutex<Vec<f32>>) -> usize {
    buffer.lock().map(|b| b.len()).unwrap_or_default()
}

/// Turn raw interleaved device audio into exactly `duration` of mono at `sample_rate`
///
/// # Errors
///
/// Returns error if the rate pair cannot be resampled
pub fn fit_clip(
    interleaved: &[f32],
    channels: usize,
    device_rate: u32,
    sample_rate: u32,
    duration: Duration,
) -> Result<Vec<f32>> {
    let target = samples_for(duration, sample_rate);
    let mono = downmix(interleaved, channels);
    let mut samples = resample(&mono, device_rate, sample_rate)?;

    if samples.len() < target {
        tracing::warn!(
            captured = samples.len(),
            expected = target,
            "device under-delivered, padding with silence"
        );
    }
    samples.resize(target, 0.0);
    Ok(samples)
}

/// Number of samples in `duration` at `sample_rate`
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}

/// Average interleaved frames down to mono
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Record a clip from `source` and persist it as WAV at `path`
///
/// # Errors
///
/// Returns error if recording or WAV encoding fails
pub fn capture_to(
    source: &dyn AudioSource,
    path: &Path,
    duration: Duration,
    sample_rate: u32,
) -> Result<()> {
    let samples = source.record(duration, sample_rate)?;
    write_wav(path, &samples, sample_rate)
}

/// Write mono f32 samples as a 32-bit float WAV file
///
/// # Errors
///
/// Returns error if the file cannot be created or encoded
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::debug!(path = %path.display(), samples = samples.len(), "wrote wav");
    Ok(())
}

/// Read a WAV file as mono f32 samples, returning them with the file's sample rate
///
/// Integer PCM is scaled to [-1.0, 1.0]; multi-channel audio is downmixed.
///
/// # Errors
///
/// Returns error if the file cannot be read or decoded
#[allow(clippy::cast_precision_loss)]
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok((downmix(&interleaved, usize::from(spec.channels)), spec.sample_rate))
}

/// Resample mono audio between rates
///
/// # Errors
///
/// Returns error if the resampler cannot be built for the rate pair
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
    if from_hz == to_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_hz as usize,
        to_hz as usize,
        RESAMPLER_CHUNK_SIZE,
        1,
        1,
    )
    .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))?;

    let chunk_size = resampler.input_frames_next();
    let expected = (samples.len() as f64 * f64::from(to_hz) / f64::from(from_hz)).round() as usize;
    let mut output = Vec::with_capacity(expected + resampler.output_frames_max());

    for chunk in samples.chunks(chunk_size) {
        let block = if chunk.len() == chunk_size {
            chunk.to_vec()
        } else {
            let mut padded = vec![0.0; chunk_size];
            padded[..chunk.len()].copy_from_slice(chunk);
            padded
        };
        let out = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&out[0]);
    }

    output.truncate(expected);
    Ok(output)
}

/// Calculate RMS energy
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
