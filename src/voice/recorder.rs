//! Listening for one spoken phrase on the default microphone.
//!
//! [`SpeechDetector`] decides when speech starts and ends from sample energy
//! alone; [`SpeechRecorder`] feeds it from a cpal input stream.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::VoiceError;

/// RMS floor so a dead-silent room still needs some sound to trigger.
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// How long the recorder waits for audio from the device before giving up.
const DEVICE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing and sensitivity of phrase detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenSettings {
    /// Ambient noise sampled before listening
    pub ambient_duration: Duration,
    /// Give up if no speech starts within this window
    pub timeout: Duration,
    /// Cut a phrase off after this long, if set
    pub phrase_time_limit: Option<Duration>,
    /// Trailing silence that ends a phrase
    pub pause_threshold: Duration,
    /// Speech must be this many times louder than the ambient level
    pub energy_ratio: f32,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            ambient_duration: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            phrase_time_limit: None,
            pause_threshold: Duration::from_millis(800),
            energy_ratio: 1.5,
        }
    }
}

/// Where the detector is after a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEvent {
    Calibrating,
    Waiting,
    Speaking,
    /// A full phrase was captured
    Finished,
    /// No speech before the timeout
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Calibrating,
    Waiting,
    Speaking,
    Done(DetectorEvent),
}

/// Energy-based phrase detector over mono f32 samples.
#[derive(Debug)]
pub struct SpeechDetector {
    settings: ListenSettings,
    sample_rate: u32,
    phase: Phase,
    ambient_sum_sq: f64,
    ambient_samples: usize,
    threshold: f32,
    waited_samples: usize,
    silent_samples: usize,
    phrase: Vec<f32>,
}

impl SpeechDetector {
    pub fn new(settings: ListenSettings, sample_rate: u32) -> Self {
        Self {
            settings,
            sample_rate,
            phase: Phase::Calibrating,
            ambient_sum_sq: 0.0,
            ambient_samples: 0,
            threshold: MIN_ENERGY_THRESHOLD,
            waited_samples: 0,
            silent_samples: 0,
            phrase: Vec::new(),
        }
    }

    /// Energy level that counts as speech, valid once calibration is done.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed the next chunk of samples.
    pub fn push(&mut self, chunk: &[f32]) -> DetectorEvent {
        match self.phase {
            Phase::Calibrating => {
                self.ambient_sum_sq += chunk.iter().map(|&s| f64::from(s * s)).sum::<f64>();
                self.ambient_samples += chunk.len();
                if self.ambient_samples >= self.samples_for(self.settings.ambient_duration) {
                    let ambient_rms =
                        (self.ambient_sum_sq / self.ambient_samples.max(1) as f64).sqrt() as f32;
                    self.threshold =
                        (ambient_rms * self.settings.energy_ratio).max(MIN_ENERGY_THRESHOLD);
                    log::debug!(
                        "Ambient level {:.4}, threshold {:.4}",
                        ambient_rms,
                        self.threshold
                    );
                    self.phase = Phase::Waiting;
                    return DetectorEvent::Waiting;
                }
                DetectorEvent::Calibrating
            }
            Phase::Waiting => {
                if rms(chunk) > self.threshold {
                    self.phrase.extend_from_slice(chunk);
                    self.phase = Phase::Speaking;
                    return DetectorEvent::Speaking;
                }
                self.waited_samples += chunk.len();
                if self.waited_samples >= self.samples_for(self.settings.timeout) {
                    self.phase = Phase::Done(DetectorEvent::TimedOut);
                    return DetectorEvent::TimedOut;
                }
                DetectorEvent::Waiting
            }
            Phase::Speaking => {
                self.phrase.extend_from_slice(chunk);
                if rms(chunk) > self.threshold {
                    self.silent_samples = 0;
                } else {
                    self.silent_samples += chunk.len();
                }

                let paused =
                    self.silent_samples >= self.samples_for(self.settings.pause_threshold);
                let too_long = self
                    .settings
                    .phrase_time_limit
                    .is_some_and(|limit| self.phrase.len() >= self.samples_for(limit));
                if paused || too_long {
                    self.phase = Phase::Done(DetectorEvent::Finished);
                    return DetectorEvent::Finished;
                }
                DetectorEvent::Speaking
            }
            Phase::Done(event) => event,
        }
    }

    /// Samples of the captured phrase (empty unless speech was detected).
    pub fn into_phrase(self) -> Vec<f32> {
        self.phrase
    }

    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.sample_rate)) as usize
    }
}

fn rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
    (sum_sq / chunk.len() as f32).sqrt()
}

/// Records single phrases from the default input device.
#[derive(Debug, Clone, Default)]
pub struct SpeechRecorder {
    settings: ListenSettings,
}

impl SpeechRecorder {
    pub fn new(settings: ListenSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ListenSettings {
        &self.settings
    }

    /// Block until one phrase is captured and return it as WAV.
    ///
    /// Returns `Ok(None)` when nobody spoke before the timeout.
    ///
    /// # Errors
    ///
    /// `VoiceError::Audio` if there is no usable input device or the stream dies.
    pub fn record(&self) -> Result<Option<Vec<u8>>, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::Audio("no input device available".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| VoiceError::Audio(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let sample_rate = config.sample_rate.0;

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let stream = build_mono_stream(&device, &config, sample_format, tx)?;
        stream.play().map_err(|e| VoiceError::Audio(e.to_string()))?;

        log::info!("Adjusting for ambient noise...");
        let mut detector = SpeechDetector::new(self.settings.clone(), sample_rate);
        let mut announced = false;

        loop {
            let chunk = match rx.recv_timeout(DEVICE_STALL_TIMEOUT) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(VoiceError::Audio(
                        "input device stopped delivering audio".to_string(),
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(VoiceError::Audio("input stream closed".to_string()))
                }
            };

            match detector.push(&chunk) {
                DetectorEvent::Waiting if !announced => {
                    log::info!("Start speaking now...");
                    announced = true;
                }
                DetectorEvent::Finished => break,
                DetectorEvent::TimedOut => {
                    log::warn!("No speech detected within timeout");
                    return Ok(None);
                }
                _ => {}
            }
        }

        drop(stream);
        log::info!("Recording complete");
        samples_to_wav(&detector.into_phrase(), sample_rate).map(Some)
    }
}

fn build_mono_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    tx: mpsc::Sender<Vec<f32>>,
) -> Result<Stream, VoiceError> {
    let channels = usize::from(config.channels.max(1));
    let on_error = |err: cpal::StreamError| log::error!("Audio capture error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(downmix(data, channels, |s| s));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(downmix(data, channels, |s| f32::from(s) / 32768.0));
            },
            on_error,
            None,
        ),
        other => {
            return Err(VoiceError::Audio(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| VoiceError::Audio(e.to_string()))
}

fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Encode mono f32 samples as 16-bit PCM WAV.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| VoiceError::Audio(e.to_string()))?;
        for &sample in samples {
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(value)
                .map_err(|e| VoiceError::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| VoiceError::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn settings() -> ListenSettings {
        ListenSettings {
            ambient_duration: Duration::from_millis(100),
            timeout: Duration::from_millis(500),
            phrase_time_limit: None,
            pause_threshold: Duration::from_millis(200),
            energy_ratio: 1.5,
        }
    }

    fn tone(level: f32, len: usize) -> Vec<f32> {
        (0..len).map(|i| if i % 2 == 0 { level } else { -level }).collect()
    }

    fn calibrated(settings: ListenSettings) -> SpeechDetector {
        let mut detector = SpeechDetector::new(settings, RATE);
        assert_eq!(detector.push(&tone(0.02, 50)), DetectorEvent::Calibrating);
        assert_eq!(detector.push(&tone(0.02, 50)), DetectorEvent::Waiting);
        detector
    }

    #[test]
    fn test_calibration_sets_threshold_above_ambient() {
        let detector = calibrated(settings());
        assert!((detector.threshold() - 0.03).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_has_floor() {
        let mut detector = SpeechDetector::new(settings(), RATE);
        detector.push(&vec![0.0; 100]);
        assert_eq!(detector.threshold(), MIN_ENERGY_THRESHOLD);
    }

    #[test]
    fn test_times_out_without_speech() {
        let mut detector = calibrated(settings());
        for _ in 0..4 {
            assert_eq!(detector.push(&tone(0.02, 100)), DetectorEvent::Waiting);
        }
        assert_eq!(detector.push(&tone(0.02, 100)), DetectorEvent::TimedOut);
        // Sticky once done
        assert_eq!(detector.push(&tone(0.5, 100)), DetectorEvent::TimedOut);
        assert!(detector.into_phrase().is_empty());
    }

    #[test]
    fn test_phrase_ends_after_pause() {
        let mut detector = calibrated(settings());
        assert_eq!(detector.push(&tone(0.5, 100)), DetectorEvent::Speaking);
        assert_eq!(detector.push(&tone(0.5, 100)), DetectorEvent::Speaking);
        assert_eq!(detector.push(&tone(0.0, 100)), DetectorEvent::Speaking);
        assert_eq!(detector.push(&tone(0.0, 100)), DetectorEvent::Finished);
        assert_eq!(detector.into_phrase().len(), 400);
    }

    #[test]
    fn test_speech_resets_silence() {
        let mut detector = calibrated(settings());
        detector.push(&tone(0.5, 100));
        detector.push(&tone(0.0, 100));
        assert_eq!(detector.push(&tone(0.5, 100)), DetectorEvent::Speaking);
        assert_eq!(detector.push(&tone(0.0, 100)), DetectorEvent::Speaking);
        assert_eq!(detector.push(&tone(0.0, 100)), DetectorEvent::Finished);
    }

    #[test]
    fn test_phrase_time_limit() {
        let mut detector = calibrated(ListenSettings {
            phrase_time_limit: Some(Duration::from_millis(300)),
            ..settings()
        });
        detector.push(&tone(0.5, 100));
        detector.push(&tone(0.5, 100));
        assert_eq!(detector.push(&tone(0.5, 100)), DetectorEvent::Finished);
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[0.2f32, 0.4, -1.0, 1.0], 2, |s| s);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_samples_to_wav_header_and_length() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], 16_000).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 4 samples * 2 bytes
        assert_eq!(wav.len(), 44 + 8);
    }
}
