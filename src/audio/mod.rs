//! Audio output using cpal
//! Percussive step clicks and held keyboard tones mixed by a tiny voice synth
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rand::Rng;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{GrooveboxError, Result};

const CLICK_GAIN: f32 = 0.1;
const CLICK_SECONDS: f32 = 0.1;
const TONE_GAIN: f32 = 0.2;
const RELEASE_SECONDS: f32 = 0.5;
const GAIN_FLOOR: f32 = 0.01;
pub const DEFAULT_CUTOFF_HZ: f32 = 1000.0;

/// Anything that can sound the groovebox: the real audio device or a test double
pub trait Instrument {
    fn click(&mut self);
    fn note_on(&mut self, frequency: f32);
    fn note_off(&mut self, frequency: f32);
    fn set_cutoff(&mut self, cutoff_hz: f32);
    /// Oscillator shape for keyboard tones started after this call
    fn set_waveform(&mut self, waveform: Waveform);
}

/// Instrument that makes no sound
#[derive(Debug, Default)]
pub struct Silent;

impl Instrument for Silent {
    fn click(&mut self) {}
    fn note_on(&mut self, _frequency: f32) {}
    fn note_off(&mut self, _frequency: f32) {}
    fn set_cutoff(&mut self, _cutoff_hz: f32) {}
    fn set_waveform(&mut self, _waveform: Waveform) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Waveform {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }

    /// Value at `phase` in [0, 1), in [-1, 1]
    fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone)]
struct Voice {
    frequency: f32,
    waveform: Waveform,
    /// Keyboard tone (filtered, released by note off) rather than a click
    tone: bool,
    phase: f32,
    gain: f32,
    /// Per-sample gain multiplier while decaying
    decay: f32,
    /// Samples left before the voice is dropped; None while held
    remaining: Option<u32>,
    lowpass: f32,
}

impl Voice {
    fn next_sample(&mut self, sample_rate: f32, cutoff_hz: f32) -> f32 {
        let raw = self.waveform.sample(self.phase);

        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let shaped = if self.tone {
            let alpha = 1.0 - (-2.0 * PI * cutoff_hz / sample_rate).exp();
            self.lowpass += alpha * (raw - self.lowpass);
            self.lowpass
        } else {
            raw
        };

        let out = shaped * self.gain;
        if let Some(remaining) = self.remaining.as_mut() {
            self.gain *= self.decay;
            *remaining = remaining.saturating_sub(1);
        }
        out
    }

    fn is_finished(&self) -> bool {
        self.remaining == Some(0)
    }

    fn release(&mut self, sample_rate: f32) {
        let samples = (RELEASE_SECONDS * sample_rate).max(1.0);
        self.decay = decay_factor(self.gain, GAIN_FLOOR, samples);
        self.remaining = Some(samples as u32);
    }
}

/// Multiplier that takes `from` to `to` in `samples` steps
fn decay_factor(from: f32, to: f32, samples: f32) -> f32 {
    if from <= to {
        return 1.0;
    }
    (to / from).powf(1.0 / samples)
}

#[derive(Debug)]
pub struct Synth {
    sample_rate: f32,
    cutoff_hz: f32,
    waveform: Waveform,
    voices: Vec<Voice>,
}

impl Synth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            waveform: Waveform::default(),
            voices: Vec::new(),
        }
    }

    pub fn click(&mut self, frequency: f32) {
        let samples = (CLICK_SECONDS * self.sample_rate).max(1.0);
        self.voices.push(Voice {
            frequency,
            waveform: Waveform::Square,
            tone: false,
            phase: 0.0,
            gain: CLICK_GAIN,
            decay: decay_factor(CLICK_GAIN, GAIN_FLOOR, samples),
            remaining: Some(samples as u32),
            lowpass: 0.0,
        });
    }

    pub fn note_on(&mut self, frequency: f32) {
        self.note_off(frequency);
        self.voices.push(Voice {
            frequency,
            waveform: self.waveform,
            tone: true,
            phase: 0.0,
            gain: TONE_GAIN,
            decay: 1.0,
            remaining: None,
            lowpass: 0.0,
        });
    }

    pub fn note_off(&mut self, frequency: f32) {
        let sample_rate = self.sample_rate;
        for voice in self.voices.iter_mut().filter(|v| {
            v.tone
                && v.remaining.is_none()
                && (v.frequency - frequency).abs() < 1e-3
        }) {
            voice.release(sample_rate);
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz.max(1.0);
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn held_notes(&self) -> usize {
        self.voices.iter().filter(|v| v.remaining.is_none()).count()
    }

    /// Mix all voices into an interleaved buffer
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in data.chunks_mut(channels) {
            let mut mixed = 0.0;
            for voice in &mut self.voices {
                if !voice.is_finished() {
                    mixed += voice.next_sample(self.sample_rate, self.cutoff_hz);
                }
            }
            frame.iter_mut().for_each(|sample| *sample = mixed);
        }
        self.voices.retain(|voice| !voice.is_finished());
    }
}

pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    synth: Arc<Mutex<Synth>>,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| GrooveboxError::Audio("No output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| GrooveboxError::Audio(e.to_string()))?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        let synth = Arc::new(Mutex::new(Synth::new(sample_rate)));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let synth = Arc::clone(&synth);
                device
                    .build_output_stream(
                        &config.into(),
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            synth
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .render(data, channels);
                        },
                        |err| tracing::error!("Audio stream error: {}", err),
                        None,
                    )
                    .map_err(|e| GrooveboxError::Audio(e.to_string()))?
            }
            other => {
                return Err(GrooveboxError::Audio(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| GrooveboxError::Audio(e.to_string()))?;

        tracing::info!("Audio output running at {} Hz", sample_rate);
        Ok(Self {
            stream: Some(stream),
            synth,
        })
    }

    fn with_synth(&self, f: impl FnOnce(&mut Synth)) {
        // Without a stream nothing would drain the voices
        if self.stream.is_some() {
            f(&mut self.synth.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::warn!("Failed to initialize audio output: {}. Audio disabled.", e);
            Self {
                stream: None,
                synth: Arc::new(Mutex::new(Synth::new(44_100.0))),
            }
        })
    }
}

impl Instrument for AudioOutput {
    fn click(&mut self) {
        let frequency = rand::thread_rng().gen_range(200.0_f32..1000.0);
        self.with_synth(|synth| synth.click(frequency));
    }

    fn note_on(&mut self, frequency: f32) {
        self.with_synth(|synth| synth.note_on(frequency));
    }

    fn note_off(&mut self, frequency: f32) {
        self.with_synth(|synth| synth.note_off(frequency));
    }

    fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.synth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_cutoff(cutoff_hz);
    }

    fn set_waveform(&mut self, waveform: Waveform) {
        self.synth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_waveform(waveform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 1000.0;

    #[test]
    fn test_click_decays_and_ends() {
        let mut synth = Synth::new(RATE);
        synth.click(250.0);
        assert_eq!(synth.active_voices(), 1);

        let mut first = vec![0.0; 10];
        synth.render(&mut first, 1);
        assert!((first[0] - CLICK_GAIN).abs() < 1e-6);

        let mut rest = vec![0.0; 200];
        synth.render(&mut rest, 1);
        assert_eq!(synth.active_voices(), 0);
        assert!(rest[95].abs() <= CLICK_GAIN * 0.2);
        assert_eq!(rest[150], 0.0);
    }

    #[test]
    fn test_held_note_until_release() {
        let mut synth = Synth::new(RATE);
        synth.note_on(220.0);
        let mut buffer = vec![0.0; 2000];
        synth.render(&mut buffer, 2);
        assert_eq!(synth.held_notes(), 1);
        assert!(buffer.iter().any(|s| s.abs() > 0.01));
        // Stereo frames carry the same sample
        assert_eq!(buffer[10], buffer[11]);

        synth.note_off(220.0);
        assert_eq!(synth.held_notes(), 0);
        let mut tail = vec![0.0; 600];
        synth.render(&mut tail, 1);
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_retrigger_replaces_held_note() {
        let mut synth = Synth::new(RATE);
        synth.note_on(330.0);
        synth.note_on(330.0);
        assert_eq!(synth.held_notes(), 1);
        assert_eq!(synth.active_voices(), 2);
    }

    #[test]
    fn test_cutoff_has_floor() {
        let mut synth = Synth::new(RATE);
        assert_eq!(synth.cutoff(), DEFAULT_CUTOFF_HZ);
        synth.set_cutoff(-5.0);
        assert_eq!(synth.cutoff(), 1.0);
    }

    #[test]
    fn test_waveform_applies_to_new_tones() {
        let mut synth = Synth::new(RATE);
        assert_eq!(synth.waveform(), Waveform::Sawtooth);
        synth.note_on(220.0);
        synth.set_waveform(Waveform::Square);
        synth.note_on(330.0);

        let shapes: Vec<Waveform> = synth.voices.iter().map(|v| v.waveform).collect();
        assert_eq!(shapes, vec![Waveform::Sawtooth, Waveform::Square]);

        // Clicks stay square whatever the tone shape
        synth.set_waveform(Waveform::Sine);
        synth.click(500.0);
        assert_eq!(synth.voices[2].waveform, Waveform::Square);
        assert!(!synth.voices[2].tone);
    }

    #[test]
    fn test_waveform_shapes() {
        assert!((Waveform::Sine.sample(0.25) - 1.0).abs() < 1e-6);
        assert_eq!(Waveform::Square.sample(0.75), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
        assert_eq!(Waveform::Triangle.sample(0.5), 1.0);
        assert_eq!(Waveform::Triangle.sample(0.0), -1.0);
    }

    #[test]
    fn test_decay_factor() {
        let factor = decay_factor(0.1, 0.01, 100.0);
        assert!((0.1 * factor.powi(100) - 0.01).abs() < 1e-5);
        assert_eq!(decay_factor(0.005, 0.01, 10.0), 1.0);
    }
}
