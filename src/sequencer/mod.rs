//! Core sequencer logic - pattern state and step management
//! The tick transition is pure: it returns events instead of touching audio or UI
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GrooveboxError, Result};

pub mod playback;

pub const PATTERN_LENGTH: usize = 16;
pub const DEFAULT_BPM: u32 = 120;

/// Probability that a step is set by `Pattern::randomize`
pub const RANDOM_STEP_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    steps: Vec<bool>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::with_len(PATTERN_LENGTH)
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            steps: vec![false; len],
        }
    }

    pub fn from_steps(steps: Vec<bool>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> bool {
        self.steps.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if let Some(step) = self.steps.get_mut(index) {
            *step = value;
        }
    }

    /// Flip a step, returning its new state (None when out of range)
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        let step = self.steps.get_mut(index)?;
        *step = !*step;
        Some(*step)
    }

    pub fn clear(&mut self) {
        self.steps.iter_mut().for_each(|step| *step = false);
    }

    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for step in &mut self.steps {
            *step = rng.gen_bool(RANDOM_STEP_PROBABILITY);
        }
    }

    /// Copy received steps over this pattern. Extra entries are ignored,
    /// positions past the received slice keep their value.
    pub fn apply(&mut self, steps: &[bool]) {
        for (step, &active) in self.steps.iter_mut().zip(steps) {
            *step = active;
        }
    }

    pub fn active_count(&self) -> usize {
        self.steps.iter().filter(|&&step| step).count()
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrumType {
    Kick,
    Snare,
    Hihat,
    Clap,
}

impl DrumType {
    pub const TABLE: [DrumType; 4] = [
        DrumType::Kick,
        DrumType::Snare,
        DrumType::Hihat,
        DrumType::Clap,
    ];

    pub fn for_step(index: usize) -> Self {
        Self::TABLE[index % Self::TABLE.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DrumType::Kick => "KICK",
            DrumType::Snare => "SNARE",
            DrumType::Hihat => "HIHAT",
            DrumType::Clap => "CLAP",
        }
    }
}

/// Tick period in milliseconds at sixteenth-note resolution
pub fn step_period_ms(bpm: u32) -> f64 {
    (60.0 / bpm as f64) * 1000.0 / 4.0
}

pub fn step_period(bpm: u32) -> Duration {
    Duration::from_secs_f64(step_period_ms(bpm) / 1000.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Playing marker moved: `cleared` lost it, `current` gained it
    Playhead { cleared: usize, current: usize },
    /// `step` is 1-based
    Trigger { step: usize, drum: DrumType },
}

/// Sequencer session state driven by the clock
#[derive(Debug, Clone)]
pub struct Sequencer {
    pattern: Pattern,
    cursor: usize,
    bpm: u32,
    state: TransportState,
    playing_marker: Option<usize>,
    recording: bool,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::with_pattern(Pattern::new())
    }

    pub fn with_pattern(pattern: Pattern) -> Self {
        Self {
            pattern,
            cursor: 0,
            bpm: DEFAULT_BPM,
            state: TransportState::Stopped,
            playing_marker: None,
            recording: false,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    pub fn playing_marker(&self) -> Option<usize> {
        self.playing_marker
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn step_period(&self) -> Duration {
        step_period(self.bpm)
    }

    /// Returns the tick period when the transport actually started,
    /// None if it was already running.
    pub fn start(&mut self) -> Option<Duration> {
        if self.is_running() {
            return None;
        }
        self.state = TransportState::Running;
        self.cursor = 0;
        Some(self.step_period())
    }

    /// Returns the marker position that was cleared, if any
    pub fn stop(&mut self) -> Option<usize> {
        self.state = TransportState::Stopped;
        self.recording = false;
        self.playing_marker.take()
    }

    /// Store a new tempo. While running this restarts the transport and
    /// returns the new period; the cursor goes back to 0 and recording stops.
    pub fn set_bpm(&mut self, bpm: u32) -> Result<Option<Duration>> {
        if bpm == 0 {
            return Err(GrooveboxError::InvalidTempo(bpm));
        }
        self.bpm = bpm;
        if self.is_running() {
            self.stop();
            return Ok(self.start());
        }
        Ok(None)
    }

    pub fn tick(&mut self) -> Vec<ClockEvent> {
        let len = self.pattern.len();
        if !self.is_running() || len == 0 {
            return Vec::new();
        }

        // Pattern may have shrunk since the last tick
        if self.cursor >= len {
            self.cursor = 0;
        }

        let cleared = if self.cursor > 0 {
            self.cursor - 1
        } else {
            len - 1
        };
        self.playing_marker = Some(self.cursor);

        let mut events = vec![ClockEvent::Playhead {
            cleared,
            current: self.cursor,
        }];

        if self.pattern.get(self.cursor) {
            events.push(ClockEvent::Trigger {
                step: self.cursor + 1,
                drum: DrumType::for_step(self.cursor),
            });
        }

        self.cursor = (self.cursor + 1) % len;
        events
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
