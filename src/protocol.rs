//! Relay wire messages.
//!
//! Every WebSocket text frame carries one JSON object of the form
//! `{"event": "<name>", "data": {...}}`. Clients use the typed [`Event`];
//! the relay itself only looks at [`Envelope`] and never enforces a schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sequencer::DrumType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportAction {
    Play,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteAction {
    NoteOn,
    NoteOff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    StepUpdate {
        step: usize,
        active: bool,
    },
    Transport {
        action: TransportAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bpm: Option<u32>,
    },
    Trigger {
        step: usize,
        #[serde(rename = "type")]
        drum: DrumType,
    },
    Parameter {
        module: String,
        parameter: String,
        value: f32,
    },
    Fader {
        channel: String,
        value: f32,
    },
    Midi {
        #[serde(rename = "type")]
        action: NoteAction,
        note: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frequency: Option<f32>,
    },
    Bpm {
        bpm: u32,
    },
    Record {
        recording: bool,
    },
    Theremin {
        x: f32,
        y: f32,
    },
    SavePatch {
        name: String,
        parameters: BTreeMap<String, f32>,
    },
    LoadPatch {
        name: String,
    },
    PatternUpdated {
        name: String,
        steps: Vec<bool>,
    },
    PatternLoaded {
        name: String,
        steps: Vec<bool>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StepUpdate { .. } => "stepUpdate",
            Event::Transport { .. } => "transport",
            Event::Trigger { .. } => "trigger",
            Event::Parameter { .. } => "parameter",
            Event::Fader { .. } => "fader",
            Event::Midi { .. } => "midi",
            Event::Bpm { .. } => "bpm",
            Event::Record { .. } => "record",
            Event::Theremin { .. } => "theremin",
            Event::SavePatch { .. } => "savePatch",
            Event::LoadPatch { .. } => "loadPatch",
            Event::PatternUpdated { .. } => "patternUpdated",
            Event::PatternLoaded { .. } => "patternLoaded",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Schema-free view of a wire message, as seen by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Event name of a raw frame, if it is shaped like an envelope at all
    pub fn peek_name(text: &str) -> Option<String> {
        serde_json::from_str::<Envelope>(text)
            .ok()
            .map(|envelope| envelope.event)
    }
}
