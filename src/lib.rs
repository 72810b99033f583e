//! Groovebox - a software step-sequencer groovebox and its event relay
//!
//! This library provides:
//! - A 16-step sequencer clock with a pure tick transition
//! - A session object wiring the clock to audio, MIDI and the relay
//! - Audio output for step clicks and keyboard tones
//! - A WebSocket relay server that fans UI events out to listeners

pub mod audio;
pub mod config;
pub mod error;
pub mod link;
pub mod midi;
pub mod params;
pub mod protocol;
pub mod relay;
pub mod sequencer;
pub mod session;

// Re-export commonly used types
pub use audio::{AudioOutput, Instrument, Silent, Waveform};
pub use config::RelayConfig;
pub use error::{ConfigError, GrooveboxError, Result};
pub use link::{EventSink, Offline, RelayLink};
pub use midi::{MidiOutputDevice, PianoKey};
pub use params::{Knob, ParameterMap};
pub use protocol::{Envelope, Event};
pub use relay::{Frame, Relay, RelayMode};
pub use sequencer::playback::Clock;
pub use sequencer::{ClockEvent, DrumType, Pattern, Sequencer};
pub use session::Groovebox;
