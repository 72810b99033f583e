//! Error types shared across the groovebox library
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrooveboxError {
    #[error("Invalid tempo: {0} BPM (must be positive)")]
    InvalidTempo(u32),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Relay link error: {0}")]
    Link(#[from] tungstenite::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid PORT value '{0}'")]
    InvalidPort(String),

    #[error("Invalid relay mode '{0}' (expected 'log' or 'broadcast')")]
    InvalidRelayMode(String),
}

pub type Result<T> = std::result::Result<T, GrooveboxError>;
