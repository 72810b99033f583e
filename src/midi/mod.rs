//! Piano keyboard layout and MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{GrooveboxError, Result};

const CLIENT_NAME: &str = "Groovebox MIDI Output";

/// Note names of the on-screen keyboard, lowest first
pub const PIANO_NOTES: [&str; 13] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B", "C2",
];

/// MIDI note number of the lowest key (sounds at 220 Hz)
const BASE_MIDI_NOTE: u8 = 57;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PianoKey {
    index: usize,
}

impl PianoKey {
    pub fn new(index: usize) -> Option<Self> {
        (index < PIANO_NOTES.len()).then_some(Self { index })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PIANO_NOTES
            .iter()
            .position(|&note| note == name)
            .map(|index| Self { index })
    }

    /// Computer keyboard row used to play the piano
    pub fn from_keyboard(key: char) -> Option<Self> {
        let name = match key.to_ascii_lowercase() {
            'a' => "C",
            'w' => "C#",
            's' => "D",
            'e' => "D#",
            'd' => "E",
            'f' => "F",
            't' => "F#",
            'g' => "G",
            'y' => "G#",
            'h' => "A",
            'u' => "A#",
            'j' => "B",
            'k' => "C2",
            _ => return None,
        };
        Self::from_name(name)
    }

    pub fn all() -> impl Iterator<Item = PianoKey> {
        (0..PIANO_NOTES.len()).map(|index| PianoKey { index })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        PIANO_NOTES[self.index]
    }

    pub fn is_black(&self) -> bool {
        self.name().ends_with('#')
    }

    pub fn frequency(&self) -> f32 {
        220.0 * 2.0_f32.powf(self.index as f32 / 12.0)
    }

    pub fn midi_note(&self) -> u8 {
        BASE_MIDI_NOTE + self.index as u8
    }
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self { connection: None }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(e) => {
                tracing::warn!("MIDI output unavailable: {}", e);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| GrooveboxError::Midi(format!("Failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| GrooveboxError::Midi(format!("Invalid port index {}", port_index)))?;
        let port_name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "groovebox")
            .map_err(|e| GrooveboxError::Midi(format!("Failed to connect: {}", e)))?;

        tracing::info!("MIDI output connected to '{}'", port_name);
        self.connection = Some(connection);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x90, note, velocity])
                .map_err(|e| GrooveboxError::Midi(format!("Failed to send note on: {}", e)))?;
        }
        Ok(())
    }

    pub fn send_note_off(&mut self, note: u8) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x80, note, 0])
                .map_err(|e| GrooveboxError::Midi(format!("Failed to send note off: {}", e)))?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            tracing::info!("MIDI output disconnected");
        }
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_frequencies() {
        let low = PianoKey::from_name("C").unwrap();
        assert_eq!(low.frequency(), 220.0);
        assert_eq!(low.midi_note(), 57);

        let octave = PianoKey::from_name("C2").unwrap();
        assert!((octave.frequency() - 440.0).abs() < 1e-3);
        assert_eq!(octave.midi_note(), 69);
    }

    #[test]
    fn test_keyboard_map() {
        assert_eq!(PianoKey::from_keyboard('a').map(|k| k.name()), Some("C"));
        assert_eq!(PianoKey::from_keyboard('W').map(|k| k.name()), Some("C#"));
        assert_eq!(PianoKey::from_keyboard('k').map(|k| k.name()), Some("C2"));
        assert_eq!(PianoKey::from_keyboard('z'), None);
    }

    #[test]
    fn test_black_keys() {
        let black: Vec<_> = PianoKey::all().filter(|k| k.is_black()).map(|k| k.name()).collect();
        assert_eq!(black, vec!["C#", "D#", "F#", "G#", "A#"]);
        assert_eq!(PianoKey::new(13), None);
    }

    #[test]
    fn test_unconnected_device_is_silent() {
        let mut device = MidiOutputDevice::new();
        assert!(!device.is_connected());
        assert!(device.send_note_on(60, 100).is_ok());
        assert!(device.send_note_off(60).is_ok());
    }
}
