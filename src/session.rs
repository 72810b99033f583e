//! Groovebox session - the single state object every UI handler works through.
//!
//! One `Groovebox` owns the clock, the knob values, and the connections to
//! the outside world (instrument, MIDI port, relay). Several can coexist,
//! which is how the tests drive it.

use rand::Rng;
use std::collections::{BTreeMap, HashSet};

use crate::audio::{Instrument, Waveform};
use crate::error::Result;
use crate::link::EventSink;
use crate::midi::{MidiOutputDevice, PianoKey};
use crate::params::{
    self, ChannelSwitches, FxSwitches, Knob, Mixer, ParameterMap, ThereminVoice, DRUMS_CHANNEL,
    PATCH_NAME, SYNTH_CHANNEL,
};
use crate::protocol::{Event, NoteAction, TransportAction};
use crate::sequencer::playback::Clock;
use crate::sequencer::{ClockEvent, DrumType};

const NOTE_VELOCITY: u8 = 100;

pub struct Groovebox {
    clock: Clock,
    params: ParameterMap,
    mixer: Mixer,
    fx: FxSwitches,
    waveforms: BTreeMap<String, Waveform>,
    instrument: Box<dyn Instrument>,
    sink: Box<dyn EventSink>,
    midi: MidiOutputDevice,
    held_keys: HashSet<PianoKey>,
    playing_step: Option<usize>,
}

impl Groovebox {
    pub fn new(instrument: Box<dyn Instrument>, sink: Box<dyn EventSink>) -> Self {
        Self::with_knobs(instrument, sink, &[])
    }

    pub fn with_knobs(
        instrument: Box<dyn Instrument>,
        sink: Box<dyn EventSink>,
        knobs: &[Knob],
    ) -> Self {
        Self {
            clock: Clock::new(),
            params: ParameterMap::with_knobs(knobs),
            mixer: Mixer::new(),
            fx: FxSwitches::new(),
            waveforms: BTreeMap::new(),
            instrument,
            sink,
            midi: MidiOutputDevice::new(),
            held_keys: HashSet::new(),
            playing_step: None,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn midi_mut(&mut self) -> &mut MidiOutputDevice {
        &mut self.midi
    }

    pub fn params(&self) -> &ParameterMap {
        &self.params
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    pub fn is_recording(&self) -> bool {
        self.clock.read(|seq| seq.is_recording())
    }

    pub fn bpm(&self) -> u32 {
        self.clock.bpm()
    }

    pub fn steps(&self) -> Vec<bool> {
        self.clock.read(|seq| seq.pattern().steps().to_vec())
    }

    /// Step showing the playing marker
    pub fn playing_step(&self) -> Option<usize> {
        self.playing_step
    }

    pub fn is_key_held(&self, key: PianoKey) -> bool {
        self.held_keys.contains(&key)
    }

    pub fn toggle_step(&mut self, index: usize) -> Option<bool> {
        let active = self.clock.edit(|seq| seq.pattern_mut().toggle(index))?;
        tracing::debug!(
            "Step {} {}",
            index + 1,
            if active { "activated" } else { "deactivated" }
        );
        self.sink.emit(&Event::StepUpdate {
            step: index + 1,
            active,
        });
        Some(active)
    }

    pub fn clear_pattern(&mut self) {
        self.clock.edit(|seq| seq.pattern_mut().clear());
        tracing::info!("Pattern cleared");
    }

    pub fn randomize_pattern<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.clock.edit(|seq| seq.pattern_mut().randomize(rng));
        tracing::info!("Random pattern generated");
    }

    pub fn play(&mut self) {
        if !self.clock.start() {
            return;
        }
        self.sink.emit(&Event::Transport {
            action: TransportAction::Play,
            bpm: Some(self.clock.bpm()),
        });
    }

    pub fn stop(&mut self) {
        self.clock.stop();
        self.flush_triggers();
        self.playing_step = None;
        self.sink.emit(&Event::Transport {
            action: TransportAction::Stop,
            bpm: None,
        });
    }

    pub fn set_bpm(&mut self, bpm: u32) -> Result<()> {
        let was_playing = self.clock.is_running();
        self.clock.set_bpm(bpm)?;
        if was_playing {
            self.flush_triggers();
            self.playing_step = None;
            self.sink.emit(&Event::Transport {
                action: TransportAction::Stop,
                bpm: None,
            });
            self.sink.emit(&Event::Transport {
                action: TransportAction::Play,
                bpm: Some(bpm),
            });
        }
        self.sink.emit(&Event::Bpm { bpm });
        Ok(())
    }

    pub fn toggle_record(&mut self) -> bool {
        let recording = self.clock.edit(|seq| {
            let recording = !seq.is_recording();
            seq.set_recording(recording);
            recording
        });
        tracing::info!(
            "Recording {}",
            if recording { "started" } else { "stopped" }
        );
        self.sink.emit(&Event::Record { recording });
        recording
    }

    /// Consume pending clock events: move the marker, sound triggers and
    /// forward them. Returns the number of triggers handled.
    pub fn process_clock(&mut self) -> usize {
        let mut triggers = 0;
        for event in self.clock.poll_events() {
            match event {
                ClockEvent::Playhead { current, .. } => {
                    self.playing_step = Some(current);
                }
                ClockEvent::Trigger { step, drum } => {
                    self.sound_trigger(step, drum);
                    triggers += 1;
                }
            }
        }
        triggers
    }

    /// Sound and forward triggers from ticks that already fired, dropping
    /// their playhead moves. Used when the transport stops or restarts.
    fn flush_triggers(&mut self) -> usize {
        let mut triggers = 0;
        for event in self.clock.poll_events() {
            if let ClockEvent::Trigger { step, drum } = event {
                self.sound_trigger(step, drum);
                triggers += 1;
            }
        }
        triggers
    }

    fn sound_trigger(&mut self, step: usize, drum: DrumType) {
        tracing::debug!("Trigger step {} -> {}", step, drum.as_str());
        if self.mixer.is_audible(DRUMS_CHANNEL) {
            self.instrument.click();
        }
        self.sink.emit(&Event::Trigger { step, drum });
    }

    pub fn press_key(&mut self, key: PianoKey) {
        if !self.held_keys.insert(key) {
            return;
        }
        let frequency = key.frequency();
        if self.mixer.is_audible(SYNTH_CHANNEL) {
            self.instrument.note_on(frequency);
        }
        if let Err(e) = self.midi.send_note_on(key.midi_note(), NOTE_VELOCITY) {
            tracing::warn!("{}", e);
        }
        tracing::debug!("Note on {} ({:.1} Hz)", key.name(), frequency);
        self.sink.emit(&Event::Midi {
            action: NoteAction::NoteOn,
            note: key.name().to_string(),
            frequency: Some(frequency),
        });
    }

    pub fn release_key(&mut self, key: PianoKey) {
        if !self.held_keys.remove(&key) {
            return;
        }
        self.instrument.note_off(key.frequency());
        if let Err(e) = self.midi.send_note_off(key.midi_note()) {
            tracing::warn!("{}", e);
        }
        tracing::debug!("Note off {}", key.name());
        self.sink.emit(&Event::Midi {
            action: NoteAction::NoteOff,
            note: key.name().to_string(),
            frequency: None,
        });
    }

    pub fn knob_value(&self, knob: &Knob) -> f32 {
        self.params.get(knob)
    }

    /// Store a knob position (clamped) and return what was stored
    pub fn set_knob(&mut self, knob: &Knob, value: f32) -> f32 {
        let value = self.params.set(knob, value);
        if knob.param == "cutoff" {
            self.instrument.set_cutoff(params::cutoff_frequency(value));
        }
        tracing::debug!("Param {}.{} = {:.3}", knob.module_name(), knob.param, value);
        self.sink.emit(&Event::Parameter {
            module: knob.module_name().to_string(),
            parameter: knob.param.clone(),
            value,
        });
        value
    }

    /// `top_percent` is the thumb position from the top of the track
    pub fn set_fader(&mut self, channel: &str, top_percent: f32) -> f32 {
        let value = params::fader_level(top_percent);
        tracing::debug!("Fader {} = {:.1}%", channel, value * 100.0);
        self.sink.emit(&Event::Fader {
            channel: channel.to_string(),
            value,
        });
        value
    }

    pub fn channel_switches(&self, channel: &str) -> ChannelSwitches {
        self.mixer.switches(channel)
    }

    pub fn is_channel_audible(&self, channel: &str) -> bool {
        self.mixer.is_audible(channel)
    }

    pub fn toggle_mute(&mut self, channel: &str) -> bool {
        let muted = self.mixer.toggle_mute(channel);
        tracing::info!("Mixer {} mute {}", channel, if muted { "on" } else { "off" });
        muted
    }

    pub fn toggle_solo(&mut self, channel: &str) -> bool {
        let soloed = self.mixer.toggle_solo(channel);
        tracing::info!("Mixer {} solo {}", channel, if soloed { "on" } else { "off" });
        soloed
    }

    pub fn is_fx_enabled(&self, fx: &str) -> bool {
        self.fx.is_enabled(fx)
    }

    pub fn toggle_fx(&mut self, fx: &str) -> bool {
        let enabled = self.fx.toggle(fx);
        tracing::info!(
            "Effect {} {}",
            fx,
            if enabled { "enabled" } else { "disabled" }
        );
        enabled
    }

    pub fn waveform(&self, osc: &str) -> Waveform {
        self.waveforms.get(osc).copied().unwrap_or_default()
    }

    /// Select an oscillator shape; keyboard tones follow the latest choice
    pub fn set_waveform(&mut self, osc: &str, waveform: Waveform) {
        self.waveforms.insert(osc.to_string(), waveform);
        self.instrument.set_waveform(waveform);
        tracing::info!("Osc {} waveform changed to {}", osc, waveform.as_str());
    }

    pub fn move_theremin(&mut self, x: f32, y: f32) -> ThereminVoice {
        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);
        let voice = params::theremin_voice(x, y);
        tracing::trace!(
            "Theremin pitch={:.1}Hz volume={:.2}",
            voice.pitch_hz,
            voice.volume
        );
        self.sink.emit(&Event::Theremin { x, y });
        voice
    }

    pub fn save_patch(&mut self) {
        tracing::info!("Saving patch '{}'", PATCH_NAME);
        self.sink.emit(&Event::SavePatch {
            name: PATCH_NAME.to_string(),
            parameters: self.params.values().clone(),
        });
    }

    pub fn load_patch(&mut self) {
        tracing::info!("Requesting patch '{}'", PATCH_NAME);
        self.sink.emit(&Event::LoadPatch {
            name: PATCH_NAME.to_string(),
        });
    }

    pub fn apply_pattern(&mut self, steps: &[bool]) {
        self.clock.edit(|seq| seq.pattern_mut().apply(steps));
    }

    /// Apply events pushed by the relay. Returns how many changed local state.
    pub fn process_incoming(&mut self) -> usize {
        let mut applied = 0;
        for event in self.sink.poll_incoming() {
            match event {
                Event::PatternLoaded { name, steps } => {
                    tracing::info!("Pattern loaded from server: {}", name);
                    self.apply_pattern(&steps);
                    applied += 1;
                }
                Event::PatternUpdated { name, .. } => {
                    tracing::info!("Pattern updated on server: {}", name);
                }
                Event::StepUpdate { step, active } if step >= 1 => {
                    self.clock
                        .edit(|seq| seq.pattern_mut().set(step - 1, active));
                    applied += 1;
                }
                other => tracing::debug!("Remote event '{}'", other.name()),
            }
        }
        applied
    }
}

impl Drop for Groovebox {
    fn drop(&mut self) {
        let held: Vec<PianoKey> = self.held_keys.iter().copied().collect();
        for key in held {
            let _ = self.midi.send_note_off(key.midi_note());
        }
    }
}
