use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use groovebox::audio::Waveform;
use groovebox::params::{DRUMS_CHANNEL, MASTER_CHANNEL, SYNTH_CHANNEL};
use groovebox::protocol::{NoteAction, TransportAction};
use groovebox::{DrumType, Event, EventSink, Groovebox, Instrument, Knob, PianoKey};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<Event>>>,
    inbox: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn push_incoming(&self, event: Event) {
        self.inbox.lock().unwrap().push(event);
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: &Event) {
        self.sent.lock().unwrap().push(event.clone());
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn poll_incoming(&self) -> Vec<Event> {
        std::mem::take(&mut *self.inbox.lock().unwrap())
    }
}

#[derive(Debug, Default)]
struct Sounds {
    clicks: usize,
    notes_on: Vec<f32>,
    notes_off: Vec<f32>,
    cutoff: Option<f32>,
    waveform: Option<Waveform>,
}

#[derive(Clone, Default)]
struct TestInstrument(Arc<Mutex<Sounds>>);

impl Instrument for TestInstrument {
    fn click(&mut self) {
        self.0.lock().unwrap().clicks += 1;
    }

    fn note_on(&mut self, frequency: f32) {
        self.0.lock().unwrap().notes_on.push(frequency);
    }

    fn note_off(&mut self, frequency: f32) {
        self.0.lock().unwrap().notes_off.push(frequency);
    }

    fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.0.lock().unwrap().cutoff = Some(cutoff_hz);
    }

    fn set_waveform(&mut self, waveform: Waveform) {
        self.0.lock().unwrap().waveform = Some(waveform);
    }
}

fn groovebox() -> (Groovebox, Recorder, TestInstrument) {
    let recorder = Recorder::default();
    let instrument = TestInstrument::default();
    let knobs = [Knob::osc("1", "cutoff"), Knob::fx("reverb", "mix")];
    let groovebox =
        Groovebox::with_knobs(Box::new(instrument.clone()), Box::new(recorder.clone()), &knobs);
    (groovebox, recorder, instrument)
}

#[test]
fn test_toggle_step_emits_one_based_update() {
    let (mut gb, recorder, _) = groovebox();
    assert_eq!(gb.toggle_step(0), Some(true));
    assert_eq!(gb.toggle_step(0), Some(false));
    assert_eq!(gb.toggle_step(16), None);

    assert_eq!(
        recorder.take(),
        vec![
            Event::StepUpdate {
                step: 1,
                active: true
            },
            Event::StepUpdate {
                step: 1,
                active: false
            },
        ]
    );
}

#[test]
fn test_play_is_idempotent() {
    let (mut gb, recorder, _) = groovebox();
    gb.play();
    gb.play();
    assert!(gb.is_playing());
    assert_eq!(
        recorder.take(),
        vec![Event::Transport {
            action: TransportAction::Play,
            bpm: Some(120)
        }]
    );
    gb.stop();
}

#[test]
fn test_stop_forces_recording_off() {
    let (mut gb, recorder, _) = groovebox();
    gb.play();
    assert!(gb.toggle_record());
    gb.stop();
    assert!(!gb.is_recording());
    assert_eq!(gb.playing_step(), None);

    let events = recorder.take();
    assert_eq!(events[1], Event::Record { recording: true });
    assert_eq!(
        events[2],
        Event::Transport {
            action: TransportAction::Stop,
            bpm: None
        }
    );
}

#[test]
fn test_tempo_change_while_playing_restarts() {
    let (mut gb, recorder, _) = groovebox();
    gb.play();
    recorder.take();

    gb.set_bpm(240).unwrap();
    assert!(gb.is_playing());
    assert_eq!(gb.clock().cursor(), 0);
    assert_eq!(gb.clock().step_period(), Duration::from_secs_f64(0.0625));
    assert_eq!(
        recorder.take(),
        vec![
            Event::Transport {
                action: TransportAction::Stop,
                bpm: None
            },
            Event::Transport {
                action: TransportAction::Play,
                bpm: Some(240)
            },
            Event::Bpm { bpm: 240 },
        ]
    );
    gb.stop();
}

#[test]
fn test_tempo_change_while_stopped_only_announces_bpm() {
    let (mut gb, recorder, _) = groovebox();
    gb.set_bpm(95).unwrap();
    assert_eq!(gb.bpm(), 95);
    assert_eq!(recorder.take(), vec![Event::Bpm { bpm: 95 }]);
    assert!(gb.set_bpm(0).is_err());
}

#[test]
fn test_triggers_click_and_forward() {
    let (mut gb, recorder, instrument) = groovebox();
    gb.toggle_step(0);
    gb.toggle_step(1);
    gb.set_bpm(1500).unwrap();
    recorder.take();

    gb.play();
    thread::sleep(Duration::from_millis(150));
    let triggers = gb.process_clock();
    gb.stop();

    assert!(triggers >= 2, "only {triggers} triggers");
    assert!(gb.playing_step().is_none());

    let events = recorder.take();
    assert_eq!(instrument.0.lock().unwrap().clicks, trigger_count(&events));
    assert!(events.contains(&Event::Trigger {
        step: 1,
        drum: DrumType::Kick
    }));
    assert!(events.contains(&Event::Trigger {
        step: 2,
        drum: DrumType::Snare
    }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::Trigger { step, .. } if *step > 2)));
}

fn trigger_count(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::Trigger { .. }))
        .count()
}

fn all_steps_on(gb: &mut Groovebox) {
    for i in 0..16 {
        gb.toggle_step(i);
    }
}

#[test]
fn test_stop_sounds_triggers_already_fired() {
    let (mut gb, recorder, instrument) = groovebox();
    all_steps_on(&mut gb);
    gb.set_bpm(1500).unwrap();
    recorder.take();

    gb.play();
    thread::sleep(Duration::from_millis(105));
    gb.stop();
    assert_eq!(gb.process_clock(), 0);

    let events = recorder.take();
    let triggers = trigger_count(&events);
    assert!(triggers >= 1, "ticks fired over active steps but no trigger was emitted");
    assert_eq!(instrument.0.lock().unwrap().clicks, triggers);
    assert_eq!(
        events.last(),
        Some(&Event::Transport {
            action: TransportAction::Stop,
            bpm: None
        })
    );
    assert!(gb.playing_step().is_none());
}

#[test]
fn test_tempo_change_sounds_triggers_already_fired() {
    let (mut gb, recorder, instrument) = groovebox();
    all_steps_on(&mut gb);
    gb.set_bpm(1500).unwrap();
    gb.play();
    recorder.take();

    thread::sleep(Duration::from_millis(105));
    gb.set_bpm(60).unwrap();
    let events = recorder.take();
    let triggers = trigger_count(&events);
    assert!(triggers >= 1);
    assert_eq!(instrument.0.lock().unwrap().clicks, triggers);
    assert_eq!(events.last(), Some(&Event::Bpm { bpm: 60 }));
    gb.stop();
}

#[test]
fn test_muted_drums_still_forward_triggers() {
    let (mut gb, recorder, instrument) = groovebox();
    gb.toggle_step(0);
    assert!(gb.toggle_mute(DRUMS_CHANNEL));
    assert!(!gb.is_channel_audible(DRUMS_CHANNEL));
    gb.set_bpm(1500).unwrap();
    recorder.take();

    gb.play();
    thread::sleep(Duration::from_millis(60));
    gb.process_clock();
    gb.stop();

    assert!(trigger_count(&recorder.take()) >= 1);
    assert_eq!(instrument.0.lock().unwrap().clicks, 0);
}

#[test]
fn test_solo_and_master_mute_gate_tones() {
    let (mut gb, recorder, instrument) = groovebox();
    let c = PianoKey::from_keyboard('a').unwrap();
    let d = PianoKey::from_keyboard('s').unwrap();

    assert!(gb.toggle_solo(DRUMS_CHANNEL));
    assert!(gb.channel_switches(DRUMS_CHANNEL).soloed);
    gb.press_key(c);
    gb.release_key(c);
    assert!(instrument.0.lock().unwrap().notes_on.is_empty());

    gb.toggle_solo(DRUMS_CHANNEL);
    gb.toggle_mute(MASTER_CHANNEL);
    gb.press_key(d);
    assert!(instrument.0.lock().unwrap().notes_on.is_empty());

    gb.toggle_mute(MASTER_CHANNEL);
    assert!(gb.is_channel_audible(SYNTH_CHANNEL));
    gb.release_key(d);
    gb.press_key(d);
    assert_eq!(instrument.0.lock().unwrap().notes_on.len(), 1);

    // Muting only affects local sound; the relay still sees every note
    let notes_on = recorder
        .take()
        .iter()
        .filter(|e| matches!(e, Event::Midi { action: NoteAction::NoteOn, .. }))
        .count();
    assert_eq!(notes_on, 3);
}

#[test]
fn test_waveform_and_fx_switches() {
    let (mut gb, recorder, instrument) = groovebox();
    assert_eq!(gb.waveform("1"), Waveform::Sawtooth);
    gb.set_waveform("2", Waveform::Triangle);
    assert_eq!(gb.waveform("2"), Waveform::Triangle);
    assert_eq!(gb.waveform("1"), Waveform::Sawtooth);
    assert_eq!(instrument.0.lock().unwrap().waveform, Some(Waveform::Triangle));

    assert!(!gb.is_fx_enabled("reverb"));
    assert!(gb.toggle_fx("reverb"));
    assert!(gb.is_fx_enabled("reverb"));
    assert!(!gb.toggle_fx("reverb"));
    assert!(recorder.take().is_empty());
}

#[test]
fn test_playing_marker_follows_clock() {
    let (mut gb, _, _) = groovebox();
    gb.set_bpm(1200).unwrap();
    gb.play();
    thread::sleep(Duration::from_millis(60));
    gb.process_clock();
    assert!(gb.playing_step().is_some());
    gb.stop();
}

#[test]
fn test_keys_send_midi_events_once() {
    let (mut gb, recorder, instrument) = groovebox();
    let key = PianoKey::from_keyboard('a').unwrap();
    gb.press_key(key);
    gb.press_key(key);
    assert!(gb.is_key_held(key));
    gb.release_key(key);
    gb.release_key(key);

    let sounds = instrument.0.lock().unwrap();
    assert_eq!(sounds.notes_on, vec![220.0]);
    assert_eq!(sounds.notes_off, vec![220.0]);
    assert_eq!(
        recorder.take(),
        vec![
            Event::Midi {
                action: NoteAction::NoteOn,
                note: "C".to_string(),
                frequency: Some(220.0)
            },
            Event::Midi {
                action: NoteAction::NoteOff,
                note: "C".to_string(),
                frequency: None
            },
        ]
    );
}

#[test]
fn test_knob_clamps_and_retunes_filter() {
    let (mut gb, recorder, instrument) = groovebox();
    let cutoff = Knob::osc("1", "cutoff");
    assert_eq!(gb.knob_value(&cutoff), 0.5);
    assert_eq!(gb.set_knob(&cutoff, 1.4), 1.0);
    assert_eq!(instrument.0.lock().unwrap().cutoff, Some(2000.0));

    let mix = Knob::fx("reverb", "mix");
    gb.set_knob(&mix, 0.25);
    assert_eq!(instrument.0.lock().unwrap().cutoff, Some(2000.0));

    assert_eq!(
        recorder.take(),
        vec![
            Event::Parameter {
                module: "1".to_string(),
                parameter: "cutoff".to_string(),
                value: 1.0
            },
            Event::Parameter {
                module: "reverb".to_string(),
                parameter: "mix".to_string(),
                value: 0.25
            },
        ]
    );
}

#[test]
fn test_fader_and_theremin() {
    let (mut gb, recorder, _) = groovebox();
    assert_eq!(gb.set_fader("DRUMS", 25.0), 0.75);
    let voice = gb.move_theremin(0.2, 1.0);
    assert_eq!(voice.pitch_hz, 300.0);
    assert_eq!(voice.volume, 0.0);

    assert_eq!(
        recorder.take(),
        vec![
            Event::Fader {
                channel: "DRUMS".to_string(),
                value: 0.75
            },
            Event::Theremin { x: 0.2, y: 1.0 },
        ]
    );
}

#[test]
fn test_patch_messages_carry_knob_values() {
    let (mut gb, recorder, _) = groovebox();
    gb.set_knob(&Knob::fx("reverb", "mix"), 0.8);
    recorder.take();

    gb.save_patch();
    gb.load_patch();
    let events = recorder.take();
    match &events[0] {
        Event::SavePatch { name, parameters } => {
            assert_eq!(name, "current_patch");
            assert_eq!(parameters.get("fx_reverb_mix"), Some(&0.8));
            assert_eq!(parameters.get("osc_1_cutoff"), Some(&0.5));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        events[1],
        Event::LoadPatch {
            name: "current_patch".to_string()
        }
    );
}

#[test]
fn test_pattern_ops() {
    let (mut gb, _, _) = groovebox();
    gb.randomize_pattern(&mut StdRng::seed_from_u64(3));
    gb.clear_pattern();
    assert!(gb.steps().iter().all(|&s| !s));
}

#[test]
fn test_incoming_pattern_is_applied_without_echo() {
    let (mut gb, recorder, _) = groovebox();
    recorder.push_incoming(Event::PatternLoaded {
        name: "remote".to_string(),
        steps: vec![true, false, true],
    });
    recorder.push_incoming(Event::StepUpdate {
        step: 16,
        active: true,
    });
    recorder.push_incoming(Event::Bpm { bpm: 99 });

    assert_eq!(gb.process_incoming(), 2);
    let steps = gb.steps();
    assert!(steps[0] && !steps[1] && steps[2] && steps[15]);
    assert_eq!(gb.bpm(), 120);
    assert!(recorder.take().is_empty());
}
