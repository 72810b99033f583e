#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use groovebox::audio::Waveform;
#[cfg(feature = "gui")]
use groovebox::params::MIXER_CHANNELS;
#[cfg(feature = "gui")]
use groovebox::{
    config, params, AudioOutput, EventSink, Groovebox, Knob, MidiOutputDevice, Offline,
    PianoKey, RelayLink,
};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([980.0, 760.0])
            .with_title("Groovebox"),
        ..Default::default()
    };

    eframe::run_native(
        "Groovebox",
        options,
        Box::new(|_cc| Ok(Box::new(GrooveboxApp::new()))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
const OSCILLATORS: [&str; 2] = ["1", "2"];

#[cfg(feature = "gui")]
const EFFECTS: [&str; 2] = ["reverb", "delay"];

#[cfg(feature = "gui")]
fn panel_knobs() -> Vec<Knob> {
    vec![
        Knob::osc("1", "cutoff"),
        Knob::osc("1", "resonance"),
        Knob::osc("1", "detune"),
        Knob::osc("2", "cutoff"),
        Knob::osc("2", "detune"),
        Knob::osc("vocoder", "bands"),
        Knob::osc("lfo", "rate"),
        Knob::fx("reverb", "mix"),
        Knob::fx("delay", "time"),
        Knob::fx("delay", "feedback"),
    ]
}

#[cfg(feature = "gui")]
#[derive(Debug, Clone, Copy)]
struct KnobDrag {
    index: usize,
    start_value: f32,
    start_y: f32,
}

#[cfg(feature = "gui")]
struct GrooveboxApp {
    groovebox: Groovebox,
    knobs: Vec<Knob>,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    bpm: u32,
    knob_drag: Option<KnobDrag>,
    fader_levels: Vec<f32>,
    pointer_key: Option<PianoKey>,
    theremin: Option<params::ThereminVoice>,
}

#[cfg(feature = "gui")]
impl GrooveboxApp {
    fn new() -> Self {
        let sink: Box<dyn EventSink> = match RelayLink::connect(&config::relay_url_from_env()) {
            Ok(link) => Box::new(link),
            Err(e) => {
                tracing::info!("Relay not available ({}), running in standalone mode", e);
                Box::new(Offline)
            }
        };

        let knobs = panel_knobs();
        let groovebox = Groovebox::with_knobs(Box::new(AudioOutput::default()), sink, &knobs);

        Self {
            bpm: groovebox.bpm(),
            groovebox,
            knobs,
            available_midi_ports: MidiOutputDevice::available_ports(),
            selected_port: None,
            knob_drag: None,
            fader_levels: vec![0.5; MIXER_CHANNELS.len()],
            pointer_key: None,
            theremin: None,
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let events = ctx.input(|i| i.events.clone());
        for event in events {
            if let egui::Event::Key {
                key,
                pressed,
                repeat,
                ..
            } = event
            {
                let name = key.name();
                if name.len() != 1 {
                    continue;
                }
                let Some(piano_key) = name.chars().next().and_then(PianoKey::from_keyboard) else {
                    continue;
                };
                if pressed && !repeat {
                    self.groovebox.press_key(piano_key);
                } else if !pressed {
                    self.groovebox.release_key(piano_key);
                }
            }
        }
    }

    fn header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("GROOVEBOX");
            ui.add_space(20.0);
            if self.groovebox.is_connected() {
                ui.colored_label(egui::Color32::LIGHT_GREEN, "SERVER: Connected");
            } else {
                ui.colored_label(egui::Color32::YELLOW, "SERVER: Standalone");
            }
        });

        // MIDI Port Selection
        let mut selected_port_changed = None;
        ui.horizontal(|ui| {
            ui.label("MIDI Output:");
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_label("")
                    .selected_text(
                        self.selected_port
                            .map(|i| self.available_midi_ports[i].as_str())
                            .unwrap_or("Select port..."),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                selected_port_changed = Some(i);
                            }
                        }
                    });
            }
        });

        if let Some(port_idx) = selected_port_changed {
            match self.groovebox.midi_mut().connect(port_idx) {
                Ok(()) => self.selected_port = Some(port_idx),
                Err(e) => tracing::warn!("{}", e),
            }
        }
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let is_playing = self.groovebox.is_playing();
            let play = egui::Button::new("▶ Play").fill(if is_playing {
                egui::Color32::from_rgb(60, 140, 60)
            } else {
                egui::Color32::from_rgb(40, 40, 40)
            });
            if ui.add(play).clicked() {
                self.groovebox.play();
            }
            if ui.button("■ Stop").clicked() {
                self.groovebox.stop();
            }

            let recording = self.groovebox.is_recording();
            let rec = egui::Button::new("● Rec").fill(if recording {
                egui::Color32::from_rgb(180, 40, 40)
            } else {
                egui::Color32::from_rgb(40, 40, 40)
            });
            if ui.add(rec).clicked() {
                self.groovebox.toggle_record();
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            if ui
                .add(egui::Slider::new(&mut self.bpm, 60..=200))
                .changed()
            {
                if let Err(e) = self.groovebox.set_bpm(self.bpm) {
                    tracing::warn!("{}", e);
                }
            }

            ui.add_space(20.0);

            if ui.button("Clear").clicked() {
                self.groovebox.clear_pattern();
            }
            if ui.button("Random").clicked() {
                self.groovebox.randomize_pattern(&mut rand::thread_rng());
            }
        });
    }

    fn step_grid(&mut self, ui: &mut egui::Ui) {
        let steps = self.groovebox.steps();
        let playing = self.groovebox.playing_step();

        ui.horizontal(|ui| {
            for (i, &active) in steps.iter().enumerate() {
                let is_current = playing == Some(i);
                let button_text = if is_current {
                    format!("● {}", i + 1)
                } else {
                    format!("{}", i + 1)
                };

                let button = egui::Button::new(button_text)
                    .min_size(egui::vec2(48.0, 48.0))
                    .fill(if is_current {
                        egui::Color32::from_rgb(100, 200, 100)
                    } else if active {
                        egui::Color32::from_rgb(60, 60, 200)
                    } else {
                        egui::Color32::from_rgb(40, 40, 40)
                    });

                if ui.add(button).clicked() {
                    self.groovebox.toggle_step(i);
                }
            }
        });
    }

    fn piano(&mut self, ui: &mut egui::Ui) {
        let mut pointer_key = None;
        ui.horizontal(|ui| {
            for key in PianoKey::all() {
                let held = self.groovebox.is_key_held(key);
                let (fill, text_color) = if held {
                    (egui::Color32::from_rgb(230, 160, 60), egui::Color32::BLACK)
                } else if key.is_black() {
                    (egui::Color32::from_rgb(20, 20, 20), egui::Color32::WHITE)
                } else {
                    (egui::Color32::from_rgb(230, 230, 230), egui::Color32::BLACK)
                };
                let button = egui::Button::new(egui::RichText::new(key.name()).color(text_color))
                    .min_size(egui::vec2(36.0, if key.is_black() { 70.0 } else { 100.0 }))
                    .fill(fill);
                if ui.add(button).is_pointer_button_down_on() {
                    pointer_key = Some(key);
                }
            }
        });

        if pointer_key != self.pointer_key {
            if let Some(old) = self.pointer_key {
                self.groovebox.release_key(old);
            }
            if let Some(new) = pointer_key {
                self.groovebox.press_key(new);
            }
            self.pointer_key = pointer_key;
        }
    }

    fn knob_panel(&mut self, ui: &mut egui::Ui) {
        let knobs = self.knobs.clone();
        ui.horizontal_wrapped(|ui| {
            for (index, knob) in knobs.iter().enumerate() {
                ui.vertical(|ui| {
                    ui.label(format!("{} {}", knob.module_name(), knob.param));
                    let value = self.groovebox.knob_value(knob);

                    let (rect, response) =
                        ui.allocate_exact_size(egui::vec2(56.0, 56.0), egui::Sense::drag());
                    let painter = ui.painter();
                    let radius = rect.width() * 0.4;
                    painter.circle_filled(rect.center(), radius, egui::Color32::from_gray(50));
                    let angle = params::knob_rotation(value).to_radians();
                    let tip = rect.center() + radius * egui::vec2(angle.sin(), -angle.cos());
                    painter.line_segment(
                        [rect.center(), tip],
                        egui::Stroke::new(3.0, egui::Color32::from_rgb(240, 180, 60)),
                    );

                    if response.drag_started() {
                        if let Some(pos) = response.interact_pointer_pos() {
                            self.knob_drag = Some(KnobDrag {
                                index,
                                start_value: value,
                                start_y: pos.y,
                            });
                        }
                    }
                    if response.dragged() {
                        if let (Some(drag), Some(pos)) =
                            (self.knob_drag, response.interact_pointer_pos())
                        {
                            if drag.index == index {
                                let new_value =
                                    params::knob_drag_value(drag.start_value, drag.start_y, pos.y);
                                if new_value != value {
                                    self.groovebox.set_knob(knob, new_value);
                                }
                            }
                        }
                    }
                    if response.drag_stopped() {
                        self.knob_drag = None;
                    }

                    ui.label(knob.display(self.groovebox.knob_value(knob)));
                });
            }
        });
    }

    fn oscillators_and_effects(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for osc in OSCILLATORS {
                ui.label(format!("OSC {}", osc));
                let current = self.groovebox.waveform(osc);
                for waveform in Waveform::ALL {
                    if ui
                        .selectable_label(current == waveform, waveform.as_str())
                        .clicked()
                    {
                        self.groovebox.set_waveform(osc, waveform);
                    }
                }
                ui.add_space(16.0);
            }

            for fx in EFFECTS {
                let enabled = self.groovebox.is_fx_enabled(fx);
                let toggle = egui::Button::new(format!("{} {}", fx, if enabled { "ON" } else { "OFF" }))
                    .fill(if enabled {
                        egui::Color32::from_rgb(60, 140, 60)
                    } else {
                        egui::Color32::from_rgb(40, 40, 40)
                    });
                if ui.add(toggle).clicked() {
                    self.groovebox.toggle_fx(fx);
                }
            }
        });
    }

    fn mixer(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for (channel, level) in MIXER_CHANNELS.iter().zip(self.fader_levels.iter_mut()) {
                ui.vertical(|ui| {
                    ui.label(*channel);
                    let switches = self.groovebox.channel_switches(channel);
                    ui.horizontal(|ui| {
                        if ui.selectable_label(switches.muted, "M").clicked() {
                            self.groovebox.toggle_mute(channel);
                        }
                        if ui.selectable_label(switches.soloed, "S").clicked() {
                            self.groovebox.toggle_solo(channel);
                        }
                    });
                    if ui
                        .add(
                            egui::Slider::new(level, 0.0..=1.0)
                                .vertical()
                                .show_value(false),
                        )
                        .changed()
                    {
                        self.groovebox.set_fader(channel, (1.0 - *level) * 100.0);
                    }
                    ui.label(format!("{:.0}%", *level * 100.0));
                });
            }
        });
    }

    fn theremin_field(&mut self, ui: &mut egui::Ui) {
        let (rect, response) =
            ui.allocate_exact_size(egui::vec2(320.0, 140.0), egui::Sense::hover());
        ui.painter()
            .rect_filled(rect, 6.0, egui::Color32::from_rgb(30, 20, 50));

        if let Some(pos) = response.hover_pos() {
            let x = (pos.x - rect.left()) / rect.width();
            let y = (pos.y - rect.top()) / rect.height();
            if response.ctx.input(|i| i.pointer.delta() != egui::Vec2::ZERO) {
                self.theremin = Some(self.groovebox.move_theremin(x, y));
            }
            ui.painter()
                .circle_filled(pos, 8.0, egui::Color32::from_rgb(180, 120, 255));
        }

        match self.theremin {
            Some(voice) => ui.label(format!(
                "Pitch {:.1} Hz  Volume {:.2}",
                voice.pitch_hz, voice.volume
            )),
            None => ui.label("Move over the field to play"),
        };
    }
}

#[cfg(feature = "gui")]
impl eframe::App for GrooveboxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.groovebox.process_clock();
        self.groovebox.process_incoming();
        self.handle_keyboard(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.header(ui);
            ui.separator();

            self.transport(ui);
            ui.add_space(10.0);

            ui.label("Steps:");
            self.step_grid(ui);
            ui.add_space(10.0);

            ui.label("Keyboard (a w s e d f t g y h u j k):");
            self.piano(ui);
            ui.separator();

            self.oscillators_and_effects(ui);
            ui.add_space(6.0);
            self.knob_panel(ui);
            ui.separator();

            ui.horizontal(|ui| {
                self.mixer(ui);
                ui.add_space(30.0);
                ui.vertical(|ui| {
                    ui.label("Theremin:");
                    self.theremin_field(ui);
                });
            });
            ui.separator();

            ui.horizontal(|ui| {
                if ui.button("Save Patch").clicked() {
                    self.groovebox.save_patch();
                }
                if ui.button("Load Patch").clicked() {
                    self.groovebox.load_patch();
                }
            });
        });
    }
}
