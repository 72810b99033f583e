//! Knob, fader and theremin state - normalized control values
use std::collections::BTreeMap;

pub const DEFAULT_KNOB_VALUE: f32 = 0.5;

/// Knob value change per pixel of vertical drag
pub const KNOB_DRAG_SENSITIVITY: f32 = 0.005;

pub const PATCH_NAME: &str = "current_patch";

pub const DRUMS_CHANNEL: &str = "DRUMS";
pub const SYNTH_CHANNEL: &str = "SYNTH";
pub const MASTER_CHANNEL: &str = "MASTER";
pub const MIXER_CHANNELS: [&str; 4] = [DRUMS_CHANNEL, SYNTH_CHANNEL, "BASS", MASTER_CHANNEL];

/// Which panel a knob lives on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnobModule {
    Osc(String),
    Fx(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Knob {
    pub module: KnobModule,
    pub param: String,
}

impl Knob {
    pub fn osc(osc: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            module: KnobModule::Osc(osc.into()),
            param: param.into(),
        }
    }

    pub fn fx(fx: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            module: KnobModule::Fx(fx.into()),
            param: param.into(),
        }
    }

    /// Parameter map key: `osc_<osc>_<param>` or `fx_<fx>_<param>`
    pub fn key(&self) -> String {
        match &self.module {
            KnobModule::Osc(osc) => format!("osc_{}_{}", osc, self.param),
            KnobModule::Fx(fx) => format!("fx_{}_{}", fx, self.param),
        }
    }

    pub fn module_name(&self) -> &str {
        match &self.module {
            KnobModule::Osc(name) | KnobModule::Fx(name) => name,
        }
    }

    pub fn display(&self, value: f32) -> String {
        if self.param == "bands" {
            format!("{}", (value * 32.0).floor() as u32)
        } else {
            format!("{:.2}", value)
        }
    }
}

/// Knob value after a vertical drag; dragging up raises it
pub fn knob_drag_value(start_value: f32, start_y: f32, current_y: f32) -> f32 {
    let delta_y = start_y - current_y;
    (start_value + delta_y * KNOB_DRAG_SENSITIVITY).clamp(0.0, 1.0)
}

/// Indicator angle in degrees, -135 at 0.0 to +135 at 1.0
pub fn knob_rotation(value: f32) -> f32 {
    value * 270.0 - 135.0
}

/// Filter cutoff in Hz for a normalized `cutoff` knob
pub fn cutoff_frequency(value: f32) -> f32 {
    200.0 + value * 1800.0
}

/// Fader level for a thumb position given as percent from the top of the track
pub fn fader_level(top_percent: f32) -> f32 {
    (100.0 - top_percent.clamp(0.0, 100.0)) / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThereminVoice {
    pub pitch_hz: f32,
    pub volume: f32,
}

/// Map a normalized hand position over the theremin field to pitch and volume
pub fn theremin_voice(x: f32, y: f32) -> ThereminVoice {
    ThereminVoice {
        pitch_hz: x * 1000.0 + 100.0,
        volume: (1.0 - y) * 0.5,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSwitches {
    pub muted: bool,
    pub soloed: bool,
}

/// Mute and solo state per mixer channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mixer {
    channels: BTreeMap<String, ChannelSwitches>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switches(&self, channel: &str) -> ChannelSwitches {
        self.channels.get(channel).copied().unwrap_or_default()
    }

    /// Flip the mute flag and return the new state
    pub fn toggle_mute(&mut self, channel: &str) -> bool {
        let switches = self.channels.entry(channel.to_string()).or_default();
        switches.muted = !switches.muted;
        switches.muted
    }

    /// Flip the solo flag and return the new state
    pub fn toggle_solo(&mut self, channel: &str) -> bool {
        let switches = self.channels.entry(channel.to_string()).or_default();
        switches.soloed = !switches.soloed;
        switches.soloed
    }

    /// Master must be unmuted, the channel unmuted, and either soloed or
    /// no channel soloed at all.
    pub fn is_audible(&self, channel: &str) -> bool {
        if self.switches(MASTER_CHANNEL).muted {
            return false;
        }
        let switches = self.switches(channel);
        if switches.muted {
            return false;
        }
        let any_solo = self
            .channels
            .iter()
            .any(|(name, s)| name != MASTER_CHANNEL && s.soloed);
        !any_solo || switches.soloed
    }
}

/// On/off state of each effect unit; effects start disabled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FxSwitches {
    enabled: BTreeMap<String, bool>,
}

impl FxSwitches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, fx: &str) -> bool {
        self.enabled.get(fx).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, fx: &str) -> bool {
        let enabled = self.enabled.entry(fx.to_string()).or_insert(false);
        *enabled = !*enabled;
        *enabled
    }

    pub fn enabled(&self) -> &BTreeMap<String, bool> {
        &self.enabled
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    values: BTreeMap<String, f32>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register knobs at their initial position
    pub fn with_knobs<'a>(knobs: impl IntoIterator<Item = &'a Knob>) -> Self {
        let mut map = Self::new();
        for knob in knobs {
            map.values.insert(knob.key(), DEFAULT_KNOB_VALUE);
        }
        map
    }

    pub fn get(&self, knob: &Knob) -> f32 {
        self.values
            .get(&knob.key())
            .copied()
            .unwrap_or(DEFAULT_KNOB_VALUE)
    }

    /// Store a clamped value and return it
    pub fn set(&mut self, knob: &Knob, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.0);
        self.values.insert(knob.key(), value);
        value
    }

    pub fn values(&self) -> &BTreeMap<String, f32> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
