//! JSON configuration for the mixer channel and the MT-32 device.

use crate::audio::AudioFrame;
use crate::error::ConfigError;
use crate::limiter::MAX_FRAMES;
use crate::synth::partial::MAX_PARTIALS;
use crate::synth::{DacInputMode, SynthProperties, DEFAULT_OUTPUT_GAIN, DEFAULT_REVERB_OUTPUT_GAIN, DEFAULT_SAMPLE_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mixer: MixerConfig,
    pub mt32: Mt32Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Name shown in limiter statistics.
    pub channel_name: String,
    pub levels: AudioFrame,
    pub range_multiplier: f32,
    pub max_frames: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            channel_name: "MT32".to_string(),
            levels: AudioFrame::splat(1.0),
            range_multiplier: 1.0,
            max_frames: MAX_FRAMES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mt32Config {
    pub romdir: PathBuf,
    pub sample_rate: u32,
    pub partials: usize,
    /// `None` keeps the mode chosen by the ROM defaults and incoming sysex.
    pub reverb_mode: Option<u8>,
    pub reverb_time: u8,
    pub reverb_level: u8,
    /// `None` picks the default conversion.
    pub dac: Option<DacInputMode>,
    pub reverse_stereo: bool,
    pub verbose: bool,
    pub output_gain: f32,
    pub reverb_output_gain: f32,
}

impl Default for Mt32Config {
    fn default() -> Self {
        Self {
            romdir: PathBuf::from("."),
            sample_rate: DEFAULT_SAMPLE_RATE,
            partials: MAX_PARTIALS,
            reverb_mode: None,
            reverb_time: 5,
            reverb_level: 3,
            dac: None,
            reverse_stereo: false,
            verbose: false,
            output_gain: DEFAULT_OUTPUT_GAIN,
            reverb_output_gain: DEFAULT_REVERB_OUTPUT_GAIN,
        }
    }
}

impl Mt32Config {
    pub fn dac_mode(&self) -> DacInputMode {
        self.dac.unwrap_or_default()
    }

    /// Pure mode skips the DAC's extra headroom, so its reverb is halved.
    pub fn effective_reverb_output_gain(&self) -> f32 {
        match self.dac_mode() {
            DacInputMode::Pure => self.reverb_output_gain * 0.5,
            _ => self.reverb_output_gain,
        }
    }

    pub fn synth_properties(&self) -> SynthProperties {
        SynthProperties {
            sample_rate: self.sample_rate,
            partial_limit: self.partials.min(MAX_PARTIALS),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses and validates JSON text; `origin` only labels errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });
        let mixer = &self.mixer;
        let mt32 = &self.mt32;
        if mixer.max_frames == 0 || mixer.max_frames > MAX_FRAMES {
            return invalid("mixer.max_frames", format!("{} is not in 1..={}", mixer.max_frames, MAX_FRAMES));
        }
        if !(mixer.range_multiplier.is_finite() && mixer.range_multiplier > 0.0) {
            return invalid("mixer.range_multiplier", format!("{} is not a positive number", mixer.range_multiplier));
        }
        if mixer.levels.left < 0.0 || mixer.levels.right < 0.0 {
            return invalid("mixer.levels", "levels must not be negative".into());
        }
        if mt32.sample_rate == 0 {
            return invalid("mt32.sample_rate", "must be nonzero".into());
        }
        if mt32.partials == 0 {
            return invalid("mt32.partials", "must be at least 1".into());
        }
        if let Some(mode) = mt32.reverb_mode {
            if mode > 3 {
                return invalid("mt32.reverb_mode", format!("{} is not in 0..=3", mode));
            }
        }
        if mt32.reverb_time > 7 {
            return invalid("mt32.reverb_time", format!("{} is not in 0..=7", mt32.reverb_time));
        }
        if mt32.reverb_level > 7 {
            return invalid("mt32.reverb_level", format!("{} is not in 0..=7", mt32.reverb_level));
        }
        if mt32.output_gain < 0.0 || mt32.reverb_output_gain < 0.0 {
            return invalid("mt32.output_gain", "gains must not be negative".into());
        }
        Ok(())
    }
}
