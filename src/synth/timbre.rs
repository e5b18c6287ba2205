//! Decoded timbre parameters, cached per part.

use super::envelope::EnvelopeGenerator;
use super::lfo::Lfo;
use super::memory::{timbre, PARTIAL_PARAM_SIZE, TIMBRE_COMMON_SIZE};
use super::partial::{PartialSetup, WaveKind};
use super::rom::PcmWave;
use log::debug;

/// PCM flags of each partial pair per structure number. Bit 1 covers the
/// first partial of the pair, bit 0 the second.
const PARTIAL_STRUCT: [u8; 13] = [0, 0, 2, 2, 1, 3, 3, 0, 3, 0, 2, 1, 3];

/// Pitch key-follow ratios indexed by the keyfollow byte.
const KEYFOLLOW: [f32; 17] = [
    -1.0, -0.5, -0.25, 0.0, 0.125, 0.25, 0.375, 0.5, 0.625, 0.75, 0.875, 1.0, 1.25, 1.5, 2.0, 1.0,
    1.0,
];

mod wg {
    pub const PITCH_COARSE: usize = 0;
    pub const PITCH_FINE: usize = 1;
    pub const PITCH_KEYFOLLOW: usize = 2;
    pub const BENDER_ENABLED: usize = 3;
    pub const WAVEFORM: usize = 4;
    pub const PCM_WAVE: usize = 5;
    pub const PULSE_WIDTH: usize = 6;
}

mod pitch_lfo {
    pub const RATE: usize = 20;
    pub const DEPTH: usize = 21;
    pub const MOD_SENS: usize = 22;
}

mod tva {
    pub const LEVEL: usize = 41;
    pub const VELO_SENS: usize = 42;
    pub const ENV_TIME: usize = 49;
    pub const ENV_LEVEL: usize = 54;
}

/// Shared, read-only sound data a part needs when starting notes.
#[derive(Debug, Clone, Copy)]
pub struct VoiceContext<'a> {
    pub waves: &'a [PcmWave],
    pub sample_rate: f32,
}

/// Where and how loud a note of this part sits in the mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub level: f32,
    pub panpot: u8,
    pub reverb: bool,
    pub fine_tune: f32,
}

impl Placement {
    /// Panpot 0..=14, 7 is centre.
    pub fn pan(&self) -> (f32, f32) {
        let left = self.panpot.min(14) as f32 / 14.0;
        (left, 1.0 - left)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialConfig {
    pub index: usize,
    /// PCM wave number, or `None` for a synthesised waveform.
    pub pcm: Option<usize>,
    params: [u8; PARTIAL_PARAM_SIZE],
}

impl PartialConfig {
    pub fn param(&self, offset: usize) -> u8 {
        self.params[offset]
    }

    /// Gain factor for a note velocity, blended by the TVA velocity sensitivity.
    pub fn velocity_to_scale(&self, velocity: u8) -> f32 {
        let sensitivity = self.params[tva::VELO_SENS].min(100) as f32 / 100.0;
        let normalized = velocity.clamp(1, 127) as f32 / 127.0;
        1.0 - sensitivity * (1.0 - normalized.powf(1.5))
    }

    pub fn setup(
        &self,
        key: u8,
        velocity: u8,
        sustain: bool,
        ctx: &VoiceContext<'_>,
        placement: &Placement,
    ) -> Option<PartialSetup> {
        let p = &self.params;
        let wave = match self.pcm {
            Some(number) => match ctx.waves.get(number) {
                Some(&pcm_wave) => WaveKind::Pcm(pcm_wave),
                None => {
                    debug!("Partial {} refers to missing PCM wave {}", self.index, number);
                    return None;
                }
            },
            None if p[wg::WAVEFORM] & 1 != 0 => WaveKind::Sawtooth,
            None => WaveKind::Square {
                duty: 0.5 - p[wg::PULSE_WIDTH].min(100) as f32 * 0.0045,
            },
        };
        let follow = KEYFOLLOW[p[wg::PITCH_KEYFOLLOW].min(16) as usize];
        let semitone = 60.0
            + (key as f32 - 60.0) * follow
            + (p[wg::PITCH_COARSE] as f32 - 36.0)
            + (p[wg::PITCH_FINE] as f32 - 50.0) / 100.0
            + placement.fine_tune;
        let (pan_left, pan_right) = placement.pan();
        let envelope = EnvelopeGenerator::from_bytes(
            &p[tva::ENV_TIME..tva::ENV_TIME + 5],
            &p[tva::ENV_LEVEL..tva::ENV_LEVEL + 4],
            sustain,
        );
        Some(PartialSetup {
            wave,
            semitone,
            bender_enabled: p[wg::BENDER_ENABLED] != 0,
            amp: p[tva::LEVEL].min(100) as f32 / 100.0 * self.velocity_to_scale(velocity) * placement.level,
            pan_left,
            pan_right,
            reverb: placement.reverb,
            envelope,
            lfo_hz: Lfo::rate_to_hz(p[pitch_lfo::RATE]),
            lfo_depth: p[pitch_lfo::DEPTH].min(100) as f32 / 200.0,
            lfo_mod_depth: p[pitch_lfo::MOD_SENS].min(100) as f32 / 100.0,
        })
    }
}

/// The playable partials of one timbre.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimbreCache {
    pub partials: Vec<PartialConfig>,
    pub sustain: bool,
}

impl TimbreCache {
    /// Decodes an unpadded timbre. `pcm_count` above 128 selects the
    /// second PCM bank for waveforms above 1.
    pub fn from_timbre(bytes: &[u8], pcm_count: usize) -> Self {
        let mute = bytes[timbre::PARTIAL_MUTE];
        let partials = (0..4)
            .filter(|&t| (mute >> t) & 1 != 0)
            .map(|t| {
                let structure = if t < 2 {
                    bytes[timbre::PARTIAL_STRUCTURE_12]
                } else {
                    bytes[timbre::PARTIAL_STRUCTURE_34]
                };
                let pcm_bit = if t % 2 == 0 { 2 } else { 1 };
                let is_pcm = PARTIAL_STRUCT[structure.min(12) as usize] & pcm_bit != 0;
                let start = TIMBRE_COMMON_SIZE + t * PARTIAL_PARAM_SIZE;
                let mut params = [0; PARTIAL_PARAM_SIZE];
                params.copy_from_slice(&bytes[start..start + PARTIAL_PARAM_SIZE]);
                let pcm = is_pcm.then(|| {
                    let mut number = params[wg::PCM_WAVE] as usize;
                    if pcm_count > 128 && params[wg::WAVEFORM] > 1 {
                        number += 128;
                    }
                    number
                });
                PartialConfig { index: t, pcm, params }
            })
            .collect();
        Self {
            partials,
            sustain: bytes[timbre::NO_SUSTAIN] == 0,
        }
    }

    pub fn partial_count(&self) -> usize {
        self.partials.len()
    }
}
