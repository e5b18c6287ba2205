//! Conversion of mixed float samples into the DAC's 16-bit input domain.

use serde::{Deserialize, Serialize};

/// How float output is quantised before it reaches the streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DacInputMode {
    /// Twice the emulated volume, clipped. Best for listening.
    #[default]
    Nice,
    /// Raw emulated levels, no gain applied.
    Pure,
    /// First-generation bit-shuffled LA32 output.
    Gen1,
    /// Later-generation bit-shuffled output.
    Gen2,
}

#[inline]
fn clip16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[inline]
fn nice(sample: f32, gain: f32) -> f32 {
    clip16((sample * gain * 16384.0) as i32) as f32
}

#[inline]
fn pure(sample: f32) -> f32 {
    ((sample * 8192.0).floor() as i32) as i16 as f32
}

#[inline]
fn reverb(sample: f32, gain: f32) -> f32 {
    ((sample * gain * 8192.0).floor() as i32) as i16 as f32
}

#[inline]
fn gen1(sample: f32, gain: f32) -> f32 {
    let t = (sample * gain * 8192.0).floor() as i32 as i16 as u16;
    ((t & 0x8000) | ((t << 1) & 0x7FFE)) as i16 as f32
}

#[inline]
fn gen2(sample: f32, gain: f32) -> f32 {
    let t = (sample * gain * 8192.0).floor() as i32 as i16 as u16;
    ((t & 0x8000) | ((t << 1) & 0x7FFE) | ((t >> 14) & 0x0001)) as i16 as f32
}

impl DacInputMode {
    /// Converts one dry sample.
    pub fn convert(self, sample: f32, gain: f32) -> f32 {
        match self {
            DacInputMode::Nice => nice(sample, gain),
            DacInputMode::Pure => pure(sample),
            DacInputMode::Gen1 => gen1(sample, gain),
            DacInputMode::Gen2 => gen2(sample, gain),
        }
    }

    /// Converts one reverb (wet or dry-through-reverb) sample.
    pub fn convert_reverb(self, sample: f32, gain: f32) -> f32 {
        match self {
            DacInputMode::Pure => pure(sample),
            _ => reverb(sample, gain),
        }
    }

    pub fn convert_slice(self, input: &[f32], out: &mut [f32], gain: f32) {
        for (o, &i) in out.iter_mut().zip(input) {
            *o = self.convert(i, gain);
        }
    }

    pub fn convert_reverb_slice(self, input: &[f32], out: &mut [f32], gain: f32) {
        for (o, &i) in out.iter_mut().zip(input) {
            *o = self.convert_reverb(i, gain);
        }
    }
}

