use std::f32::consts::TAU;

/// Sine pitch LFO.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    phase_increment: f32,
}

impl Lfo {
    pub fn new(freq_hz: f32, sample_rate: f32) -> Self {
        Lfo {
            phase: 0.0,
            phase_increment: freq_hz / sample_rate,
        }
    }

    /// Maps the 0..=100 LFO rate byte onto roughly 0.1-20 Hz.
    pub fn rate_to_hz(rate: u8) -> f32 {
        0.1 * 2.0f32.powf(rate.min(100) as f32 * 7.64 / 100.0)
    }

    pub fn process(&mut self) -> f32 {
        let val = (self.phase * TAU).sin();
        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        val
    }
}
