/// Five-segment amplitude envelope driven by the TVA time/level bytes.
///
/// Segments 1-4 move towards `levels[0..4]` over `times[0..4]`; the last
/// level is held while the key is down. Segment 5 is the release to silence.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeGenerator {
    pub times: [f32; 5],
    pub levels: [f32; 4],
    pub sustain: bool,
}

/// Converts a 0..=100 envelope time byte into seconds.
pub fn time_to_seconds(time: u8) -> f32 {
    if time == 0 {
        0.0
    } else {
        0.001 * 2.0f32.powf(time.min(100) as f32 / 8.0)
    }
}

impl EnvelopeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `env_time[5]` and `env_level[4]` as laid out in the TVA block.
    pub fn from_bytes(env_time: &[u8], env_level: &[u8], sustain: bool) -> Self {
        let mut times = [0.0; 5];
        for (t, &b) in times.iter_mut().zip(env_time) {
            *t = time_to_seconds(b);
        }
        let mut levels = [0.0; 4];
        for (l, &b) in levels.iter_mut().zip(env_level) {
            *l = b.min(100) as f32 / 100.0;
        }
        Self { times, levels, sustain }
    }

    fn hold_start(&self) -> f32 {
        self.times[..4].iter().sum()
    }

    fn evaluate_held(&self, time_since_on: f32) -> f32 {
        let mut start = 0.0;
        let mut from = 0.0;
        for (&duration, &to) in self.times[..4].iter().zip(&self.levels) {
            if time_since_on < start + duration {
                let progress = (time_since_on - start) / duration;
                return from + (to - from) * progress;
            }
            start += duration;
            from = to;
        }
        self.levels[3]
    }

    /// Envelope level at `time_since_on`. `time_since_off` is set once the
    /// key has been released.
    pub fn evaluate(&self, time_since_on: f32, time_since_off: Option<f32>) -> f32 {
        let release_elapsed = match (time_since_off, self.sustain) {
            (Some(off), true) => Some(off),
            (Some(off), false) => Some(off.max(time_since_on - self.hold_start())),
            (None, true) => None,
            (None, false) => {
                let past_hold = time_since_on - self.hold_start();
                (past_hold >= 0.0).then_some(past_hold)
            }
        };
        match release_elapsed {
            None => self.evaluate_held(time_since_on),
            Some(elapsed) => {
                let release = self.times[4];
                if elapsed >= release {
                    return 0.0;
                }
                let start_level = self.evaluate_held(time_since_on - elapsed);
                start_level * (1.0 - elapsed / release)
            }
        }
    }

    /// True once the release has run its course.
    pub fn is_finished(&self, time_since_on: f32, time_since_off: Option<f32>) -> bool {
        let released =
            time_since_off.is_some() || (!self.sustain && time_since_on >= self.hold_start());
        released && self.evaluate(time_since_on, time_since_off) == 0.0
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self {
            times: [0.01, 0.1, 0.0, 0.0, 0.2],
            levels: [1.0, 0.7, 0.7, 0.7],
            sustain: true,
        }
    }
}
