use std::fmt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// --- DSP Primitives ---

/// Integer-delay line. Power-of-two buffers wrap with a mask.
#[derive(Clone, Debug)]
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
}

impl DelayLine {
    fn new() -> Self {
        Self {
            buffer: vec![0.0; 1],
            write_pos: 0,
            mask: 0,
        }
    }

    fn resize(&mut self, max_delay_samples: usize) {
        let new_size = (max_delay_samples + 1).next_power_of_two();
        if new_size != self.buffer.len() {
            self.buffer = vec![0.0; new_size];
            self.mask = new_size - 1;
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    #[inline]
    fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) & self.mask;
    }

    /// Sample written `delay_samples + 1` writes ago.
    #[inline]
    fn read(&self, delay_samples: usize) -> f32 {
        if delay_samples >= self.buffer.len() {
            return 0.0;
        }
        self.buffer[self.write_pos.wrapping_sub(delay_samples).wrapping_sub(1) & self.mask]
    }
}

// --- Matrices ---

fn householder(order: usize, rng: &mut SmallRng) -> Vec<Vec<f32>> {
    if order == 1 {
        return vec![vec![-1.0]];
    }
    let mut v = vec![0.0f32; order];
    let mut v_norm_sq = 0.0;
    while v_norm_sq < 1e-9 {
        for x in v.iter_mut() {
            *x = rng.random_range(-1.0..1.0);
        }
        v_norm_sq = v.iter().map(|x| x * x).sum();
    }
    let factor = -2.0 / v_norm_sq;
    let mut h = vec![vec![0.0; order]; order];
    for r in 0..order {
        for c in 0..order {
            h[r][c] = factor * v[r] * v[c];
        }
        h[r][r] += 1.0;
    }
    h
}

/// Unnormalised fast Hadamard transform. `data.len()` must be a power of two.
fn hadamard_in_place(data: &mut [f32]) {
    let n = data.len();
    let mut h = 1;
    while h < n {
        for i in (0..n).step_by(h * 2) {
            for j in i..i + h {
                let x = data[j];
                let y = data[j + h];
                data[j] = x + y;
                data[j + h] = x - y;
            }
        }
        h *= 2;
    }
    let scale = 1.0 / (n as f32).sqrt();
    for x in data.iter_mut() {
        *x *= scale;
    }
}

#[inline]
fn matrix_vector_mult(matrix: &[Vec<f32>], vector: &[f32], out: &mut [f32]) {
    for (o, row) in out.iter_mut().zip(matrix) {
        *o = row.iter().zip(vector).map(|(m, v)| m * v).sum();
    }
}

// --- FDN components ---

#[derive(Clone, Debug)]
struct DiffusionStep {
    delay_ms_range: f32,
    delay_samples: Vec<usize>,
    delays: Vec<DelayLine>,
    flip_polarity: Vec<bool>,
    scratch: Vec<f32>,
}

impl DiffusionStep {
    fn new(channels: usize, delay_ms_range: f32) -> Self {
        Self {
            delay_ms_range,
            delay_samples: vec![0; channels],
            delays: (0..channels).map(|_| DelayLine::new()).collect(),
            flip_polarity: vec![false; channels],
            scratch: vec![0.0; channels],
        }
    }

    fn configure(&mut self, sample_rate: f32, rng: &mut SmallRng) {
        let channels = self.delays.len();
        let range = self.delay_ms_range * 0.001 * sample_rate;
        for c in 0..channels {
            let low = range * c as f32 / channels as f32;
            let high = range * (c + 1) as f32 / channels as f32;
            let delay = if high > low { rng.random_range(low..high) } else { low };
            self.delay_samples[c] = delay.round().max(0.0) as usize;
            self.flip_polarity[c] = rng.random::<bool>();
            self.delays[c].resize(self.delay_samples[c]);
        }
    }

    fn reset(&mut self) {
        self.delays.iter_mut().for_each(DelayLine::reset);
    }

    #[inline]
    fn process(&mut self, buffer: &mut [f32]) {
        for (c, delay) in self.delays.iter_mut().enumerate() {
            delay.write(buffer[c]);
            self.scratch[c] = delay.read(self.delay_samples[c]);
        }
        hadamard_in_place(&mut self.scratch);
        for (c, out) in buffer.iter_mut().enumerate() {
            let mixed = self.scratch[c];
            *out = if self.flip_polarity[c] { -mixed } else { mixed };
        }
    }
}

#[derive(Clone, Debug)]
struct FeedbackLoop {
    delay_ms: f32,
    decay_gain: f32,
    delay_samples: Vec<usize>,
    delays: Vec<DelayLine>,
    matrix: Vec<Vec<f32>>,
    delayed: Vec<f32>,
    mixed: Vec<f32>,
}

impl FeedbackLoop {
    fn new(channels: usize, delay_ms: f32, rng: &mut SmallRng) -> Self {
        Self {
            delay_ms,
            decay_gain: 0.0,
            delay_samples: vec![0; channels],
            delays: (0..channels).map(|_| DelayLine::new()).collect(),
            matrix: householder(channels, rng),
            delayed: vec![0.0; channels],
            mixed: vec![0.0; channels],
        }
    }

    fn configure(&mut self, sample_rate: f32) {
        let channels = self.delays.len();
        let base = self.delay_ms * 0.001 * sample_rate;
        for c in 0..channels {
            let r = c as f32 / channels as f32;
            self.delay_samples[c] = (2.0f32.powf(r) * base).round() as usize;
            self.delays[c].resize(self.delay_samples[c]);
        }
    }

    fn reset(&mut self) {
        self.delays.iter_mut().for_each(DelayLine::reset);
        self.delayed.fill(0.0);
        self.mixed.fill(0.0);
    }

    /// Writes the delayed signals (read before feedback) into `output`.
    #[inline]
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (c, delay) in self.delays.iter().enumerate() {
            self.delayed[c] = delay.read(self.delay_samples[c]);
        }
        matrix_vector_mult(&self.matrix, &self.delayed, &mut self.mixed);
        for (c, delay) in self.delays.iter_mut().enumerate() {
            let value = input[c] + self.mixed[c] * self.decay_gain;
            delay.write(if value.is_finite() { value } else { 0.0 });
        }
        output.copy_from_slice(&self.delayed);
    }
}

// --- Reverb models ---

/// Shared interface of the switchable reverb processors.
///
/// `process` writes wet output only; the dry signal is mixed elsewhere.
pub trait ReverbModel: fmt::Debug + Send {
    fn open(&mut self, sample_rate: u32);
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Silences the tail without reallocating.
    fn mute(&mut self);
    /// `time` and `level` are the 0..=7 system parameters.
    fn set_parameters(&mut self, time: u8, level: u8);
    fn process(&mut self, in_left: &[f32], in_right: &[f32], out_left: &mut [f32], out_right: &mut [f32]);
    /// True while the model may still emit a nonzero tail.
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbMode {
    Room = 0,
    Hall = 1,
    Plate = 2,
    TapDelay = 3,
}

impl ReverbMode {
    pub const ALL: [ReverbMode; 4] = [Self::Room, Self::Hall, Self::Plate, Self::TapDelay];

    pub fn from_u8(mode: u8) -> Self {
        Self::ALL[(mode & 3) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Room => "Room",
            Self::Hall => "Hall",
            Self::Plate => "Plate",
            Self::TapDelay => "Tap-delay",
        }
    }
}

pub fn new_model(mode: ReverbMode) -> Box<dyn ReverbModel> {
    match mode {
        ReverbMode::Room => Box::new(FdnReverb::new(FdnShape::ROOM)),
        ReverbMode::Hall => Box::new(FdnReverb::new(FdnShape::HALL)),
        ReverbMode::Plate => Box::new(FdnReverb::new(FdnShape::PLATE)),
        ReverbMode::TapDelay => Box::new(TapDelayReverb::new()),
    }
}

const FDN_CHANNELS: usize = 8;

/// Geometry of one FDN flavour.
#[derive(Debug, Clone, Copy)]
pub struct FdnShape {
    size_ms: f32,
    diffusion_steps: usize,
    rt60_min: f32,
    rt60_max: f32,
    seed: u64,
}

impl FdnShape {
    pub const ROOM: Self = Self { size_ms: 40.0, diffusion_steps: 3, rt60_min: 0.3, rt60_max: 2.0, seed: 0x5eed_0001 };
    pub const HALL: Self = Self { size_ms: 90.0, diffusion_steps: 4, rt60_min: 0.8, rt60_max: 5.0, seed: 0x5eed_0002 };
    pub const PLATE: Self = Self { size_ms: 25.0, diffusion_steps: 5, rt60_min: 0.5, rt60_max: 3.0, seed: 0x5eed_0003 };
}

/// Feedback-delay-network reverb: a halving-length diffuser chain into a
/// Householder feedback loop.
#[derive(Debug)]
pub struct FdnReverb {
    shape: FdnShape,
    sample_rate: f32,
    open: bool,
    diffuser: Vec<DiffusionStep>,
    feedback: FeedbackLoop,
    channels: [f32; FDN_CHANNELS],
    feedback_out: [f32; FDN_CHANNELS],
    rt60: f32,
    wet: f32,
    tail_samples: usize,
    silent_run: usize,
}

impl FdnReverb {
    pub fn new(shape: FdnShape) -> Self {
        let mut rng = SmallRng::seed_from_u64(shape.seed);
        let mut diffusion_ms = shape.size_ms;
        let diffuser = (0..shape.diffusion_steps)
            .map(|_| {
                diffusion_ms *= 0.5;
                DiffusionStep::new(FDN_CHANNELS, diffusion_ms)
            })
            .collect();
        Self {
            shape,
            sample_rate: 0.0,
            open: false,
            diffuser,
            feedback: FeedbackLoop::new(FDN_CHANNELS, shape.size_ms, &mut rng),
            channels: [0.0; FDN_CHANNELS],
            feedback_out: [0.0; FDN_CHANNELS],
            rt60: shape.rt60_min,
            wet: 0.0,
            tail_samples: 0,
            silent_run: usize::MAX,
        }
    }

    fn update_decay(&mut self) {
        let loop_seconds = self.shape.size_ms * 1.5 * 0.001;
        let loops_per_rt60 = self.rt60 / loop_seconds;
        let db_per_loop = -60.0 / loops_per_rt60;
        self.feedback.decay_gain = 10.0f32.powf(db_per_loop * 0.05).clamp(0.0, 1.0);
        self.tail_samples = (self.rt60 * self.sample_rate) as usize;
    }
}

impl ReverbModel for FdnReverb {
    fn open(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        let mut rng = SmallRng::seed_from_u64(self.shape.seed.rotate_left(17));
        for step in self.diffuser.iter_mut() {
            step.configure(self.sample_rate, &mut rng);
        }
        self.feedback.configure(self.sample_rate);
        self.update_decay();
        self.open = true;
        self.mute();
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn mute(&mut self) {
        self.diffuser.iter_mut().for_each(DiffusionStep::reset);
        self.feedback.reset();
        self.silent_run = usize::MAX;
    }

    fn set_parameters(&mut self, time: u8, level: u8) {
        let t = time.min(7) as f32 / 7.0;
        self.rt60 = self.shape.rt60_min + (self.shape.rt60_max - self.shape.rt60_min) * t;
        self.wet = level.min(7) as f32 / 7.0;
        self.update_decay();
    }

    fn process(&mut self, in_left: &[f32], in_right: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        if !self.open {
            out_left.fill(0.0);
            out_right.fill(0.0);
            return;
        }
        for i in 0..out_left.len() {
            let input = 0.5 * (in_left[i] + in_right[i]);
            if input != 0.0 {
                self.silent_run = 0;
            } else {
                self.silent_run = self.silent_run.saturating_add(1);
            }
            self.channels.fill(input);
            for step in self.diffuser.iter_mut() {
                step.process(&mut self.channels);
            }
            self.feedback.process(&self.channels, &mut self.feedback_out);
            out_left[i] = self.feedback_out[0] * self.wet;
            out_right[i] = self.feedback_out[1] * self.wet;
        }
    }

    fn is_active(&self) -> bool {
        self.open && self.wet > 0.0 && self.silent_run < self.tail_samples
    }
}

const TAP_COUNT: usize = 4;
const TAP_MAX_MS: f32 = 600.0;

/// Multitap stereo echo with cross-fed feedback.
#[derive(Debug)]
pub struct TapDelayReverb {
    sample_rate: f32,
    open: bool,
    left: DelayLine,
    right: DelayLine,
    taps: [usize; TAP_COUNT],
    feedback: f32,
    wet: f32,
    tail_samples: usize,
    silent_run: usize,
}

impl TapDelayReverb {
    pub fn new() -> Self {
        Self {
            sample_rate: 0.0,
            open: false,
            left: DelayLine::new(),
            right: DelayLine::new(),
            taps: [0; TAP_COUNT],
            feedback: 0.0,
            wet: 0.0,
            tail_samples: 0,
            silent_run: usize::MAX,
        }
    }
}

impl Default for TapDelayReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverbModel for TapDelayReverb {
    fn open(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        let max = (TAP_MAX_MS * 0.001 * self.sample_rate) as usize;
        self.left.resize(max);
        self.right.resize(max);
        self.open = true;
        self.set_parameters(5, 3);
        self.mute();
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn mute(&mut self) {
        self.left.reset();
        self.right.reset();
        self.silent_run = usize::MAX;
    }

    fn set_parameters(&mut self, time: u8, level: u8) {
        let spacing_ms = 20.0 + 20.0 * time.min(7) as f32;
        for (k, tap) in self.taps.iter_mut().enumerate() {
            let ms = (spacing_ms * (k + 1) as f32).min(TAP_MAX_MS - 1.0);
            *tap = (ms * 0.001 * self.sample_rate) as usize;
        }
        self.feedback = 0.25 + 0.05 * time.min(7) as f32;
        self.wet = level.min(7) as f32 / 7.0;
        // Time for the feedback path to fall 60 dB.
        let echoes = -3.0 / self.feedback.log10();
        self.tail_samples = self.taps[TAP_COUNT - 1] * (echoes.ceil() as usize + 1);
    }

    fn process(&mut self, in_left: &[f32], in_right: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        if !self.open {
            out_left.fill(0.0);
            out_right.fill(0.0);
            return;
        }
        let last = self.taps[TAP_COUNT - 1];
        for i in 0..out_left.len() {
            if in_left[i] != 0.0 || in_right[i] != 0.0 {
                self.silent_run = 0;
            } else {
                self.silent_run = self.silent_run.saturating_add(1);
            }
            let mut wet_l = 0.0;
            let mut wet_r = 0.0;
            for (k, &tap) in self.taps.iter().enumerate() {
                let gain = 1.0 / (k + 1) as f32;
                // Alternate taps between sides for a ping-pong image.
                if k % 2 == 0 {
                    wet_l += self.left.read(tap) * gain;
                    wet_r += self.right.read(tap) * gain;
                } else {
                    wet_l += self.right.read(tap) * gain;
                    wet_r += self.left.read(tap) * gain;
                }
            }
            let fb_l = self.right.read(last) * self.feedback;
            let fb_r = self.left.read(last) * self.feedback;
            self.left.write(in_left[i] + fb_l);
            self.right.write(in_right[i] + fb_r);
            out_left[i] = wet_l * self.wet;
            out_right[i] = wet_r * self.wet;
        }
    }

    fn is_active(&self) -> bool {
        self.open && self.wet > 0.0 && self.silent_run < self.tail_samples
    }
}
