//! Zero-latency soft limiter.
//!
//! Converts interleaved float stereo into bounded 16-bit PCM. Each channel
//! keeps its own running peak, tail sample, and zero-crossing state, so an
//! overload on one side never changes the other.

mod prescale;
mod scale;
mod scan;

pub use self::prescale::SharedPrescale;

use self::scale::{linear_scale, poly_fit};
use self::scan::{find_peaks_and_zero_crosses, ChannelScan};
use crate::audio::AudioFrame;
use log::info;

/// Largest magnitude ever emitted. One unit short of `i16::MAX` keeps the
/// positive and negative extents symmetric.
pub const BOUNDS: f32 = (i16::MAX - 1) as f32;

/// Largest block a single `process` call may request.
pub const MAX_FRAMES: usize = 16384;

/// Per-block peak decay, roughly 0.0235 dB.
const RELEASE_FRACTION: f32 = 0.002709201;
const RELEASE_AMPLITUDE: f32 = BOUNDS * RELEASE_FRACTION;

/// Channel-blocks to accumulate before `print_stats` reports anything.
const MIN_STATS_TALLY: u64 = 16;
const MIN_PEAK_RATIO: f32 = 0.02;
const WELL_BELOW_3DB: f32 = 0.6;
const LIMITED_REPORT_RATIO: f64 = 0.2;

/// Summary produced by [`SoftLimiter::stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterStats {
    /// Peak magnitude relative to the bound, capped at 1.
    pub peak_ratio: f32,
    /// Suggested mixer level when the channel never got close to full scale.
    pub louder_suggestion: Option<f32>,
    /// Fraction of processed channel-blocks that needed limiting.
    pub limited_ratio: f64,
    /// Suggested mixer level when too much of the stream was limited.
    pub quieter_suggestion: Option<f64>,
}

pub struct SoftLimiter {
    channel_name: String,
    prescale: SharedPrescale,
    max_samples: usize,
    out: Vec<i16>,
    global_peaks: AudioFrame,
    tail_frame: AudioFrame,
    limited_tally: u64,
    non_limited_tally: u64,
}

impl SoftLimiter {
    /// A limiter with its own unity prescale.
    pub fn new(name: &str, max_frames: usize) -> Self {
        Self::with_prescale(name, max_frames, SharedPrescale::unity())
    }

    /// A limiter reading its gain from a prescale owned elsewhere.
    pub fn with_prescale(name: &str, max_frames: usize, prescale: SharedPrescale) -> Self {
        debug_assert!(max_frames > 0 && max_frames <= MAX_FRAMES);
        let max_samples = max_frames * 2;
        Self {
            channel_name: name.to_string(),
            prescale,
            max_samples,
            out: vec![0; max_samples],
            global_peaks: AudioFrame::default(),
            tail_frame: AudioFrame::default(),
            limited_tally: 0,
            non_limited_tally: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.channel_name
    }

    pub fn max_frames(&self) -> usize {
        self.max_samples / 2
    }

    /// Handle for a mixer thread to adjust this limiter's gain.
    pub fn prescale(&self) -> SharedPrescale {
        self.prescale.clone()
    }

    pub fn update_levels(&self, levels: AudioFrame, range_multiplier: f32) {
        self.prescale.update_levels(levels, range_multiplier);
    }

    /// Limits `frames` frames of `input` and returns them from an internal
    /// buffer that stays valid until the next call.
    pub fn process(&mut self, input: &[f32], frames: usize) -> &[i16] {
        let mut out = std::mem::take(&mut self.out);
        self.process_into(input, frames, &mut out);
        self.out = out;
        &self.out[..frames * 2]
    }

    /// Limits `frames` frames of `input` into `out`.
    ///
    /// Callers must keep `0 < frames <= max_frames` and supply at least
    /// `frames * 2` samples in both slices. Violations panic in debug builds.
    pub fn process_into(&mut self, input: &[f32], frames: usize, out: &mut [i16]) {
        debug_assert!(frames > 0, "need some quantity of frames");
        debug_assert!(frames <= MAX_FRAMES, "consider using smaller sequence chunks");
        let samples = frames * 2;
        debug_assert!(samples <= self.max_samples);
        debug_assert!(input.len() >= samples);
        debug_assert!(out.len() >= samples);

        let prescale = self.prescale.load();
        let (left, right) =
            find_peaks_and_zero_crosses(input, samples, prescale, &mut self.global_peaks);

        self.scale_or_copy(input, samples, 0, prescale.left, left, out);
        self.scale_or_copy(input, samples, 1, prescale.right, right, out);

        self.save_tail_frame(frames, out);
        self.release();
    }

    fn scale_or_copy(
        &mut self,
        input: &[f32],
        samples: usize,
        channel: usize,
        prescale: f32,
        scan: ChannelScan,
        out: &mut [i16],
    ) {
        let global_peak = self.global_peaks.channel(channel);
        let tail = self.tail_frame.channel(channel);
        let end = samples + channel;

        if let Some(peak_pos) = scan.precross_peak {
            let peak = input[peak_pos].abs();
            let tail_abs = tail.abs();
            let prepeak_scalar = (BOUNDS - tail_abs) / (prescale * peak - tail_abs);
            poly_fit(input, channel, peak_pos, out, prescale, prepeak_scalar, tail);

            let postpeak_scalar = BOUNDS / peak;
            match scan.zero_cross {
                Some(cross_pos) => {
                    linear_scale(input, peak_pos, cross_pos, out, postpeak_scalar);
                    let postcross_scalar = prescale * BOUNDS / global_peak;
                    linear_scale(input, cross_pos, end, out, postcross_scalar);
                }
                None => linear_scale(input, peak_pos, end, out, postpeak_scalar),
            }
            self.limited_tally += 1;
        } else if global_peak > BOUNDS {
            let current_scalar = prescale * BOUNDS / global_peak;
            linear_scale(input, channel, end, out, current_scalar);
            self.limited_tally += 1;
        } else {
            linear_scale(input, channel, end, out, prescale);
            self.non_limited_tally += 1;
        }
    }

    fn save_tail_frame(&mut self, frames: usize, out: &[i16]) {
        let i = (frames - 1) * 2;
        self.tail_frame = AudioFrame::new(out[i] as f32, out[i + 1] as f32);
    }

    fn release(&mut self) {
        for channel in 0..2 {
            let peak = self.global_peaks.channel_mut(channel);
            if *peak > BOUNDS {
                *peak -= RELEASE_AMPLITUDE;
            }
        }
    }

    pub fn get_peaks(&self) -> AudioFrame {
        self.global_peaks
    }

    pub fn tail_frame(&self) -> AudioFrame {
        self.tail_frame
    }

    pub fn tallies(&self) -> (u64, u64) {
        (self.limited_tally, self.non_limited_tally)
    }

    /// Called when the owning channel pauses. Peaks are clamped rather than
    /// zeroed so later statistics still reflect how loud the stream got.
    pub fn reset(&mut self) {
        self.global_peaks.left = self.global_peaks.left.min(BOUNDS);
        self.global_peaks.right = self.global_peaks.right.min(BOUNDS);
        self.tail_frame = AudioFrame::default();
    }

    /// `None` while too little audio has passed or the channel stayed
    /// essentially silent.
    pub fn stats(&self) -> Option<LimiterStats> {
        let total_tally = self.limited_tally + self.non_limited_tally;
        if total_tally < MIN_STATS_TALLY {
            return None;
        }
        let peak_ratio = (self.global_peaks.max_channel() / BOUNDS).min(1.0);
        if peak_ratio < MIN_PEAK_RATIO {
            return None;
        }

        let range_multiplier = self.prescale.range_multiplier();
        let scale = if range_multiplier != 0.0 {
            self.prescale.load().max_channel() / range_multiplier
        } else {
            0.0
        };

        let louder_suggestion = (peak_ratio < WELL_BELOW_3DB).then(|| 100.0 * scale / peak_ratio);

        let limited_ratio = self.limited_tally as f64 / (total_tally as f64 + 1.0);
        let quieter_suggestion = (limited_ratio > LIMITED_REPORT_RATIO)
            .then(|| 100.0 * (1.0 - limited_ratio) * scale as f64);

        Some(LimiterStats {
            peak_ratio,
            louder_suggestion,
            limited_ratio,
            quieter_suggestion,
        })
    }

    pub fn print_stats(&self) {
        let Some(stats) = self.stats() else {
            return;
        };
        let name = &self.channel_name;
        info!(
            "{}: Peak amplitude reached {:.0}% of max",
            name,
            100.0 * stats.peak_ratio
        );
        if let Some(level) = stats.louder_suggestion {
            info!("{}: If it should be louder, use: mixer {} {:.0}", name, name, level);
        }
        if let Some(level) = stats.quieter_suggestion {
            info!(
                "{}: {:.1}% of the audio needed limiting, consider: mixer {} {:.0}",
                name,
                100.0 * stats.limited_ratio,
                name,
                level
            );
        }
    }
}
