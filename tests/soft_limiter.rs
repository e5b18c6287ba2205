use dosmix::audio::AudioFrame;
use dosmix::limiter::{SharedPrescale, SoftLimiter, BOUNDS};

fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    left.iter().zip(right).flat_map(|(&l, &r)| [l, r]).collect()
}

fn left_of(out: &[i16]) -> Vec<i16> {
    out.iter().step_by(2).copied().collect()
}

fn right_of(out: &[i16]) -> Vec<i16> {
    out.iter().skip(1).step_by(2).copied().collect()
}

#[test]
fn quiet_audio_passes_through_truncated() {
    let mut limiter = SoftLimiter::new("test", 64);
    let input = interleave(&[100.0, 300.7, -0.7], &[-200.0, -1.5, 32000.0]);
    let out = limiter.process(&input, 3).to_vec();
    assert_eq!(out, vec![100, -200, 300, -1, 0, 32000]);
    assert_eq!(limiter.tallies(), (0, 2));
    assert_eq!(limiter.tail_frame(), AudioFrame::new(0.0, 32000.0));
}

#[test]
fn in_bounds_block_is_unchanged() {
    let mut limiter = SoftLimiter::new("test", 64);
    let input = [-3.0, -2.0, -1.0, 0.0, 1.0, 2.0];
    assert_eq!(limiter.process(&input, 3), &[-3, -2, -1, 0, 1, 2]);
}

#[test]
fn new_peak_joins_the_previous_tail() {
    let mut limiter = SoftLimiter::new("test", 64);
    let first = [18000.0, 18000.0, 20000.0, 20000.0, 22000.0, 22000.0];
    assert_eq!(limiter.process(&first, 3), &[18000, 18000, 20000, 20000, 22000, 22000]);

    let second = [30000.0, 30000.0, 60000.0, 60000.0, 30000.0, 30000.0];
    assert_eq!(limiter.process(&second, 3), &[24266, 24266, 32766, 32766, 16383, 16383]);
    assert_eq!(limiter.tallies(), (2, 2));
}

#[test]
fn gain_recovers_gradually_after_a_spike() {
    let mut limiter = SoftLimiter::new("test", 64);
    limiter.process(&[65534.0, 0.0], 1);

    let quiet = [10000.0, 0.0];
    let mut previous = limiter.process(&quiet, 1)[0];
    let mut blocks = 1;
    while previous < 10000 {
        let next = limiter.process(&quiet, 1)[0];
        assert!(next >= previous);
        previous = next;
        blocks += 1;
        assert!(blocks < 1000, "gain never recovered");
    }
    // Halving the peak takes a few hundred release steps.
    assert!(blocks > 100);
}

#[test]
fn negative_peak_joins_the_previous_tail() {
    let mut limiter = SoftLimiter::new("test", 64);
    let first = [-18000.0, -18000.0, -20000.0, -20000.0, -22000.0, -22000.0];
    assert_eq!(limiter.process(&first, 3), &[-18000, -18000, -20000, -20000, -22000, -22000]);

    let second = [-30000.0, -30000.0, -60000.0, -60000.0, -30000.0, -30000.0];
    assert_eq!(limiter.process(&second, 3), &[-24266, -24266, -32766, -32766, -16383, -16383]);
}

#[test]
fn join_scales_through_a_zero_crossing() {
    let mut limiter = SoftLimiter::new("test", 64);
    let first = [
        -5000.0, 1000.0, -3000.0, 1000.0, -1000.0, 1000.0, 0.0, 1000.0, 3000.0, 1000.0, 5000.0,
        1000.0,
    ];
    limiter.process(&first, 6);

    // Fitted up to the peak, scaled to the crossing, then scaled by the
    // new global peak for the rest of the block.
    let second = [
        15000.0, 1000.0, 25000.0, 1000.0, 32000.0, 1000.0, 0.0, 1000.0, -15000.0, 1000.0,
        -40000.0, 1000.0,
    ];
    assert_eq!(
        limiter.process(&second, 6),
        &[12287, 1000, 20478, 1000, 26212, 1000, 0, 1000, -12287, 1000, -32765, 1000]
    );

    let third = [
        -25000.0, 1000.0, -15000.0, 1000.0, -10000.0, 1000.0, -5000.0, 1000.0, 0.0, 1000.0,
        3000.0, 1000.0,
    ];
    assert_eq!(
        limiter.process(&third, 6),
        &[-20524, 1000, -12314, 1000, -8209, 1000, -4104, 1000, 0, 1000, 2462, 1000]
    );
}

#[test]
fn fit_starts_from_the_previous_tail() {
    let mut limiter = SoftLimiter::new("test", 64);
    limiter.process(&[22000.0, -22000.0], 1);
    assert_eq!(limiter.tail_frame(), AudioFrame::new(22000.0, -22000.0));

    let input = [22000.0, -22000.0, 60000.0, -60000.0, 30000.0, -30000.0];
    let out = limiter.process(&input, 3);
    assert_eq!(&out[..2], &[22000, -22000]);
    assert_eq!(&out[2..4], &[32766, -32766]);
}

fn settle(first: [f32; 2], steady: [f32; 2], blocks: usize) -> Vec<i16> {
    let mut limiter = SoftLimiter::new("test", 64);
    let mut input = first;
    let mut out = vec![0i16; 2];
    for _ in 0..blocks {
        limiter.process_into(&input, 1, &mut out);
        input = steady;
    }
    out
}

#[test]
fn small_overage_recovers_within_a_few_blocks() {
    assert_eq!(settle([-32800.0, 32800.0], [-32767.0, 32767.0], 2), vec![-32766, 32766]);
    assert_eq!(settle([-32800.0, 32800.0], [-32767.0, 32768.0], 10), vec![-32766, 32766]);
}

#[test]
fn large_overage_takes_hundreds_of_blocks() {
    assert_eq!(settle([-60000.0, 80000.0], [-32767.0, 32768.0], 600), vec![-32766, 32766]);
}

#[test]
fn one_release_step_after_a_large_overage() {
    let mut limiter = SoftLimiter::new("test", 64);
    let first = limiter.process(&[-60000.0, 80000.0], 1).to_vec();
    let again = [first[0] as f32, first[1] as f32];
    assert_eq!(limiter.process(&again, 1), &[-17920, 13434]);
}

#[test]
fn prescale_applies_per_channel() {
    let prescale = SharedPrescale::new(AudioFrame::new(0.5, 1.0), 1.0);
    let mut limiter = SoftLimiter::with_prescale("music", 64, prescale.clone());
    let input = interleave(&[1000.0, -1000.0], &[1000.0, -1000.0]);
    let out = limiter.process(&input, 2).to_vec();
    assert_eq!(out, vec![500, 1000, -500, -1000]);

    // A mixer thread adjusts the gain through its own handle.
    prescale.update_levels(AudioFrame::splat(2.0), 1.5);
    assert_eq!(limiter.prescale().load(), AudioFrame::splat(3.0));
    let out = limiter.process(&input, 2).to_vec();
    assert_eq!(out, vec![3000, 3000, -3000, -3000]);
}

#[test]
fn overload_is_bounded_without_touching_the_other_channel() {
    let mut limiter = SoftLimiter::new("test", 64);
    let left = [1000.0, 40000.0, 65534.0, 20000.0, -100.0, -3000.0];
    let right = [500.0; 6];
    let input = interleave(&left, &right);
    let mut out = vec![0i16; 12];
    limiter.process_into(&input, 6, &mut out);

    let limited = left_of(&out);
    assert!(limited.iter().all(|&v| (v as f32).abs() <= BOUNDS));
    assert!(limited[2] >= 32760);
    // Roughly half, since the peak is twice the bound.
    assert!((limited[1] - 20000).abs() < 10);
    assert!(limited[4] < 0);
    assert_eq!(right_of(&out), vec![500; 6]);
    assert_eq!(limiter.tallies(), (1, 1));
    assert_eq!(limiter.get_peaks().right, 500.0);
}

#[test]
fn remembered_peak_keeps_scaling_and_slowly_releases() {
    let mut limiter = SoftLimiter::new("test", 64);
    let spike = interleave(&[65534.0, -10.0], &[0.0, 0.0]);
    limiter.process(&spike, 2);
    let after_spike = limiter.get_peaks().left;
    assert!(after_spike < 65534.0);
    assert!(after_spike > BOUNDS);

    let quiet = interleave(&[10000.0, 10000.0], &[0.0, 0.0]);
    let out = limiter.process(&quiet, 2).to_vec();
    assert!(out[0] < 10000 && out[0] > 4900);
    assert!(limiter.get_peaks().left < after_spike);
    assert_eq!(limiter.tallies().0, 2);
}

#[test]
fn reset_clamps_peaks_and_clears_the_tail() {
    let mut limiter = SoftLimiter::new("test", 64);
    let spike = interleave(&[65534.0, 100.0], &[2000.0, 1000.0]);
    limiter.process(&spike, 2);
    limiter.reset();
    assert_eq!(limiter.get_peaks().left, BOUNDS);
    assert_eq!(limiter.get_peaks().right, 2000.0);
    assert_eq!(limiter.tail_frame(), AudioFrame::default());
}

#[test]
fn block_after_reset_ignores_the_old_tail() {
    let mut limiter = SoftLimiter::new("test", 64);
    limiter.process(&[65534.0, 65534.0], 1);
    assert_eq!(limiter.process(&[22000.0, 22000.0], 1), &[11014, 11014]);
    limiter.reset();
    assert_eq!(limiter.get_peaks(), AudioFrame::splat(BOUNDS));

    let input = [30000.0, 30000.0, 60000.0, 60000.0, 30000.0, 30000.0];
    let after_reset = limiter.process(&input, 3).to_vec();
    let mut fresh = SoftLimiter::new("fresh", 64);
    assert_eq!(after_reset, fresh.process(&input, 3));
    assert_eq!(after_reset, vec![16383, 16383, 32766, 32766, 16383, 16383]);
}

#[test]
fn stats_need_enough_non_silent_audio() {
    let mut limiter = SoftLimiter::new("quiet", 64);
    let input = interleave(&[1000.0; 8], &[-1000.0; 8]);
    for _ in 0..7 {
        limiter.process(&input, 8);
    }
    assert!(limiter.stats().is_none());
    limiter.process(&input, 8);

    let stats = limiter.stats().expect("16 channel-blocks");
    assert!((stats.peak_ratio - 1000.0 / BOUNDS).abs() < 1e-6);
    let louder = stats.louder_suggestion.expect("far below full scale");
    assert!((louder - 100.0 * BOUNDS / 1000.0).abs() < 0.5);
    assert_eq!(stats.limited_ratio, 0.0);
    assert!(stats.quieter_suggestion.is_none());

    let mut silent = SoftLimiter::new("silent", 64);
    let zeros = vec![0.0f32; 16];
    for _ in 0..20 {
        silent.process(&zeros, 8);
    }
    assert!(silent.stats().is_none());
}

#[test]
fn heavy_limiting_suggests_a_lower_level() {
    let mut limiter = SoftLimiter::new("loud", 64);
    let input = interleave(&[60000.0, -60000.0, 60000.0, -60000.0], &[60000.0, -60000.0, 60000.0, -60000.0]);
    for _ in 0..10 {
        limiter.process(&input, 4);
    }
    let stats = limiter.stats().expect("enough audio");
    assert_eq!(stats.peak_ratio, 1.0);
    assert!(stats.louder_suggestion.is_none());
    assert!(stats.limited_ratio > 0.9);
    let quieter = stats.quieter_suggestion.expect("mostly limited");
    assert!(quieter < 10.0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "need some quantity of frames")]
fn empty_blocks_are_a_contract_violation() {
    let mut limiter = SoftLimiter::new("test", 64);
    limiter.process(&[], 0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn blocks_beyond_max_frames_are_a_contract_violation() {
    let mut limiter = SoftLimiter::new("test", 4);
    let input = vec![0.0f32; 16];
    limiter.process(&input, 8);
}
