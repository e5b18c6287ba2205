mod common;

use common::*;
use dosmix::error::OpenError;
use dosmix::synth::{DacInputMode, Streams, Synth, SynthProperties, MAX_PRERENDER_SAMPLES};

fn stream_buffers(frames: usize) -> [Vec<f32>; 6] {
    std::array::from_fn(|_| vec![0.0; frames])
}

fn buffer_peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()))
}

#[test]
fn closed_synth_ignores_messages() {
    let mut synth = Synth::new(SynthProperties::default());
    assert!(!synth.is_open());
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    assert!(!synth.is_enabled());
    assert_eq!(peak(&render(&mut synth, 64)), 0);
}

#[test]
fn opening_twice_fails_and_keeps_the_synth_open() {
    let mut synth = open_synth();
    let err = synth.open(&control_rom(), &pcm_rom()).unwrap_err();
    assert!(matches!(err, OpenError::AlreadyOpen));
    assert!(synth.is_open());
}

#[test]
fn stays_silent_until_the_first_message() {
    let mut synth = open_synth();
    assert!(synth.is_open());
    assert!(!synth.is_enabled());
    assert_eq!(peak(&render(&mut synth, 512)), 0);

    let mut floats = vec![1.0f32; 64];
    synth.render_float(&mut floats);
    assert!(floats.iter().all(|&v| v == 0.0));
}

#[test]
fn unmapped_channel_enables_without_sound() {
    let mut synth = open_synth();
    synth.play_msg(note_on(0, 60, 100));
    assert!(synth.is_enabled());
    assert_eq!(synth.partial_manager().active_count(), 0);
    assert_eq!(peak(&render(&mut synth, 512)), 0);
}

#[test]
fn note_on_sounds_and_note_off_releases() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    assert_eq!(synth.partial_manager().active_count(), 1);
    assert!(peak(&render(&mut synth, 1024)) > 1000);

    synth.play_msg(note_off(PART1_CHANNEL, 60));
    render(&mut synth, 4096);
    assert!(!synth.has_active_partials());
    assert!(synth.part(0).is_some_and(|p| p.polys().is_empty()));
}

#[test]
fn velocity_zero_note_on_is_a_note_off() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 64, 100));
    synth.play_msg(note_on(PART1_CHANNEL, 64, 0));
    render(&mut synth, 4096);
    assert_eq!(synth.partial_manager().active_count(), 0);
}

#[test]
fn hold_pedal_defers_release() {
    let mut synth = open_synth();
    synth.play_msg(control_change(PART1_CHANNEL, 0x40, 127));
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    synth.play_msg(note_off(PART1_CHANNEL, 60));
    render(&mut synth, 4096);
    assert_eq!(synth.partial_manager().active_count(), 1);

    synth.play_msg(control_change(PART1_CHANNEL, 0x40, 0));
    render(&mut synth, 4096);
    assert_eq!(synth.partial_manager().active_count(), 0);
}

#[test]
fn all_notes_off_releases_every_key() {
    let mut synth = open_synth();
    for key in [60, 64, 67] {
        synth.play_msg(note_on(PART1_CHANNEL, key, 100));
    }
    assert_eq!(synth.partial_manager().active_count(), 3);
    synth.play_msg(control_change(PART1_CHANNEL, 0x7B, 0));
    render(&mut synth, 4096);
    assert_eq!(synth.partial_manager().active_count(), 0);
}

#[test]
fn controllers_update_part_state() {
    let mut synth = open_synth();
    synth.play_msg(control_change(PART1_CHANNEL, 0x07, 127));
    synth.play_msg(control_change(PART1_CHANNEL, 0x0A, 127));
    synth.play_msg(control_change(PART1_CHANNEL, 0x01, 90));
    synth.play_msg(control_change(PART1_CHANNEL, 0x0B, 127));
    assert_eq!(synth.mem().patch_temp(0)[8], 100);
    assert_eq!(synth.mem().patch_temp(0)[9], 14);
    let part = synth.part(0).expect("part 1");
    assert_eq!(part.modulation(), 90);
    assert_eq!(part.expression(), 100);

    // RPN 0 sets the bender range through data entry.
    synth.play_msg(control_change(PART1_CHANNEL, 0x65, 0));
    synth.play_msg(control_change(PART1_CHANNEL, 0x64, 0));
    synth.play_msg(control_change(PART1_CHANNEL, 0x06, 2));
    assert_eq!(synth.mem().patch_temp(0)[4], 2);

    // NRPN data entry is ignored.
    synth.play_msg(control_change(PART1_CHANNEL, 0x63, 1));
    synth.play_msg(control_change(PART1_CHANNEL, 0x06, 7));
    assert_eq!(synth.mem().patch_temp(0)[4], 2);

    synth.play_msg(control_change(PART1_CHANNEL, 0x79, 0));
    let part = synth.part(0).expect("part 1");
    assert_eq!(part.modulation(), 0);
    assert_eq!(part.bend(), 0);
}

#[test]
fn pitch_bend_scales_with_bender_range() {
    let mut synth = open_synth();
    // Full upward bend with the default range of 12 semitones.
    synth.play_msg(short_msg(0xE0 | PART1_CHANNEL, 0x7F, 0x7F));
    let up = synth.part(0).map(|p| p.bend()).unwrap_or_default();
    assert_eq!(up, ((16383 - 8192) * (12 * 683)) >> 14);
    synth.play_msg(short_msg(0xE0 | PART1_CHANNEL, 0x00, 0x40));
    assert_eq!(synth.part(0).map(|p| p.bend()), Some(0));
}

#[test]
fn rhythm_channel_plays_drum_timbres() {
    let mut synth = open_synth();
    synth.play_msg(note_on(RHYTHM_CHANNEL, 36, 100));
    assert_eq!(synth.partial_manager().part_usage()[8], 1);
    // Keys outside the drum map are ignored.
    synth.play_msg(note_on(RHYTHM_CHANNEL, 20, 100));
    assert_eq!(synth.partial_manager().active_count(), 1);
}

#[test]
fn partial_limit_caps_polyphony() {
    let props = SynthProperties {
        partial_limit: 4,
        ..SynthProperties::default()
    };
    let mut synth = open_synth_with(props);
    assert_eq!(synth.partial_limit(), 4);
    for key in 60..68 {
        synth.play_msg(note_on(PART1_CHANNEL, key, 100));
    }
    assert_eq!(synth.partial_manager().active_count(), 4);
    // The newest notes survive.
    let mut keys: Vec<u8> = synth
        .part(0)
        .map(|p| p.polys().iter().map(|poly| poly.key).collect())
        .unwrap_or_default();
    keys.sort_unstable();
    assert_eq!(keys, vec![64, 65, 66, 67]);
}

#[test]
fn partial_usage_line_counts_per_part() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    synth.play_msg(note_on(PART1_CHANNEL, 62, 100));
    synth.play_msg(note_on(RHYTHM_CHANNEL, 40, 100));
    assert_eq!(
        synth.partial_usage_line(),
        "Partial Usage: 1:02 2:00 3:00 4:00 5:00 6:00 7:00 8:00 R: 01  TOTAL: 03"
    );
}

#[test]
fn each_message_prerenders_one_frame() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    assert_eq!(synth.prerender_len(), 1);
    synth.play_msg(note_on(PART1_CHANNEL, 64, 100));
    assert_eq!(synth.prerender_len(), 2);

    let mut pushed = synth.prerender_len();
    while synth.prerender() {
        pushed += 1;
    }
    assert_eq!(pushed, MAX_PRERENDER_SAMPLES - 1);
    // A full ring still takes messages; only the extra frame is skipped.
    synth.play_msg(note_off(PART1_CHANNEL, 60));
    assert_eq!(synth.prerender_len(), MAX_PRERENDER_SAMPLES - 1);

    render(&mut synth, 2048);
    assert_eq!(synth.prerender_len(), 0);
}

#[test]
fn prerendered_frames_come_out_first() {
    let mut straight = open_synth();
    let mut ahead = open_synth();
    straight.play_msg(note_on(PART1_CHANNEL, 60, 100));
    ahead.play_msg(note_on(PART1_CHANNEL, 60, 100));
    for _ in 0..100 {
        ahead.prerender();
    }
    assert_eq!(render(&mut straight, 600), render(&mut ahead, 600));
}

#[test]
fn chunked_and_whole_renders_match() {
    let mut whole = open_synth();
    let mut chunked = open_synth();
    whole.play_msg(note_on(PART1_CHANNEL, 48, 100));
    chunked.play_msg(note_on(PART1_CHANNEL, 48, 100));

    let a = render(&mut whole, 10_000);
    let mut b = render(&mut chunked, 3_000);
    b.extend(render(&mut chunked, 7_000));
    assert_eq!(a, b);
}

#[test]
fn float_render_is_the_unclipped_stream_sum() {
    let mut clipped = open_synth();
    let mut floating = open_synth();
    clipped.play_msg(note_on(PART1_CHANNEL, 60, 127));
    floating.play_msg(note_on(PART1_CHANNEL, 60, 127));

    let ints = render(&mut clipped, 2048);
    let mut floats = vec![0.0f32; 2048 * 2];
    floating.render_float(&mut floats);
    for (i, f) in ints.iter().zip(&floats) {
        assert_eq!(*i as f32, f.clamp(i16::MIN as f32, i16::MAX as f32));
    }
}

#[test]
fn reverb_switch_routes_partials() {
    let frames = 1024;
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    let mut buffers = stream_buffers(frames);
    {
        let mut streams = Streams::from_buffers(&mut buffers, frames);
        synth.render_streams(&mut streams, frames);
    }
    // Patches default to reverb on.
    assert_eq!(buffer_peak(&buffers[0]), 0.0);
    assert!(buffer_peak(&buffers[2]) > 0.0);

    synth.set_reverb_enabled(false);
    assert!(!synth.is_reverb_enabled());
    let mut buffers = stream_buffers(frames);
    {
        let mut streams = Streams::from_buffers(&mut buffers, frames);
        synth.render_streams(&mut streams, frames);
    }
    assert!(buffer_peak(&buffers[0]) > 0.0);
    for stream in &buffers[2..] {
        assert_eq!(buffer_peak(stream), 0.0);
    }
}

#[test]
fn absent_streams_are_skipped() {
    let frames = 256;
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    let mut dry = vec![0.0f32; frames];
    let mut streams = Streams {
        reverb_dry_left: Some(&mut dry),
        ..Streams::default()
    };
    synth.render_streams(&mut streams, frames);
    assert!(buffer_peak(&dry) > 0.0);
}

#[test]
fn reverb_tail_keeps_the_synth_active() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    render(&mut synth, 2048);
    synth.play_msg(note_off(PART1_CHANNEL, 60));
    render(&mut synth, 4096);
    assert!(!synth.has_active_partials());
    assert!(synth.is_active());

    synth.set_reverb_enabled(false);
    assert!(!synth.is_active());
}

#[test]
fn pure_dac_halves_the_level() {
    let mut nice = open_synth();
    let mut pure = open_synth();
    pure.set_dac_input_mode(DacInputMode::Pure);
    for synth in [&mut nice, &mut pure] {
        synth.set_reverb_enabled(false);
        synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    }
    let loud = peak(&render(&mut nice, 512));
    let quiet = peak(&render(&mut pure, 512));
    assert!(quiet > 0);
    assert!((loud - 2 * quiet).abs() <= 2, "nice {} pure {}", loud, quiet);
}

#[test]
fn reset_silences_and_disables() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    synth.play_msg(control_change(PART1_CHANNEL, 0x07, 10));
    synth.reset();
    assert!(!synth.is_enabled());
    assert_eq!(synth.partial_manager().active_count(), 0);
    assert_eq!(synth.mem().patch_temp(0)[8], 80);
}

#[test]
fn close_releases_everything() {
    let mut synth = open_synth();
    synth.play_msg(note_on(PART1_CHANNEL, 60, 100));
    synth.close();
    assert!(!synth.is_open());
    assert!(!synth.is_enabled());
    assert!(!synth.has_active_partials());
    assert_eq!(peak(&render(&mut synth, 64)), 0);
    // A closed synth can be opened again.
    synth.open(&control_rom(), &pcm_rom()).expect("reopen");
    assert!(synth.is_open());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "render needs whole stereo frames")]
fn odd_length_render_is_a_contract_violation() {
    let mut synth = open_synth();
    let mut out = vec![0i16; 7];
    synth.render(&mut out);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "render_float needs whole stereo frames")]
fn odd_length_float_render_is_a_contract_violation() {
    let mut synth = open_synth();
    let mut out = vec![0.0f32; 7];
    synth.render_float(&mut out);
}
