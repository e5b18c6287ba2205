use dosmix::synth::DacInputMode;

#[test]
fn nice_clips_at_full_scale() {
    assert_eq!(DacInputMode::Nice.convert(4.0, 1.0), i16::MAX as f32);
    assert_eq!(DacInputMode::Nice.convert(-4.0, 1.0), i16::MIN as f32);
    assert_eq!(DacInputMode::Nice.convert(0.5, 1.0), 8192.0);
}

#[test]
fn pure_ignores_gain() {
    assert_eq!(DacInputMode::Pure.convert(0.5, 2.0), 4096.0);
    assert_eq!(DacInputMode::Pure.convert_reverb(0.5, 2.0), 4096.0);
}

#[test]
fn generation_modes_shuffle_bits() {
    // 0.5 * 8192 = 0x1000, shifted to 0x2000
    assert_eq!(DacInputMode::Gen1.convert(0.5, 1.0), 8192.0);
    assert_eq!(DacInputMode::Gen1.convert(1.5, 1.0), 0x6000 as f32);
    assert_eq!(DacInputMode::Gen2.convert(1.5, 1.0), 0x6000 as f32);
    // 2.5 * 8192 = 0x5000 sets bit 14, which gen2 feeds back into bit 0
    assert_eq!(DacInputMode::Gen1.convert(2.5, 1.0), 0x2000 as f32);
    assert_eq!(DacInputMode::Gen2.convert(2.5, 1.0), 0x2001 as f32);
}
