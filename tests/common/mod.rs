#![allow(dead_code)]

//! Synthetic MT-32 1.07 ROM images and helpers shared by the integration tests.

use dosmix::synth::sysex::data_set_message;
use dosmix::synth::{ReportHandler, Synth, SynthProperties};
use std::sync::{Arc, Mutex};

pub const CONTROL_ROM_SIZE: usize = 64 * 1024;
pub const PCM_ROM_BYTES: usize = 256 * 1024 * 2;

// Table locations of the 1.07 revision.
const ID_POS: usize = 0x4010;
const ID: &[u8] = b"\0 ver1.07 10 Oct, 87 \0";
const PCM_TABLE: usize = 0x3000;
const TIMBRE_A_MAP: usize = 0x8000;
const TIMBRE_B_MAP: usize = 0xC000;
const TIMBRE_B_OFFSET: usize = 0x4000;
const TIMBRE_R_MAP: usize = 0x3200;
const TIMBRE_R_COUNT: usize = 30;
const RHYTHM_SETTINGS: usize = 0x73FE;
const RESERVE_SETTINGS: usize = 0x57B1;
const PAN_SETTINGS: usize = 0x57CC;
const PROGRAM_SETTINGS: usize = 0x57BA;
const RHYTHM_MAX: usize = 0x523C;
const PATCH_MAX: usize = 0x5248;
const SYSTEM_MAX: usize = 0x5258;
const TIMBRE_MAX: usize = 0x51F4;

/// Where the melodic test timbre and the compressed drum timbre live.
const MELODIC_TIMBRE: usize = 0x6000;
const DRUM_TIMBRE: usize = 0x6200;

pub const TIMBRE_NAME: &[u8; 10] = b"TestSquare";
pub const RESERVE: [u8; 9] = [3, 10, 6, 4, 3, 0, 0, 0, 6];

/// A 246 byte timbre with one square-wave partial that sustains at full
/// level and releases over a few hundred samples.
pub fn melodic_timbre() -> Vec<u8> {
    let mut timbre = vec![0u8; 246];
    timbre[..10].copy_from_slice(TIMBRE_NAME);
    timbre[10] = 0; // both pairs synth
    timbre[11] = 0;
    timbre[12] = 0b0001; // only partial 1 plays
    timbre[13] = 0; // sustain
    for t in 0..4 {
        let p = 14 + t * 58;
        timbre[p] = 36; // coarse pitch: unison
        timbre[p + 1] = 50; // fine pitch: centre
        timbre[p + 2] = 11; // keyfollow 1.0
        timbre[p + 3] = 1; // bender on
        timbre[p + 4] = 0; // square
        timbre[p + 6] = 0; // pulse width
        timbre[p + 20] = 50; // lfo rate
        timbre[p + 41] = 100; // TVA level
        timbre[p + 42] = 0; // velocity insensitive
        timbre[p + 49..p + 54].copy_from_slice(&[0, 0, 0, 0, 30]);
        timbre[p + 54..p + 58].copy_from_slice(&[100, 100, 100, 100]);
    }
    timbre
}

/// Builds a control ROM the synth identifies as an MT-32 1.07.
pub fn control_rom() -> Vec<u8> {
    let mut rom = vec![0u8; CONTROL_ROM_SIZE];
    rom[ID_POS..ID_POS + ID.len()].copy_from_slice(ID);

    // 128 PCM waves, all one looped 2 KiB block at the start of the PCM ROM.
    for i in 0..128 {
        let at = PCM_TABLE + i * 4;
        rom[at..at + 4].copy_from_slice(&[0, 0x80, 0x00, 0x80]);
    }

    let timbre = melodic_timbre();
    rom[MELODIC_TIMBRE..MELODIC_TIMBRE + 246].copy_from_slice(&timbre);
    for i in 0..64 {
        let a = (MELODIC_TIMBRE as u16).to_le_bytes();
        rom[TIMBRE_A_MAP + i * 2..TIMBRE_A_MAP + i * 2 + 2].copy_from_slice(&a);
        let b = ((MELODIC_TIMBRE - TIMBRE_B_OFFSET) as u16).to_le_bytes();
        rom[TIMBRE_B_MAP + i * 2..TIMBRE_B_MAP + i * 2 + 2].copy_from_slice(&b);
    }

    // Compressed drum: common block plus the single unmuted partial.
    rom[DRUM_TIMBRE..DRUM_TIMBRE + 72].copy_from_slice(&timbre[..72]);
    rom[DRUM_TIMBRE] = b'D';
    for i in 0..TIMBRE_R_COUNT {
        let r = (DRUM_TIMBRE as u16).to_le_bytes();
        rom[TIMBRE_R_MAP + i * 2..TIMBRE_R_MAP + i * 2 + 2].copy_from_slice(&r);
    }

    // Every rhythm key plays drum timbre 64 (the first rhythm bank timbre).
    for key in 0..85 {
        let at = RHYTHM_SETTINGS + key * 4;
        rom[at..at + 4].copy_from_slice(&[64, 100, 7, 1]);
    }

    rom[RESERVE_SETTINGS..RESERVE_SETTINGS + 9].copy_from_slice(&RESERVE);
    rom[PAN_SETTINGS..PAN_SETTINGS + 9].fill(7);
    for i in 0..8 {
        rom[PROGRAM_SETTINGS + i] = i as u8;
    }

    rom[RHYTHM_MAX..RHYTHM_MAX + 4].copy_from_slice(&[127, 100, 14, 1]);
    let patch_max = [3, 63, 48, 100, 24, 3, 1, 0, 100, 14, 0, 0, 0, 0, 0, 0];
    rom[PATCH_MAX..PATCH_MAX + 16].copy_from_slice(&patch_max);
    let mut system_max = vec![127, 3, 7, 7];
    system_max.extend_from_slice(&[32; 9]);
    system_max.extend_from_slice(&[16; 9]);
    system_max.push(100);
    rom[SYSTEM_MAX..SYSTEM_MAX + 23].copy_from_slice(&system_max);
    rom[TIMBRE_MAX..TIMBRE_MAX + 10].fill(127);
    rom[TIMBRE_MAX + 10..TIMBRE_MAX + 14].copy_from_slice(&[12, 12, 15, 1]);
    rom[TIMBRE_MAX + 14..TIMBRE_MAX + 72].fill(127);
    rom
}

/// A silent PCM ROM of the size a 128-wave control ROM expects.
pub fn pcm_rom() -> Vec<u8> {
    vec![0u8; PCM_ROM_BYTES]
}

pub fn open_synth() -> Synth {
    open_synth_with(SynthProperties::default())
}

pub fn open_synth_with(props: SynthProperties) -> Synth {
    let mut synth = Synth::new(props);
    synth
        .open(&control_rom(), &pcm_rom())
        .expect("synthetic ROMs should open");
    synth
}

/// Packs a channel message the way MIDI drivers hand it over.
pub fn short_msg(status: u8, data1: u8, data2: u8) -> u32 {
    status as u32 | (data1 as u32) << 8 | (data2 as u32) << 16
}

/// MIDI channel 2 drives part 1 with the power-on channel assignment.
pub const PART1_CHANNEL: u8 = 1;
/// MIDI channel 10 drives the rhythm part.
pub const RHYTHM_CHANNEL: u8 = 9;

pub fn note_on(channel: u8, key: u8, velocity: u8) -> u32 {
    short_msg(0x90 | channel, key, velocity)
}

pub fn note_off(channel: u8, key: u8) -> u32 {
    short_msg(0x80 | channel, key, 0)
}

pub fn control_change(channel: u8, controller: u8, value: u8) -> u32 {
    short_msg(0xB0 | channel, controller, value)
}

/// Framed DT1 to the unit-wide device ID.
pub fn dt1(sysex_addr: u32, data: &[u8]) -> Vec<u8> {
    data_set_message(0x10, sysex_addr, data)
}

/// Renders `frames` stereo frames.
pub fn render(synth: &mut Synth, frames: usize) -> Vec<i16> {
    let mut out = vec![0i16; frames * 2];
    synth.render(&mut out);
    out
}

pub fn peak(samples: &[i16]) -> i32 {
    samples.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0)
}

/// Everything a [`RecordingHandler`] was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Lcd(String),
    DeviceReset,
    ReverbMode(u8),
    ReverbTime(u8),
    ReverbLevel(u8),
    SysexResponse(Vec<u8>),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    pub reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingHandler {
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock().unwrap())
    }

    fn push(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}

impl ReportHandler for RecordingHandler {
    fn show_lcd_message(&mut self, message: &str) {
        self.push(Report::Lcd(message.to_string()));
    }

    fn on_device_reset(&mut self) {
        self.push(Report::DeviceReset);
    }

    fn on_new_reverb_mode(&mut self, mode: u8) {
        self.push(Report::ReverbMode(mode));
    }

    fn on_new_reverb_time(&mut self, time: u8) {
        self.push(Report::ReverbTime(time));
    }

    fn on_new_reverb_level(&mut self, level: u8) {
        self.push(Report::ReverbLevel(level));
    }

    fn on_sysex_response(&mut self, message: &[u8]) {
        self.push(Report::SysexResponse(message.to_vec()));
    }
}

/// An open synth whose reports land in the returned handler.
pub fn open_recording_synth() -> (Synth, RecordingHandler) {
    let handler = RecordingHandler::default();
    let mut synth = Synth::with_report_handler(SynthProperties::default(), Box::new(handler.clone()));
    synth
        .open(&control_rom(), &pcm_rom())
        .expect("synthetic ROMs should open");
    (synth, handler)
}
