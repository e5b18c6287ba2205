use super::dac::DacInputMode;
use super::memory::{
    patch, system, MaxTables, MemParams, MemoryMap, RegionKind, MEMORY_TIMBRE_BASE, PADDED_TIMBRE_SIZE,
    PARTIAL_PARAM_SIZE, PART_COUNT, PATCH_PARAM_SIZE, PATCH_TEMP_SIZE, RHYTHM_PART, RHYTHM_TEMP_SIZE,
    RHYTHM_TIMBRE_BASE, SYSTEM_SIZE, TIMBRE_COMMON_SIZE, TIMBRE_PARAM_SIZE,
};
use super::part::Part;
use super::partial::{PartMix, PartialManager, PartialOutput, MAX_PARTIALS};
use super::prerender::{PrerenderRing, Streams, STREAM_COUNT};
use super::reverb::{new_model, ReverbMode, ReverbModel};
use super::rom::{
    decode_pcm_rom, find_rom, pcm_wave_list, ControlRom, PcmWave, CONTROL_ROM_NAMES, CONTROL_ROM_SIZE,
    PCM_ROM_NAMES,
};
use super::timbre::VoiceContext;
use crate::error::{OpenError, Result};
use log::{debug, info};
use std::path::Path;

/// Largest block synthesised in one pass; longer renders are chunked.
pub const MAX_SAMPLES_PER_RUN: usize = 4096;
pub const DEFAULT_SAMPLE_RATE: u32 = 32000;
pub const DEFAULT_OUTPUT_GAIN: f32 = 1.0;
pub const DEFAULT_REVERB_OUTPUT_GAIN: f32 = 0.68;

/// Construction-time settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthProperties {
    pub sample_rate: u32,
    pub partial_limit: usize,
}

impl Default for SynthProperties {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            partial_limit: MAX_PARTIALS,
        }
    }
}

/// Notifications from the synth to its host. Every method has a logging
/// default, so hosts override only what they display.
pub trait ReportHandler: Send {
    fn show_lcd_message(&mut self, message: &str) {
        info!("MT32: LCD-Message: {}", message);
    }

    fn on_device_reset(&mut self) {
        debug!("MT32: device reset");
    }

    fn on_device_reconfig(&mut self) {}

    fn on_new_reverb_mode(&mut self, mode: u8) {
        debug!("MT32: reverb mode {}", mode);
    }

    fn on_new_reverb_time(&mut self, time: u8) {
        debug!("MT32: reverb time {}", time);
    }

    fn on_new_reverb_level(&mut self, level: u8) {
        debug!("MT32: reverb level {}", level);
    }

    /// Data-set reply to a sysex data request, framed and checksummed.
    fn on_sysex_response(&mut self, message: &[u8]) {
        debug!("MT32: sysex response of {} bytes", message.len());
    }
}

/// Report handler that only logs.
#[derive(Debug, Default)]
pub struct LogReportHandler;

impl ReportHandler for LogReportHandler {}

/// Scratch mix buffers for one render pass.
#[derive(Debug, Clone)]
pub(super) struct MixBuffers {
    pub dry_left: Vec<f32>,
    pub dry_right: Vec<f32>,
    pub reverb_left: Vec<f32>,
    pub reverb_right: Vec<f32>,
    pub wet_left: Vec<f32>,
    pub wet_right: Vec<f32>,
}

impl MixBuffers {
    fn new(len: usize) -> Self {
        Self {
            dry_left: vec![0.0; len],
            dry_right: vec![0.0; len],
            reverb_left: vec![0.0; len],
            reverb_right: vec![0.0; len],
            wet_left: vec![0.0; len],
            wet_right: vec![0.0; len],
        }
    }

    fn clear(&mut self, len: usize) {
        for buffer in [
            &mut self.dry_left,
            &mut self.dry_right,
            &mut self.reverb_left,
            &mut self.reverb_right,
            &mut self.wet_left,
            &mut self.wet_right,
        ] {
            buffer[..len].fill(0.0);
        }
    }
}

#[inline]
fn clip16(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Writes converted `input` into an optional stream.
fn maybe_convert(stream: &mut Option<&mut [f32]>, convert: impl Fn(&[f32], &mut [f32]), input: &[f32]) {
    if let Some(stream) = stream.as_deref_mut() {
        convert(input, stream);
    }
}

fn maybe_clear(stream: &mut Option<&mut [f32]>) {
    if let Some(stream) = stream.as_deref_mut() {
        stream.fill(0.0);
    }
}

/// MT-32 compatible synthesiser.
///
/// Closed until [`Synth::open`] succeeds. While open it stays disabled,
/// rendering silence without synthesis, until the first MIDI message.
pub struct Synth {
    pub(super) props: SynthProperties,
    pub(super) report: Box<dyn ReportHandler>,
    pub(super) open: bool,
    pub(super) enabled: bool,
    pub(super) control_rom: Option<ControlRom>,
    pub(super) pcm: Vec<i16>,
    pub(super) waves: Vec<PcmWave>,
    pub(super) program_settings: [u8; 8],
    pub(super) mem: MemParams,
    pub(super) default_mem: MemParams,
    pub(super) memory_map: Option<MemoryMap>,
    pub(super) parts: Vec<Part>,
    pub(super) partial_manager: PartialManager,
    pub(super) chantable: [Option<usize>; 16],
    pub(super) reverb_models: Vec<Box<dyn ReverbModel>>,
    pub(super) current_reverb: Option<ReverbMode>,
    pub(super) reverb_enabled: bool,
    pub(super) reverb_overridden: bool,
    pub(super) dac_mode: DacInputMode,
    pub(super) output_gain: f32,
    pub(super) reverb_output_gain: f32,
    pub(super) master_tune: f32,
    pub(super) prerender: PrerenderRing,
    pub(super) mix: MixBuffers,
    pub(super) render_buffers: [Vec<f32>; STREAM_COUNT],
    pub(super) prerender_buffers: [Vec<f32>; STREAM_COUNT],
}

impl Synth {
    pub fn new(props: SynthProperties) -> Self {
        Self::with_report_handler(props, Box::new(LogReportHandler))
    }

    pub fn with_report_handler(props: SynthProperties, report: Box<dyn ReportHandler>) -> Self {
        let partial_limit = props.partial_limit.clamp(1, MAX_PARTIALS);
        Self {
            props: SynthProperties {
                partial_limit,
                ..props
            },
            report,
            open: false,
            enabled: false,
            control_rom: None,
            pcm: Vec::new(),
            waves: Vec::new(),
            program_settings: [0; 8],
            mem: MemParams::new(),
            default_mem: MemParams::new(),
            memory_map: None,
            parts: Vec::new(),
            partial_manager: PartialManager::new(partial_limit),
            chantable: [None; 16],
            reverb_models: ReverbMode::ALL.iter().map(|&mode| new_model(mode)).collect(),
            current_reverb: None,
            reverb_enabled: true,
            reverb_overridden: false,
            dac_mode: DacInputMode::Nice,
            output_gain: DEFAULT_OUTPUT_GAIN,
            reverb_output_gain: DEFAULT_REVERB_OUTPUT_GAIN,
            master_tune: 0.0,
            prerender: PrerenderRing::new(),
            mix: MixBuffers::new(MAX_SAMPLES_PER_RUN),
            render_buffers: Default::default(),
            prerender_buffers: Default::default(),
        }
    }

    // --- Lifecycle ---

    /// Opens from in-memory ROM images. On failure the synth stays closed.
    pub fn open(&mut self, control_rom: &[u8], pcm_rom: &[u8]) -> Result<()> {
        if self.open {
            return Err(OpenError::AlreadyOpen);
        }
        let rom = ControlRom::from_bytes(control_rom)?;
        let map = rom.map();
        let pcm = decode_pcm_rom(pcm_rom, rom.pcm_rom_samples())?;
        let waves = pcm_wave_list(&rom)?;
        let memory_map = MemoryMap::new(max_tables(&rom)?);

        let mut mem = MemParams::new();
        init_timbres(&rom, &memory_map, &mut mem, map.timbre_a_map, map.timbre_a_offset, 64, 0, map.timbre_a_compressed)?;
        init_timbres(&rom, &memory_map, &mut mem, map.timbre_b_map, map.timbre_b_offset, 64, 64, map.timbre_b_compressed)?;
        init_timbres(&rom, &memory_map, &mut mem, map.timbre_r_map, 0, map.timbre_r_count, RHYTHM_TIMBRE_BASE, true)?;
        let m_bank = MEMORY_TIMBRE_BASE * PADDED_TIMBRE_SIZE..RHYTHM_TIMBRE_BASE * PADDED_TIMBRE_SIZE;
        mem.timbres[m_bank].fill(0);

        let rhythm_len = map.rhythm_settings_count * RHYTHM_TEMP_SIZE;
        mem.rhythm_temp[..rhythm_len].copy_from_slice(rom.bytes_at(map.rhythm_settings, rhythm_len)?);

        for i in 0..128 {
            mem.patch_mut(i).copy_from_slice(&[(i / 64) as u8, (i % 64) as u8, 24, 50, 12, 0, 1, 0]);
        }

        mem.system[system::MASTER_TUNE] = 0x4A;
        mem.system[system::REVERB_MODE] = 0;
        mem.system[system::REVERB_TIME] = 5;
        mem.system[system::REVERB_LEVEL] = 3;
        mem.system[system::RESERVE_SETTINGS_START..=system::RESERVE_SETTINGS_END]
            .copy_from_slice(rom.bytes_at(map.reserve_settings, PART_COUNT)?);
        for i in 0..PART_COUNT {
            mem.system[system::CHAN_ASSIGN_START + i] = i as u8 + 1;
        }
        mem.system[system::MASTER_VOL] = 100;

        let pan_settings = rom.bytes_at(map.pan_settings, PART_COUNT)?.to_vec();
        self.program_settings.copy_from_slice(rom.bytes_at(map.program_settings, 8)?);

        // Nothing below can fail.
        for model in self.reverb_models.iter_mut() {
            model.open(self.props.sample_rate);
        }
        self.partial_manager = PartialManager::new(self.props.partial_limit);
        self.parts = (0..PART_COUNT).map(|i| Part::new(i, map.pcm_count)).collect();
        self.waves = waves;
        self.pcm = pcm;
        self.memory_map = Some(memory_map);
        self.mem = mem;
        self.current_reverb = None;
        self.prerender.clear();
        self.refresh_system();

        for i in 0..PART_COUNT {
            let temp = self.mem.patch_temp_mut(i);
            temp[..PATCH_PARAM_SIZE].copy_from_slice(&[0, 0, 24, 50, 12, 0, 1, 0]);
            temp[patch::OUTPUT_LEVEL] = 80;
            temp[patch::PANPOT] = pan_settings[i];
            temp[10..PATCH_TEMP_SIZE].copy_from_slice(&[0, 127, 0, 0, 0, 0]);
            if i != RHYTHM_PART {
                let program = self.program_settings[i];
                self.parts[i].set_program(&mut self.partial_manager, &mut self.mem, program);
            } else {
                self.parts[i].refresh(&self.mem);
            }
        }

        self.default_mem = self.mem.clone();
        self.control_rom = Some(rom);
        self.open = true;
        self.enabled = false;
        info!("MT32: opened {} with {} partials", map.name, self.props.partial_limit);
        Ok(())
    }

    /// Opens from ROM files in `dir`, preferring CM-32L images.
    pub fn open_from_dir(&mut self, dir: &Path) -> Result<()> {
        let control_path = find_rom(dir, &CONTROL_ROM_NAMES).ok_or_else(|| OpenError::ControlRomMissing {
            dir: dir.to_path_buf(),
            tried: CONTROL_ROM_NAMES.join(", "),
        })?;
        let pcm_path = find_rom(dir, &PCM_ROM_NAMES).ok_or_else(|| OpenError::PcmRomMissing {
            dir: dir.to_path_buf(),
            tried: PCM_ROM_NAMES.join(", "),
        })?;
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| OpenError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let control = read(&control_path)?;
        let pcm = read(&pcm_path)?;
        debug!("MT32: loading {} and {}", control_path.display(), pcm_path.display());
        self.open(&control, &pcm)
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.partial_manager.deactivate_all();
        self.parts.clear();
        self.pcm = Vec::new();
        self.waves.clear();
        self.memory_map = None;
        self.control_rom = None;
        for model in self.reverb_models.iter_mut() {
            model.close();
        }
        self.current_reverb = None;
        self.prerender.clear();
        self.open = false;
        self.enabled = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Restores the power-on state and disables rendering until the next message.
    pub fn reset(&mut self) {
        if !self.open {
            return;
        }
        self.report.on_device_reset();
        self.partial_manager.deactivate_all();
        self.mem = self.default_mem.clone();
        for i in 0..PART_COUNT {
            self.parts[i].reset(&mut self.partial_manager, &self.mem);
            if i != RHYTHM_PART {
                let program = self.program_settings[i];
                self.parts[i].set_program(&mut self.partial_manager, &mut self.mem, program);
            } else {
                self.parts[i].refresh(&self.mem);
            }
        }
        self.refresh_system();
        self.enabled = false;
    }

    // --- Accessors ---

    pub fn properties(&self) -> &SynthProperties {
        &self.props
    }

    pub fn control_rom_name(&self) -> Option<&'static str> {
        self.control_rom.as_ref().map(|rom| rom.map().name)
    }

    pub fn mem(&self) -> &MemParams {
        &self.mem
    }

    pub fn part(&self, number: usize) -> Option<&Part> {
        self.parts.get(number)
    }

    pub fn partial_manager(&self) -> &PartialManager {
        &self.partial_manager
    }

    pub fn partial_limit(&self) -> usize {
        self.partial_manager.partial_limit()
    }

    /// Part assigned to each MIDI channel.
    pub fn chantable(&self) -> &[Option<usize>; 16] {
        &self.chantable
    }

    pub fn reverb_mode(&self) -> Option<ReverbMode> {
        self.current_reverb
    }

    pub fn master_tune(&self) -> f32 {
        self.master_tune
    }

    pub fn prerender_len(&self) -> usize {
        self.prerender.len()
    }

    pub fn set_reverb_enabled(&mut self, enabled: bool) {
        self.reverb_enabled = enabled;
    }

    pub fn is_reverb_enabled(&self) -> bool {
        self.reverb_enabled
    }

    /// While overridden, system writes no longer change the reverb.
    pub fn set_reverb_overridden(&mut self, overridden: bool) {
        self.reverb_overridden = overridden;
    }

    pub fn is_reverb_overridden(&self) -> bool {
        self.reverb_overridden
    }

    pub fn set_dac_input_mode(&mut self, mode: DacInputMode) {
        self.dac_mode = mode;
    }

    pub fn dac_input_mode(&self) -> DacInputMode {
        self.dac_mode
    }

    pub fn set_output_gain(&mut self, gain: f32) {
        self.output_gain = gain;
    }

    pub fn set_reverb_output_gain(&mut self, gain: f32) {
        self.reverb_output_gain = gain;
    }

    // --- MIDI ---

    /// Plays a packed short message: status in the low byte, then data bytes.
    pub fn play_msg(&mut self, msg: u32) {
        if !self.open {
            return;
        }
        let code = ((msg & 0xF0) >> 4) as u8;
        let chan = (msg & 0x0F) as usize;
        let note = ((msg & 0xFF00) >> 8) as u8;
        let velocity = ((msg & 0xFF0000) >> 16) as u8;
        self.enabled = true;

        let Some(part) = self.chantable[chan] else {
            debug!("Play msg on unreg chan {}: code=0x{:01x}, vel={}", chan, code, velocity);
            return;
        };
        self.play_msg_on_part(part, code, note, velocity);

        // At least one sample between consecutive events.
        self.prerender();
    }

    pub fn play_msg_on_part(&mut self, part: usize, code: u8, note: u8, velocity: u8) {
        if !self.open || part >= PART_COUNT {
            return;
        }
        self.enabled = true;
        let ctx = VoiceContext {
            waves: &self.waves,
            sample_rate: self.props.sample_rate as f32,
        };
        let mgr = &mut self.partial_manager;
        let mem = &mut self.mem;
        let p = &mut self.parts[part];
        match code {
            0x8 => p.note_off(mgr, note),
            0x9 if velocity == 0 => p.note_off(mgr, note),
            0x9 => p.note_on(mgr, mem, &ctx, note, velocity),
            0xB => match note {
                0x01 => p.set_modulation(velocity),
                0x06 => p.set_data_entry_msb(mem, velocity),
                0x07 => p.set_volume(mem, velocity),
                0x0A => p.set_pan(mem, velocity),
                0x0B => p.set_expression(velocity),
                0x40 => p.set_hold_pedal(mgr, velocity >= 64),
                0x62 | 0x63 => p.set_nrpn(),
                0x64 => p.set_rpn_lsb(velocity),
                0x65 => p.set_rpn_msb(velocity),
                0x79 => p.reset_all_controllers(mgr, mem),
                0x7B => p.all_notes_off(mgr),
                0x7C..=0x7F => {
                    p.set_hold_pedal(mgr, false);
                    p.all_notes_off(mgr);
                }
                _ => debug!("Unknown MIDI Control code: 0x{:02x} - vel 0x{:02x}", note, velocity),
            },
            0xC => p.set_program(mgr, mem, note),
            0xE => p.set_bend(mem, ((velocity as u16) << 7) | note as u16),
            _ => debug!("Unknown MIDI code: 0x{:01x} - {:02x} - {:02x}", code, note, velocity),
        }
    }

    // --- Rendering ---

    /// Renders interleaved stereo, clipped to 16 bits. Silence while disabled.
    pub fn render(&mut self, stream: &mut [i16]) {
        debug_assert!(stream.len() % 2 == 0, "render needs whole stereo frames");
        if !self.enabled {
            stream.fill(0);
            return;
        }
        for chunk in stream.chunks_mut(MAX_SAMPLES_PER_RUN * 2) {
            let frames = chunk.len() / 2;
            self.render_chunk(frames, |i, left, right| {
                chunk[i * 2] = clip16(left);
                chunk[i * 2 + 1] = clip16(right);
            });
        }
    }

    /// Renders interleaved stereo as unclipped floats in 16-bit units.
    pub fn render_float(&mut self, stream: &mut [f32]) {
        debug_assert!(stream.len() % 2 == 0, "render_float needs whole stereo frames");
        if !self.enabled {
            stream.fill(0.0);
            return;
        }
        for chunk in stream.chunks_mut(MAX_SAMPLES_PER_RUN * 2) {
            let frames = chunk.len() / 2;
            self.render_chunk(frames, |i, left, right| {
                chunk[i * 2] = left;
                chunk[i * 2 + 1] = right;
            });
        }
    }

    fn render_chunk(&mut self, frames: usize, mut emit: impl FnMut(usize, f32, f32)) {
        let mut buffers = std::mem::take(&mut self.render_buffers);
        for buffer in buffers.iter_mut() {
            buffer.resize(MAX_SAMPLES_PER_RUN, 0.0);
        }
        {
            let mut streams = Streams::from_buffers(&mut buffers, frames);
            self.render_streams(&mut streams, frames);
        }
        let [nl, nr, dl, dr, wl, wr] = &buffers;
        for i in 0..frames {
            emit(i, nl[i] + dl[i] + wl[i], nr[i] + dr[i] + wr[i]);
        }
        self.render_buffers = buffers;
    }

    /// Renders `len` frames into separate streams, draining prerendered
    /// frames first.
    pub fn render_streams(&mut self, streams: &mut Streams<'_>, len: usize) {
        if !self.enabled {
            streams.window(0, len).clear();
            return;
        }
        let mut pos = self.prerender.drain_into(streams, len);
        while pos < len {
            let this_len = (len - pos).min(MAX_SAMPLES_PER_RUN);
            self.do_render_streams(&mut streams.window(pos, this_len), this_len);
            pos += this_len;
        }
    }

    /// Renders one frame into the prerender ring. Returns false, leaving
    /// the ring untouched, when it is full.
    pub fn prerender(&mut self) -> bool {
        if !self.open || self.prerender.is_full() {
            return false;
        }
        let mut buffers = std::mem::take(&mut self.prerender_buffers);
        for buffer in buffers.iter_mut() {
            buffer.resize(1, 0.0);
        }
        {
            let mut streams = Streams::from_buffers(&mut buffers, 1);
            self.do_render_streams(&mut streams, 1);
        }
        let frame = [buffers[0][0], buffers[1][0], buffers[2][0], buffers[3][0], buffers[4][0], buffers[5][0]];
        self.prerender_buffers = buffers;
        self.prerender.push(frame)
    }

    fn part_mixes(&self) -> [PartMix; PART_COUNT] {
        let master_volume = self.mem.system[system::MASTER_VOL];
        let mut mixes = [PartMix::default(); PART_COUNT];
        for (mix, part) in mixes.iter_mut().zip(&self.parts) {
            *mix = part.mix(&self.mem, master_volume);
        }
        mixes
    }

    fn do_render_streams(&mut self, streams: &mut Streams<'_>, len: usize) {
        let mixes = self.part_mixes();
        self.mix.clear(len);
        {
            let mut output = PartialOutput {
                dry_left: &mut self.mix.dry_left[..len],
                dry_right: &mut self.mix.dry_right[..len],
                reverb_left: &mut self.mix.reverb_left[..len],
                reverb_right: &mut self.mix.reverb_right[..len],
            };
            self.partial_manager.render(
                &mixes,
                self.master_tune,
                self.props.sample_rate as f32,
                &self.pcm,
                self.reverb_enabled,
                &mut output,
            );
        }

        let dac = self.dac_mode;
        let gain = self.output_gain;
        let reverb_gain = self.reverb_output_gain;
        let dry = |input: &[f32], out: &mut [f32]| dac.convert_slice(input, out, gain);
        maybe_convert(&mut streams.non_reverb_left, dry, &self.mix.dry_left[..len]);
        maybe_convert(&mut streams.non_reverb_right, dry, &self.mix.dry_right[..len]);

        let model = self
            .current_reverb
            .and_then(|mode| self.reverb_models.get_mut(mode as usize));
        match model {
            Some(model) if self.reverb_enabled => {
                maybe_convert(&mut streams.reverb_dry_left, dry, &self.mix.reverb_left[..len]);
                maybe_convert(&mut streams.reverb_dry_right, dry, &self.mix.reverb_right[..len]);
                model.process(
                    &self.mix.reverb_left[..len],
                    &self.mix.reverb_right[..len],
                    &mut self.mix.wet_left[..len],
                    &mut self.mix.wet_right[..len],
                );
                let wet = |input: &[f32], out: &mut [f32]| dac.convert_reverb_slice(input, out, reverb_gain);
                maybe_convert(&mut streams.reverb_wet_left, wet, &self.mix.wet_left[..len]);
                maybe_convert(&mut streams.reverb_wet_right, wet, &self.mix.wet_right[..len]);
            }
            _ => {
                maybe_clear(&mut streams.reverb_dry_left);
                maybe_clear(&mut streams.reverb_dry_right);
                maybe_clear(&mut streams.reverb_wet_left);
                maybe_clear(&mut streams.reverb_wet_right);
            }
        }

        for part in self.parts.iter_mut() {
            part.prune(&self.partial_manager);
        }
    }

    // --- Status ---

    /// True while prerendered frames are pending or any partial sounds.
    pub fn has_active_partials(&self) -> bool {
        !self.prerender.is_empty() || self.partial_manager.has_active_partials()
    }

    /// Like [`Synth::has_active_partials`], but also waits for the reverb tail.
    pub fn is_active(&self) -> bool {
        if self.has_active_partials() {
            return true;
        }
        if !self.reverb_enabled {
            return false;
        }
        self.current_reverb
            .and_then(|mode| self.reverb_models.get(mode as usize))
            .is_some_and(|model| model.is_active())
    }

    pub fn partial_usage_line(&self) -> String {
        let usage = self.partial_manager.part_usage();
        format!(
            "Partial Usage: 1:{:02} 2:{:02} 3:{:02} 4:{:02} 5:{:02} 6:{:02} 7:{:02} 8:{:02} R: {:02}  TOTAL: {:02}",
            usage[0],
            usage[1],
            usage[2],
            usage[3],
            usage[4],
            usage[5],
            usage[6],
            usage[7],
            usage[8],
            self.partial_manager.active_count()
        )
    }

    pub fn print_partial_usage(&self) {
        info!("{}", self.partial_usage_line());
    }
}

impl Drop for Synth {
    fn drop(&mut self) {
        self.close();
    }
}

fn max_tables(rom: &ControlRom) -> Result<MaxTables> {
    let map = rom.map();
    let timbre_src = rom.bytes_at(map.timbre_max_table, TIMBRE_COMMON_SIZE + PARTIAL_PARAM_SIZE)?;
    let mut timbre = Vec::with_capacity(PADDED_TIMBRE_SIZE);
    timbre.extend_from_slice(timbre_src);
    for _ in 0..3 {
        timbre.extend_from_slice(&timbre_src[TIMBRE_COMMON_SIZE..]);
    }
    timbre.resize(PADDED_TIMBRE_SIZE, 0);
    Ok(MaxTables {
        patch: rom.bytes_at(map.patch_max_table, PATCH_TEMP_SIZE)?.to_vec(),
        rhythm: rom.bytes_at(map.rhythm_max_table, RHYTHM_TEMP_SIZE)?.to_vec(),
        system: rom.bytes_at(map.system_max_table, SYSTEM_SIZE)?.to_vec(),
        timbre,
    })
}

#[allow(clippy::too_many_arguments)]
fn init_timbres(
    rom: &ControlRom,
    memory_map: &MemoryMap,
    mem: &mut MemParams,
    map_address: usize,
    offset: usize,
    count: usize,
    start_timbre: usize,
    compressed: bool,
) -> Result<()> {
    let region = memory_map.region(RegionKind::Timbres);
    for i in 0..count {
        let timbre = start_timbre + i;
        let address = rom.u16_entry(map_address, i) as usize;
        if !compressed && address + offset + TIMBRE_PARAM_SIZE > CONTROL_ROM_SIZE {
            return Err(OpenError::TimbreOutOfRange { timbre, addr: address });
        }
        let address = address + offset;
        if compressed {
            let src = rom.data().get(address..).unwrap_or(&[]);
            if !init_compressed_timbre(region, mem, timbre, src) {
                return Err(OpenError::TimbreOutOfRange { timbre, addr: address });
            }
        } else {
            region.write(mem, timbre, 0, rom.bytes_at(address, TIMBRE_PARAM_SIZE)?, true);
        }
    }
    Ok(())
}

/// Compressed timbres omit muted partials after the first; the previous
/// partial's data stands in for them.
fn init_compressed_timbre(
    region: &super::memory::MemoryRegion,
    mem: &mut MemParams,
    timbre: usize,
    src: &[u8],
) -> bool {
    if src.len() < TIMBRE_COMMON_SIZE {
        return false;
    }
    region.write(mem, timbre, 0, &src[..TIMBRE_COMMON_SIZE], true);
    let mute = mem.timbre(timbre)[super::memory::timbre::PARTIAL_MUTE];
    let mut src_pos = TIMBRE_COMMON_SIZE;
    let mut mem_pos = TIMBRE_COMMON_SIZE;
    for t in 0..4 {
        if t != 0 && (mute >> t) & 1 == 0 {
            src_pos -= PARTIAL_PARAM_SIZE;
        } else if src_pos + PARTIAL_PARAM_SIZE >= src.len() {
            return false;
        }
        region.write(mem, timbre, mem_pos, &src[src_pos..src_pos + PARTIAL_PARAM_SIZE], false);
        src_pos += PARTIAL_PARAM_SIZE;
        mem_pos += PARTIAL_PARAM_SIZE;
    }
    true
}
