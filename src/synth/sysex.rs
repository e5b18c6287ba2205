//! System exclusive handling and the memory-mapped parameter writes behind it.

use super::core::Synth;
use super::memory::{
    memaddr, name_from_bytes, sysex_memaddr, system, MemoryRegion, RegionKind, MEMORY_TIMBRE_BASE,
    PART_COUNT, PATCH_TEMP_SIZE, RHYTHM_PART, TIMBRE_PARAM_SIZE,
};
use super::reverb::ReverbMode;
use log::{debug, warn};

const ROLAND_ID: u8 = 0x41;
const MODEL_MT32: u8 = 0x16;
const MODEL_D50: u8 = 0x14;

/// Sysex command bytes.
pub mod command {
    pub const RQ1: u8 = 0x11;
    pub const DT1: u8 = 0x12;
    pub const RQD: u8 = 0x41;
    pub const DAT: u8 = 0x42;
}

/// Roland checksum: the 7-bit two's complement of the byte sum.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) & 0x7F;
    if sum == 0 {
        0
    } else {
        0x80 - sum
    }
}

/// Builds a framed DT1 message for `sysex_addr` carrying `data`.
pub fn data_set_message(device: u8, sysex_addr: u32, data: &[u8]) -> Vec<u8> {
    let mut body = vec![
        ((sysex_addr >> 16) & 0x7F) as u8,
        ((sysex_addr >> 8) & 0x7F) as u8,
        (sysex_addr & 0x7F) as u8,
    ];
    body.extend_from_slice(data);
    let mut message = vec![0xF0, ROLAND_ID, device, MODEL_MT32, command::DT1];
    message.extend_from_slice(&body);
    message.push(checksum(&body));
    message.push(0xF7);
    message
}

fn unpack_addr(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

impl Synth {
    /// Plays a complete message framed by 0xF0 and 0xF7. Trailing junk
    /// after the first 0xF7 is ignored.
    pub fn play_sysex(&mut self, sysex: &[u8]) {
        if sysex.first() != Some(&0xF0) {
            debug!("Sysex: Message lacks start-of-sysex (0xF0)");
            return;
        }
        let Some(end) = sysex.iter().skip(1).position(|&b| b == 0xF7) else {
            debug!("Sysex: Message lacks end-of-sysex (0xF7)");
            return;
        };
        self.play_sysex_without_framing(&sysex[1..end + 1]);
    }

    /// Plays a message stripped of its 0xF0 and 0xF7 framing.
    pub fn play_sysex_without_framing(&mut self, sysex: &[u8]) {
        if sysex.len() < 4 {
            debug!("Sysex: Message is too short ({} bytes)!", sysex.len());
            return;
        }
        if sysex[0] != ROLAND_ID {
            debug!("Sysex: Header not intended for this device manufacturer: {:02x} {:02x} {:02x} {:02x}", sysex[0], sysex[1], sysex[2], sysex[3]);
            return;
        }
        if sysex[2] == MODEL_D50 {
            debug!("Sysex: Header is intended for model D-50 (not yet supported)");
            return;
        }
        if sysex[2] != MODEL_MT32 {
            debug!("Sysex: Header not intended for model MT-32: {:02x} {:02x} {:02x} {:02x}", sysex[0], sysex[1], sysex[2], sysex[3]);
            return;
        }
        self.play_sysex_without_header(sysex[1], sysex[3], &sysex[4..]);
    }

    /// Plays the body of a message: address, data and trailing checksum.
    pub fn play_sysex_without_header(&mut self, device: u8, command: u8, sysex: &[u8]) {
        if !self.open {
            return;
        }
        if device > 0x10 {
            // Device IDs above 0x10 address other units on the chain.
            debug!("Sysex: Message is not intended for this device ID (provided: {:02x}, expected: 0x10 or channel)", device);
            return;
        }
        if (command == command::DT1 || command == command::DAT) && sysex.first() == Some(&0x7F) {
            self.reset();
            return;
        }
        if sysex.len() < 4 {
            debug!("Sysex: Message is too short ({} bytes)!", sysex.len());
            return;
        }
        let (body, sum) = sysex.split_at(sysex.len() - 1);
        let expected = checksum(body);
        if expected != sum[0] {
            debug!("Sysex: Message checksum is incorrect (provided: {:02x}, expected: {:02x})!", sum[0], expected);
            return;
        }
        match command {
            command::DAT | command::DT1 => {
                if command == command::DAT && self.has_active_partials() {
                    debug!("Sysex: got DAT but partials are active - ignoring");
                    return;
                }
                self.write_sysex(device, body);
            }
            command::RQD | command::RQ1 => {
                if command == command::RQD && self.has_active_partials() {
                    debug!("Sysex: got RQD but partials are active - ignoring");
                    return;
                }
                self.read_sysex(device, body);
            }
            _ => debug!("Sysex: Unsupported command {:02x}", command),
        }
    }

    /// Answers a data request with a DT1 message through the report handler.
    /// `sysex` holds a three byte address and a three byte size.
    pub fn read_sysex(&mut self, device: u8, sysex: &[u8]) {
        if sysex.len() < 6 {
            debug!("Sysex read: Request is too short ({} bytes)", sysex.len());
            return;
        }
        let sysex_addr = unpack_addr(&sysex[..3]);
        let len = memaddr(unpack_addr(&sysex[3..6])) as usize;
        let data = self.read_memory(memaddr(sysex_addr), len);
        if data.is_empty() {
            debug!("Sysex read: Nothing to read at {:06x}", sysex_addr);
            return;
        }
        let reply = data_set_message(device, sysex_addr, &data);
        self.report.on_sysex_response(&reply);
    }

    /// Writes a DT1 body: three address bytes followed by data.
    ///
    /// Devices below 0x10 address channel-relative areas, which are mapped
    /// onto the areas of the part assigned to that channel.
    pub fn write_sysex(&mut self, device: u8, sysex: &[u8]) {
        if sysex.len() < 3 {
            return;
        }
        let mut addr = memaddr(unpack_addr(sysex));
        let mut data = &sysex[3..];

        if device < 0x10 {
            let part = self.chantable[device as usize].filter(|&p| p != RHYTHM_PART);
            if addr < memaddr(0x010000) {
                let offset = part.map_or(0, |p| p * PATCH_TEMP_SIZE) as u32;
                addr += memaddr(0x030000) + offset;
            } else if addr < memaddr(0x020000) {
                addr += memaddr(0x030110) - memaddr(0x010000);
            } else if addr < memaddr(0x030000) {
                let offset = part.map_or(0, |p| p * TIMBRE_PARAM_SIZE) as u32;
                addr += memaddr(0x040000) - memaddr(0x020000) + offset;
            } else {
                debug!("Sysex write: Invalid channel area {:06x}", sysex_memaddr(addr));
                return;
            }
        }

        loop {
            let Some(region) = self.memory_map.as_ref().and_then(|map| map.find(addr)).cloned() else {
                debug!("Sysex write to unrecognised address {:06x}, len {}", sysex_memaddr(addr), data.len());
                break;
            };
            let len = data.len() as u32;
            let clamped = region.clamped_len(addr, len) as usize;
            self.write_memory_region(&region, addr, &data[..clamped]);
            let next = region.next(addr, len);
            if next == 0 {
                break;
            }
            addr += next;
            data = &data[next as usize..];
        }
    }

    /// Reads up to `len` bytes at a linear address, clamped to the region
    /// holding it. Unknown addresses read as nothing.
    pub fn read_memory(&self, addr: u32, len: usize) -> Vec<u8> {
        let Some(region) = self.memory_map.as_ref().and_then(|map| map.find(addr)) else {
            return Vec::new();
        };
        let mut first = region.first_touched(addr) as usize;
        if region.kind == RegionKind::Timbres {
            first += MEMORY_TIMBRE_BASE;
        }
        let off = region.first_touched_offset(addr) as usize;
        let mut out = vec![0; region.clamped_len(addr, len as u32) as usize];
        region.read(&self.mem, first, off, &mut out);
        out
    }

    fn write_memory_region(&mut self, region: &MemoryRegion, addr: u32, data: &[u8]) {
        let mut first = region.first_touched(addr) as usize;
        let mut last = region.last_touched(addr, data.len() as u32) as usize;
        let off = region.first_touched_offset(addr) as usize;
        match region.kind {
            RegionKind::PatchTemp => {
                region.write(&mut self.mem, first, off, data, false);
                for i in first..=last.min(PART_COUNT - 1) {
                    let abs_timbre = self.parts[i].abs_timbre_num(&self.mem);
                    debug!("Patch temp {}: timbre {} ({})", i + 1, abs_timbre, self.mem.timbre_name(abs_timbre));
                    // Only a write reaching the timbre selection reloads the timbre.
                    if i != RHYTHM_PART && !(i == first && off > 2) {
                        self.parts[i].set_timbre(&mut self.mem, abs_timbre);
                    }
                    self.parts[i].refresh(&self.mem);
                }
            }
            RegionKind::RhythmTemp => {
                region.write(&mut self.mem, first, off, data, false);
                self.parts[RHYTHM_PART].refresh(&self.mem);
            }
            RegionKind::TimbreTemp => {
                region.write(&mut self.mem, first, off, data, false);
                for i in first..=last.min(RHYTHM_PART - 1) {
                    debug!("Timbre temp {}: {}", i + 1, name_from_bytes(&self.mem.timbre_temp(i)[..10]));
                    self.parts[i].refresh(&self.mem);
                }
            }
            RegionKind::Patches => {
                region.write(&mut self.mem, first, off, data, false);
            }
            RegionKind::Timbres => {
                first += MEMORY_TIMBRE_BASE;
                last += MEMORY_TIMBRE_BASE;
                region.write(&mut self.mem, first, off, data, false);
                for i in first..=last {
                    debug!("Memory timbre {}: {}", i - MEMORY_TIMBRE_BASE + 1, self.mem.timbre_name(i));
                    for part in self.parts.iter_mut() {
                        part.refresh_timbre(&mut self.mem, i);
                    }
                }
            }
            RegionKind::System => {
                region.write(&mut self.mem, 0, off, data, false);
                self.report.on_device_reconfig();
                let end = off + data.len();
                if off == system::MASTER_TUNE && end > system::MASTER_TUNE {
                    self.refresh_system_master_tune();
                }
                if off <= system::REVERB_LEVEL && end > system::REVERB_MODE {
                    self.refresh_system_reverb_parameters();
                }
                if off <= system::RESERVE_SETTINGS_END && end > system::RESERVE_SETTINGS_START {
                    self.refresh_system_reserve_settings();
                }
                if off <= system::CHAN_ASSIGN_END && end > system::CHAN_ASSIGN_START {
                    let first_part = off.saturating_sub(system::CHAN_ASSIGN_START);
                    let last_part = (end - system::CHAN_ASSIGN_START - 1).min(RHYTHM_PART);
                    self.refresh_system_chan_assign(first_part, last_part);
                }
                if off <= system::MASTER_VOL && end > system::MASTER_VOL {
                    self.refresh_system_master_vol();
                }
            }
            RegionKind::Display => {
                let message = String::from_utf8_lossy(data);
                self.report.show_lcd_message(message.trim_end_matches('\0'));
            }
            RegionKind::Reset => self.reset(),
        }
    }

    pub(super) fn refresh_system(&mut self) {
        self.refresh_system_master_tune();
        self.refresh_system_reverb_parameters();
        self.refresh_system_reserve_settings();
        self.refresh_system_chan_assign(0, RHYTHM_PART);
        self.refresh_system_master_vol();
    }

    fn refresh_system_master_tune(&mut self) {
        let value = self.mem.system[system::MASTER_TUNE] as f32;
        self.master_tune = (value - 64.0) / 128.0;
        debug!(" Master Tune: {:.2} Hz", 440.0 * 2f32.powf(self.master_tune / 12.0));
    }

    fn refresh_system_reverb_parameters(&mut self) {
        let mode = self.mem.system[system::REVERB_MODE];
        let time = self.mem.system[system::REVERB_TIME];
        let level = self.mem.system[system::REVERB_LEVEL];
        debug!(" Reverb: mode={}, time={}, level={}", mode, time, level);
        if self.reverb_overridden && self.current_reverb.is_some() {
            debug!(" (Reverb overridden - ignoring)");
            return;
        }
        self.report.on_new_reverb_mode(mode);
        self.report.on_new_reverb_time(time);
        self.report.on_new_reverb_level(level);

        let new_mode = ReverbMode::from_u8(mode);
        let Some(model) = self.reverb_models.get_mut(new_mode as usize) else {
            warn!("No reverb model for mode {}", mode);
            return;
        };
        if self.current_reverb != Some(new_mode) {
            model.mute();
            self.current_reverb = Some(new_mode);
        }
        model.set_parameters(time, level);
    }

    fn refresh_system_reserve_settings(&mut self) {
        let reserve = &self.mem.system[system::RESERVE_SETTINGS_START..=system::RESERVE_SETTINGS_END];
        debug!(" Partial reserve: {:?}", reserve);
        self.partial_manager.set_reserve(reserve);
    }

    /// Rebuilds the channel table. Parts in `first_part..=last_part` had
    /// their assignment touched and are silenced and reset. When several
    /// parts share a channel the lowest wins.
    fn refresh_system_chan_assign(&mut self, first_part: usize, last_part: usize) {
        self.chantable = [None; 16];
        for i in 0..PART_COUNT {
            if (first_part..=last_part).contains(&i) {
                if let Some(part) = self.parts.get_mut(i) {
                    part.all_sound_off(&mut self.partial_manager);
                    part.reset_all_controllers(&mut self.partial_manager, &self.mem);
                }
            }
            let chan = self.mem.system[system::CHAN_ASSIGN_START + i] as usize;
            if chan < 16 && self.chantable[chan].is_none() {
                self.chantable[chan] = Some(i);
            }
        }
        debug!(" Part assign: {:?}", &self.mem.system[system::CHAN_ASSIGN_START..=system::CHAN_ASSIGN_END]);
    }

    fn refresh_system_master_vol(&mut self) {
        debug!(" Master volume: {}", self.mem.system[system::MASTER_VOL]);
    }
}
