//! Control and PCM ROM images.
//!
//! ROMs are plain binary dumps. A control ROM is identified by the version
//! string it carries at a model-specific offset; the matching map entry tells
//! where every table lives inside it.

use crate::error::OpenError;
use log::debug;
use std::path::{Path, PathBuf};

pub const CONTROL_ROM_SIZE: usize = 64 * 1024;

/// Control ROM names tried in order when opening from a directory.
pub const CONTROL_ROM_NAMES: [&str; 2] = ["CM32L_CONTROL.ROM", "MT32_CONTROL.ROM"];
pub const PCM_ROM_NAMES: [&str; 2] = ["CM32L_PCM.ROM", "MT32_PCM.ROM"];

/// Table locations inside one control ROM revision.
#[derive(Debug)]
pub struct ControlRomMap {
    pub name: &'static str,
    pub id_pos: usize,
    pub id_bytes: &'static [u8],
    pub pcm_table: usize,
    pub pcm_count: usize,
    pub timbre_a_map: usize,
    pub timbre_a_offset: usize,
    pub timbre_a_compressed: bool,
    pub timbre_b_map: usize,
    pub timbre_b_offset: usize,
    pub timbre_b_compressed: bool,
    pub timbre_r_map: usize,
    pub timbre_r_count: usize,
    pub rhythm_settings: usize,
    pub rhythm_settings_count: usize,
    pub reserve_settings: usize,
    pub pan_settings: usize,
    pub program_settings: usize,
    pub rhythm_max_table: usize,
    pub patch_max_table: usize,
    pub system_max_table: usize,
    pub timbre_max_table: usize,
}

macro_rules! rom_map {
    (
        $name:expr, $id_pos:expr, $id:expr, $pcm:expr, $pcm_count:expr,
        $ta:expr, $tao:expr, $tac:expr, $tb:expr, $tbo:expr, $tbc:expr,
        $tr:expr, $trc:expr, $rhy:expr, $rhyc:expr, $rsrv:expr, $pan:expr, $prog:expr,
        $rhymax:expr, $patmax:expr, $sysmax:expr, $timmax:expr
    ) => {
        ControlRomMap {
            name: $name,
            id_pos: $id_pos,
            id_bytes: $id,
            pcm_table: $pcm,
            pcm_count: $pcm_count,
            timbre_a_map: $ta,
            timbre_a_offset: $tao,
            timbre_a_compressed: $tac,
            timbre_b_map: $tb,
            timbre_b_offset: $tbo,
            timbre_b_compressed: $tbc,
            timbre_r_map: $tr,
            timbre_r_count: $trc,
            rhythm_settings: $rhy,
            rhythm_settings_count: $rhyc,
            reserve_settings: $rsrv,
            pan_settings: $pan,
            program_settings: $prog,
            rhythm_max_table: $rhymax,
            patch_max_table: $patmax,
            system_max_table: $sysmax,
            timbre_max_table: $timmax,
        }
    };
}

#[rustfmt::skip]
pub static CONTROL_ROM_MAPS: [ControlRomMap; 7] = [
    rom_map!("MT-32 1.04", 0x4014, b"\0 ver1.04 14 July 87 \0", 0x3000, 128, 0x8000, 0x0000, false, 0xC000, 0x4000, false, 0x3200, 30, 0x73A6, 85, 0x57C7, 0x57E2, 0x57D0, 0x5252, 0x525E, 0x526E, 0x520A),
    rom_map!("MT-32 1.05", 0x4014, b"\0 ver1.05 06 Aug, 87 \0", 0x3000, 128, 0x8000, 0x0000, false, 0xC000, 0x4000, false, 0x3200, 30, 0x7414, 85, 0x57C7, 0x57E2, 0x57D0, 0x5252, 0x525E, 0x526E, 0x520A),
    rom_map!("MT-32 1.06", 0x4014, b"\0 ver1.06 31 Aug, 87 \0", 0x3000, 128, 0x8000, 0x0000, false, 0xC000, 0x4000, false, 0x3200, 30, 0x7414, 85, 0x57D9, 0x57F4, 0x57E2, 0x5264, 0x5270, 0x5280, 0x521C),
    rom_map!("MT-32 1.07", 0x4010, b"\0 ver1.07 10 Oct, 87 \0", 0x3000, 128, 0x8000, 0x0000, false, 0xC000, 0x4000, false, 0x3200, 30, 0x73fe, 85, 0x57B1, 0x57CC, 0x57BA, 0x523C, 0x5248, 0x5258, 0x51F4),
    rom_map!("MT-32 Blue Ridge", 0x4010, b"\0verX.XX  30 Sep, 88 \0", 0x3000, 128, 0x8000, 0x0000, false, 0xC000, 0x4000, false, 0x3200, 30, 0x741C, 85, 0x57E5, 0x5800, 0x57EE, 0x5270, 0x527C, 0x528C, 0x5228),
    rom_map!("CM-32L 1.00", 0x2205, b"\0CM32/LAPC1.00 890404\0", 0x8100, 256, 0x8000, 0x8000, false, 0x8080, 0x8000, false, 0x8500, 64, 0x8580, 85, 0x4F65, 0x4F80, 0x4F6E, 0x48A1, 0x48A5, 0x48BE, 0x48D5),
    rom_map!("CM-32L 1.02", 0x2205, b"\0CM32/LAPC1.02 891205\0", 0x8100, 256, 0x8000, 0x8000, true, 0x8080, 0x8000, true, 0x8500, 64, 0x8580, 85, 0x4F93, 0x4FAE, 0x4F9C, 0x48CB, 0x48CF, 0x48E8, 0x48FF),
];

/// A loaded, identified control ROM.
#[derive(Debug, Clone)]
pub struct ControlRom {
    data: Vec<u8>,
    map: &'static ControlRomMap,
}

impl ControlRom {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OpenError> {
        if bytes.len() < CONTROL_ROM_SIZE {
            return Err(OpenError::ControlRomSize {
                expected: CONTROL_ROM_SIZE,
                actual: bytes.len(),
            });
        }
        let data = bytes[..CONTROL_ROM_SIZE].to_vec();
        let map = CONTROL_ROM_MAPS
            .iter()
            .find(|map| {
                data.get(map.id_pos..map.id_pos + map.id_bytes.len()) == Some(map.id_bytes)
            })
            .ok_or(OpenError::UnknownControlRom)?;
        debug!("Found control ROM: {}", map.name);
        Ok(Self { data, map })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn map(&self) -> &'static ControlRomMap {
        self.map
    }

    /// PCM ROM length in 16-bit samples.
    pub fn pcm_rom_samples(&self) -> usize {
        if self.map.pcm_count == 256 {
            512 * 1024
        } else {
            256 * 1024
        }
    }

    pub fn bytes_at(&self, pos: usize, len: usize) -> Result<&[u8], OpenError> {
        self.data
            .get(pos..pos + len)
            .ok_or(OpenError::RomTableOutOfRange { table: "control", pos })
    }

    pub fn byte(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0)
    }

    /// Little-endian 16-bit entry `index` of the table at `pos`.
    pub fn u16_entry(&self, pos: usize, index: usize) -> u16 {
        let at = pos + index * 2;
        u16::from_le_bytes([self.byte(at), self.byte(at + 1)])
    }
}

/// One entry of the control ROM's PCM wave table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmWave {
    pub addr: usize,
    pub len: usize,
    pub looped: bool,
    pub pitch: u16,
}

const PCM_BLOCK: usize = 0x800;

pub fn pcm_wave_list(rom: &ControlRom) -> Result<Vec<PcmWave>, OpenError> {
    let map = rom.map();
    let pcm_rom_samples = rom.pcm_rom_samples();
    let table = rom.bytes_at(map.pcm_table, map.pcm_count * 4)?;
    table
        .chunks_exact(4)
        .enumerate()
        .map(|(index, entry)| {
            let (pos, len, pitch_lsb, pitch_msb) = (entry[0], entry[1], entry[2], entry[3]);
            let addr = pos as usize * PCM_BLOCK;
            let length = PCM_BLOCK << ((len & 0x70) >> 4);
            if addr + length > pcm_rom_samples {
                return Err(OpenError::PcmWaveOutOfRange {
                    index,
                    addr,
                    len: length,
                });
            }
            Ok(PcmWave {
                addr,
                len: length,
                looped: len & 0x80 != 0,
                pitch: u16::from_be_bytes([pitch_msb, pitch_lsb]),
            })
        })
        .collect()
}

/// Bit order of the scrambled PCM ROM address lines.
const PCM_BIT_ORDER: [usize; 15] = [0, 9, 1, 2, 3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 15];

/// Unscrambles a PCM ROM dump into signed samples. The file must hold
/// exactly two bytes per sample.
pub fn decode_pcm_rom(bytes: &[u8], samples: usize) -> Result<Vec<i16>, OpenError> {
    if bytes.len() != samples * 2 {
        return Err(OpenError::PcmRomSize {
            expected: samples * 2,
            actual: bytes.len(),
        });
    }
    let decoded = bytes
        .chunks_exact(2)
        .map(|pair| {
            let (s, c) = (pair[0], pair[1]);
            let mut value: u16 = 0;
            for (u, &order) in PCM_BIT_ORDER.iter().enumerate() {
                let bit = if order < 8 {
                    (s >> (7 - order)) & 1
                } else {
                    (c >> (7 - (order - 8))) & 1
                };
                value |= (bit as u16) << (15 - u);
            }
            value as i16
        })
        .collect();
    Ok(decoded)
}

/// Returns the first existing file of `names` inside `dir`.
pub fn find_rom(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}
