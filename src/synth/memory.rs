//! Parameter RAM and the address-range regions that expose it to sysex.

use log::debug;

/// Packs a 7-bit-per-byte sysex address into a linear offset.
pub const fn memaddr(addr: u32) -> u32 {
    ((addr & 0x7f0000) >> 2) | ((addr & 0x7f00) >> 1) | (addr & 0x7f)
}

/// Inverse of [`memaddr`], for log output.
pub const fn sysex_memaddr(addr: u32) -> u32 {
    ((addr & 0x1FC000) << 2) | ((addr & 0x3F80) << 1) | (addr & 0x7f)
}

pub const PART_COUNT: usize = 9;
pub const RHYTHM_PART: usize = 8;
pub const RHYTHM_KEY_COUNT: usize = 85;
pub const TIMBRE_COUNT: usize = 256;
pub const MEMORY_TIMBRE_BASE: usize = 128;
pub const RHYTHM_TIMBRE_BASE: usize = 192;

pub const PATCH_PARAM_SIZE: usize = 8;
pub const PATCH_TEMP_SIZE: usize = 16;
pub const RHYTHM_TEMP_SIZE: usize = 4;
pub const TIMBRE_COMMON_SIZE: usize = 14;
pub const PARTIAL_PARAM_SIZE: usize = 58;
pub const TIMBRE_PARAM_SIZE: usize = TIMBRE_COMMON_SIZE + 4 * PARTIAL_PARAM_SIZE;
pub const PADDED_TIMBRE_SIZE: usize = 256;
pub const SYSTEM_SIZE: usize = 23;

/// Byte offsets inside a patch (and the first eight bytes of a patch temp).
pub mod patch {
    pub const TIMBRE_GROUP: usize = 0;
    pub const TIMBRE_NUM: usize = 1;
    pub const KEY_SHIFT: usize = 2;
    pub const FINE_TUNE: usize = 3;
    pub const BENDER_RANGE: usize = 4;
    pub const ASSIGN_MODE: usize = 5;
    pub const REVERB_SWITCH: usize = 6;
    pub const OUTPUT_LEVEL: usize = 8;
    pub const PANPOT: usize = 9;
}

pub mod rhythm {
    pub const TIMBRE: usize = 0;
    pub const OUTPUT_LEVEL: usize = 1;
    pub const PANPOT: usize = 2;
    pub const REVERB_SWITCH: usize = 3;
}

pub mod system {
    pub const MASTER_TUNE: usize = 0;
    pub const REVERB_MODE: usize = 1;
    pub const REVERB_TIME: usize = 2;
    pub const REVERB_LEVEL: usize = 3;
    pub const RESERVE_SETTINGS_START: usize = 4;
    pub const RESERVE_SETTINGS_END: usize = 12;
    pub const CHAN_ASSIGN_START: usize = 13;
    pub const CHAN_ASSIGN_END: usize = 21;
    pub const MASTER_VOL: usize = 22;
}

pub mod timbre {
    pub const PARTIAL_STRUCTURE_12: usize = 10;
    pub const PARTIAL_STRUCTURE_34: usize = 11;
    pub const PARTIAL_MUTE: usize = 12;
    pub const NO_SUSTAIN: usize = 13;
}

/// The synth's parameter RAM, one byte array per area.
#[derive(Debug, Clone, PartialEq)]
pub struct MemParams {
    pub patch_temp: Vec<u8>,
    pub rhythm_temp: Vec<u8>,
    pub timbre_temp: Vec<u8>,
    pub patches: Vec<u8>,
    pub timbres: Vec<u8>,
    pub system: Vec<u8>,
}

impl MemParams {
    /// Filled with `?` so untouched bytes stand out when dumped.
    pub fn new() -> Self {
        Self {
            patch_temp: vec![b'?'; PART_COUNT * PATCH_TEMP_SIZE],
            rhythm_temp: vec![b'?'; RHYTHM_KEY_COUNT * RHYTHM_TEMP_SIZE],
            timbre_temp: vec![b'?'; 8 * TIMBRE_PARAM_SIZE],
            patches: vec![b'?'; 128 * PATCH_PARAM_SIZE],
            timbres: vec![b'?'; TIMBRE_COUNT * PADDED_TIMBRE_SIZE],
            system: vec![b'?'; SYSTEM_SIZE],
        }
    }

    pub fn patch_temp(&self, part: usize) -> &[u8] {
        &self.patch_temp[part * PATCH_TEMP_SIZE..(part + 1) * PATCH_TEMP_SIZE]
    }

    pub fn patch_temp_mut(&mut self, part: usize) -> &mut [u8] {
        &mut self.patch_temp[part * PATCH_TEMP_SIZE..(part + 1) * PATCH_TEMP_SIZE]
    }

    pub fn rhythm_temp(&self, key: usize) -> &[u8] {
        &self.rhythm_temp[key * RHYTHM_TEMP_SIZE..(key + 1) * RHYTHM_TEMP_SIZE]
    }

    pub fn timbre_temp(&self, part: usize) -> &[u8] {
        &self.timbre_temp[part * TIMBRE_PARAM_SIZE..(part + 1) * TIMBRE_PARAM_SIZE]
    }

    pub fn timbre_temp_mut(&mut self, part: usize) -> &mut [u8] {
        &mut self.timbre_temp[part * TIMBRE_PARAM_SIZE..(part + 1) * TIMBRE_PARAM_SIZE]
    }

    pub fn patch(&self, index: usize) -> &[u8] {
        &self.patches[index * PATCH_PARAM_SIZE..(index + 1) * PATCH_PARAM_SIZE]
    }

    pub fn patch_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.patches[index * PATCH_PARAM_SIZE..(index + 1) * PATCH_PARAM_SIZE]
    }

    /// The unpadded parameters of absolute timbre `index`.
    pub fn timbre(&self, index: usize) -> &[u8] {
        let start = index * PADDED_TIMBRE_SIZE;
        &self.timbres[start..start + TIMBRE_PARAM_SIZE]
    }

    /// Absolute timbre number selected by a patch or patch temp.
    pub fn abs_timbre_num(patch_bytes: &[u8]) -> usize {
        patch_bytes[patch::TIMBRE_GROUP] as usize * 64 + patch_bytes[patch::TIMBRE_NUM] as usize
    }

    pub fn timbre_name(&self, index: usize) -> String {
        name_from_bytes(&self.timbre(index)[..10])
    }

    fn area(&self, kind: RegionKind) -> Option<&[u8]> {
        match kind {
            RegionKind::PatchTemp => Some(&self.patch_temp),
            RegionKind::RhythmTemp => Some(&self.rhythm_temp),
            RegionKind::TimbreTemp => Some(&self.timbre_temp),
            RegionKind::Patches => Some(&self.patches),
            RegionKind::Timbres => Some(&self.timbres),
            RegionKind::System => Some(&self.system),
            RegionKind::Display | RegionKind::Reset => None,
        }
    }

    fn area_mut(&mut self, kind: RegionKind) -> Option<&mut [u8]> {
        match kind {
            RegionKind::PatchTemp => Some(&mut self.patch_temp),
            RegionKind::RhythmTemp => Some(&mut self.rhythm_temp),
            RegionKind::TimbreTemp => Some(&mut self.timbre_temp),
            RegionKind::Patches => Some(&mut self.patches),
            RegionKind::Timbres => Some(&mut self.timbres),
            RegionKind::System => Some(&mut self.system),
            RegionKind::Display | RegionKind::Reset => None,
        }
    }
}

impl Default for MemParams {
    fn default() -> Self {
        Self::new()
    }
}

pub fn name_from_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    PatchTemp,
    RhythmTemp,
    TimbreTemp,
    Patches,
    Timbres,
    System,
    Display,
    Reset,
}

/// A named window of the sysex address space.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    pub kind: RegionKind,
    start_addr: u32,
    entry_size: u32,
    entries: u32,
    /// Indexed by offset within an entry. `None` accepts any byte.
    max_table: Option<Vec<u8>>,
}

impl MemoryRegion {
    pub fn new(
        kind: RegionKind,
        sysex_addr: u32,
        entry_size: u32,
        entries: u32,
        max_table: Option<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            start_addr: memaddr(sysex_addr),
            entry_size,
            entries,
            max_table,
        }
    }

    pub fn end(&self) -> u32 {
        self.start_addr + self.entry_size * self.entries
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start_addr && addr < self.end()
    }

    pub fn first_touched(&self, addr: u32) -> u32 {
        (addr - self.start_addr) / self.entry_size
    }

    pub fn first_touched_offset(&self, addr: u32) -> u32 {
        (addr - self.start_addr) % self.entry_size
    }

    pub fn last_touched(&self, addr: u32, len: u32) -> u32 {
        (self.first_touched_offset(addr) + len.max(1) - 1) / self.entry_size
            + self.first_touched(addr)
    }

    pub fn clamped_len(&self, addr: u32, len: u32) -> u32 {
        len.min(self.end() - addr)
    }

    /// Bytes consumed by this region when a write spills past its end,
    /// or 0 if the write ends inside it.
    pub fn next(&self, addr: u32, len: u32) -> u32 {
        if addr + len > self.end() {
            self.end() - addr
        } else {
            0
        }
    }

    pub fn max_value(&self, mem_off: usize) -> u8 {
        match &self.max_table {
            Some(table) => table[mem_off % self.entry_size as usize],
            None => 0xFF,
        }
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self.kind, RegionKind::Display | RegionKind::Reset)
    }

    /// Writes `data` at byte `off` of entry `entry`.
    ///
    /// Values above the per-byte maximum are clamped. A maximum of 0 marks a
    /// write-protected byte, which only `init` writes may set.
    pub fn write(&self, mem: &mut MemParams, entry: usize, off: usize, data: &[u8], init: bool) {
        let kind = self.kind;
        let mut mem_off = entry * self.entry_size as usize + off;
        let Some(area) = mem.area_mut(kind) else {
            return;
        };
        if mem_off + data.len() > area.len() {
            debug!(
                "write[{:?}]: out of bounds at entry {}, offset {}, len {}",
                kind,
                entry,
                off,
                data.len()
            );
            return;
        }
        for &desired in data {
            let max = self.max_value(mem_off);
            if max != 0 || init {
                let value = if desired > max {
                    debug!(
                        "write[{:?}]: wanted 0x{:02x} at {}, but max 0x{:02x}",
                        kind, desired, mem_off, max
                    );
                    max
                } else {
                    desired
                };
                area[mem_off] = value;
            } else if desired != 0 {
                debug!(
                    "write[{:?}]: wanted 0x{:02x} at {}, but write-protected",
                    kind, desired, mem_off
                );
            }
            mem_off += 1;
        }
    }

    pub fn read(&self, mem: &MemParams, entry: usize, off: usize, out: &mut [u8]) {
        if !self.is_readable() {
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = if i % 2 == 0 { 0xFF } else { self.kind as u8 };
            }
            return;
        }
        let start = entry * self.entry_size as usize + off;
        if let Some(area) = mem.area(self.kind) {
            let end = (start + out.len()).min(area.len());
            let available = end.saturating_sub(start);
            out[..available].copy_from_slice(&area[start..end]);
        }
    }
}

/// The fixed, linearly searched table of regions.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

pub struct MaxTables {
    pub patch: Vec<u8>,
    pub rhythm: Vec<u8>,
    pub system: Vec<u8>,
    pub timbre: Vec<u8>,
}

impl MemoryMap {
    pub fn new(max: MaxTables) -> Self {
        let regions = vec![
            MemoryRegion::new(RegionKind::PatchTemp, 0x030000, PATCH_TEMP_SIZE as u32, PART_COUNT as u32, Some(max.patch.clone())),
            MemoryRegion::new(RegionKind::RhythmTemp, 0x030110, RHYTHM_TEMP_SIZE as u32, RHYTHM_KEY_COUNT as u32, Some(max.rhythm)),
            MemoryRegion::new(RegionKind::TimbreTemp, 0x040000, TIMBRE_PARAM_SIZE as u32, 8, Some(max.timbre.clone())),
            MemoryRegion::new(RegionKind::Patches, 0x050000, PATCH_PARAM_SIZE as u32, 128, Some(max.patch)),
            MemoryRegion::new(RegionKind::Timbres, 0x080000, PADDED_TIMBRE_SIZE as u32, 64, Some(max.timbre)),
            MemoryRegion::new(RegionKind::System, 0x100000, SYSTEM_SIZE as u32, 1, Some(max.system)),
            MemoryRegion::new(RegionKind::Display, 0x200000, 511, 1, None),
            MemoryRegion::new(RegionKind::Reset, 0x7F0000, 0x3FFF, 1, None),
        ];
        Self { regions }
    }

    pub fn find(&self, addr: u32) -> Option<&MemoryRegion> {
        self.regions.iter().find(|region| region.contains(addr))
    }

    pub fn region(&self, kind: RegionKind) -> &MemoryRegion {
        // The table always holds one region of every kind.
        &self.regions[kind as usize]
    }
}
