use super::memory::{patch, rhythm, MemParams, RHYTHM_PART};
use super::partial::{PartMix, PartialManager};
use super::timbre::{Placement, TimbreCache, VoiceContext};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyState {
    Playing,
    /// Key released while the hold pedal is down.
    Held,
    Releasing,
}

/// One sounding note of a part.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    pub id: u64,
    pub key: u8,
    pub velocity: u8,
    pub sustain: bool,
    pub state: PolyState,
}

/// A MIDI-channel-addressable part. Parts 0-7 are melodic, part 8 plays
/// drums from the rhythm setup table.
#[derive(Debug, Clone)]
pub struct Part {
    number: usize,
    pcm_count: usize,
    cache: TimbreCache,
    polys: Vec<Poly>,
    hold_pedal: bool,
    modulation: u8,
    expression: u8,
    midi_bend: u16,
    bend: i32,
    nrpn: bool,
    rpn: u16,
}

/// Maps a MIDI key through the patch key shift into the playable range.
pub fn midi_key_to_key(midi_key: u8, key_shift: u8) -> u8 {
    let mut key = midi_key as i32 + key_shift as i32;
    while key < 36 {
        key += 12;
    }
    while key > 132 {
        key -= 12;
    }
    (key - 24) as u8
}

impl Part {
    pub fn new(number: usize, pcm_count: usize) -> Self {
        Self {
            number,
            pcm_count,
            cache: TimbreCache::default(),
            polys: Vec::new(),
            hold_pedal: false,
            modulation: 0,
            expression: 100,
            midi_bend: 8192,
            bend: 0,
            nrpn: false,
            rpn: 0xFFFF,
        }
    }

    pub fn is_rhythm(&self) -> bool {
        self.number == RHYTHM_PART
    }

    pub fn name(&self) -> String {
        if self.is_rhythm() {
            "Rhythm".to_string()
        } else {
            format!("Part {}", self.number + 1)
        }
    }

    pub fn polys(&self) -> &[Poly] {
        &self.polys
    }

    pub fn timbre_cache(&self) -> &TimbreCache {
        &self.cache
    }

    pub fn modulation(&self) -> u8 {
        self.modulation
    }

    pub fn expression(&self) -> u8 {
        self.expression
    }

    pub fn hold_pedal(&self) -> bool {
        self.hold_pedal
    }

    /// Current bend in 1/4096 octave units.
    pub fn bend(&self) -> i32 {
        self.bend
    }

    pub fn abs_timbre_num(&self, mem: &MemParams) -> usize {
        MemParams::abs_timbre_num(mem.patch_temp(self.number))
    }

    // --- Timbre management ---

    /// Rebuilds the cached timbre from the part's timbre temp area.
    pub fn refresh(&mut self, mem: &MemParams) {
        self.update_bend(mem);
        if self.is_rhythm() {
            return;
        }
        self.cache = TimbreCache::from_timbre(mem.timbre_temp(self.number), self.pcm_count);
    }

    pub fn set_timbre(&mut self, mem: &mut MemParams, abs_timbre: usize) {
        if self.is_rhythm() {
            return;
        }
        let source = mem.timbre(abs_timbre).to_vec();
        mem.timbre_temp_mut(self.number).copy_from_slice(&source);
    }

    /// Picks up a change to a stored timbre if this part is playing it.
    pub fn refresh_timbre(&mut self, mem: &mut MemParams, abs_timbre: usize) {
        if !self.is_rhythm() && self.abs_timbre_num(mem) == abs_timbre {
            self.set_timbre(mem, abs_timbre);
            self.refresh(mem);
        }
    }

    pub fn set_program(&mut self, mgr: &mut PartialManager, mem: &mut MemParams, program: u8) {
        if self.is_rhythm() {
            debug!("Rhythm: Attempt to set program ({}) ignored", program);
            return;
        }
        let stored = mem.patch(program as usize & 0x7F).to_vec();
        mem.patch_temp_mut(self.number)[..stored.len()].copy_from_slice(&stored);
        self.hold_pedal = false;
        self.all_sound_off(mgr);
        self.set_timbre(mem, MemParams::abs_timbre_num(&stored));
        self.refresh(mem);
    }

    // --- Controllers ---

    pub fn set_modulation(&mut self, value: u8) {
        self.modulation = value;
    }

    pub fn set_volume(&mut self, mem: &mut MemParams, value: u8) {
        mem.patch_temp_mut(self.number)[patch::OUTPUT_LEVEL] = (value as u32 * 100 / 127) as u8;
    }

    pub fn set_expression(&mut self, value: u8) {
        self.expression = (value as u32 * 100 / 127) as u8;
    }

    pub fn set_pan(&mut self, mem: &mut MemParams, value: u8) {
        mem.patch_temp_mut(self.number)[patch::PANPOT] = ((value as u32) * 8 / 68) as u8;
    }

    pub fn set_bend(&mut self, mem: &MemParams, midi_bend: u16) {
        self.midi_bend = midi_bend;
        self.update_bend(mem);
    }

    fn update_bend(&mut self, mem: &MemParams) {
        let range = mem.patch_temp(self.number)[patch::BENDER_RANGE] as i32;
        self.bend = ((self.midi_bend as i32 - 8192) * (range * 683)) >> 14;
    }

    /// Only RPN 0 (bender range) is honoured.
    pub fn set_data_entry_msb(&mut self, mem: &mut MemParams, value: u8) {
        if self.nrpn || self.rpn != 0 {
            return;
        }
        mem.patch_temp_mut(self.number)[patch::BENDER_RANGE] = value.min(24);
        self.update_bend(mem);
    }

    pub fn set_nrpn(&mut self) {
        self.nrpn = true;
    }

    pub fn set_rpn_lsb(&mut self, value: u8) {
        self.nrpn = false;
        self.rpn = (self.rpn & 0xFF00) | value as u16;
    }

    pub fn set_rpn_msb(&mut self, value: u8) {
        self.nrpn = false;
        self.rpn = (self.rpn & 0x00FF) | ((value as u16) << 8);
    }

    pub fn set_hold_pedal(&mut self, mgr: &mut PartialManager, pressed: bool) {
        if self.hold_pedal && !pressed {
            self.hold_pedal = false;
            self.stop_pedal_hold(mgr);
        } else {
            self.hold_pedal = pressed;
        }
    }

    fn stop_pedal_hold(&mut self, mgr: &mut PartialManager) {
        for poly in self.polys.iter_mut().filter(|p| p.state == PolyState::Held) {
            poly.state = PolyState::Releasing;
            mgr.release_poly(self.number, poly.id);
        }
    }

    pub fn reset_all_controllers(&mut self, mgr: &mut PartialManager, mem: &MemParams) {
        self.modulation = 0;
        self.expression = 100;
        self.set_bend(mem, 8192);
        self.set_hold_pedal(mgr, false);
    }

    pub fn reset(&mut self, mgr: &mut PartialManager, mem: &MemParams) {
        self.reset_all_controllers(mgr, mem);
        self.all_sound_off(mgr);
        self.rpn = 0xFFFF;
        self.nrpn = false;
    }

    /// Live controller state for the partial renderer.
    pub fn mix(&self, mem: &MemParams, master_volume: u8) -> PartMix {
        let output_level = mem.patch_temp(self.number)[patch::OUTPUT_LEVEL];
        PartMix {
            bend: self.bend as f32 * 12.0 / 4096.0,
            modulation: self.modulation as f32 / 127.0,
            amp: output_level.min(100) as f32 / 100.0
                * self.expression as f32 / 100.0
                * master_volume.min(100) as f32 / 100.0,
        }
    }

    // --- Notes ---

    pub fn note_on(
        &mut self,
        mgr: &mut PartialManager,
        mem: &MemParams,
        ctx: &VoiceContext<'_>,
        midi_key: u8,
        velocity: u8,
    ) {
        let temp = mem.patch_temp(self.number);
        let assign_mode = temp[patch::ASSIGN_MODE];
        if self.is_rhythm() {
            self.rhythm_note_on(mgr, mem, ctx, midi_key, velocity, assign_mode);
            return;
        }
        let key = midi_key_to_key(midi_key, temp[patch::KEY_SHIFT]);
        let placement = Placement {
            level: 1.0,
            panpot: temp[patch::PANPOT],
            reverb: temp[patch::REVERB_SWITCH] != 0,
            fine_tune: (temp[patch::FINE_TUNE] as f32 - 50.0) / 100.0,
        };
        let cache = std::mem::take(&mut self.cache);
        self.play_poly(mgr, &cache, ctx, midi_key, key, velocity, &placement, assign_mode);
        self.cache = cache;
    }

    fn rhythm_note_on(
        &mut self,
        mgr: &mut PartialManager,
        mem: &MemParams,
        ctx: &VoiceContext<'_>,
        key: u8,
        velocity: u8,
        assign_mode: u8,
    ) {
        if !(24..=108).contains(&key) {
            debug!("{}: Attempted to play invalid key {}", self.name(), key);
            return;
        }
        let drum = mem.rhythm_temp((key - 24) as usize);
        let drum_timbre = drum[rhythm::TIMBRE];
        if drum_timbre >= 127 {
            debug!("{}: Attempted to play unmapped key {}", self.name(), key);
            return;
        }
        let abs_timbre = drum_timbre as usize + 128;
        let cache = TimbreCache::from_timbre(mem.timbre(abs_timbre), self.pcm_count);
        let placement = Placement {
            level: drum[rhythm::OUTPUT_LEVEL].min(100) as f32 / 100.0,
            panpot: drum[rhythm::PANPOT],
            reverb: drum[rhythm::REVERB_SWITCH] != 0,
            fine_tune: 0.0,
        };
        self.play_poly(mgr, &cache, ctx, key, key, velocity, &placement, assign_mode);
    }

    #[allow(clippy::too_many_arguments)]
    fn play_poly(
        &mut self,
        mgr: &mut PartialManager,
        cache: &TimbreCache,
        ctx: &VoiceContext<'_>,
        midi_key: u8,
        key: u8,
        velocity: u8,
        placement: &Placement,
        assign_mode: u8,
    ) {
        let needed = cache.partial_count();
        if needed == 0 {
            debug!("{}: No partials to play for this instrument", self.name());
            return;
        }
        if assign_mode & 2 == 0 {
            // Single-assign: a repeated key cuts off its previous note.
            if let Some(i) = self.polys.iter().position(|p| p.key == midi_key) {
                let old = self.polys.remove(i);
                mgr.abort_poly(self.number, old.id);
            }
        }
        if !mgr.free_partials(needed, self.number) {
            debug!("{}: Insufficient free partials to play key {}", self.name(), midi_key);
            self.prune(mgr);
            return;
        }
        self.prune(mgr);
        let id = mgr.next_poly_id();
        let mut started = 0;
        for config in &cache.partials {
            let Some(setup) = config.setup(key, velocity, cache.sustain, ctx, placement) else {
                continue;
            };
            if mgr.start(self.number, id, setup, ctx.sample_rate).is_some() {
                started += 1;
            }
        }
        if started == 0 {
            return;
        }
        let poly = Poly {
            id,
            key: midi_key,
            velocity,
            sustain: cache.sustain,
            state: PolyState::Playing,
        };
        if assign_mode & 1 != 0 {
            self.polys.insert(0, poly);
        } else {
            self.polys.push(poly);
        }
    }

    /// Releases the first sustaining note on `midi_key`.
    pub fn note_off(&mut self, mgr: &mut PartialManager, midi_key: u8) {
        let hold = self.hold_pedal;
        let found = self
            .polys
            .iter_mut()
            .find(|p| p.key == midi_key && p.sustain && p.state == PolyState::Playing);
        if let Some(poly) = found {
            if hold {
                poly.state = PolyState::Held;
            } else {
                poly.state = PolyState::Releasing;
                mgr.release_poly(self.number, poly.id);
            }
        }
    }

    pub fn all_notes_off(&mut self, mgr: &mut PartialManager) {
        let hold = self.hold_pedal;
        for poly in self
            .polys
            .iter_mut()
            .filter(|p| p.sustain && p.state == PolyState::Playing)
        {
            if hold {
                poly.state = PolyState::Held;
            } else {
                poly.state = PolyState::Releasing;
                mgr.release_poly(self.number, poly.id);
            }
        }
    }

    pub fn all_sound_off(&mut self, mgr: &mut PartialManager) {
        for poly in self.polys.iter_mut() {
            poly.state = PolyState::Releasing;
        }
        mgr.release_part(self.number);
    }

    /// Forgets notes whose partials have all finished.
    pub fn prune(&mut self, mgr: &PartialManager) {
        let number = self.number;
        self.polys.retain(|p| mgr.poly_is_active(number, p.id));
    }
}
