use super::envelope::EnvelopeGenerator;
use super::lfo::Lfo;
use super::memory::PART_COUNT;
use super::rom::PcmWave;
use log::debug;

pub const MAX_PARTIALS: usize = 32;

/// Source rate of the PCM samples when played at middle C.
const PCM_SOURCE_RATE: f32 = 32000.0;
const PARTIAL_GAIN: f32 = 0.35;

/// Oscillator of one partial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveKind {
    Pcm(PcmWave),
    Square { duty: f32 },
    Sawtooth,
}

/// Everything a part decides about a partial at note-on.
#[derive(Debug, Clone)]
pub struct PartialSetup {
    pub wave: WaveKind,
    /// Pitch in semitones on the MIDI note scale, before bend and tuning.
    pub semitone: f32,
    pub bender_enabled: bool,
    pub amp: f32,
    pub pan_left: f32,
    pub pan_right: f32,
    pub reverb: bool,
    pub envelope: EnvelopeGenerator,
    pub lfo_hz: f32,
    /// Vibrato depth in semitones at full modulation wheel.
    pub lfo_mod_depth: f32,
    /// Vibrato depth in semitones with the wheel at rest.
    pub lfo_depth: f32,
}

/// Live per-part controller state applied while rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartMix {
    pub bend: f32,
    pub modulation: f32,
    pub amp: f32,
}

impl Default for PartMix {
    fn default() -> Self {
        Self {
            bend: 0.0,
            modulation: 0.0,
            amp: 1.0,
        }
    }
}

/// Destination buffers for one render pass of the pool.
pub struct PartialOutput<'a> {
    pub dry_left: &'a mut [f32],
    pub dry_right: &'a mut [f32],
    pub reverb_left: &'a mut [f32],
    pub reverb_right: &'a mut [f32],
}

/// One sound generator slot.
#[derive(Debug, Clone)]
pub struct Partial {
    active: bool,
    releasing: bool,
    owner: usize,
    poly_id: u64,
    setup: Option<PartialSetup>,
    position: f64,
    lfo: Option<Lfo>,
    samples_elapsed: u64,
    note_off_sample_index: Option<u64>,
}

impl Partial {
    fn new() -> Self {
        Self {
            active: false,
            releasing: false,
            owner: 0,
            poly_id: 0,
            setup: None,
            position: 0.0,
            lfo: None,
            samples_elapsed: 0,
            note_off_sample_index: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    pub fn owner(&self) -> Option<usize> {
        self.active.then_some(self.owner)
    }

    pub fn poly_id(&self) -> u64 {
        self.poly_id
    }

    fn activate(&mut self, owner: usize, poly_id: u64, setup: PartialSetup, sample_rate: f32) {
        self.active = true;
        self.releasing = false;
        self.owner = owner;
        self.poly_id = poly_id;
        self.position = 0.0;
        self.samples_elapsed = 0;
        self.note_off_sample_index = None;
        self.lfo = Some(Lfo::new(setup.lfo_hz, sample_rate));
        self.setup = Some(setup);
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.releasing = false;
        self.setup = None;
        self.lfo = None;
    }

    pub fn release(&mut self) {
        if self.active && !self.releasing {
            self.releasing = true;
            self.note_off_sample_index = Some(self.samples_elapsed);
        }
    }

    fn oscillate(&mut self, wave: WaveKind, freq_ratio: f32, sample_rate: f32, pcm: &[i16]) -> Option<f32> {
        match wave {
            WaveKind::Pcm(pcm_wave) => {
                let index = self.position as usize;
                let offset = if pcm_wave.looped { index % pcm_wave.len } else { index };
                if offset >= pcm_wave.len {
                    return None;
                }
                let sample = pcm.get(pcm_wave.addr + offset).copied().unwrap_or(0);
                self.position += (freq_ratio * PCM_SOURCE_RATE / sample_rate) as f64;
                if pcm_wave.looped && self.position >= pcm_wave.len as f64 {
                    self.position -= pcm_wave.len as f64;
                }
                Some(sample as f32 / 32768.0)
            }
            WaveKind::Square { duty } => {
                let value = if self.position < duty as f64 { 1.0 } else { -1.0 };
                self.advance_cycle(freq_ratio, sample_rate);
                Some(value)
            }
            WaveKind::Sawtooth => {
                let value = 2.0 * self.position as f32 - 1.0;
                self.advance_cycle(freq_ratio, sample_rate);
                Some(value)
            }
        }
    }

    fn advance_cycle(&mut self, freq_ratio: f32, sample_rate: f32) {
        // freq_ratio is relative to middle C.
        let freq = 261.625_58 * freq_ratio;
        self.position += (freq / sample_rate) as f64;
        if self.position >= 1.0 {
            self.position -= self.position.floor();
        }
    }

    fn render(
        &mut self,
        mix: &PartMix,
        tune: f32,
        sample_rate: f32,
        pcm: &[i16],
        reverb_enabled: bool,
        out: &mut PartialOutput<'_>,
    ) {
        let Some(setup) = self.setup.take() else {
            self.active = false;
            return;
        };
        let bend = if setup.bender_enabled { mix.bend } else { 0.0 };
        let depth = setup.lfo_depth + setup.lfo_mod_depth * mix.modulation;
        let (left, right) = if setup.reverb && reverb_enabled {
            (&mut *out.reverb_left, &mut *out.reverb_right)
        } else {
            (&mut *out.dry_left, &mut *out.dry_right)
        };
        let mut finished = false;
        for i in 0..left.len() {
            let time_since_on = self.samples_elapsed as f32 / sample_rate;
            let time_since_off = self
                .note_off_sample_index
                .map(|off| (self.samples_elapsed - off) as f32 / sample_rate);
            if setup.envelope.is_finished(time_since_on, time_since_off) {
                finished = true;
                break;
            }
            let vibrato = match self.lfo.as_mut() {
                Some(lfo) if depth != 0.0 => lfo.process() * depth,
                _ => 0.0,
            };
            let semitone = setup.semitone + bend + tune + vibrato;
            let freq_ratio = 2.0f32.powf((semitone - 60.0) / 12.0);
            let Some(raw) = self.oscillate(setup.wave, freq_ratio, sample_rate, pcm) else {
                finished = true;
                break;
            };
            let env = setup.envelope.evaluate(time_since_on, time_since_off);
            let value = raw * env * setup.amp * mix.amp * PARTIAL_GAIN;
            left[i] += value * setup.pan_left;
            right[i] += value * setup.pan_right;
            self.samples_elapsed += 1;
        }
        self.setup = Some(setup);
        if finished {
            self.deactivate();
        }
    }
}

/// Fixed pool of partials shared by all parts.
#[derive(Debug, Clone)]
pub struct PartialManager {
    partials: Vec<Partial>,
    reserve: [u8; PART_COUNT],
    next_poly_id: u64,
}

impl PartialManager {
    pub fn new(count: usize) -> Self {
        let count = count.clamp(1, MAX_PARTIALS);
        Self {
            partials: (0..count).map(|_| Partial::new()).collect(),
            reserve: [0; PART_COUNT],
            next_poly_id: 1,
        }
    }

    pub fn partial_limit(&self) -> usize {
        self.partials.len()
    }

    pub fn partials(&self) -> &[Partial] {
        &self.partials
    }

    pub fn next_poly_id(&mut self) -> u64 {
        let id = self.next_poly_id;
        self.next_poly_id += 1;
        id
    }

    pub fn set_reserve(&mut self, reserve: &[u8]) {
        for (slot, &value) in self.reserve.iter_mut().zip(reserve) {
            *slot = value;
        }
    }

    pub fn reserve(&self) -> &[u8; PART_COUNT] {
        &self.reserve
    }

    pub fn free_count(&self) -> usize {
        self.partials.iter().filter(|p| !p.active).count()
    }

    pub fn active_count(&self) -> usize {
        self.partials.len() - self.free_count()
    }

    pub fn has_active_partials(&self) -> bool {
        self.partials.iter().any(Partial::is_active)
    }

    pub fn part_usage(&self) -> [usize; PART_COUNT] {
        let mut usage = [0; PART_COUNT];
        for owner in self.partials.iter().filter_map(Partial::owner) {
            usage[owner] += 1;
        }
        usage
    }

    pub fn deactivate_all(&mut self) {
        self.partials.iter_mut().for_each(Partial::deactivate);
    }

    pub fn abort_poly(&mut self, part: usize, poly_id: u64) {
        for p in self.partials.iter_mut() {
            if p.owner() == Some(part) && p.poly_id == poly_id {
                p.deactivate();
            }
        }
    }

    pub fn release_poly(&mut self, part: usize, poly_id: u64) {
        for p in self.partials.iter_mut() {
            if p.owner() == Some(part) && p.poly_id == poly_id {
                p.release();
            }
        }
    }

    pub fn release_part(&mut self, part: usize) {
        for p in self.partials.iter_mut() {
            if p.owner() == Some(part) {
                p.release();
            }
        }
    }

    pub fn poly_is_active(&self, part: usize, poly_id: u64) -> bool {
        self.partials
            .iter()
            .any(|p| p.owner() == Some(part) && p.poly_id == poly_id)
    }

    fn oldest_poly(&self, part: usize) -> Option<u64> {
        self.partials
            .iter()
            .filter(|p| p.owner() == Some(part))
            .map(|p| p.poly_id)
            .min()
    }

    /// Makes room for `needed` partials on behalf of `part`.
    ///
    /// Releasing partials go first, oldest note first. Then notes of parts
    /// using more than their reserve, then the oldest note of `part` itself.
    pub fn free_partials(&mut self, needed: usize, part: usize) -> bool {
        if needed > self.partials.len() {
            return false;
        }
        while self.free_count() < needed {
            let releasing = self
                .partials
                .iter()
                .filter(|p| p.active && p.releasing)
                .map(|p| (p.poly_id, p.owner))
                .min();
            let Some((poly_id, owner)) = releasing else {
                break;
            };
            self.abort_poly(owner, poly_id);
        }
        while self.free_count() < needed {
            let usage = self.part_usage();
            let over_reserve = (0..PART_COUNT)
                .filter(|&p| p != part && usage[p] > self.reserve[p] as usize)
                .filter_map(|p| self.oldest_poly(p).map(|id| (id, p)))
                .min();
            let Some((poly_id, owner)) = over_reserve else {
                break;
            };
            debug!("Aborting note of part {} above its reserve", owner + 1);
            self.abort_poly(owner, poly_id);
        }
        while self.free_count() < needed {
            let Some(poly_id) = self.oldest_poly(part) else {
                break;
            };
            self.abort_poly(part, poly_id);
        }
        self.free_count() >= needed
    }

    /// Starts a partial for `part`. Call `free_partials` first.
    pub fn start(&mut self, part: usize, poly_id: u64, setup: PartialSetup, sample_rate: f32) -> Option<usize> {
        let index = self.partials.iter().position(|p| !p.active)?;
        self.partials[index].activate(part, poly_id, setup, sample_rate);
        Some(index)
    }

    /// Adds every active partial's output into `out`. With reverb disabled
    /// all partials land in the dry buffers.
    pub fn render(
        &mut self,
        mixes: &[PartMix; PART_COUNT],
        tune: f32,
        sample_rate: f32,
        pcm: &[i16],
        reverb_enabled: bool,
        out: &mut PartialOutput<'_>,
    ) {
        for partial in self.partials.iter_mut().filter(|p| p.active) {
            let mix = mixes[partial.owner];
            partial.render(&mix, tune, sample_rate, pcm, reverb_enabled, out);
        }
    }
}
