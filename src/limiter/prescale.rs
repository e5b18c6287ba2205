use crate::audio::AudioFrame;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct PrescaleCells {
    left: AtomicU32,
    right: AtomicU32,
    range_multiplier: AtomicU32,
}

/// Per-channel gain shared between a mixer/UI thread (writer) and the audio
/// thread (reader). Each field is an independent relaxed atomic; a reader may
/// see a left/right pair from two different updates for one block.
#[derive(Debug, Clone)]
pub struct SharedPrescale {
    cells: Arc<PrescaleCells>,
}

impl SharedPrescale {
    pub fn new(levels: AudioFrame, range_multiplier: f32) -> Self {
        let prescale = Self {
            cells: Arc::new(PrescaleCells {
                left: AtomicU32::new(0),
                right: AtomicU32::new(0),
                range_multiplier: AtomicU32::new(0),
            }),
        };
        prescale.update_levels(levels, range_multiplier);
        prescale
    }

    pub fn unity() -> Self {
        Self::new(AudioFrame::splat(1.0), 1.0)
    }

    /// Stores `levels * range_multiplier` as the effective prescale.
    pub fn update_levels(&self, levels: AudioFrame, range_multiplier: f32) {
        let scaled = levels * range_multiplier;
        self.cells
            .range_multiplier
            .store(range_multiplier.to_bits(), Ordering::Relaxed);
        self.cells.left.store(scaled.left.to_bits(), Ordering::Relaxed);
        self.cells
            .right
            .store(scaled.right.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> AudioFrame {
        AudioFrame::new(
            f32::from_bits(self.cells.left.load(Ordering::Relaxed)),
            f32::from_bits(self.cells.right.load(Ordering::Relaxed)),
        )
    }

    pub fn range_multiplier(&self) -> f32 {
        f32::from_bits(self.cells.range_multiplier.load(Ordering::Relaxed))
    }
}

impl Default for SharedPrescale {
    fn default() -> Self {
        Self::unity()
    }
}
