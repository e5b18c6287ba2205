use super::BOUNDS;
use crate::audio::AudioFrame;

/// Positions found while scanning one channel of an interleaved block.
/// Indices address the interleaved buffer, not frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChannelScan {
    pub precross_peak: Option<usize>,
    pub zero_cross: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ScanState {
    prescale: f32,
    local_peak: f32,
    prev: Option<usize>,
    found: ChannelScan,
}

impl ScanState {
    fn new(prescale: f32, starting_peak: f32) -> Self {
        Self {
            prescale,
            local_peak: starting_peak,
            prev: None,
            found: ChannelScan::default(),
        }
    }

    #[inline]
    fn visit(&mut self, input: &[f32], pos: usize, global_peak: &mut f32) {
        let sample = input[pos];
        let val = sample.abs() * self.prescale;
        if val > BOUNDS && val > self.local_peak {
            self.local_peak = val;
            if self.found.zero_cross.is_none() {
                self.found.precross_peak = Some(pos);
            }
        }
        if val > *global_peak {
            *global_peak = val;
        }
        if self.found.zero_cross.is_none() {
            if let Some(prev) = self.prev {
                if input[prev].is_sign_negative() != sample.is_sign_negative() {
                    self.found.zero_cross = Some(pos);
                }
            }
        }
        self.prev = Some(pos);
    }
}

/// Single pass over `samples` interleaved values. Updates `global_peaks` and
/// returns the left and right scan results.
///
/// A local peak only registers when it beats the remembered global peak, so a
/// block that stays under an already-reduced level is handled by the plain
/// global-peak scale instead of a new join.
pub(crate) fn find_peaks_and_zero_crosses(
    input: &[f32],
    samples: usize,
    prescale: AudioFrame,
    global_peaks: &mut AudioFrame,
) -> (ChannelScan, ChannelScan) {
    let mut left = ScanState::new(prescale.left, global_peaks.left);
    let mut right = ScanState::new(prescale.right, global_peaks.right);

    let mut pos = 0;
    while pos < samples {
        left.visit(input, pos, &mut global_peaks.left);
        right.visit(input, pos + 1, &mut global_peaks.right);
        pos += 2;
    }
    (left.found, right.found)
}
