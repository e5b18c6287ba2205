//! One-sample prerender ring and the six-stream output views.

pub const MAX_PRERENDER_SAMPLES: usize = 1024;
pub const STREAM_COUNT: usize = 6;

/// Output destinations of one render pass. Any stream may be absent.
#[derive(Default)]
pub struct Streams<'a> {
    pub non_reverb_left: Option<&'a mut [f32]>,
    pub non_reverb_right: Option<&'a mut [f32]>,
    pub reverb_dry_left: Option<&'a mut [f32]>,
    pub reverb_dry_right: Option<&'a mut [f32]>,
    pub reverb_wet_left: Option<&'a mut [f32]>,
    pub reverb_wet_right: Option<&'a mut [f32]>,
}

impl<'a> Streams<'a> {
    /// All six streams backed by `buffers`, each at least `len` long.
    pub fn from_buffers(buffers: &'a mut [Vec<f32>; STREAM_COUNT], len: usize) -> Self {
        let [nl, nr, dl, dr, wl, wr] = buffers;
        Self {
            non_reverb_left: Some(&mut nl[..len]),
            non_reverb_right: Some(&mut nr[..len]),
            reverb_dry_left: Some(&mut dl[..len]),
            reverb_dry_right: Some(&mut dr[..len]),
            reverb_wet_left: Some(&mut wl[..len]),
            reverb_wet_right: Some(&mut wr[..len]),
        }
    }

    pub(crate) fn slots(&mut self) -> [&mut Option<&'a mut [f32]>; STREAM_COUNT] {
        [
            &mut self.non_reverb_left,
            &mut self.non_reverb_right,
            &mut self.reverb_dry_left,
            &mut self.reverb_dry_right,
            &mut self.reverb_wet_left,
            &mut self.reverb_wet_right,
        ]
    }

    /// Reborrows the window `[from, from + len)` of every present stream.
    pub fn window(&mut self, from: usize, len: usize) -> Streams<'_> {
        fn sub<'b>(stream: &'b mut Option<&mut [f32]>, from: usize, len: usize) -> Option<&'b mut [f32]> {
            stream.as_deref_mut().map(|s| &mut s[from..from + len])
        }
        Streams {
            non_reverb_left: sub(&mut self.non_reverb_left, from, len),
            non_reverb_right: sub(&mut self.non_reverb_right, from, len),
            reverb_dry_left: sub(&mut self.reverb_dry_left, from, len),
            reverb_dry_right: sub(&mut self.reverb_dry_right, from, len),
            reverb_wet_left: sub(&mut self.reverb_wet_left, from, len),
            reverb_wet_right: sub(&mut self.reverb_wet_right, from, len),
        }
    }

    pub fn clear(&mut self) {
        for slot in self.slots() {
            if let Some(stream) = slot.as_deref_mut() {
                stream.fill(0.0);
            }
        }
    }
}

/// Fixed-capacity FIFO of prerendered single-sample frames.
///
/// Empty when the indices are equal, so one slot always stays unused.
#[derive(Debug, Clone)]
pub struct PrerenderRing {
    frames: Vec<[f32; STREAM_COUNT]>,
    read_index: usize,
    write_index: usize,
}

impl PrerenderRing {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PRERENDER_SAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 1);
        Self {
            frames: vec![[0.0; STREAM_COUNT]; capacity],
            read_index: 0,
            write_index: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read_index == self.write_index
    }

    pub fn is_full(&self) -> bool {
        (self.write_index + 1) % self.frames.len() == self.read_index
    }

    pub fn len(&self) -> usize {
        (self.write_index + self.frames.len() - self.read_index) % self.frames.len()
    }

    /// Appends a frame, or returns false without touching the ring when full.
    pub fn push(&mut self, frame: [f32; STREAM_COUNT]) -> bool {
        let next = (self.write_index + 1) % self.frames.len();
        if next == self.read_index {
            return false;
        }
        self.frames[self.write_index] = frame;
        self.write_index = next;
        true
    }

    /// Moves up to `len` frames into the front of `streams`, oldest first.
    /// Returns how many were copied. Indices rewind to 0 once drained.
    pub fn drain_into(&mut self, streams: &mut Streams<'_>, len: usize) -> usize {
        let mut copied = 0;
        // Wrapped part first, then the linear part.
        if self.write_index < self.read_index {
            let count = (self.frames.len() - self.read_index).min(len);
            self.copy_out(streams, copied, count);
            copied += count;
        }
        if copied < len && self.read_index < self.write_index {
            let count = (self.write_index - self.read_index).min(len - copied);
            self.copy_out(streams, copied, count);
            copied += count;
        }
        if self.is_empty() {
            self.read_index = 0;
            self.write_index = 0;
        }
        copied
    }

    fn copy_out(&mut self, streams: &mut Streams<'_>, at: usize, count: usize) {
        let from = self.read_index;
        for (channel, slot) in streams.slots().into_iter().enumerate() {
            if let Some(stream) = slot.as_deref_mut() {
                for (i, frame) in self.frames[from..from + count].iter().enumerate() {
                    stream[at + i] = frame[channel];
                }
            }
        }
        self.read_index = (self.read_index + count) % self.frames.len();
    }

    pub fn clear(&mut self) {
        self.read_index = 0;
        self.write_index = 0;
    }
}

impl Default for PrerenderRing {
    fn default() -> Self {
        Self::new()
    }
}
