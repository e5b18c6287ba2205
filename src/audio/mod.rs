#[cfg(feature = "native")]
mod cpal_backend;
#[cfg(feature = "native")]
pub use self::cpal_backend::CpalBackend;

use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A left/right sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub const fn splat(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Channel 0 is left, anything else is right.
    #[inline]
    pub fn channel(&self, channel: usize) -> f32 {
        if channel == 0 {
            self.left
        } else {
            self.right
        }
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut f32 {
        if channel == 0 {
            &mut self.left
        } else {
            &mut self.right
        }
    }

    pub fn max_channel(&self) -> f32 {
        self.left.max(self.right)
    }
}

impl Mul<f32> for AudioFrame {
    type Output = AudioFrame;

    fn mul(self, rhs: f32) -> AudioFrame {
        AudioFrame::new(self.left * rhs, self.right * rhs)
    }
}

pub trait AudioBackend {
    fn start(&mut self);
    fn stop(&mut self);
}
