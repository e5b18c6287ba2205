pub mod audio;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod synth;

#[cfg(feature = "native")]
pub mod input;
#[cfg(feature = "native")]
pub mod runtime;
