//! MT-32 compatible synthesiser: ROM loading, parameter memory and sysex,
//! parts and the partial pool, reverb and the stream render pipeline.

mod core;
pub mod dac;
pub mod envelope;
pub mod lfo;
pub mod memory;
pub mod part;
pub mod partial;
pub mod prerender;
pub mod reverb;
pub mod rom;
pub mod sysex;
pub mod timbre;

pub use self::core::{
    LogReportHandler, ReportHandler, Synth, SynthProperties, DEFAULT_OUTPUT_GAIN, DEFAULT_REVERB_OUTPUT_GAIN,
    DEFAULT_SAMPLE_RATE, MAX_SAMPLES_PER_RUN,
};
pub use self::dac::DacInputMode;
pub use self::prerender::{Streams, MAX_PRERENDER_SAMPLES};
pub use self::reverb::ReverbMode;
