use std::path::PathBuf;
use thiserror::Error;

/// Failure to bring the synth from closed to open. The synth stays closed.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("synth is already open")]
    AlreadyOpen,

    #[error("no control ROM found in {dir} (tried {tried})")]
    ControlRomMissing { dir: PathBuf, tried: String },

    #[error("no PCM ROM found in {dir} (tried {tried})")]
    PcmRomMissing { dir: PathBuf, tried: String },

    #[error("failed to read ROM {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control ROM has wrong size (expected at least {expected} bytes, got {actual})")]
    ControlRomSize { expected: usize, actual: usize },

    #[error("control ROM is not a known revision")]
    UnknownControlRom,

    #[error("PCM ROM has wrong size (expected {expected} bytes, got {actual})")]
    PcmRomSize { expected: usize, actual: usize },

    #[error("{table} ROM table at 0x{pos:04X} runs past the end of the image")]
    RomTableOutOfRange { table: &'static str, pos: usize },

    #[error("PCM wave {index} points to invalid PCM address 0x{addr:05X}, length 0x{len:04X}")]
    PcmWaveOutOfRange { index: usize, addr: usize, len: usize },

    #[error("timbre {timbre} at 0x{addr:04X} runs past the end of the control ROM")]
    TimbreOutOfRange { timbre: usize, addr: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T, E = OpenError> = std::result::Result<T, E>;
