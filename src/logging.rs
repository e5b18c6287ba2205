//! Logger setup for the binary and for tests that want log output.

use log::LevelFilter;

/// Level used when `RUST_LOG` is not set.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs the global logger at INFO, or DEBUG when `verbose`. The
/// RUST_LOG environment variable overrides the level. Later calls are
/// ignored.
pub fn init_logger(verbose: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level(verbose))
        .parse_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        })
        .try_init();
}
