use anyhow::Context;
use clap::Parser;
use dosmix::config::Config;
use dosmix::logging::init_logger;
use dosmix::runtime::native;
use std::path::PathBuf;

/// MT-32 emulation with a soft-limited output channel.
#[derive(Debug, Parser)]
#[command(name = "dosmix", version, about)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the control and PCM ROMs
    #[arg(long)]
    romdir: Option<PathBuf>,

    /// Index of the MIDI input port to open
    #[arg(long)]
    midi_port: Option<usize>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(romdir) = args.romdir {
        config.mt32.romdir = romdir;
    }
    config.mt32.verbose |= args.verbose;

    init_logger(config.mt32.verbose);
    native::start(&config, args.midi_port)
}
