use crate::audio::{AudioBackend, CpalBackend};
use crate::config::{Config, Mt32Config};
use crate::error::OpenError;
use crate::input::{MidiEvent, MidiHandler};
use crate::limiter::SoftLimiter;
use crate::synth::sysex::data_set_message;
use crate::synth::Synth;
use anyhow::Context;
use log::{debug, info};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};

/// System area address of the reverb mode, time and level bytes.
const REVERB_MODE_SYSEX_ADDR: u32 = 0x100001;

/// Synth, limiter and MIDI feed as driven by the audio callback.
pub struct NativeSynth {
    synth: Synth,
    limiter: SoftLimiter,
    midi_receiver: Receiver<MidiEvent>,
    reverse_stereo: bool,
    render_buffer: Vec<f32>,
    pcm_buffer: Vec<i16>,
}

impl NativeSynth {
    pub fn new(synth: Synth, limiter: SoftLimiter, midi_receiver: Receiver<MidiEvent>, reverse_stereo: bool) -> Self {
        Self {
            synth,
            limiter,
            midi_receiver,
            reverse_stereo,
            render_buffer: Vec::new(),
            pcm_buffer: Vec::new(),
        }
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut Synth {
        &mut self.synth
    }

    pub fn limiter(&self) -> &SoftLimiter {
        &self.limiter
    }

    /// Fills interleaved `output` of `channels` channels. Channel 0 gets the
    /// left signal, every other channel the right.
    pub fn process(&mut self, output: &mut [f32], channels: usize) {
        self.process_midi_events();
        let channels = channels.max(1);
        let frames = output.len() / channels;
        let max_frames = self.limiter.max_frames();
        let mut done = 0;
        while done < frames {
            let this_len = (frames - done).min(max_frames);
            self.render_limited(this_len);
            let out = &mut output[done * channels..(done + this_len) * channels];
            for (frame, samples) in out.chunks_mut(channels).zip(self.pcm_buffer.chunks(2)) {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    let value = if channel == 0 { samples[0] } else { samples[1] };
                    *sample = value as f32 / 32768.0;
                }
            }
            done += this_len;
        }
    }

    fn render_limited(&mut self, frames: usize) {
        self.render_buffer.resize(frames * 2, 0.0);
        self.pcm_buffer.resize(frames * 2, 0);
        self.synth.render_float(&mut self.render_buffer);
        if self.reverse_stereo {
            for frame in self.render_buffer.chunks_mut(2) {
                frame.swap(0, 1);
            }
        }
        self.limiter.process_into(&self.render_buffer, frames, &mut self.pcm_buffer);
    }

    fn process_midi_events(&mut self) {
        while let Ok(event) = self.midi_receiver.try_recv() {
            match event {
                MidiEvent::Short(msg) => self.synth.play_msg(msg),
                MidiEvent::Sysex(data) => self.synth.play_sysex(&data),
            }
        }
    }

    pub fn print_stats(&self) {
        self.limiter.print_stats();
        self.synth.print_partial_usage();
    }
}

/// Opens a synth from the configured ROM directory and applies the
/// configured output settings.
pub fn open_synth(config: &Mt32Config) -> Result<Synth, OpenError> {
    let mut synth = Synth::new(config.synth_properties());
    synth.open_from_dir(&config.romdir)?;
    synth.set_dac_input_mode(config.dac_mode());
    synth.set_output_gain(config.output_gain);
    synth.set_reverb_output_gain(config.effective_reverb_output_gain());
    if let Some(mode) = config.reverb_mode {
        let message = data_set_message(0x10, REVERB_MODE_SYSEX_ADDR, &[mode, config.reverb_time, config.reverb_level]);
        synth.play_sysex(&message);
        synth.set_reverb_overridden(true);
        debug!("Reverb fixed at mode {}, time {}, level {}", mode, config.reverb_time, config.reverb_level);
    }
    info!(
        "MT32: {} ready at {} Hz with {} partials",
        synth.control_rom_name().unwrap_or("ROM"),
        config.sample_rate,
        synth.partial_limit()
    );
    Ok(synth)
}

/// Runs the synth on the default output device until Enter is pressed.
pub fn start(config: &Config, midi_port: Option<usize>) -> anyhow::Result<()> {
    let synth = open_synth(&config.mt32)
        .with_context(|| format!("failed to open MT-32 ROMs in {}", config.mt32.romdir.display()))?;

    let limiter = SoftLimiter::new(&config.mixer.channel_name, config.mixer.max_frames);
    limiter.update_levels(config.mixer.levels, config.mixer.range_multiplier);

    let (midi_tx, midi_rx) = channel();
    let native = Arc::new(Mutex::new(NativeSynth::new(synth, limiter, midi_rx, config.mt32.reverse_stereo)));

    let mut audio_backend = CpalBackend::new(native.clone(), config.mt32.sample_rate);
    audio_backend.try_start().map_err(|e| anyhow::anyhow!("failed to start audio output: {}", e))?;

    let midi_handler = MidiHandler::new(midi_tx, midi_port);
    if !midi_handler.is_connected() {
        info!("Running without MIDI input");
    }

    info!("Press Enter to quit");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).context("failed to read stdin")?;

    audio_backend.stop();
    drop(midi_handler);
    match native.lock() {
        Ok(native) => native.print_stats(),
        Err(poisoned) => poisoned.into_inner().print_stats(),
    }
    Ok(())
}
