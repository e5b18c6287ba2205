use crate::audio::AudioBackend;
use crate::runtime::NativeSynth;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use log::{error, info, warn};
use std::sync::{Arc, Mutex};

type BackendError = Box<dyn std::error::Error + Send + Sync>;

pub struct CpalBackend {
    stream: Option<Stream>,
    synth: Arc<Mutex<NativeSynth>>,
    sample_rate: u32,
}

impl CpalBackend {
    /// `sample_rate` must match the rate the synth renders at.
    pub fn new(synth: Arc<Mutex<NativeSynth>>, sample_rate: u32) -> Self {
        Self {
            stream: None,
            synth,
            sample_rate,
        }
    }

    fn select_output_device(&self, host: &cpal::Host) -> Result<cpal::Device, BackendError> {
        host.default_output_device()
            .ok_or_else(|| "No output device available".into())
    }

    fn build_stream(&mut self) -> Result<Stream, BackendError> {
        let host = cpal::default_host();
        let device = self.select_output_device(&host)?;
        info!("Selected device: {}", device.name().unwrap_or_default());

        let supported_config = device.default_output_config()?;
        let mut stream_config: cpal::StreamConfig = supported_config.clone().into();
        if stream_config.sample_rate.0 != self.sample_rate {
            warn!(
                "Device prefers {} Hz, requesting {} Hz",
                stream_config.sample_rate.0, self.sample_rate
            );
            stream_config.sample_rate = cpal::SampleRate(self.sample_rate);
        }

        let channels = stream_config.channels as usize;
        let synth = self.synth.clone();

        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match synth.lock() {
                    Ok(mut synth) => synth.process(data, channels),
                    Err(_) => data.fill(0.0),
                },
                |err| error!("Stream error: {}", err),
                None,
            )?,
            other => return Err(format!("Unsupported sample format {:?}", other).into()),
        };

        Ok(stream)
    }

    pub fn try_start(&mut self) -> Result<(), BackendError> {
        let stream = self.build_stream()?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioBackend for CpalBackend {
    fn start(&mut self) {
        if let Err(e) = self.try_start() {
            error!("Failed to start audio output: {}", e);
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to stop stream: {}", e);
            }
        }
    }
}
