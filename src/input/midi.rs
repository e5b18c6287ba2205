use log::{debug, info, warn};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use std::error::Error;
use std::sync::mpsc::Sender;

/// One message from the MIDI input, as the synth consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Status byte in bits 0-7, data bytes in bits 8-15 and 16-23.
    Short(u32),
    /// Complete message including the 0xF0 and 0xF7 framing.
    Sysex(Vec<u8>),
}

impl MidiEvent {
    /// Classifies a raw message. Empty messages and system realtime bytes
    /// are dropped.
    pub fn from_bytes(message: &[u8]) -> Option<Self> {
        match message.first()? {
            0xF0 => Some(Self::Sysex(message.to_vec())),
            0xF8..=0xFF => None,
            _ => Some(Self::Short(pack_short_message(message))),
        }
    }
}

pub fn pack_short_message(message: &[u8]) -> u32 {
    message
        .iter()
        .take(3)
        .enumerate()
        .fold(0, |packed, (i, &byte)| packed | (byte as u32) << (8 * i))
}

pub struct MidiHandler {
    /// Holds the connection to keep it alive
    #[allow(dead_code)]
    connection: Option<MidiInputConnection<()>>,
}

impl MidiHandler {
    /// Connects to input port `port` (0 when `None`) and forwards its
    /// messages to `sender`. Without a usable port MIDI input is disabled.
    pub fn new(sender: Sender<MidiEvent>, port: Option<usize>) -> Self {
        match Self::try_new(sender, port.unwrap_or(0)) {
            Ok(handler) => handler,
            Err(e) => {
                warn!("Failed to initialize MIDI: {}. MIDI input will be disabled.", e);
                Self { connection: None }
            }
        }
    }

    fn try_new(sender: Sender<MidiEvent>, selection: usize) -> Result<Self, Box<dyn Error>> {
        let mut midi_in = MidiInput::new("dosmix input")?;
        midi_in.ignore(Ignore::TimeAndActiveSense);
        let port = Self::select_input_port(&midi_in, selection)?;
        let port_name = midi_in.port_name(&port)?;

        let connection = midi_in.connect(
            &port,
            "dosmix-read-input",
            move |_, message, _| {
                if let Some(event) = MidiEvent::from_bytes(message) {
                    if sender.send(event).is_err() {
                        debug!("MIDI event dropped, synth is gone");
                    }
                }
            },
            (),
        )?;

        info!("Opened MIDI port: {}", port_name);

        Ok(Self {
            connection: Some(connection),
        })
    }

    fn select_input_port(midi_in: &MidiInput, selection: usize) -> Result<MidiInputPort, Box<dyn Error>> {
        let in_ports = midi_in.ports();
        if in_ports.is_empty() {
            return Err("No MIDI input ports found".into());
        }

        info!("Available MIDI input ports:");
        for (i, port) in in_ports.iter().enumerate() {
            info!("{}: {}", i, midi_in.port_name(port)?);
        }

        let port = in_ports
            .get(selection)
            .ok_or("Invalid MIDI port selection")?
            .clone();

        Ok(port)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}
