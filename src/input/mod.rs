mod midi;
pub use self::midi::{pack_short_message, MidiEvent, MidiHandler};
