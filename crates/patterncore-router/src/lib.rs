//! Destination routing and the OSC/MIDI senders that carry scheduled
//! messages to the outside world.

mod error;
mod midi;
mod osc;
mod router;
mod sender;

pub use error::{Result, SenderError};
pub use midi::MidiSender;
pub use osc::OscSender;
pub use router::Router;
pub use sender::Sender;
