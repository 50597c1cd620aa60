use patterncore_model::ScheduledMessage;

/// A polymorphic capability that transmits a batch of messages to one
/// destination. OSC and MIDI are the two built-in variants; the trait
/// exists so the [`crate::router::Router`] never needs to know which.
pub trait Sender: Send + Sync {
    fn send_batch(&self, messages: &[ScheduledMessage]);
    fn close(&self);
    fn name(&self) -> &str;
}
