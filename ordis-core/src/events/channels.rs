//! Event channel factories and handles.

use tokio::sync::mpsc;

use super::types::SendIntent;

/// Default buffer size for event channels.
///
/// Enough to absorb a launch burst while keeping memory bounded; a full
/// channel backpressures the launcher rather than dropping intents.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for SendIntent events.
pub type SendIntentSender = mpsc::Sender<SendIntent>;
/// Receiver handle for SendIntent events.
pub type SendIntentReceiver = mpsc::Receiver<SendIntent>;

/// Create a new SendIntent channel.
///
/// Multiple senders (launcher, escalation scheduler) can be cloned from the
/// returned sender; the OutboundSender owns the receiver.
pub fn send_intent_channel() -> (SendIntentSender, SendIntentReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
