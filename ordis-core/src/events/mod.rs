//! Events connecting the dispatch pipeline's processors.

mod channels;
mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, SendIntentReceiver, SendIntentSender, send_intent_channel};
pub use types::SendIntent;
