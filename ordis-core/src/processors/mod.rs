//! Processors for the dispatch pipeline.
//!
//! - `DispatchLauncher`: creates dispatches for a campaign's recipients,
//!   emits `SendIntent`
//! - `OutboundSender`: receives `SendIntent`, calls the channel gateway,
//!   records acceptance as `queued → sent`
//! - `EventIngestor`: receives provider delivery events, applies the
//!   normalized status to the matching dispatch
//! - `EscalationScheduler`: periodically advances stalled dispatches to the
//!   next channel or fails exhausted ones

pub mod escalation;
pub mod ingestor;
pub mod launcher;
pub mod outbound;

pub use escalation::{EscalationScheduler, PassError, PassSummary};
pub use ingestor::{EventIngestor, InboundEvent, IngestError, IngestOutcome};
pub use launcher::{DispatchLauncher, LaunchError, LaunchResult};
pub use outbound::{ChannelGateway, GatewayError, HttpChannelGateway, OutboundSender};
