//! Application state shared across all request handlers.

use std::sync::Arc;

use ordis_core::processors::{DispatchLauncher, EventIngestor};
use ordis_core::segment::AudienceSegmenter;
use ordis_core::store::{CampaignStore, DispatchStore};

use crate::config::runtime::SharedConfig;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Dispatch persistence port.
    pub dispatches: Arc<dyn DispatchStore>,
    /// Campaign read port.
    pub campaigns: Arc<dyn CampaignStore>,
    /// Creates dispatches for launch requests.
    pub launcher: Arc<DispatchLauncher>,
    /// Applies inbound provider events.
    pub ingestor: Arc<EventIngestor>,
    /// Narrows posted recipient sets before launch.
    pub segmenter: Arc<dyn AudienceSegmenter>,
    /// Runtime configuration (reloaded via SIGHUP).
    pub config: SharedConfig,
}
