//! Store event channel.
//!
//! Every authoritative write publishes a [`StoreEvent`]. The graph syncer and
//! the scheduler subscribe to it; the store itself never waits on them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted after a store write commits.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A connection was created or changed status.
    ConnectionUpserted { tenant_id: String, connection_id: String },
    /// A vertex was deactivated and should lose its mirrored relationships.
    VertexRetired { tenant_id: String, vertex_id: String },
    /// An actor's baseline risk score was refreshed.
    BaselineUpdated { tenant_id: String, actor_id: String },
}

impl StoreEvent {
    /// Tenant the event belongs to.
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::ConnectionUpserted { tenant_id, .. }
            | Self::VertexRetired { tenant_id, .. }
            | Self::BaselineUpdated { tenant_id, .. } => tenant_id,
        }
    }
}

/// Type alias for the event sender.
pub type EventSender = broadcast::Sender<StoreEvent>;

/// Type alias for the event receiver.
pub type EventReceiver = broadcast::Receiver<StoreEvent>;

/// Create a new event channel with default capacity.
pub fn create_event_channel() -> EventSender {
    let (tx, _rx) = broadcast::channel(256);
    tx
}
