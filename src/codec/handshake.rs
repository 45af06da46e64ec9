//! Session handshake and acknowledgment frames

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StreamId, WindowId};

/// First frame sent by a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub stream_id: StreamId,
    pub identity: Option<String>,
}

impl PublishRequest {
    pub fn new(stream_id: impl Into<StreamId>) -> Self {
        Self {
            stream_id: stream_id.into(),
            identity: None,
        }
    }
}

/// Restricts which payloads a consumer receives.
///
/// A payload passes when `partition_key & mask` is one of `keys`. Window
/// and reset records always pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFilter {
    pub mask: u32,
    pub keys: Vec<u32>,
}

impl PartitionFilter {
    pub fn new(mask: u32, keys: impl IntoIterator<Item = u32>) -> Self {
        Self {
            mask,
            keys: keys.into_iter().collect(),
        }
    }

    pub fn admits(&self, partition_key: u32) -> bool {
        self.keys.contains(&(partition_key & self.mask))
    }
}

/// First frame sent by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub stream_id: StreamId,
    /// Earliest window to deliver; zero replays everything retained.
    pub threshold: WindowId,
    /// Opaque caller identity, only echoed in logs.
    pub identity: Option<String>,
    pub partitions: Option<PartitionFilter>,
}

impl SubscribeRequest {
    pub fn new(stream_id: impl Into<StreamId>, threshold: WindowId) -> Self {
        Self {
            stream_id: stream_id.into(),
            threshold,
            identity: None,
            partitions: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_partitions(mut self, filter: PartitionFilter) -> Self {
        self.partitions = Some(filter);
        self
    }
}

/// First frame sent by an administrator; followed by one purge or wipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub stream_id: StreamId,
}

/// Reply to an administrative request. The marker is opaque on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub marker: Bytes,
}

impl Ack {
    /// Decodes the marker as written by this server.
    pub fn decode_marker(&self) -> Result<AckMarker, serde_json::Error> {
        serde_json::from_slice(&self.marker)
    }
}

/// Administrative operation named in an [`AckMarker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminOp {
    Purge,
    Reset,
}

/// Completion marker the server writes into an [`Ack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckMarker {
    pub op: AdminOp,
    pub stream: StreamId,
    /// Entries removed; zero when the stream had no log.
    pub removed: u64,
    pub completed_at: DateTime<Utc>,
}

impl AckMarker {
    pub fn new(op: AdminOp, stream: StreamId, removed: u64) -> Self {
        Self {
            op,
            stream,
            removed,
            completed_at: Utc::now(),
        }
    }

    pub fn into_ack(self) -> Result<Ack, serde_json::Error> {
        Ok(Ack {
            marker: Bytes::from(serde_json::to_vec(&self)?),
        })
    }
}
