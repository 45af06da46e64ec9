//! Authoritative table of streams

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{StreamChannel, StreamStats};
use crate::types::StreamId;

/// Maps each stream id to its channel.
///
/// Channels are created on first reference by a producer or consumer and
/// are never removed by the server itself.
#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamId, Arc<StreamChannel>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an existing stream without creating it.
    pub fn get(&self, id: &str) -> Option<Arc<StreamChannel>> {
        self.streams.read().get(id).cloned()
    }

    pub fn get_or_create(&self, id: &StreamId) -> Arc<StreamChannel> {
        if let Some(channel) = self.get(id.as_str()) {
            return channel;
        }
        let mut streams = self.streams.write();
        streams
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(stream = %id, "creating window log");
                Arc::new(StreamChannel::new(id.clone()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stats for every stream, sorted by id.
    pub fn stats(&self) -> Vec<StreamStats> {
        let channels: Vec<Arc<StreamChannel>> = self.streams.read().values().cloned().collect();
        let mut stats: Vec<StreamStats> = channels.iter().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.stream.cmp(&b.stream));
        stats
    }
}
