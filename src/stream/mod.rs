//! Per-stream serialization point
//!
//! A [`StreamChannel`] owns one [`WindowLog`] together with the consumers
//! attached to it. Every operation on the stream takes the same lock, so an
//! append and its fan-out are atomic with respect to purge, reset, cursor
//! resolution and live registration.
//!
//! Consumers are in one of two sets while attached:
//!
//! - **live**: a bounded queue that receives each appended entry directly.
//!   If the queue is full the consumer is dropped from the set; it notices
//!   its queue closing, then replays from its own cursor and re-registers.
//! - **waiting**: a one-shot wake keyed by threshold window, fired by the
//!   first append whose window id reaches it.

mod registry;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::types::{LogEntry, Record, StreamId, WindowId};
use crate::window_log::{Cursor, LogStats, WindowLog};

pub use registry::StreamRegistry;

pub type SubscriberId = u64;

/// Result of attaching a consumer.
#[derive(Debug)]
pub enum Attach {
    /// Replay from this position.
    At(u64),
    /// Woken with the position of the first qualifying entry.
    Pending(oneshot::Receiver<u64>),
}

/// Result of one catch-up step.
#[derive(Debug)]
pub enum CatchUp {
    /// Entries still to deliver before the consumer reaches the tail.
    Batch(Vec<LogEntry>),
    /// The consumer is at the tail and now registered for live pushes.
    Live(mpsc::Receiver<LogEntry>),
}

/// Counters reported for one stream
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub stream: StreamId,
    #[serde(flatten)]
    pub log: LogStats,
    pub live_consumers: usize,
    pub pending_consumers: usize,
}

struct LiveSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<LogEntry>,
}

struct Waiter {
    id: SubscriberId,
    tx: oneshot::Sender<u64>,
}

#[derive(Default)]
struct StreamState {
    log: WindowLog,
    live: Vec<LiveSubscriber>,
    waiters: BTreeMap<WindowId, VecDeque<Waiter>>,
}

impl StreamState {
    fn append(&mut self, stream: &StreamId, record: Record) -> LogEntry {
        let entry = self.log.append(record);

        self.live.retain(|sub| match sub.tx.try_send(entry.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(
                    stream = %stream,
                    subscriber = sub.id,
                    position = entry.position,
                    "consumer queue full, falling back to replay"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        self.wake_waiters(&entry);
        entry
    }

    fn wake_waiters(&mut self, entry: &LogEntry) {
        match self.waiters.first_key_value() {
            Some((threshold, _)) if *threshold <= entry.window_id => {}
            _ => return,
        }
        let still_waiting = match entry.window_id.successor() {
            Some(next) => self.waiters.split_off(&next),
            None => BTreeMap::new(),
        };
        let woken = std::mem::replace(&mut self.waiters, still_waiting);
        for waiter in woken.into_values().flatten() {
            // A closed receiver means the consumer went away while waiting.
            let _ = waiter.tx.send(entry.position);
        }
    }

    fn pending_count(&self) -> usize {
        self.waiters.values().map(VecDeque::len).sum()
    }
}

/// One stream's log plus its attached consumers.
pub struct StreamChannel {
    id: StreamId,
    state: Mutex<StreamState>,
    next_subscriber: AtomicU64,
}

impl StreamChannel {
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            state: Mutex::new(StreamState::default()),
            next_subscriber: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Allocates an id for a consumer session on this stream.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.next_subscriber.fetch_add(1, Ordering::Relaxed)
    }

    /// Appends a record and fans it out to live and waiting consumers.
    pub fn publish(&self, record: Record) -> LogEntry {
        self.state.lock().append(&self.id, record)
    }

    /// Appends records in order under a single lock acquisition.
    pub fn publish_batch(&self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for record in records {
            state.append(&self.id, record);
            count += 1;
        }
        count
    }

    /// Resolves a consumer's threshold, registering it in the wait set when
    /// nothing qualifying has been appended yet.
    pub fn attach(&self, subscriber: SubscriberId, threshold: WindowId) -> Attach {
        let mut state = self.state.lock();
        match state.log.resolve_cursor(threshold) {
            Cursor::At(position) => Attach::At(position),
            Cursor::Pending => {
                let (tx, rx) = oneshot::channel();
                state
                    .waiters
                    .entry(threshold)
                    .or_default()
                    .push_back(Waiter { id: subscriber, tx });
                Attach::Pending(rx)
            }
        }
    }

    /// Reads up to `limit` entries from `from`; at the tail, registers the
    /// consumer for live pushes through a queue of `queue_capacity`.
    pub fn catch_up(
        &self,
        subscriber: SubscriberId,
        from: u64,
        limit: usize,
        queue_capacity: usize,
    ) -> CatchUp {
        let mut state = self.state.lock();
        let batch = state.log.read_from(from, limit);
        if !batch.is_empty() {
            return CatchUp::Batch(batch);
        }
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        state.live.push(LiveSubscriber { id: subscriber, tx });
        CatchUp::Live(rx)
    }

    /// Forgets a consumer in either set.
    pub fn detach(&self, subscriber: SubscriberId) {
        let mut state = self.state.lock();
        state.live.retain(|sub| sub.id != subscriber);
        state.waiters.retain(|_, queue| {
            queue.retain(|w| w.id != subscriber);
            !queue.is_empty()
        });
    }

    pub fn purge(&self, threshold: WindowId) -> usize {
        let removed = self.state.lock().log.purge(threshold);
        info!(stream = %self.id, threshold = %threshold, removed, "purged window log");
        removed
    }

    pub fn reset(&self) -> usize {
        let removed = self.state.lock().log.reset();
        info!(stream = %self.id, removed, "reset window log");
        removed
    }

    /// Runs `f` against a consistent view of the log.
    pub fn with_log<R>(&self, f: impl FnOnce(&WindowLog) -> R) -> R {
        f(&self.state.lock().log)
    }

    pub fn stats(&self) -> StreamStats {
        let state = self.state.lock();
        StreamStats {
            stream: self.id.clone(),
            log: state.log.stats(),
            live_consumers: state.live.len(),
            pending_consumers: state.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> StreamChannel {
        StreamChannel::new(StreamId::from("test"))
    }

    fn live(channel: &StreamChannel, sub: SubscriberId, from: u64, capacity: usize) -> mpsc::Receiver<LogEntry> {
        match channel.catch_up(sub, from, 16, capacity) {
            CatchUp::Live(rx) => rx,
            CatchUp::Batch(batch) => panic!("expected live, got {} entries", batch.len()),
        }
    }

    #[test]
    fn test_live_consumer_receives_appends_in_order() {
        let channel = channel();
        let mut rx = live(&channel, 1, 0, 8);

        channel.publish(Record::begin(0));
        channel.publish(Record::payload(0, &b"a"[..]));
        channel.publish(Record::end(0));

        let positions: Vec<u64> = (0..3).map(|_| rx.try_recv().unwrap().position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_attach_on_empty_stream_waits() {
        let channel = channel();
        let sub = channel.subscriber_id();
        let Attach::Pending(mut rx) = channel.attach(sub, WindowId::ZERO) else {
            panic!("empty stream must not resolve");
        };
        assert!(rx.try_recv().is_err());
        assert_eq!(channel.stats().pending_consumers, 1);

        channel.publish(Record::begin(0));
        assert_eq!(rx.try_recv().unwrap(), 0);
        assert_eq!(channel.stats().pending_consumers, 0);
    }

    #[test]
    fn test_waiter_woken_only_at_threshold() {
        let channel = channel();
        let Attach::Pending(mut rx) = channel.attach(1, WindowId::new(0, 2)) else {
            panic!("expected pending");
        };

        for w in 0..2 {
            channel.publish(Record::begin(w));
            channel.publish(Record::end(w));
        }
        assert!(rx.try_recv().is_err());

        let entry = channel.publish(Record::begin(2));
        assert_eq!(rx.try_recv().unwrap(), entry.position);
    }

    #[test]
    fn test_equal_thresholds_woken_together_in_fifo_order() {
        let channel = channel();
        let mut receivers = Vec::new();
        for sub in 1..=3 {
            match channel.attach(sub, WindowId::new(0, 1)) {
                Attach::Pending(rx) => receivers.push(rx),
                Attach::At(_) => panic!("expected pending"),
            }
        }
        let entry = channel.publish(Record::begin(5));
        for mut rx in receivers {
            assert_eq!(rx.try_recv().unwrap(), entry.position);
        }
    }

    #[test]
    fn test_full_queue_demotes_without_loss() {
        let channel = channel();
        let mut rx = live(&channel, 7, 0, 2);

        for seq in 0..5 {
            channel.publish(Record::begin(seq));
        }
        assert_eq!(channel.stats().live_consumers, 0);

        let mut seen = Vec::new();
        while let Some(entry) = rx.blocking_recv() {
            seen.push(entry.position);
        }
        assert_eq!(seen, vec![0, 1]);

        let next = seen.last().map_or(0, |p| p + 1);
        match channel.catch_up(7, next, 16, 2) {
            CatchUp::Batch(batch) => {
                let rest: Vec<u64> = batch.iter().map(|e| e.position).collect();
                assert_eq!(rest, vec![2, 3, 4]);
            }
            CatchUp::Live(_) => panic!("missed entries"),
        }
        let _rx = live(&channel, 7, 5, 2);
        assert_eq!(channel.stats().live_consumers, 1);
    }

    #[test]
    fn test_detach_releases_both_sets() {
        let channel = channel();
        let _live = live(&channel, 1, 0, 4);
        let _pending = channel.attach(2, WindowId::new(9, 9));
        assert_eq!(channel.stats().live_consumers, 1);
        assert_eq!(channel.stats().pending_consumers, 1);

        channel.detach(1);
        channel.detach(2);
        let stats = channel.stats();
        assert_eq!(stats.live_consumers, 0);
        assert_eq!(stats.pending_consumers, 0);
    }

    #[test]
    fn test_dropped_live_receiver_is_pruned_on_append() {
        let channel = channel();
        drop(live(&channel, 1, 0, 4));
        channel.publish(Record::begin(0));
        assert_eq!(channel.stats().live_consumers, 0);
    }

    #[test]
    fn test_publish_batch_counts() {
        let channel = channel();
        let n = channel.publish_batch(vec![Record::begin(0), Record::payload(1, &b"p"[..]), Record::end(0)]);
        assert_eq!(n, 3);
        assert_eq!(channel.with_log(|log| log.len()), 3);
    }
}
