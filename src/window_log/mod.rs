//! Window Log - retained history of one stream
//!
//! A flat, append-ordered sequence of [`LogEntry`] values, each tagged with
//! the window it belongs to, plus an index from window id to the position of
//! that window's BeginWindow entry.
//!
//! # Retention
//!
//! ```text
//!   purge(w1):   [R e0] [B w0 .. E w0] [B w1 .. E w1] [B w2 ..]
//!                  \_ kept as epoch context   removed    retained
//! ```
//!
//! Purge drops every entry whose window id is at or below the threshold but
//! keeps the newest dropped Reset so that replay still starts with the right
//! epoch. Reset drops everything.

mod stats;

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::types::{LogEntry, Record, WindowId};

pub use stats::LogStats;

/// Where a consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Deliver every retained entry with position at or above this one.
    At(u64),
    /// Nothing at or above the threshold has been appended yet.
    Pending,
}

/// Append-only, window-indexed log for one stream.
#[derive(Debug, Default)]
pub struct WindowLog {
    entries: VecDeque<LogEntry>,
    /// Reset entry kept by purge; always older than every entry in `entries`.
    epoch_context: Option<LogEntry>,
    /// BeginWindow position by window id
    index: BTreeMap<WindowId, u64>,
    epoch: u32,
    sequence: u32,
    open_window: Option<WindowId>,
    /// Positions are never reused, not even across `reset`.
    next_position: u64,
    /// Set once an entry's window id is lower than its predecessor's; lookups
    /// fall back to linear scans.
    unordered: bool,
}

impl WindowLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained entries, counting a retained epoch context.
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.leading_context().is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_position(&self) -> u64 {
        self.next_position
    }

    /// Window the next Payload would be assigned to.
    pub fn current_window(&self) -> WindowId {
        WindowId::new(self.epoch, self.sequence)
    }

    /// Window that has seen BeginWindow but not yet EndWindow.
    pub fn open_window(&self) -> Option<WindowId> {
        self.open_window
    }

    /// Position of the BeginWindow entry for `window`, if retained.
    pub fn begin_position(&self, window: WindowId) -> Option<u64> {
        self.index.get(&window).copied()
    }

    pub fn epoch_context(&self) -> Option<&LogEntry> {
        self.leading_context()
    }

    /// Retained entries in position order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.leading_context().into_iter().chain(self.entries.iter())
    }

    /// The epoch context, when it precedes every retained entry.
    fn leading_context(&self) -> Option<&LogEntry> {
        self.epoch_context.as_ref().filter(|context| {
            self.entries
                .front()
                .map_or(true, |first| context.position < first.position)
        })
    }

    /// Appends a record, assigning its window id from the log's epoch and
    /// sequence state.
    pub fn append(&mut self, record: Record) -> LogEntry {
        let window_id = match &record {
            Record::Reset { epoch, .. } => {
                self.epoch = *epoch;
                self.sequence = 0;
                self.open_window = None;
                WindowId::new(*epoch, 0)
            }
            Record::BeginWindow { sequence } => {
                self.sequence = *sequence;
                let id = WindowId::new(self.epoch, *sequence);
                self.open_window = Some(id);
                id
            }
            Record::Payload { .. } => self.current_window(),
            Record::EndWindow { sequence } => {
                let id = self.current_window();
                if *sequence != self.sequence {
                    trace!(window = %id, end_sequence = sequence, "end window does not match open window");
                }
                if self.open_window == Some(id) {
                    self.open_window = None;
                }
                id
            }
        };

        if self.entries.back().is_some_and(|last| window_id < last.window_id) {
            self.unordered = true;
        }

        let position = self.next_position;
        self.next_position += 1;

        if matches!(record, Record::BeginWindow { .. }) {
            self.index.entry(window_id).or_insert(position);
        }

        let entry = LogEntry {
            record,
            window_id,
            position,
        };
        self.entries.push_back(entry.clone());
        entry
    }

    /// Removes every entry with window id at or below `threshold`.
    ///
    /// The newest removed Reset that is older than every surviving entry
    /// becomes the epoch context, unless the oldest survivor is itself a
    /// Reset. Returns the number of entries that left the log.
    pub fn purge(&mut self, threshold: WindowId) -> usize {
        let before = self.len();
        let mut newest_reset = None;

        if self.unordered {
            let mut kept = VecDeque::with_capacity(self.entries.len());
            let mut removed_resets = Vec::new();
            for entry in std::mem::take(&mut self.entries) {
                if entry.window_id > threshold {
                    kept.push_back(entry);
                } else if entry.record.is_reset() {
                    removed_resets.push(entry);
                }
            }
            // Only a Reset older than every survivor can lead the replay.
            let first_kept = kept.front().map_or(u64::MAX, |e| e.position);
            newest_reset = removed_resets
                .into_iter()
                .filter(|e| e.position < first_kept)
                .last();
            self.entries = kept;
        } else {
            let cut = self.entries.partition_point(|e| e.window_id <= threshold);
            newest_reset = self.entries.drain(..cut).filter(|e| e.record.is_reset()).last();
        }

        if newest_reset.is_some() {
            self.epoch_context = newest_reset;
        }
        if self.entries.front().is_some_and(|e| e.record.is_reset()) {
            self.epoch_context = None;
        }

        match threshold.successor() {
            Some(next) => self.index = self.index.split_off(&next),
            None => self.index.clear(),
        }
        if self.entries.is_empty() {
            self.unordered = false;
        }

        before - self.len()
    }

    /// Drops every entry, the index and the epoch context.
    pub fn reset(&mut self) -> usize {
        let removed = self.len();
        self.entries.clear();
        self.epoch_context = None;
        self.index.clear();
        self.epoch = 0;
        self.sequence = 0;
        self.open_window = None;
        self.unordered = false;
        removed
    }

    /// Finds where a consumer asking for `threshold` starts.
    pub fn resolve_cursor(&self, threshold: WindowId) -> Cursor {
        let Some(first) = self.iter().next() else {
            return Cursor::Pending;
        };
        if threshold <= first.window_id {
            return Cursor::At(0);
        }

        let found = if self.unordered {
            self.entries.iter().find(|e| e.window_id >= threshold)
        } else {
            let i = self.entries.partition_point(|e| e.window_id < threshold);
            self.entries.get(i)
        };

        match found {
            Some(entry) => Cursor::At(entry.position),
            None => Cursor::Pending,
        }
    }

    /// Copies up to `limit` retained entries with position at or above
    /// `position`, oldest first.
    pub fn read_from(&self, position: u64, limit: usize) -> Vec<LogEntry> {
        let mut out = Vec::new();
        if limit == 0 {
            return out;
        }
        if let Some(context) = self.leading_context() {
            if context.position >= position {
                out.push(context.clone());
            }
        }
        let start = self.entries.partition_point(|e| e.position < position);
        let remaining = limit - out.len();
        out.extend(self.entries.range(start..).take(remaining).cloned());
        out
    }

    pub fn stats(&self) -> LogStats {
        let mut stats = LogStats {
            entries: self.len(),
            windows: self.index.len(),
            first_window: self.index.keys().next().copied(),
            last_window: self.index.keys().next_back().copied(),
            open_window: self.open_window,
            epoch: self.epoch,
            next_position: self.next_position,
            epoch_context: self.leading_context().is_some(),
            ..Default::default()
        };
        for entry in self.iter() {
            *stats.entries_by_kind.entry(entry.record.kind()).or_insert(0) += 1;
            if let Record::Payload { data, .. } = &entry.record {
                stats.payload_bytes += data.len();
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;

    const EPOCH: u32 = 0x7afe_babe;

    fn publish_window(log: &mut WindowLog, sequence: u32, payloads: usize) {
        log.append(Record::begin(sequence));
        for i in 0..payloads {
            log.append(Record::payload(0, vec![i as u8]));
        }
        log.append(Record::end(sequence));
    }

    /// Reset + two windows of 100 payloads each.
    fn two_window_log() -> WindowLog {
        let mut log = WindowLog::new();
        log.append(Record::reset(EPOCH));
        publish_window(&mut log, 0, 100);
        publish_window(&mut log, 1, 100);
        log
    }

    fn replay_all(log: &WindowLog, threshold: WindowId) -> Vec<LogEntry> {
        match log.resolve_cursor(threshold) {
            Cursor::At(position) => log.read_from(position, usize::MAX),
            Cursor::Pending => Vec::new(),
        }
    }

    fn data_records(entries: &[LogEntry]) -> usize {
        entries.iter().filter(|e| !e.record.is_reset()).count()
    }

    #[test]
    fn test_window_ids_follow_reset_and_begin() {
        let mut log = WindowLog::new();
        let reset = log.append(Record::reset(EPOCH));
        let begin = log.append(Record::begin(4));
        let payload = log.append(Record::payload(1, &b"x"[..]));
        let end = log.append(Record::end(4));

        assert_eq!(reset.window_id, WindowId::new(EPOCH, 0));
        assert_eq!(begin.window_id, WindowId::new(EPOCH, 4));
        assert_eq!(payload.window_id, begin.window_id);
        assert_eq!(end.window_id, begin.window_id);
        assert_eq!(
            [reset.position, begin.position, payload.position, end.position],
            [0, 1, 2, 3]
        );
        assert_eq!(log.begin_position(WindowId::new(EPOCH, 4)), Some(1));
    }

    #[test]
    fn test_open_window_payloads_visible() {
        let mut log = WindowLog::new();
        log.append(Record::begin(0));
        log.append(Record::payload(0, &b"a"[..]));

        assert_eq!(log.open_window(), Some(WindowId::new(0, 0)));
        assert_eq!(replay_all(&log, WindowId::ZERO).len(), 2);

        log.append(Record::end(0));
        assert_eq!(log.open_window(), None);
    }

    #[test]
    fn test_replay_starts_with_reset() {
        let mut log = WindowLog::new();
        log.append(Record::reset(EPOCH));

        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(replay.len(), 1);
        assert!(replay[0].record.is_reset());
    }

    #[test]
    fn test_full_accounting() {
        let log = two_window_log();
        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(data_records(&replay), 204);
        assert!(replay[0].record.is_reset());
    }

    #[test]
    fn test_purge_prefix_keeps_epoch_context() {
        let mut log = two_window_log();
        let removed = log.purge(WindowId::new(EPOCH, 0));
        assert_eq!(removed, 102);

        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(data_records(&replay), 102);
        assert!(replay[0].record.is_reset());
        assert_eq!(replay[1].record, Record::begin(1));
        assert_eq!(log.begin_position(WindowId::new(EPOCH, 0)), None);
        assert!(log.begin_position(WindowId::new(EPOCH, 1)).is_some());
    }

    #[test]
    fn test_purge_everything_leaves_only_context() {
        let mut log = two_window_log();
        log.purge(WindowId::new(EPOCH, 0));
        log.purge(WindowId::new(EPOCH, 1));

        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].record, Record::reset(EPOCH));
        assert!(log.stats().epoch_context);
    }

    #[test]
    fn test_purge_below_retained_history_is_noop() {
        let mut log = two_window_log();
        let before: Vec<_> = log.iter().cloned().collect();

        assert_eq!(log.purge(WindowId::ZERO), 0);
        assert_eq!(log.iter().cloned().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_purge_is_idempotent() {
        let mut once = two_window_log();
        once.purge(WindowId::new(EPOCH, 0));

        let mut twice = two_window_log();
        twice.purge(WindowId::new(EPOCH, 0));
        assert_eq!(twice.purge(WindowId::new(EPOCH, 0)), 0);

        assert_eq!(
            once.iter().cloned().collect::<Vec<_>>(),
            twice.iter().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_purge_drops_superseded_context() {
        let mut log = WindowLog::new();
        log.append(Record::reset(1));
        publish_window(&mut log, 0, 1);
        log.append(Record::reset(2));
        publish_window(&mut log, 0, 1);

        log.purge(WindowId::new(1, 0));
        // The epoch 2 reset is still retained, so the epoch 1 reset is not.
        assert!(log.epoch_context().is_none());
        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(replay[0].record, Record::reset(2));
        assert_eq!(replay.len(), 4);
    }

    #[test]
    fn test_reset_wipes_everything() {
        let mut log = two_window_log();
        assert_eq!(log.reset(), 205);
        assert!(log.is_empty());
        assert_eq!(log.resolve_cursor(WindowId::ZERO), Cursor::Pending);
        assert_eq!(log.reset(), 0);
        assert!(log.is_empty());
        assert_eq!(log.current_window(), WindowId::ZERO);
    }

    #[test]
    fn test_positions_survive_reset() {
        let mut log = two_window_log();
        let next = log.next_position();
        log.reset();
        let entry = log.append(Record::begin(0));
        assert_eq!(entry.position, next);
    }

    #[test]
    fn test_resolve_mid_history() {
        let mut log = WindowLog::new();
        for w in 0..10 {
            publish_window(&mut log, w, 1);
        }

        assert_eq!(log.resolve_cursor(WindowId::ZERO), Cursor::At(0));
        assert_eq!(log.resolve_cursor(WindowId::new(0, 4)), Cursor::At(12));
        assert_eq!(log.resolve_cursor(WindowId::new(0, 10)), Cursor::Pending);

        let replay = replay_all(&log, WindowId::new(0, 4));
        assert_eq!(replay.len(), 18);
        assert_eq!(replay[0].record, Record::begin(4));
    }

    #[test]
    fn test_lower_window_republish_accumulates() {
        let mut log = two_window_log();
        log.append(Record::reset(10));
        publish_window(&mut log, 0, 2);
        publish_window(&mut log, 1, 2);

        // Epoch 10 sorts below the epoch already in the log; both are kept.
        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(data_records(&replay), 204 + 8);
        assert_eq!(log.resolve_cursor(WindowId::new(10, 1)), Cursor::At(0));
        assert_eq!(
            log.resolve_cursor(WindowId::new(EPOCH, 1)),
            Cursor::At(103)
        );

        assert_eq!(log.purge(WindowId::new(10, 1)), 9);
        let stats = log.stats();
        assert_eq!(stats.entries, 205);
        assert_eq!(stats.count(RecordKind::Payload), 200);
        assert_eq!(stats.count(RecordKind::BeginWindow), 2);
        assert!(!stats.epoch_context);
    }

    #[test]
    fn test_read_from_respects_limit() {
        let log = two_window_log();
        let batch = log.read_from(0, 10);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[9].position, 9);
        let rest = log.read_from(10, usize::MAX);
        assert_eq!(rest.len(), 195);
    }

    #[test]
    fn test_purge_after_republish_keeps_replay_in_position_order() {
        let mut log = WindowLog::new();
        log.append(Record::reset(7));
        for w in 0..10 {
            publish_window(&mut log, w, 1);
        }
        log.append(Record::reset(7));
        for w in 5..10 {
            publish_window(&mut log, w, 1);
        }

        assert_eq!(log.purge(WindowId::new(7, 3)), 13);
        assert_eq!(log.len(), 34);
        assert_eq!(log.epoch_context().map(|e| e.position), Some(0));

        // Read the way a consumer does: small batches from its own cursor.
        let mut delivered = Vec::new();
        let mut next = 0;
        loop {
            let batch = log.read_from(next, 2);
            let Some(last) = batch.last() else { break };
            next = last.position + 1;
            delivered.extend(batch);
        }
        assert_eq!(delivered.len(), 34);
        assert_eq!(delivered.iter().filter(|e| e.record.is_reset()).count(), 1);
        assert!(delivered.windows(2).all(|p| p[0].position < p[1].position));
        assert_eq!(delivered[1].record, Record::begin(4));
    }

    #[test]
    fn test_newer_reset_behind_survivors_is_not_context() {
        let mut log = WindowLog::new();
        publish_window(&mut log, 5, 1);
        log.append(Record::reset(0));
        publish_window(&mut log, 1, 1);

        // The Reset at position 3 is removed but window 5 survives ahead of it.
        assert_eq!(log.purge(WindowId::new(0, 1)), 4);
        assert!(log.epoch_context().is_none());
        let replay = replay_all(&log, WindowId::ZERO);
        assert_eq!(replay.len(), 3);
        assert_eq!(replay[0].record, Record::begin(5));
    }

    #[test]
    fn test_stats() {
        let log = two_window_log();
        let stats = log.stats();
        assert_eq!(stats.entries, 205);
        assert_eq!(stats.windows, 2);
        assert_eq!(stats.count(RecordKind::Payload), 200);
        assert_eq!(stats.payload_bytes, 200);
        assert_eq!(stats.first_window, Some(WindowId::new(EPOCH, 0)));
        assert_eq!(stats.last_window, Some(WindowId::new(EPOCH, 1)));
        assert_eq!(stats.epoch, EPOCH);
        assert!(!stats.epoch_context);
    }
}
