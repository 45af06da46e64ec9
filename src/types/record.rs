//! Records carried on a stream and the log entries that wrap them

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use super::WindowId;

/// One framed unit produced onto a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Starts a new epoch. `bootstrap` is carried through untouched.
    Reset { epoch: u32, bootstrap: Bytes },
    BeginWindow { sequence: u32 },
    Payload { partition_key: u32, data: Bytes },
    EndWindow { sequence: u32 },
}

/// Discriminant of a [`Record`], used in logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Reset,
    BeginWindow,
    Payload,
    EndWindow,
}

impl Record {
    pub fn reset(epoch: u32) -> Self {
        Record::Reset {
            epoch,
            bootstrap: Bytes::new(),
        }
    }

    pub fn begin(sequence: u32) -> Self {
        Record::BeginWindow { sequence }
    }

    pub fn end(sequence: u32) -> Self {
        Record::EndWindow { sequence }
    }

    pub fn payload(partition_key: u32, data: impl Into<Bytes>) -> Self {
        Record::Payload {
            partition_key,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Reset { .. } => RecordKind::Reset,
            Record::BeginWindow { .. } => RecordKind::BeginWindow,
            Record::Payload { .. } => RecordKind::Payload,
            Record::EndWindow { .. } => RecordKind::EndWindow,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Record::Reset { .. })
    }
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Reset => "reset",
            RecordKind::BeginWindow => "begin_window",
            RecordKind::Payload => "payload",
            RecordKind::EndWindow => "end_window",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as retained by a window log.
///
/// `window_id` is fixed when the record is appended; `position` is the
/// append index, unique and strictly increasing within one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub record: Record,
    pub window_id: WindowId,
    pub position: u64,
}
