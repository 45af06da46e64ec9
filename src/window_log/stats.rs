//! Window log statistics

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{RecordKind, WindowId};

/// Point-in-time summary of one window log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    /// Retained entries, including a retained epoch context
    pub entries: usize,
    /// Entries by record kind
    pub entries_by_kind: HashMap<RecordKind, usize>,
    /// Payload bytes held
    pub payload_bytes: usize,
    /// Windows with an indexed BeginWindow
    pub windows: usize,
    pub first_window: Option<WindowId>,
    pub last_window: Option<WindowId>,
    pub open_window: Option<WindowId>,
    /// Epoch that the next appended record falls under
    pub epoch: u32,
    pub next_position: u64,
    /// Whether a purge left a Reset behind as epoch context
    pub epoch_context: bool,
}

impl LogStats {
    pub fn count(&self, kind: RecordKind) -> usize {
        self.entries_by_kind.get(&kind).copied().unwrap_or(0)
    }
}
