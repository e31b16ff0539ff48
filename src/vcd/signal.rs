use super::types::Window;
use super::utilities::{indent_into, record_into};

// records sit inside an array that is a member of the root object
const RECORD_DEPTH: usize = 2;

// Index into `SignalMap`'s entries. Stable for the lifetime of the map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignalIdx(pub usize);

/// The last value a signal took outside the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ChangeRecord {
    pub(super) timestamp: u64,
    pub(super) value: Vec<u8>,
}

#[derive(Debug)]
pub struct SignalEntry {
    name: String,
    // already formatted `[t, "v"]` records, one per indented line,
    // comma separated
    buffer: Vec<u8>,
    has_emitted: bool,
    pending: Option<ChangeRecord>,
}

impl SignalEntry {
    pub(super) fn new(name: &str) -> Self {
        SignalEntry {
            name: name.to_string(),
            buffer: vec![],
            has_emitted: false,
            pending: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_emitted(&self) -> bool {
        self.has_emitted
    }

    /// Records already formatted but not yet handed to a sink.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub(super) fn clear_buffered(&mut self) {
        self.buffer.clear();
    }

    /// Applies one value change seen at `timestamp`.
    ///
    /// A change inside the window is formatted into the buffer. The first
    /// one is preceded by the value that was in effect when the window
    /// opened, unless the change lands exactly on the window start. A
    /// change outside the window only replaces the pending record.
    pub(super) fn record(&mut self, window: &Window, timestamp: u64, value: &[u8]) {
        if !window.contains(timestamp) {
            match &mut self.pending {
                Some(pending) => {
                    pending.timestamp = timestamp;
                    pending.value.clear();
                    pending.value.extend_from_slice(value);
                }
                None => {
                    self.pending = Some(ChangeRecord {
                        timestamp,
                        value: value.to_vec(),
                    })
                }
            }
            return;
        }

        if self.has_emitted {
            self.buffer.extend_from_slice(b",\n");
        } else if window.start < timestamp {
            if let Some(pending) = self.pending.take() {
                self.push_record(pending.timestamp, &pending.value);
                self.buffer.extend_from_slice(b",\n");
            }
        }
        self.push_record(timestamp, value);
        self.has_emitted = true;
    }

    fn push_record(&mut self, timestamp: u64, value: &[u8]) {
        indent_into(&mut self.buffer, RECORD_DEPTH);
        record_into(&mut self.buffer, timestamp, value);
    }
}
