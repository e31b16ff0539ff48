//! Requested signals, and the table that resolves VCD identifier codes
//! to them.
//!
//! Identifier codes are short and file-local, and callers only ever ask
//! for a handful of signals, so the table is a fixed 256 bucket open
//! addressing table keyed by the code's bytes packed into a `u32`. The
//! bucket is the XOR of those bytes.
use super::signal::{SignalEntry, SignalIdx};
use super::types::VcdError;

const TABLE_SIZE: usize = 256;
const MAX_KEY_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Slot {
    symbol: u32,
    signal: SignalIdx,
}

#[derive(Debug)]
pub struct SignalMap {
    // insertion order, so that a `SignalIdx` never moves
    entries: Vec<SignalEntry>,
    // indices into `entries`, sorted by name
    ordered: Vec<SignalIdx>,
    table: [Option<Slot>; TABLE_SIZE],
}

// 8 bit bucket and big endian packed symbol of a short key.
fn hash_key(key: &[u8]) -> (usize, u32) {
    let mut bucket = 0u8;
    let mut symbol = 0u32;
    for byte in key {
        bucket ^= byte;
        symbol = symbol << 8 | *byte as u32;
    }
    (bucket as usize, symbol)
}

impl Default for SignalMap {
    fn default() -> Self {
        SignalMap::new()
    }
}

impl SignalMap {
    pub fn new() -> Self {
        SignalMap {
            entries: vec![],
            ordered: vec![],
            table: [None; TABLE_SIZE],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `name` unless it is already present and returns its position
    /// in alphabetical order.
    pub fn insert_name(&mut self, name: &str) -> usize {
        match self.position(name) {
            Ok(pos) => pos,
            Err(pos) => {
                let idx = SignalIdx(self.entries.len());
                self.entries.push(SignalEntry::new(name));
                self.ordered.insert(pos, idx);
                pos
            }
        }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.ordered
            .binary_search_by(|SignalIdx(idx)| self.entries[*idx].name().cmp(name))
    }

    pub fn find(&self, name: &str) -> Option<SignalIdx> {
        self.position(name).ok().map(|pos| self.ordered[pos])
    }

    /// Associates the identifier code `key` with the entry called `name`.
    ///
    /// Returns `Ok(false)` when no entry has that name, before the key is
    /// even looked at. Binding a key that is already bound moves it to the
    /// new entry.
    pub fn bind_short_key(&mut self, name: &str, key: &[u8]) -> Result<bool, VcdError> {
        let Some(signal) = self.find(name) else {
            return Ok(false);
        };
        if key.len() > MAX_KEY_LEN {
            return Err(VcdError::KeyTooLong {
                key: String::from_utf8_lossy(key).into_owned(),
            });
        }
        if key.is_empty() {
            return Ok(false);
        }

        let (mut bucket, symbol) = hash_key(key);
        for _ in 0..TABLE_SIZE {
            match self.table[bucket] {
                Some(slot) if slot.symbol != symbol => bucket = (bucket + 1) % TABLE_SIZE,
                _ => {
                    self.table[bucket] = Some(Slot { symbol, signal });
                    return Ok(true);
                }
            }
        }
        Err(VcdError::SymbolTableFull {
            key: String::from_utf8_lossy(key).into_owned(),
        })
    }

    /// Resolves an identifier code. Codes that were never bound, and codes
    /// that cannot fit a short key, miss.
    pub fn lookup(&self, key: &[u8]) -> Option<SignalIdx> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return None;
        }
        let (mut bucket, symbol) = hash_key(key);
        for _ in 0..TABLE_SIZE {
            match self.table[bucket] {
                None => return None,
                Some(slot) if slot.symbol == symbol => return Some(slot.signal),
                Some(_) => bucket = (bucket + 1) % TABLE_SIZE,
            }
        }
        log::warn!(
            "walked the whole symbol table looking for `{}`",
            String::from_utf8_lossy(key)
        );
        None
    }

    pub fn entry(&self, idx: SignalIdx) -> &SignalEntry {
        let SignalIdx(idx) = idx;
        &self.entries[idx]
    }

    pub(super) fn entry_mut(&mut self, idx: SignalIdx) -> &mut SignalEntry {
        let SignalIdx(idx) = idx;
        &mut self.entries[idx]
    }

    /// Entries in alphabetical order of their names.
    pub fn iter(&self) -> impl Iterator<Item = &SignalEntry> + '_ {
        self.ordered.iter().map(|idx| self.entry(*idx))
    }
}
