use chrono::prelude::*;

use super::parse::ParserState;
use super::reader::TokenKind;

/// Carry-over bound for a token cut by a chunk boundary.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 64 * 1024;

/// Number of bytes the stream drivers read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timescale {
    Fs,
    Ps,
    Ns,
    Us,
    Ms,
    S,
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub date: Option<DateTime<Utc>>,
    pub version: Option<Version>,
    pub timescale: (Option<u32>, Timescale),
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            date: None,
            version: None,
            timescale: (None, Timescale::Unit),
        }
    }
}

/// Half-open range of simulation timestamps `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn new(start: u64, end: u64) -> Self {
        Window { start, end }
    }

    pub fn unbounded() -> Self {
        Window {
            start: 0,
            end: u64::MAX,
        }
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::unbounded()
    }
}

/// What a session writes to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// `{ "definitions": {...} }` plus header fields.
    Definitions,
    /// `{ "<requested>": [[t, "v"], ...] }`, streamed as records arrive.
    Values { requested: String },
    /// Definitions followed by one buffered array per requested
    /// fully-qualified name.
    Filter { requested: Vec<String> },
}

/// What to do when the parser receives a token its current state does
/// not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recovery {
    #[default]
    Abort,
    /// Skip to the next `$end` and carry on from the top-level state.
    Resync,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub mode: Mode,
    pub window: Window,
    // timestamps per pixel; accepted but no records are skipped yet
    pub resolution: u64,
    pub recovery: Recovery,
    pub max_token_len: usize,
    pub chunk_size: usize,
}

impl Options {
    pub fn definitions() -> Self {
        Options {
            mode: Mode::Definitions,
            window: Window::unbounded(),
            resolution: 1,
            recovery: Recovery::Abort,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn values(requested: &str, window: Window, resolution: u64) -> Self {
        Options {
            mode: Mode::Values {
                requested: requested.to_string(),
            },
            window,
            resolution,
            ..Options::definitions()
        }
    }

    pub fn filter<S: AsRef<str>>(requested: &[S], window: Window, resolution: u64) -> Self {
        Options {
            mode: Mode::Filter {
                requested: requested.iter().map(|s| s.as_ref().to_string()).collect(),
            },
            window,
            resolution,
            ..Options::definitions()
        }
    }

    pub fn with_recovery(mut self, recovery: Recovery) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_max_token_len(mut self, max_token_len: usize) -> Self {
        self.max_token_len = max_token_len;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VcdError {
    #[error("unexpected {kind:?} token on line {line} while parser was in state {state:?}")]
    MalformedToken {
        line: usize,
        kind: TokenKind,
        state: ParserState,
    },

    #[error("token starting on line {line} is longer than the {limit} bytes that can be carried across chunks")]
    TokenTooLong { line: usize, limit: usize },

    #[error("identifier code `{key}` is {} bytes long, more than the 4 bytes a short key holds", .key.len())]
    KeyTooLong { key: String },

    #[error("symbol table is full, unable to bind identifier code `{key}`")]
    SymbolTableFull { key: String },

    #[error("input ended on line {line} while parser was in state {state:?}")]
    TruncatedInput { line: usize, state: ParserState },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
