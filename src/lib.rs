// Copyright (C) 2022 Yehowshua Immanuel
// This program is distributed under both the GPLV3 license
// and the YEHOWSHUA license, both of which can be found at
// the root of the folder containing the sources for this program.

//! Streaming VCD to JSON conversion.
//!
//! Input is pushed through a resumable [`Tokenizer`] into a [`Parser`]
//! state machine that writes JSON to any [`std::io::Write`] sink while
//! it reads. Nothing holds the whole trace in memory.

mod vcd;
pub use vcd::{emit_definitions, emit_filtered, emit_values, parse_stream};
pub use vcd::{Flow, Token, TokenKind, TokenSink, Tokenizer};
pub use vcd::{Metadata, Timescale, Version};
pub use vcd::{Mode, Options, Recovery, VcdError, Window};
pub use vcd::{Outcome, Parser, ParserState, Session};
pub use vcd::{SignalEntry, SignalIdx, SignalMap};
pub use vcd::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TOKEN_LEN};
