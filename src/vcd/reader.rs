//! Resumable VCD lexer.
//!
//! The tokenizer is fed arbitrary chunks of a single input. Tokens that
//! end inside a chunk are pushed straight out of that chunk; a token cut
//! by the end of a chunk is copied into a carry-over buffer and pushed
//! exactly once when the next chunk completes it, so the token stream
//! does not depend on how the input was split.
use super::types::VcdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    /// `$` followed by a word that is not one of the known keywords.
    Keyword,
    Comment,
    Date,
    EndDefinitions,
    Scope,
    Timescale,
    Upscope,
    Var,
    Version,
    End,
    Data,
    DumpAll,
    DumpOff,
    DumpOn,
    DumpVars,
    SimulationTime,
    ScalarValueChange,
    BinaryValueChange,
    RealValueChange,
}

impl TokenKind {
    pub fn is_value_change(self) -> bool {
        matches!(
            self,
            TokenKind::ScalarValueChange | TokenKind::BinaryValueChange | TokenKind::RealValueChange
        )
    }

    /// Kinds that can stand in for plain data inside a declaration field.
    pub fn is_data(self) -> bool {
        self == TokenKind::Data
            || self == TokenKind::Keyword
            || self == TokenKind::SimulationTime
            || self.is_value_change()
    }
}

/// A classified lexical unit. `text` borrows either the caller's chunk
/// or the carry-over buffer, so a token never outlives the `feed` call
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// For whitespace, only the bytes from the chunk the run ended in.
    pub text: &'a [u8],
    /// Offset into `text` where the identifier code of a value change
    /// begins.
    pub mark: Option<usize>,
    /// Line the token starts on, counting from 1.
    pub line: usize,
}

impl<'a> Token<'a> {
    /// Value text of a value change, with the `b`/`r` marker and the
    /// separating whitespace stripped. Other kinds return their full text.
    pub fn value(&self) -> &'a [u8] {
        let text = self.text;
        match (self.kind, self.mark) {
            (TokenKind::ScalarValueChange, Some(mark)) => &text[..mark],
            (TokenKind::BinaryValueChange | TokenKind::RealValueChange, Some(mark)) => {
                let end = text[..mark]
                    .iter()
                    .rposition(|byte| !is_space(*byte))
                    .map_or(1, |pos| pos + 1);
                &text[1..end.max(1)]
            }
            _ => text,
        }
    }

    /// Identifier code half of a value change; empty for other kinds.
    pub fn id_code(&self) -> &'a [u8] {
        match self.mark {
            Some(mark) => &self.text[mark..],
            None => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The consumer has everything it needs; `feed` returns early.
    Stop,
    /// The consumer rejected the token and reset itself; skip the input
    /// up to and including the next `$end`.
    Resync,
}

/// Receives the tokens produced by a [`Tokenizer`].
pub trait TokenSink {
    fn push(&mut self, token: Token<'_>) -> Result<Flow, VcdError>;

    /// Whether the next token may be a simulation time or a value change.
    /// Inside declarations every atom that is not a keyword lexes as data.
    fn wants_value_changes(&self) -> bool;

    /// Called once after the last token. `mid_token` is set when the
    /// input stopped in the middle of a token that cannot be completed.
    fn end_of_input(&mut self, line: usize, mid_token: bool) -> Result<(), VcdError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Start,
    Whitespace,
    Keyword,
    TimeHash,
    TimeDigits,
    ScalarValue,
    ScalarIdentifier,
    BinaryValue,
    BinaryDigits,
    RealValue,
    RealDigits,
    Separator(TokenKind),
    VectorIdentifier(TokenKind),
    Data,
    // number of bytes of `$end` matched so far
    Resync(u8),
}

enum Transition {
    Consume(LexState),
    // consume the byte and record it as the start of the identifier code
    Mark(LexState),
    // the token ended right before this byte
    Emit(TokenKind),
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_value_char(byte: u8) -> bool {
    matches!(
        byte,
        b'0' | b'1'
            | b'x'
            | b'X'
            | b'z'
            | b'Z'
            | b'u'
            | b'U'
            | b'w'
            | b'W'
            | b'h'
            | b'H'
            | b'l'
            | b'L'
            | b'-'
    )
}

fn keyword_kind(word: &[u8]) -> TokenKind {
    match &word[1..] {
        b"comment" => TokenKind::Comment,
        b"date" => TokenKind::Date,
        b"enddefinitions" => TokenKind::EndDefinitions,
        b"scope" => TokenKind::Scope,
        b"timescale" => TokenKind::Timescale,
        b"upscope" => TokenKind::Upscope,
        b"var" => TokenKind::Var,
        b"version" => TokenKind::Version,
        b"end" => TokenKind::End,
        b"dumpall" => TokenKind::DumpAll,
        b"dumpoff" => TokenKind::DumpOff,
        b"dumpon" => TokenKind::DumpOn,
        b"dumpvars" => TokenKind::DumpVars,
        b"" => TokenKind::Data,
        _ => TokenKind::Keyword,
    }
}

impl LexState {
    fn first_byte(byte: u8, value_changes: bool) -> LexState {
        if is_space(byte) {
            return LexState::Whitespace;
        }
        match byte {
            b'$' => LexState::Keyword,
            _ if !value_changes => LexState::Data,
            b'#' => LexState::TimeHash,
            b'b' | b'B' => LexState::BinaryValue,
            b'r' | b'R' => LexState::RealValue,
            _ if is_value_char(byte) => LexState::ScalarValue,
            _ => LexState::Data,
        }
    }

    fn transition(self, byte: u8) -> Transition {
        use LexState::*;
        use Transition::*;

        let space = is_space(byte);
        match self {
            Whitespace if space => Consume(Whitespace),
            Whitespace => Emit(TokenKind::Whitespace),

            Keyword if space => Emit(TokenKind::Keyword),
            Keyword => Consume(Keyword),

            TimeHash | TimeDigits if byte.is_ascii_digit() => Consume(TimeDigits),
            TimeHash if space => Emit(TokenKind::Data),
            TimeDigits if space => Emit(TokenKind::SimulationTime),

            ScalarValue if space => Emit(TokenKind::Data),
            ScalarValue => Mark(ScalarIdentifier),
            ScalarIdentifier if space => Emit(TokenKind::ScalarValueChange),
            ScalarIdentifier => Consume(ScalarIdentifier),

            BinaryValue | BinaryDigits if is_value_char(byte) => Consume(BinaryDigits),
            BinaryValue if space => Emit(TokenKind::Data),
            BinaryDigits if space => Consume(Separator(TokenKind::BinaryValueChange)),

            RealValue if space => Emit(TokenKind::Data),
            RealDigits if space => Consume(Separator(TokenKind::RealValueChange)),
            RealValue | RealDigits => Consume(RealDigits),

            Separator(kind) if space => Consume(Separator(kind)),
            Separator(kind) => Mark(VectorIdentifier(kind)),
            VectorIdentifier(kind) if space => Emit(kind),
            VectorIdentifier(kind) => Consume(VectorIdentifier(kind)),

            Data if space => Emit(TokenKind::Data),

            // a prefix that stopped matching its rule degrades to data
            TimeHash | TimeDigits | BinaryValue | BinaryDigits | Data => Consume(Data),

            // handled by the feed loop before dispatch
            Start | Resync(_) => Consume(self),
        }
    }
}

fn resync_step(matched: u8, byte: u8) -> LexState {
    const END: &[u8; 4] = b"$end";
    if byte == END[matched as usize] {
        if matched as usize + 1 == END.len() {
            LexState::Start
        } else {
            LexState::Resync(matched + 1)
        }
    } else if byte == b'$' {
        LexState::Resync(1)
    } else {
        LexState::Resync(0)
    }
}

#[derive(Debug)]
pub struct Tokenizer {
    state: LexState,
    carry: Vec<u8>,
    mark: Option<usize>,
    line: usize,
    token_line: usize,
    max_token_len: usize,
}

impl Tokenizer {
    pub fn new(max_token_len: usize) -> Self {
        Tokenizer {
            state: LexState::Start,
            carry: Vec::new(),
            mark: None,
            line: 1,
            token_line: 1,
            max_token_len,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Skips input up to and including the next literal `$end`, then
    /// resumes normal scanning. Drops any partially carried token.
    pub fn resync(&mut self) {
        self.carry.clear();
        self.mark = None;
        self.state = LexState::Resync(0);
    }

    /// Scans `chunk`, pushing every completed token into `sink`.
    ///
    /// Returns the number of bytes consumed, which is the chunk length
    /// unless the sink asked to stop.
    pub fn feed<S: TokenSink>(&mut self, chunk: &[u8], sink: &mut S) -> Result<usize, VcdError> {
        // start of the current token's bytes within this chunk
        let mut first = 0usize;
        let mut idx = 0usize;

        while idx < chunk.len() {
            let byte = chunk[idx];
            match self.state {
                LexState::Start => {
                    self.state = LexState::first_byte(byte, sink.wants_value_changes());
                    self.token_line = self.line;
                    first = idx;
                }
                LexState::Resync(matched) => {
                    self.state = resync_step(matched, byte);
                    first = idx + 1;
                }
                state => match state.transition(byte) {
                    Transition::Consume(next) => self.state = next,
                    Transition::Mark(next) => {
                        self.mark = Some(self.carry.len() + idx - first);
                        self.state = next;
                    }
                    Transition::Emit(kind) => {
                        let flow = self.emit(kind, &chunk[first..idx], sink)?;
                        first = idx;
                        match flow {
                            Flow::Continue => {}
                            Flow::Stop => return Ok(idx),
                            Flow::Resync => self.resync(),
                        }
                        // the byte that ended the token starts the next one
                        continue;
                    }
                },
            }
            if byte == b'\n' {
                self.line += 1;
            }
            idx += 1;
        }

        match self.state {
            // only the end of a whitespace run matters, its bytes are dropped
            LexState::Start | LexState::Resync(_) | LexState::Whitespace => {}
            _ => self.carry_over(&chunk[first..])?,
        }
        Ok(chunk.len())
    }

    /// Flushes a token left open by the end of the input and reports the
    /// end of input to the sink.
    pub fn finish<S: TokenSink>(&mut self, sink: &mut S) -> Result<(), VcdError> {
        match self.state {
            LexState::Start | LexState::Resync(_) => {}
            // a vector value still needs its identifier code
            LexState::BinaryDigits | LexState::RealDigits | LexState::Separator(_) => {
                return sink.end_of_input(self.line, true)
            }
            state => {
                // the end of input terminates a token like whitespace would
                if let Transition::Emit(kind) = state.transition(b' ') {
                    self.emit(kind, &[], sink)?;
                }
            }
        }
        sink.end_of_input(self.line, false)
    }

    fn carry_over(&mut self, bytes: &[u8]) -> Result<(), VcdError> {
        self.carry.extend_from_slice(bytes);
        if self.carry.len() > self.max_token_len {
            return Err(VcdError::TokenTooLong {
                line: self.token_line,
                limit: self.max_token_len,
            });
        }
        Ok(())
    }

    fn emit<S: TokenSink>(
        &mut self,
        kind: TokenKind,
        tail: &[u8],
        sink: &mut S,
    ) -> Result<Flow, VcdError> {
        let text: &[u8] = if self.carry.is_empty() {
            tail
        } else {
            self.carry.extend_from_slice(tail);
            &self.carry[..]
        };

        if kind != TokenKind::Whitespace && text.len() > self.max_token_len {
            return Err(VcdError::TokenTooLong {
                line: self.token_line,
                limit: self.max_token_len,
            });
        }

        let kind = match kind {
            TokenKind::Keyword => keyword_kind(text),
            other => other,
        };
        let token = Token {
            kind,
            text,
            mark: self.mark,
            line: self.token_line,
        };
        let flow = sink.push(token);

        self.carry.clear();
        self.mark = None;
        self.state = LexState::Start;
        flow
    }
}
