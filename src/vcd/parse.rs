use std::io::{ErrorKind, Read, Write};

use super::reader::{Flow, Token, TokenKind, TokenSink, Tokenizer};
use super::types::{Metadata, Mode, Options, Recovery, VcdError, Window};

mod combinator_atoms;

mod types;

mod metadata;
use metadata::*;

mod scopes;
use scopes::*;

mod events;
use events::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    DumpOrDefinitions,
    KeywordField,
    KeywordFieldValue,
    ScopeType,
    ScopeIdentifier,
    VarType,
    VarSize,
    VarIdentifier,
    VarReference,
    VarReferenceSlice,
    EndKeyword,
    DumpallVariables,
}

/// Token-driven VCD state machine. Writes JSON to `out` as declarations
/// complete and routes value changes to the requested signals.
pub struct Parser<W: Write> {
    state: ParserState,
    out: W,
    defs: Option<DefinitionsWriter>,
    sim: Option<Simulation>,
    scopes: ScopePath,
    id_code: Vec<u8>,
    reference: Vec<u8>,
    field: FieldBuffer,
    metadata: Metadata,
    definitions_done: bool,
    stop_after_definitions: bool,
    stopped: bool,
    recovery: Recovery,
    warnings: Vec<VcdError>,
}

impl<W: Write> Parser<W> {
    pub fn new(options: &Options, out: W) -> Result<Self, VcdError> {
        let (defs, sim) = match &options.mode {
            Mode::Definitions => (Some(DefinitionsWriter::new()), None),
            Mode::Values { requested } => {
                (None, Some(Simulation::streamed(options.window, requested)?))
            }
            Mode::Filter { requested } => (
                Some(DefinitionsWriter::new()),
                Some(Simulation::buffered(options.window, requested)),
            ),
        };

        Ok(Parser {
            state: ParserState::DumpOrDefinitions,
            out,
            defs,
            sim,
            scopes: ScopePath::default(),
            id_code: vec![],
            reference: vec![],
            field: FieldBuffer::default(),
            metadata: Metadata::default(),
            definitions_done: false,
            stop_after_definitions: options.mode == Mode::Definitions,
            stopped: false,
            recovery: options.recovery,
            warnings: vec![],
        })
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Non-fatal problems met so far, in the order they happened.
    pub fn warnings(&self) -> &[VcdError] {
        &self.warnings
    }

    /// Writes the opening of the output document.
    pub fn begin(&mut self) -> Result<(), VcdError> {
        if let Some(defs) = &mut self.defs {
            defs.begin(&mut self.out)?;
        }
        if let Some(sim) = &self.sim {
            sim.begin(&mut self.out)?;
        }
        Ok(())
    }

    fn warn(&mut self, err: VcdError) {
        log::warn!("{err}");
        self.warnings.push(err);
    }

    // Applies the side effects of `token` and returns the next state, or
    // `None` if the current state does not accept it.
    fn step(&mut self, token: &Token) -> Result<Option<ParserState>, VcdError> {
        use ParserState::*;
        use TokenKind as K;

        if token.kind == K::Whitespace {
            return Ok(Some(self.state));
        }
        let declaring = !self.definitions_done;

        let next = match (self.state, token.kind) {
            (DumpOrDefinitions, K::Comment | K::Date | K::Timescale | K::Version) => {
                self.field.begin(token.kind);
                KeywordField
            }
            (DumpOrDefinitions, K::Scope) if declaring => ScopeType,
            (DumpOrDefinitions, K::Upscope) if declaring => {
                match self.scopes.exit() {
                    None => return Ok(None),
                    Some(true) => {
                        if let Some(defs) = &mut self.defs {
                            defs.exit_scope(&mut self.out)?;
                        }
                    }
                    Some(false) => {}
                }
                EndKeyword
            }
            (DumpOrDefinitions, K::Var) if declaring => VarType,
            (DumpOrDefinitions, K::EndDefinitions) if declaring => {
                while self.scopes.exit().is_some() {}
                if let Some(defs) = &mut self.defs {
                    defs.close_definitions(&mut self.out)?;
                }
                self.definitions_done = true;
                EndKeyword
            }
            (DumpOrDefinitions, K::SimulationTime) => {
                let Some(timestamp) = parse_timestamp(token.text) else {
                    return Ok(None);
                };
                if let Some(sim) = &mut self.sim {
                    sim.set_time(timestamp);
                }
                DumpOrDefinitions
            }
            (DumpOrDefinitions | DumpallVariables, kind) if kind.is_value_change() => {
                if let Some(sim) = &mut self.sim {
                    sim.value_change(token, &mut self.out)?;
                }
                self.state
            }
            (DumpOrDefinitions, K::DumpAll | K::DumpOff | K::DumpOn | K::DumpVars) => {
                DumpallVariables
            }

            (KeywordField | KeywordFieldValue, kind) if kind.is_data() => {
                self.field.push(token.text);
                KeywordFieldValue
            }
            (KeywordField | KeywordFieldValue, K::End) => {
                self.finish_field()?;
                DumpOrDefinitions
            }

            (ScopeType, K::Data) => ScopeIdentifier,
            (ScopeIdentifier, K::Data) => {
                self.scopes.enter(&String::from_utf8_lossy(token.text));
                if let Some(defs) = &mut self.defs {
                    defs.enter_scope(&mut self.out, token.text)?;
                }
                EndKeyword
            }
            // `$scope module $end`
            (ScopeIdentifier, K::End) => {
                self.scopes.enter_transparent();
                DumpOrDefinitions
            }

            (VarType, K::Data) => VarSize,
            (VarSize, K::Data) => VarIdentifier,
            (VarIdentifier, kind) if kind.is_data() => {
                self.id_code.clear();
                self.id_code.extend_from_slice(token.text);
                VarReference
            }
            (VarReference, K::Data) => {
                self.reference.clear();
                self.reference.extend_from_slice(token.text);
                VarReferenceSlice
            }
            (VarReferenceSlice, K::End) => {
                self.finish_var()?;
                DumpOrDefinitions
            }
            (VarReferenceSlice, K::Data) => {
                self.reference.extend_from_slice(token.text);
                self.finish_var()?;
                EndKeyword
            }

            (EndKeyword | DumpallVariables, K::End) => DumpOrDefinitions,

            _ => return Ok(None),
        };
        Ok(Some(next))
    }

    fn finish_field(&mut self) -> Result<(), VcdError> {
        if let Some(keyword) = self.field.keyword() {
            capture(&mut self.metadata, keyword, self.field.text());
            if let Some(defs) = &mut self.defs {
                defs.field(&mut self.out, field_name(keyword), self.field.text())?;
            }
        }
        self.field.clear();
        Ok(())
    }

    // `reference` holds the reference with its slice, if any
    fn finish_var(&mut self) -> Result<(), VcdError> {
        if let Some(defs) = &mut self.defs {
            defs.var(&mut self.out, &self.reference, &self.id_code)?;
        }
        if let Some(sim) = &mut self.sim {
            let name = self
                .scopes
                .qualified(&String::from_utf8_lossy(&self.reference));
            if let Err(err) = sim.bind(&name, &self.id_code) {
                self.warn(err);
            }
        }
        Ok(())
    }

    // Drops whatever declaration was in progress.
    fn reset(&mut self) {
        self.state = ParserState::DumpOrDefinitions;
        self.field.clear();
        self.id_code.clear();
        self.reference.clear();
    }

    fn finish_output(&mut self) -> Result<(), VcdError> {
        if let Some(defs) = &mut self.defs {
            defs.close_definitions(&mut self.out)?;
        }
        if let Some(sim) = &self.sim {
            sim.finish(self.defs.as_mut(), &mut self.out)?;
        }
        if let Some(defs) = &mut self.defs {
            defs.end(&mut self.out)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> TokenSink for Parser<W> {
    fn push(&mut self, token: Token<'_>) -> Result<Flow, VcdError> {
        let Some(next) = self.step(&token)? else {
            let err = VcdError::MalformedToken {
                line: token.line,
                kind: token.kind,
                state: self.state,
            };
            return match self.recovery {
                Recovery::Abort => Err(err),
                Recovery::Resync => {
                    self.reset();
                    self.warn(err);
                    Ok(Flow::Resync)
                }
            };
        };

        if next != self.state {
            log::trace!(
                "line {}: {:?} -> {:?} on {:?}",
                token.line,
                self.state,
                next,
                token.kind
            );
        }
        self.state = next;

        if self.stop_after_definitions && self.definitions_done && next == ParserState::DumpOrDefinitions {
            self.stopped = true;
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn wants_value_changes(&self) -> bool {
        matches!(
            self.state,
            ParserState::DumpOrDefinitions | ParserState::DumpallVariables
        )
    }

    fn end_of_input(&mut self, line: usize, mid_token: bool) -> Result<(), VcdError> {
        let open_scopes = !self.definitions_done && self.scopes.depth() > 0;
        if mid_token || self.state != ParserState::DumpOrDefinitions || open_scopes {
            return Err(VcdError::TruncatedInput {
                line,
                state: self.state,
            });
        }
        self.finish_output()
    }
}

/// What a finished session hands back.
#[derive(Debug)]
pub struct Outcome<W> {
    pub sink: W,
    pub metadata: Metadata,
    pub warnings: Vec<VcdError>,
    /// Lines seen, counting from 1.
    pub lines: usize,
}

/// One conversion: a [`Tokenizer`] feeding a [`Parser`].
///
/// Chunks may be split anywhere, including inside a token. Once the
/// parser has everything it needs `feed` consumes nothing more.
pub struct Session<W: Write> {
    tokenizer: Tokenizer,
    parser: Parser<W>,
}

impl<W: Write> Session<W> {
    pub fn new(options: &Options, sink: W) -> Result<Self, VcdError> {
        log::debug!(
            "starting {:?} session over [{}, {}) with resolution {}",
            options.mode,
            options.window.start,
            options.window.end,
            options.resolution
        );
        let mut parser = Parser::new(options, sink)?;
        parser.begin()?;
        Ok(Session {
            tokenizer: Tokenizer::new(options.max_token_len),
            parser,
        })
    }

    /// Returns the number of bytes consumed; fewer than `chunk.len()`
    /// once the session has stopped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, VcdError> {
        if self.parser.stopped {
            return Ok(0);
        }
        self.tokenizer.feed(chunk, &mut self.parser)
    }

    pub fn is_stopped(&self) -> bool {
        self.parser.stopped
    }

    pub fn metadata(&self) -> &Metadata {
        self.parser.metadata()
    }

    pub fn warnings(&self) -> &[VcdError] {
        self.parser.warnings()
    }

    /// Signals end of input and writes the closing JSON.
    pub fn finish(mut self) -> Result<Outcome<W>, VcdError> {
        self.tokenizer.finish(&mut self.parser)?;
        let Parser {
            out,
            metadata,
            warnings,
            ..
        } = self.parser;
        Ok(Outcome {
            sink: out,
            metadata,
            warnings,
            lines: self.tokenizer.line(),
        })
    }
}

/// Reads `input` in `options.chunk_size` chunks and converts it into
/// `sink`.
pub fn parse_stream<R: Read, W: Write>(
    mut input: R,
    options: &Options,
    sink: W,
) -> Result<Outcome<W>, VcdError> {
    let mut session = Session::new(options, sink)?;
    let mut chunk = vec![0u8; options.chunk_size.max(1)];

    loop {
        let len = match input.read(&mut chunk) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if session.feed(&chunk[..len])? < len || session.is_stopped() {
            break;
        }
    }

    session.finish()
}

/// Streams `{ "definitions": {...} }`, header fields included.
pub fn emit_definitions<R: Read, W: Write>(input: R, sink: W) -> Result<W, VcdError> {
    parse_stream(input, &Options::definitions(), sink).map(|outcome| outcome.sink)
}

/// Streams `{ "<requested>": [[t, "v"], ...] }` for one signal, named
/// either by identifier code or by fully-qualified name.
pub fn emit_values<R: Read, W: Write>(
    input: R,
    requested: &str,
    window: Window,
    resolution: u64,
    sink: W,
) -> Result<W, VcdError> {
    let options = Options::values(requested, window, resolution);
    parse_stream(input, &options, sink).map(|outcome| outcome.sink)
}

/// Streams the definitions followed by one windowed array per requested
/// fully-qualified name.
pub fn emit_filtered<R: Read, W: Write, S: AsRef<str>>(
    input: R,
    requested: &[S],
    window: Window,
    resolution: u64,
    sink: W,
) -> Result<W, VcdError> {
    let options = Options::filter(requested, window, resolution);
    parse_stream(input, &options, sink).map(|outcome| outcome.sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const TRACE: &str = "$date Tue Aug 23 15:02:44 2022 $end
$timescale 1ns $end
$scope module board $end
$scope module cpu $end
$var wire 1 ! clock $end
$var wire 8 \" data [7:0] $end
$upscope $end
$var wire 1 # reset $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
0!
b00000000 \"
1#
$end
#50
1!
#60
b00001111 \"
0#
#100
0!
";

    fn run(options: &Options, input: &str) -> Result<Outcome<Vec<u8>>, VcdError> {
        parse_stream(input.as_bytes(), options, vec![])
    }

    fn json_of(outcome: &Outcome<Vec<u8>>) -> Value {
        serde_json::from_slice(&outcome.sink).unwrap()
    }

    #[test]
    fn definitions_mode() {
        let outcome = run(&Options::definitions(), TRACE).unwrap();
        assert_eq!(
            json_of(&outcome),
            json!({
                "date": "Tue Aug 23 15:02:44 2022",
                "timescale": "1ns",
                "definitions": {
                    "board": {
                        "cpu": { "clock": "!", "data[7:0]": "\"" },
                        "reset": "#"
                    }
                }
            })
        );
        assert!(outcome.metadata.date.is_some());
        // stops right after `$enddefinitions $end`
        assert_eq!(outcome.lines, 10);
    }

    #[test]
    fn filter_mode() {
        let names = [".board.reset", ".board.cpu.clock", ".board.missing"];
        let options = Options::filter(&names, Window::new(60, 150), 1);
        let outcome = run(&options, TRACE).unwrap();
        let parsed = json_of(&outcome);
        assert_eq!(parsed[".board.cpu.clock"], json!([[50, "1"], [100, "0"]]));
        // the change lands on the window start, so no earlier value is carried
        assert_eq!(parsed[".board.reset"], json!([[60, "0"]]));
        assert_eq!(parsed[".board.missing"], json!([]));
        assert!(parsed["definitions"]["board"].is_object());
    }

    #[test]
    fn values_mode_by_name_and_code() {
        let window = Window::new(0, 100);
        for requested in [".board.cpu.clock", "!"] {
            let out = emit_values(TRACE.as_bytes(), requested, window, 1, vec![]).unwrap();
            let parsed: Value = serde_json::from_slice(&out).unwrap();
            assert_eq!(parsed, json!({ requested: [[0, "0"], [50, "1"]] }));
        }
    }

    #[test]
    fn vector_values_strip_marker() {
        let window = Window::unbounded();
        let out = emit_values(TRACE.as_bytes(), "\"", window, 1, vec![]).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, json!({ "\"": [[0, "00000000"], [60, "00001111"]] }));
    }

    #[test]
    fn nameless_scope_and_empty_comment() {
        let input = "$comment $end
$scope module top $end
$var wire 1 ! clk $end
$scope module $end
$var wire 1 \" b $end
$upscope $end
$var wire 1 # after $end
$upscope $end
$enddefinitions $end
#0
1!
0\"
";
        let names = [".top.clk", ".top.b"];
        let outcome = run(&Options::filter(&names, Window::unbounded(), 1), input).unwrap();
        assert_eq!(
            json_of(&outcome),
            json!({
                "comment": "",
                "definitions": { "top": { "clk": "!", "b": "\"", "after": "#" } },
                ".top.b": [[0, "0"]],
                ".top.clk": [[0, "1"]]
            })
        );
    }

    #[test]
    fn vector_value_cut_at_end_of_input() {
        let input = "$scope module top $end\n$var wire 4 ! v $end\n$upscope $end\n$enddefinitions $end\n#0\nb0101";
        let err = emit_values(input.as_bytes(), "!", Window::unbounded(), 1, vec![]).unwrap_err();
        assert!(matches!(
            err,
            VcdError::TruncatedInput {
                line: 6,
                state: ParserState::DumpOrDefinitions
            }
        ));
    }

    #[test]
    fn non_utf8_field_text_is_valid_json() {
        let input = b"$comment caf\xe9 $end\n$scope module top $end\n$var wire 1 ! clk $end\n$upscope $end\n$enddefinitions $end\n";
        let out = emit_definitions(&input[..], vec![]).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["comment"], "caf\u{e9}");
        assert_eq!(parsed["definitions"], json!({ "top": { "clk": "!" } }));
    }

    #[test]
    fn upscope_at_top_level() {
        let err = run(&Options::definitions(), "$upscope $end\n").unwrap_err();
        assert!(matches!(
            err,
            VcdError::MalformedToken {
                line: 1,
                kind: TokenKind::Upscope,
                state: ParserState::DumpOrDefinitions
            }
        ));
    }

    #[test]
    fn unbalanced_scopes_are_truncated() {
        let err = run(&Options::definitions(), "$scope module top $end\n").unwrap_err();
        assert!(matches!(
            err,
            VcdError::TruncatedInput {
                state: ParserState::DumpOrDefinitions,
                ..
            }
        ));

        let err = run(&Options::definitions(), "$var wire 1 ! clk").unwrap_err();
        assert!(matches!(
            err,
            VcdError::TruncatedInput {
                state: ParserState::VarReferenceSlice,
                ..
            }
        ));
    }

    #[test]
    fn declarations_after_enddefinitions() {
        let input = "$enddefinitions $end\n$scope module late $end\n";
        let options = Options::filter(&["x"], Window::unbounded(), 1);
        let err = run(&options, input).unwrap_err();
        assert!(matches!(
            err,
            VcdError::MalformedToken {
                line: 2,
                kind: TokenKind::Scope,
                ..
            }
        ));
    }

    #[test]
    fn timestamp_overflow() {
        let input = "$enddefinitions $end\n#99999999999999999999\n";
        let options = Options::filter(&["x"], Window::unbounded(), 1);
        let err = run(&options, input).unwrap_err();
        assert!(matches!(
            err,
            VcdError::MalformedToken {
                kind: TokenKind::SimulationTime,
                ..
            }
        ));
    }

    #[test]
    fn resync_skips_bad_declaration() {
        let input = "$scope module top $end
$var wire 1 ! clk $end
$var wire $dumpvars 1 \" broken $end
$var wire 1 # ok $end
$upscope $end
$enddefinitions $end
#5
1!
";
        let options = Options::filter(&[".top.clk"], Window::unbounded(), 1)
            .with_recovery(Recovery::Resync);
        let outcome = run(&options, input).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            VcdError::MalformedToken { line: 3, .. }
        ));
        assert_eq!(
            json_of(&outcome),
            json!({
                "definitions": { "top": { "clk": "!", "ok": "#" } },
                ".top.clk": [[5, "1"]]
            })
        );
    }

    #[test]
    fn abort_is_the_default() {
        let input = "$var wire $dumpvars 1 \" broken $end\n";
        let err = run(&Options::definitions(), input).unwrap_err();
        assert!(matches!(
            err,
            VcdError::MalformedToken {
                kind: TokenKind::DumpVars,
                state: ParserState::VarSize,
                ..
            }
        ));
    }

    #[test]
    fn long_identifier_code_is_a_warning() {
        let input = "$var wire 1 abcde sig $end\n$enddefinitions $end\n#1\n";
        let options = Options::filter(&[".sig"], Window::unbounded(), 1);
        let outcome = run(&options, input).unwrap();
        assert!(matches!(
            outcome.warnings.as_slice(),
            [VcdError::KeyTooLong { .. }]
        ));
        assert_eq!(json_of(&outcome)[".sig"], json!([]));
    }

    #[test]
    fn output_does_not_depend_on_chunking() {
        let names = [".board.cpu.clock", ".board.cpu.data[7:0]"];
        let whole = run(&Options::filter(&names, Window::new(10, 80), 1), TRACE)
            .unwrap()
            .sink;
        for chunk_size in 1..64 {
            let options = Options::filter(&names, Window::new(10, 80), 1).with_chunk_size(chunk_size);
            let split = run(&options, TRACE).unwrap().sink;
            assert_eq!(whole, split, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn parser_follows_declaration_states() {
        let mut tokenizer = Tokenizer::new(64);
        let mut parser = Parser::new(&Options::definitions(), vec![]).unwrap();
        parser.begin().unwrap();

        tokenizer.feed(b"$var wire 1 ! clk ", &mut parser).unwrap();
        assert_eq!(parser.state(), ParserState::VarReferenceSlice);
        tokenizer.feed(b"$end $comment ", &mut parser).unwrap();
        assert_eq!(parser.state(), ParserState::KeywordField);
        tokenizer.feed(b"1! #5 $end ", &mut parser).unwrap();
        assert_eq!(parser.state(), ParserState::DumpOrDefinitions);
        assert!(parser.warnings().is_empty());
        assert!(parser.metadata().version.is_none());
    }

    #[test]
    fn stopped_session_consumes_nothing() {
        let mut session = Session::new(&Options::definitions(), vec![]).unwrap();
        let consumed = session.feed(b"$enddefinitions $end\n#0\n").unwrap();
        assert_eq!(consumed, "$enddefinitions $end".len());
        assert!(session.is_stopped());
        assert_eq!(session.feed(b"1!\n").unwrap(), 0);
        let outcome = session.finish().unwrap();
        assert_eq!(json_of(&outcome), json!({ "definitions": {} }));
    }
}
