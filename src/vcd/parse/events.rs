//! part of the vcd parser that follows simulation time and routes value
//! changes of the requested signals through their windows
use std::io::Write;

use super::super::reader::Token;
use super::super::signal_map::SignalMap;
use super::super::types::{VcdError, Window};
use super::super::utilities::quoted_into;
use super::scopes::DefinitionsWriter;

/// Digits of a `#<digits>` token, or `None` if they overflow a `u64`.
pub(super) fn parse_timestamp(text: &[u8]) -> Option<u64> {
    let digits = text.strip_prefix(b"#").unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, byte| {
        if !byte.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add((byte - b'0') as u64)
    })
}

#[derive(Debug)]
enum Delivery {
    // one signal, records go to the sink as soon as they are formatted
    Streamed { requested: String },
    // every signal keeps its records until the end of input
    Buffered,
}

#[derive(Debug)]
pub(super) struct Simulation {
    window: Window,
    timestamp: u64,
    signals: SignalMap,
    delivery: Delivery,
}

impl Simulation {
    /// A single requested signal. `requested` can be an identifier code
    /// as well as a fully-qualified name, so short strings are bound as
    /// a code straight away.
    pub(super) fn streamed(window: Window, requested: &str) -> Result<Self, VcdError> {
        let mut signals = SignalMap::new();
        signals.insert_name(requested);
        if requested.len() <= 4 {
            signals.bind_short_key(requested, requested.as_bytes())?;
        }
        Ok(Simulation {
            window,
            timestamp: 0,
            signals,
            delivery: Delivery::Streamed {
                requested: requested.to_string(),
            },
        })
    }

    pub(super) fn buffered<S: AsRef<str>>(window: Window, requested: &[S]) -> Self {
        let mut signals = SignalMap::new();
        for name in requested {
            signals.insert_name(name.as_ref());
        }
        Simulation {
            window,
            timestamp: 0,
            signals,
            delivery: Delivery::Buffered,
        }
    }

    pub(super) fn set_time(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Binds the identifier code of a declared var if its fully-qualified
    /// name was requested.
    pub(super) fn bind(&mut self, name: &str, id_code: &[u8]) -> Result<bool, VcdError> {
        self.signals.bind_short_key(name, id_code)
    }

    pub(super) fn value_change<W: Write>(&mut self, token: &Token, out: &mut W) -> Result<(), VcdError> {
        let Some(idx) = self.signals.lookup(token.id_code()) else {
            return Ok(());
        };
        let entry = self.signals.entry_mut(idx);
        entry.record(&self.window, self.timestamp, token.value());

        if let Delivery::Streamed { .. } = self.delivery {
            if !entry.buffered().is_empty() {
                out.write_all(entry.buffered())?;
                entry.clear_buffered();
            }
        }
        Ok(())
    }

    pub(super) fn begin<W: Write>(&self, out: &mut W) -> Result<(), VcdError> {
        if let Delivery::Streamed { requested } = &self.delivery {
            let mut head = b"{\n\t".to_vec();
            quoted_into(&mut head, requested.as_bytes());
            head.extend_from_slice(b": [\n");
            out.write_all(&head)?;
        }
        Ok(())
    }

    /// Closes the streamed array, or writes one array per requested name
    /// into the root object held by `defs`.
    pub(super) fn finish<W: Write>(
        &self,
        defs: Option<&mut DefinitionsWriter>,
        out: &mut W,
    ) -> Result<(), VcdError> {
        match (&self.delivery, defs) {
            (Delivery::Streamed { .. }, _) => out.write_all(b"\n\t]\n}\n")?,
            (Delivery::Buffered, Some(defs)) => {
                for entry in self.signals.iter() {
                    defs.array(out, entry.name(), entry.buffered())?;
                }
            }
            (Delivery::Buffered, None) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::reader::TokenKind;
    use super::*;

    fn scalar(text: &'static [u8]) -> Token<'static> {
        Token {
            kind: TokenKind::ScalarValueChange,
            text,
            mark: Some(1),
            line: 1,
        }
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp(b"#0"), Some(0));
        assert_eq!(parse_timestamp(b"#105"), Some(105));
        assert_eq!(
            parse_timestamp(b"#18446744073709551615"),
            Some(u64::MAX)
        );
        assert_eq!(parse_timestamp(b"#18446744073709551616"), None);
        assert_eq!(parse_timestamp(b"#"), None);
    }

    #[test]
    fn streams_requested_code() {
        let mut out = vec![];
        let mut sim = Simulation::streamed(Window::new(0, 100), "!").unwrap();
        sim.begin(&mut out).unwrap();
        for (timestamp, text) in [(0, b"0!"), (50, b"1!"), (60, b"1\""), (100, b"0!")] {
            sim.set_time(timestamp);
            sim.value_change(&scalar(text), &mut out).unwrap();
        }
        sim.finish(None, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "{\n\t\"!\": [\n\t\t[0, \"0\"],\n\t\t[50, \"1\"]\n\t]\n}\n"
        );
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, serde_json::json!({ "!": [[0, "0"], [50, "1"]] }));
    }

    #[test]
    fn buffered_signals_wait_for_finish() {
        let mut out = vec![];
        let mut sim = Simulation::buffered(Window::unbounded(), &[".top.b", ".top.a"]);
        assert!(sim.bind(".top.a", b"%").unwrap());
        assert!(!sim.bind(".top.other", b"&").unwrap());
        sim.set_time(3);
        sim.value_change(&scalar(b"x%"), &mut out).unwrap();
        sim.value_change(&scalar(b"1&"), &mut out).unwrap();
        assert!(out.is_empty());

        let mut defs = DefinitionsWriter::new();
        defs.begin(&mut out).unwrap();
        defs.close_definitions(&mut out).unwrap();
        sim.finish(Some(&mut defs), &mut out).unwrap();
        defs.end(&mut out).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({
                "definitions": {},
                ".top.a": [[3, "x"]],
                ".top.b": []
            })
        );
    }
}
