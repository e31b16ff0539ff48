// Copyright (C) 2022 Yehowshua Immanuel
// This program is distributed under both the GPLV3 license
// and the YEHOWSHUA license, both of which can be found at
// the root of the folder containing the sources for this program.

//! part of the vcd parser that tracks the scope hierarchy and writes it
//! out as nested JSON objects
use std::io::Write;

use super::super::types::VcdError;
use super::super::utilities::{indent_into, quoted_into};

/// Dotted path of the named scopes currently open, e.g. `.board.cpu`.
#[derive(Debug, Default)]
pub(super) struct ScopePath {
    path: String,
    // length of `path` before each open scope; `None` for a nameless one
    marks: Vec<Option<usize>>,
}

impl ScopePath {
    pub(super) fn enter(&mut self, name: &str) {
        self.marks.push(Some(self.path.len()));
        self.path.push('.');
        self.path.push_str(name);
    }

    pub(super) fn enter_transparent(&mut self) {
        self.marks.push(None);
    }

    /// Pops the innermost scope. Returns `Some(true)` if it was named,
    /// `Some(false)` if it was nameless and `None` at depth zero.
    pub(super) fn exit(&mut self) -> Option<bool> {
        let mark = self.marks.pop()?;
        match mark {
            Some(len) => {
                self.path.truncate(len);
                Some(true)
            }
            None => Some(false),
        }
    }

    pub(super) fn depth(&self) -> usize {
        self.marks.len()
    }

    pub(super) fn qualified(&self, key: &str) -> String {
        format!("{}.{}", self.path, key)
    }
}

/// Streams the root JSON object: header fields, the `"definitions"`
/// object and any members appended after it.
///
/// Every member is assembled in `scratch` and handed to the sink with a
/// single `write_all`, so the sink never sees half a member.
#[derive(Debug, Default)]
pub(super) struct DefinitionsWriter {
    // open JSON objects, root included
    depth: usize,
    needs_comma: bool,
    opened: bool,
    closed: bool,
    scratch: Vec<u8>,
}

impl DefinitionsWriter {
    pub(super) fn new() -> Self {
        DefinitionsWriter::default()
    }

    pub(super) fn begin<W: Write>(&mut self, out: &mut W) -> Result<(), VcdError> {
        out.write_all(b"{\n")?;
        self.depth = 1;
        self.needs_comma = false;
        Ok(())
    }

    fn member(&mut self, key: &[u8]) {
        if self.needs_comma {
            self.scratch.extend_from_slice(b",\n");
        }
        indent_into(&mut self.scratch, self.depth);
        quoted_into(&mut self.scratch, key);
        self.scratch.extend_from_slice(b": ");
        self.needs_comma = true;
    }

    fn open_object(&mut self, key: &[u8]) {
        self.member(key);
        self.scratch.extend_from_slice(b"{\n");
        self.depth += 1;
        self.needs_comma = false;
    }

    fn ensure_definitions(&mut self) {
        if !self.opened {
            self.open_object(b"definitions");
            self.opened = true;
        }
    }

    fn flush<W: Write>(&mut self, out: &mut W) -> Result<(), VcdError> {
        out.write_all(&self.scratch)?;
        self.scratch.clear();
        Ok(())
    }

    /// `"name": "text"` in the innermost open object.
    pub(super) fn field<W: Write>(
        &mut self,
        out: &mut W,
        name: &str,
        text: &[u8],
    ) -> Result<(), VcdError> {
        self.member(name.as_bytes());
        quoted_into(&mut self.scratch, text);
        self.flush(out)
    }

    pub(super) fn enter_scope<W: Write>(&mut self, out: &mut W, name: &[u8]) -> Result<(), VcdError> {
        self.ensure_definitions();
        self.open_object(name);
        self.flush(out)
    }

    pub(super) fn exit_scope<W: Write>(&mut self, out: &mut W) -> Result<(), VcdError> {
        self.depth -= 1;
        self.scratch.push(b'\n');
        indent_into(&mut self.scratch, self.depth);
        self.scratch.push(b'}');
        self.needs_comma = true;
        self.flush(out)
    }

    pub(super) fn var<W: Write>(&mut self, out: &mut W, key: &[u8], id_code: &[u8]) -> Result<(), VcdError> {
        self.ensure_definitions();
        self.member(key);
        quoted_into(&mut self.scratch, id_code);
        self.flush(out)
    }

    /// Closes every open scope object and the `"definitions"` object
    /// itself, opening an empty one first if no scope or var was seen.
    pub(super) fn close_definitions<W: Write>(&mut self, out: &mut W) -> Result<(), VcdError> {
        if self.closed {
            return Ok(());
        }
        self.ensure_definitions();
        self.flush(out)?;
        while self.depth > 1 {
            self.exit_scope(out)?;
        }
        self.closed = true;
        Ok(())
    }

    /// `"name": [ body ]` in the root object, after the definitions.
    pub(super) fn array<W: Write>(&mut self, out: &mut W, name: &str, body: &[u8]) -> Result<(), VcdError> {
        self.member(name.as_bytes());
        self.scratch.extend_from_slice(b"[\n");
        self.scratch.extend_from_slice(body);
        self.scratch.extend_from_slice(b"\n");
        indent_into(&mut self.scratch, self.depth);
        self.scratch.push(b']');
        self.flush(out)
    }

    pub(super) fn end<W: Write>(&mut self, out: &mut W) -> Result<(), VcdError> {
        self.close_definitions(out)?;
        out.write_all(b"\n}\n")?;
        self.depth = 0;
        Ok(())
    }
}
