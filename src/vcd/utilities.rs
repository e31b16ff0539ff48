//! JSON text helpers shared by the definitions writer and the signal
//! buffers. Everything here appends to a `Vec<u8>` so callers can build a
//! complete JSON member before handing it to the sink.

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Appends `bytes` with the JSON escapes a VCD identifier code needs.
///
/// IEEE 1364 identifier codes are printable ASCII from `!` to `~`, so
/// among them only `"`, `\` and `/` need escaping. Names and field text
/// go through the same routine, which also escapes control bytes. Bytes
/// that are not part of valid UTF-8 are written as `\u00XX`, reading
/// them as Latin-1.
pub(super) fn escape_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                escape_valid_into(buf, valid.as_bytes());
                return;
            }
            Err(err) => {
                let (valid, invalid) = rest.split_at(err.valid_up_to());
                escape_valid_into(buf, valid);
                // `None` is a sequence cut short by the end of `bytes`
                let bad = err.error_len().unwrap_or(invalid.len());
                for &byte in &invalid[..bad] {
                    unicode_escape_into(buf, byte);
                }
                rest = &invalid[bad..];
            }
        }
    }
}

// `bytes` is valid UTF-8, so multi-byte sequences are copied as they are
fn escape_valid_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        match byte {
            b'"' | b'\\' | b'/' => {
                buf.push(b'\\');
                buf.push(byte);
            }
            0x00..=0x1f => unicode_escape_into(buf, byte),
            _ => buf.push(byte),
        }
    }
}

fn unicode_escape_into(buf: &mut Vec<u8>, byte: u8) {
    buf.extend_from_slice(b"\\u00");
    buf.push(HEX[(byte >> 4) as usize]);
    buf.push(HEX[(byte & 0x0f) as usize]);
}

/// Appends `"<escaped bytes>"`.
pub(super) fn quoted_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(b'"');
    escape_into(buf, bytes);
    buf.push(b'"');
}

/// Appends one `[timestamp, "value"]` record.
pub(super) fn record_into(buf: &mut Vec<u8>, timestamp: u64, value: &[u8]) {
    buf.push(b'[');
    buf.extend_from_slice(timestamp.to_string().as_bytes());
    buf.extend_from_slice(b", ");
    quoted_into(buf, value);
    buf.push(b']');
}

pub(super) fn indent_into(buf: &mut Vec<u8>, depth: usize) {
    buf.extend(std::iter::repeat(b'\t').take(depth));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escaped(bytes: &[u8]) -> String {
        let mut buf = vec![];
        quoted_into(&mut buf, bytes);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn escapes_identifier_code_specials() {
        assert_eq!(escaped(b"!"), r#""!""#);
        assert_eq!(escaped(b"\""), r#""\"""#);
        assert_eq!(escaped(b"a\\b"), r#""a\\b""#);
        assert_eq!(escaped(b"/"), r#""\/""#);
    }

    #[test]
    fn escapes_control_bytes() {
        assert_eq!(escaped(b"a\x01"), r#""a\u0001""#);
        assert_eq!(escaped(b"\x1f"), r#""\u001f""#);
    }

    #[test]
    fn invalid_utf8_is_escaped() {
        assert_eq!(escaped(b"caf\xe9"), r#""caf\u00e9""#);
        assert_eq!(escaped(b"\xff\xfe!"), r#""\u00ff\u00fe!""#);
        // a sequence cut short at the end
        assert_eq!(escaped(b"a\xc3"), r#""a\u00c3""#);
        // valid multi-byte text is kept
        assert_eq!(escaped("café".as_bytes()), "\"café\"");

        let parsed: String = serde_json::from_str(&escaped(b"caf\xe9 \xe2\x82\xac")).unwrap();
        assert_eq!(parsed, "café €");
    }

    #[test]
    fn escaped_text_round_trips_through_json() {
        let raw = "\"\\/~!#{}";
        let parsed: String = serde_json::from_str(&escaped(raw.as_bytes())).unwrap();
        assert_eq!(parsed, raw);
    }

    #[test]
    fn record_format() {
        let mut buf = vec![];
        record_into(&mut buf, 50, b"1");
        assert_eq!(buf, br#"[50, "1"]"#.to_vec());
    }
}
