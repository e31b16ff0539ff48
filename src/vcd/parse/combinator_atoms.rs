use super::types::ParseResult;

pub(super) fn digit(chr: u8) -> bool {
    chr.is_ascii_digit()
}

pub(super) fn take_until(word: &str, pattern: u8) -> ParseResult<'_> {
    let new_start = word
        .bytes()
        .position(|chr| chr == pattern)
        .unwrap_or(word.len());

    ParseResult {
        matched: &word[0..new_start],
        residual: &word[new_start..],
    }
}

pub(super) fn take_while(word: &str, cond: fn(u8) -> bool) -> ParseResult<'_> {
    let new_start = word
        .bytes()
        .position(|chr| !cond(chr))
        .unwrap_or(word.len());

    ParseResult {
        matched: &word[0..new_start],
        residual: &word[new_start..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_pattern() {
        let res = take_until("15:02:44", b':');
        assert_eq!(res.matched, "15");
        assert_eq!(res.residual, ":02:44");

        let res = take_until("1502", b':');
        assert_eq!(res.assert_match(), Some("1502"));
        assert_eq!(res.assert_residual(), None);
    }

    #[test]
    fn splits_on_condition() {
        let res = take_while("100ps", digit);
        assert_eq!(res.matched, "100");
        assert_eq!(res.residual, "ps");

        let res = take_while("ns", digit);
        assert_eq!(res.assert_match(), None);
    }
}
