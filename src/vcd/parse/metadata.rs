use chrono::prelude::*;
use itertools::Itertools;

use super::super::reader::TokenKind;
use super::super::types::{Metadata, Timescale, Version};
use super::combinator_atoms::{digit, take_until, take_while};
use super::types::ParseResult;

/// Words of a `$comment`, `$date`, `$timescale` or `$version` field,
/// joined with single spaces.
#[derive(Debug, Default)]
pub(super) struct FieldBuffer {
    keyword: Option<TokenKind>,
    text: Vec<u8>,
}

impl FieldBuffer {
    pub(super) fn begin(&mut self, keyword: TokenKind) {
        self.keyword = Some(keyword);
        self.text.clear();
    }

    pub(super) fn push(&mut self, word: &[u8]) {
        if !self.text.is_empty() {
            self.text.push(b' ');
        }
        self.text.extend_from_slice(word);
    }

    pub(super) fn keyword(&self) -> Option<TokenKind> {
        self.keyword
    }

    pub(super) fn text(&self) -> &[u8] {
        &self.text
    }

    pub(super) fn clear(&mut self) {
        self.keyword = None;
        self.text.clear();
    }
}

pub(super) fn field_name(keyword: TokenKind) -> &'static str {
    match keyword {
        TokenKind::Date => "date",
        TokenKind::Timescale => "timescale",
        TokenKind::Version => "version",
        _ => "comment",
    }
}

/// Records what a finished header field says about the trace.
pub(super) fn capture(metadata: &mut Metadata, keyword: TokenKind, text: &[u8]) {
    let text = String::from_utf8_lossy(text);
    match keyword {
        TokenKind::Date => {
            // a date is typically composed of the 5 following words which can
            // occur in any order:
            // {Day, Month, Date(number in month), hh:mm:ss, year}.
            // Thus, we try our date parser on 5! = 120 permutations of them.
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.len() != 5 {
                log::debug!("`$date {text}` does not have 5 words, not parsing it");
                return;
            }
            metadata.date = words
                .iter()
                .permutations(words.len())
                .find_map(|perm| parse_date(perm[0], perm[1], perm[2], perm[3], perm[4]));
            if metadata.date.is_none() {
                log::debug!("unable to parse `$date {text}`");
            }
        }
        TokenKind::Version => metadata.version = Some(Version(text.into_owned())),
        TokenKind::Timescale => match parse_timescale(&text) {
            Some(timescale) => metadata.timescale = timescale,
            None => log::debug!("unable to parse `$timescale {text}`"),
        },
        _ => {}
    }
}

fn parse_date(
    day: &str,
    month: &str,
    date: &str,
    time: &str,
    year: &str,
) -> Option<DateTime<Utc>> {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    if !days.contains(&day) {
        return None;
    }

    let months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Sept", "Oct", "Nov", "Dec",
    ];
    if !months.contains(&month) {
        return None;
    }
    // chrono only knows the three letter abbreviation
    let month = if month == "Sept" { "Sep" } else { month };

    let date: u8 = date.parse().ok()?;
    if date > 31 {
        return None;
    }

    // hh:mm:ss
    let res = take_until(time, b':');
    let hh: u8 = res.assert_match()?.parse().ok()?;
    if hh > 23 {
        return None;
    }

    // chop off colon which is at index 0
    let res = take_until(&res.assert_residual()?[1..], b':');
    let mm: u8 = res.assert_match()?.parse().ok()?;
    if mm > 59 {
        return None;
    }

    let ss: u8 = res.assert_residual()?[1..].parse().ok()?;
    if ss > 60 {
        return None;
    }

    let year: i32 = year.parse().ok()?;

    let full_date = format!("{day} {month} {date} {hh:02}:{mm:02}:{ss:02} {year}");
    let naive = NaiveDateTime::parse_from_str(&full_date, "%a %b %e %T %Y").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

// we might see `1ps` or `1 ps`
fn parse_timescale(text: &str) -> Option<(Option<u32>, Timescale)> {
    let mut words = text.split_whitespace();
    let ParseResult { matched, residual } = take_while(words.next()?, digit);
    let scalar: u32 = matched.parse().ok()?;

    let unit = if residual.is_empty() {
        words.next()?
    } else {
        residual
    };
    let unit = match unit {
        "fs" => Timescale::Fs,
        "ps" => Timescale::Ps,
        "ns" => Timescale::Ns,
        "us" => Timescale::Us,
        "ms" => Timescale::Ms,
        "s" => Timescale::S,
        _ => return None,
    };

    Some((Some(scalar), unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_words_join_with_single_spaces() {
        let mut field = FieldBuffer::default();
        field.begin(TokenKind::Comment);
        field.push(b"hello");
        field.push(b"world");
        assert_eq!(field.text(), b"hello world");
        assert_eq!(field.keyword().map(field_name), Some("comment"));

        field.clear();
        assert!(field.keyword().is_none());
        assert!(field.text().is_empty());
    }

    #[test]
    fn dates_in_any_word_order() {
        let expected = Utc.with_ymd_and_hms(2022, 8, 23, 15, 2, 44).unwrap();
        for text in ["Tue Aug 23 15:02:44 2022", "Aug 23 2022 Tue 15:02:44"] {
            let mut metadata = Metadata::default();
            capture(&mut metadata, TokenKind::Date, text.as_bytes());
            assert_eq!(metadata.date, Some(expected), "{text}");
        }
    }

    #[test]
    fn september_spelled_out() {
        let mut metadata = Metadata::default();
        capture(&mut metadata, TokenKind::Date, b"Fri Sept 2 09:00:05 2022");
        assert_eq!(
            metadata.date,
            Some(Utc.with_ymd_and_hms(2022, 9, 2, 9, 0, 5).unwrap())
        );
    }

    #[test]
    fn unparseable_date_is_ignored() {
        let mut metadata = Metadata::default();
        capture(&mut metadata, TokenKind::Date, b"yesterday");
        capture(&mut metadata, TokenKind::Date, b"Tue Aug 23 25:02:44 2022");
        assert!(metadata.date.is_none());
    }

    #[test]
    fn timescales() {
        let mut metadata = Metadata::default();
        capture(&mut metadata, TokenKind::Timescale, b"1ps");
        assert_eq!(metadata.timescale, (Some(1), Timescale::Ps));
        capture(&mut metadata, TokenKind::Timescale, b"100 ns");
        assert_eq!(metadata.timescale, (Some(100), Timescale::Ns));
        capture(&mut metadata, TokenKind::Timescale, b"10 parsecs");
        assert_eq!(metadata.timescale, (Some(100), Timescale::Ns));
    }

    #[test]
    fn version_is_kept_verbatim() {
        let mut metadata = Metadata::default();
        capture(&mut metadata, TokenKind::Version, b"Icarus Verilog");
        assert_eq!(metadata.version, Some(Version("Icarus Verilog".to_string())));
    }
}
