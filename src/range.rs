use std::error::Error;
use std::fmt;

use axum::http::{header, HeaderMap};

/// One clause of an HTTP `Range` header, as sent by the client.
///
/// Values are numerically well-formed but not validated against any resource
/// size. Clamping a specifier to the bounds of an actual resource is the
/// responder's job, not the parser's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRangeSpec {
    /// `<first>-<last>`: an explicit closed range, both bounds inclusive.
    Exact { first: u64, last: u64 },
    /// `<offset>-`: from `offset` to the end of the resource.
    OffsetToEnd { offset: u64 },
    /// `-<length>`: the last `length` bytes of the resource.
    SuffixLength { length: u64 },
}

/// A malformed specifier somewhere in the range set.
///
/// One bad specifier poisons the entire header: a client cannot be served a
/// subset of the ranges it asked for without ambiguity, so partial results
/// are never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParseError {
    spec: String,
}

impl RangeParseError {
    fn new(spec: &str) -> Self {
        RangeParseError { spec: spec.to_owned() }
    }

    /// The offending specifier, after whitespace stripping.
    pub fn spec(&self) -> &str {
        &self.spec
    }
}

impl fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed byte range specifier: {:?}", self.spec)
    }
}

impl Error for RangeParseError {}

/// Parse the value following the `bytes=` prefix of a `Range` header into an
/// ordered list of [`ByteRangeSpec`].
///
/// Input order and duplicates are preserved. Any malformed specifier poisons
/// the whole result. Whitespace is stripped from anywhere inside each
/// specifier before parsing, matching lenient real-world header formatting,
/// so `"1 - 2"` parses the same as `"1-2"`.
///
/// Callers are responsible for the `bytes=` prefix convention: an absent
/// header, or one with a different unit, means an unranged request, not a
/// parse error. See [`ranges_from_header`].
pub fn parse_ranges(raw: &str) -> Result<Vec<ByteRangeSpec>, RangeParseError> {
    raw.split(',').map(parse_spec).collect()
}

/// Apply the caller-side header convention: `None`, or a value not starting
/// with `bytes=`, is an unranged request and yields an empty list.
pub fn ranges_from_header(value: Option<&str>) -> Result<Vec<ByteRangeSpec>, RangeParseError> {
    match value.and_then(|value| value.strip_prefix("bytes=")) {
        Some(raw) => parse_ranges(raw),
        None => Ok(Vec::new()),
    }
}

/// Look up the `Range` header in a request header map and parse it.
///
/// The first `Range` header wins if several are present. A header that is
/// present but not valid UTF-8 cannot name any byte range and poisons the
/// result, same as a malformed specifier; only an absent header reads as
/// unranged.
pub fn ranges_from_headers(headers: &HeaderMap) -> Result<Vec<ByteRangeSpec>, RangeParseError> {
    match headers.get(header::RANGE) {
        Some(value) => match value.to_str() {
            Ok(value) => ranges_from_header(Some(value)),
            Err(_) => Err(RangeParseError::new(&String::from_utf8_lossy(value.as_bytes()))),
        },
        None => Ok(Vec::new()),
    }
}

fn parse_spec(candidate: &str) -> Result<ByteRangeSpec, RangeParseError> {
    // whitespace is stripped from the whole specifier, not just the ends:
    // "1 2 - 3" therefore reads as "12-3"
    let spec: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(rest) = spec.strip_prefix('-') {
        let length = parse_decimal(rest).ok_or_else(|| RangeParseError::new(&spec))?;
        return Ok(ByteRangeSpec::SuffixLength { length });
    }

    match spec.split_once('-') {
        Some((first, "")) => {
            let offset = parse_decimal(first).ok_or_else(|| RangeParseError::new(&spec))?;
            Ok(ByteRangeSpec::OffsetToEnd { offset })
        }
        Some((first, last)) => {
            let first = parse_decimal(first).ok_or_else(|| RangeParseError::new(&spec))?;
            let last = parse_decimal(last).ok_or_else(|| RangeParseError::new(&spec))?;
            Ok(ByteRangeSpec::Exact { first, last })
        }
        None => Err(RangeParseError::new(&spec)),
    }
}

/// ASCII decimal digits only. Empty strings, signs, and anything `u64`
/// cannot hold are rejected.
fn parse_decimal(literal: &str) -> Option<u64> {
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    literal.parse().ok()
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;
    use ByteRangeSpec::*;

    #[test]
    fn test_parse_ranges() {
        let tests: &[(&str, Result<Vec<ByteRangeSpec>, ()>)] = &[
            ("0-499", Ok(vec![Exact { first: 0, last: 499 }])),
            ("-500", Ok(vec![SuffixLength { length: 500 }])),
            ("9500-", Ok(vec![OffsetToEnd { offset: 9500 }])),
            ("0-0,-1", Ok(vec![Exact { first: 0, last: 0 }, SuffixLength { length: 1 }])),
            ("500-600,601-999", Ok(vec![
                Exact { first: 500, last: 600 },
                Exact { first: 601, last: 999 },
            ])),
            // duplicates are preserved, not deduplicated
            ("0-0,0-0", Ok(vec![Exact { first: 0, last: 0 }, Exact { first: 0, last: 0 }])),
            // whitespace is stripped anywhere inside a specifier
            ("1 - 2", Ok(vec![Exact { first: 1, last: 2 }])),
            (" -500 ", Ok(vec![SuffixLength { length: 500 }])),
            ("1 2 - 3", Ok(vec![Exact { first: 12, last: 3 }])),
            // numerically backwards ranges are well-formed here; bounds
            // checking belongs to the responder
            ("499-0", Ok(vec![Exact { first: 499, last: 0 }])),
            // one bad specifier poisons the whole set
            ("abc-def", Err(())),
            ("0-10,abc", Err(())),
            ("abc,0-10", Err(())),
            ("", Err(())),
            ("-", Err(())),
            ("--5", Err(())),
            ("0-10,", Err(())),
            ("+1-2", Err(())),
            ("1-+2", Err(())),
            ("1.5-2", Err(())),
            ("0x10-20", Err(())),
        ];

        for (raw, expected) in tests {
            let result = parse_ranges(raw).map_err(|_| ());
            assert_eq!(result, *expected, "parse_ranges({raw:?})");
        }
    }

    #[test]
    fn test_order_preserved() {
        let ranges = parse_ranges("9500-,-500,0-499").unwrap();
        assert_eq!(
            vec![
                OffsetToEnd { offset: 9500 },
                SuffixLength { length: 500 },
                Exact { first: 0, last: 499 },
            ],
            ranges,
        );
    }

    #[test]
    fn test_overflowing_literal_poisons() {
        // 2^64 does not fit in u64
        let result = parse_ranges("18446744073709551616-");
        assert!(result.is_err());
        // u64::MAX itself is fine
        let ranges = parse_ranges("18446744073709551615-").unwrap();
        assert_eq!(vec![OffsetToEnd { offset: u64::MAX }], ranges);
    }

    #[test]
    fn test_error_reports_stripped_spec() {
        let err = parse_ranges("0-10, a b c").unwrap_err();
        assert_eq!("abc", err.spec());
    }

    #[test]
    fn test_header_conventions() {
        assert_eq!(Ok(vec![]), ranges_from_header(None));
        assert_eq!(Ok(vec![]), ranges_from_header(Some("items=0-499")));
        assert_eq!(
            Ok(vec![Exact { first: 0, last: 499 }]),
            ranges_from_header(Some("bytes=0-499")),
        );
        assert!(ranges_from_header(Some("bytes=abc")).is_err());
    }

    #[test]
    fn test_header_map_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(Ok(vec![]), ranges_from_headers(&headers));

        headers.insert("Range", HeaderValue::from_static("bytes=0-0,-1"));
        assert_eq!(
            Ok(vec![Exact { first: 0, last: 0 }, SuffixLength { length: 1 }]),
            ranges_from_headers(&headers),
        );
    }

    #[test]
    fn test_undecodable_header_value_poisons() {
        // opaque octets are legal in a header value but cannot name a byte
        // range; a present-but-undecodable header poisons like any other
        // malformed specifier rather than reading as unranged
        let mut headers = HeaderMap::new();
        headers.insert("Range", HeaderValue::from_bytes(b"bytes=0-4\xff9").unwrap());
        assert!(ranges_from_headers(&headers).is_err());
    }
}
