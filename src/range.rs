//! `Range` header handling for single byte ranges.
//!
//! Only the `bytes=<start>-<end>` form is understood, with either side
//! optional. An empty start means offset 0, so `bytes=-500` is *not* a
//! suffix range: it asks for bytes `0..=500`. Existing players rely on this.

use axum::http::HeaderValue;

/// Inclusive byte window within an asset of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the window
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{size}", self.start, self.end)
    }
}

/// What to send for a request, given its `Range` header and the asset size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No `Range` header: 200 with the whole body
    Full,
    /// 206 with the given window
    Partial(ByteRange),
    /// 416 with `Content-Range: bytes */size`
    Unsatisfiable,
}

/// Resolve the `Range` header against an asset of `size` bytes
pub fn parse_range(header: Option<&HeaderValue>, size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };

    let Some((start, end)) = header.to_str().ok().and_then(parse_bounds) else {
        return RangeOutcome::Unsatisfiable;
    };

    normalize(start, end, size)
}

/// Split `bytes=<digits*>-<digits*>` into its optional bounds.
///
/// Numbers too large for u64 saturate, which later clamps an oversized end
/// and rejects an oversized start.
fn parse_bounds(value: &str) -> Option<(Option<u64>, Option<u64>)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    Some((parse_bound(start)?, parse_bound(end)?))
}

fn parse_bound(digits: &str) -> Option<Option<u64>> {
    if digits.is_empty() {
        return Some(None);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Some(digits.parse::<u64>().unwrap_or(u64::MAX)))
}

fn normalize(start: Option<u64>, end: Option<u64>, size: u64) -> RangeOutcome {
    let Some(last) = size.checked_sub(1) else {
        // nothing in an empty file can satisfy a range
        return RangeOutcome::Unsatisfiable;
    };

    let start = start.unwrap_or(0);
    let end = end.map_or(last, |end| end.min(last));

    if start > end {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Partial(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(header: &str, size: u64) -> RangeOutcome {
        parse_range(Some(&HeaderValue::from_str(header).unwrap()), size)
    }

    fn partial(start: u64, end: u64) -> RangeOutcome {
        RangeOutcome::Partial(ByteRange { start, end })
    }

    #[test]
    fn test_no_header_is_full() {
        assert_eq!(parse_range(None, 1000), RangeOutcome::Full);
        assert_eq!(parse_range(None, 0), RangeOutcome::Full);
    }

    #[test]
    fn test_explicit_window() {
        assert_eq!(outcome("bytes=0-99", 1000), partial(0, 99));
        assert_eq!(outcome("bytes=100-199", 1000), partial(100, 199));
        assert_eq!(outcome("bytes=999-999", 1000), partial(999, 999));
        assert_eq!(outcome("bytes=0-0", 1), partial(0, 0));
    }

    #[test]
    fn test_open_ended_windows() {
        assert_eq!(outcome("bytes=500-", 1000), partial(500, 999));
        assert_eq!(outcome("bytes=-", 1000), partial(0, 999));
        assert_eq!(outcome("bytes=0-", 1000), partial(0, 999));
    }

    #[test]
    fn test_empty_start_is_not_a_suffix_range() {
        assert_eq!(outcome("bytes=-500", 1000), partial(0, 500));
        assert_eq!(outcome("bytes=-5000", 1000), partial(0, 999));
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(outcome("bytes=0-5000", 1000), partial(0, 999));
        assert_eq!(
            outcome("bytes=10-99999999999999999999999999", 1000),
            partial(10, 999)
        );
    }

    #[test]
    fn test_start_past_end_is_unsatisfiable() {
        for size in [1u64, 100, 1000] {
            let header = format!("bytes={size}-{}", size + 50);
            assert_eq!(outcome(&header, size), RangeOutcome::Unsatisfiable);
        }
        assert_eq!(outcome("bytes=200-100", 1000), RangeOutcome::Unsatisfiable);
        assert_eq!(
            outcome("bytes=99999999999999999999999999-", 1000),
            RangeOutcome::Unsatisfiable
        );
    }

    #[test]
    fn test_grammar_violations_are_unsatisfiable() {
        for header in [
            "bytes=abc-def",
            "bytes=0-99,200-299",
            "items=0-99",
            "bytes 0-99",
            "bytes=0",
            "bytes=+1-5",
            "bytes=0-99 ",
            " bytes=0-99",
            "bytes=1-2-3",
            "BYTES=0-99",
            "",
        ] {
            assert_eq!(
                outcome(header, 1000),
                RangeOutcome::Unsatisfiable,
                "header {header:?}"
            );
        }
    }

    #[test]
    fn test_non_utf8_header_is_unsatisfiable() {
        let header = HeaderValue::from_bytes(b"bytes=\xff-1").unwrap();
        assert_eq!(parse_range(Some(&header), 10), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn test_empty_file_cannot_satisfy_a_range() {
        assert_eq!(outcome("bytes=0-", 0), RangeOutcome::Unsatisfiable);
        assert_eq!(outcome("bytes=-", 0), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn test_window_headers() {
        let range = ByteRange { start: 0, end: 99 };
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 0-99/1000");
    }
}
