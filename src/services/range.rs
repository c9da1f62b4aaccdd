//! `Range` request header parsing (single `bytes=` range only).
//!
//! Supported forms:
//! - `bytes=START-END`  inclusive interval
//! - `bytes=START-`     from START to end of file
//! - `bytes=-N`         last N bytes
//!
//! Explicit bounds past the end of the file are unsatisfiable, never clamped.

use thiserror::Error;

/// Inclusive byte interval `[start, end]` over a resource of `total` bytes.
///
/// Always satisfies `start <= end < total`; empty ranges cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
    total: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64, total: u64) -> Option<Self> {
        (start <= end && end < total).then_some(Self { start, end, total })
    }

    /// The whole resource, or `None` for an empty one.
    pub fn full(total: u64) -> Option<Self> {
        total.checked_sub(1).and_then(|end| Self::new(0, end, total))
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered (`end - start + 1`).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total
    }

    /// `Content-Range` value, e.g. `bytes 0-499/1234`.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Outcome of parsing a request's `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// Serve the whole resource with 200.
    NoRange,
    /// Serve the interval with 206.
    Partial(ByteRange),
}

/// How to treat a `Range` header that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRangePolicy {
    /// Ignore the header and serve the whole resource.
    #[default]
    Ignore,
    /// Reject the request.
    Reject,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range not satisfiable for resource of {total} bytes")]
    NotSatisfiable { total: u64 },
    #[error("malformed range header: {0}")]
    Malformed(&'static str),
}

/// Syntactic form of a single byte range, before it meets a resource length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    Bounded(u64, u64),
    From(u64),
    Suffix(u64),
}

/// Parse `header` against a resource of `total` bytes.
pub fn parse_range(
    header: Option<&str>,
    total: u64,
    policy: MalformedRangePolicy,
) -> Result<RangeRequest, RangeError> {
    let Some(value) = header else {
        return Ok(RangeRequest::NoRange);
    };

    match parse_spec(value) {
        Ok(spec) => resolve(spec, total).map(RangeRequest::Partial),
        Err(RangeError::Malformed(reason)) if policy == MalformedRangePolicy::Ignore => {
            tracing::debug!(header = value, reason, "ignoring malformed range header");
            Ok(RangeRequest::NoRange)
        }
        Err(err) => Err(err),
    }
}

fn parse_spec(value: &str) -> Result<RangeSpec, RangeError> {
    let value = value.trim();
    let (unit, set) = value
        .split_once('=')
        .ok_or(RangeError::Malformed("missing range unit"))?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeError::Malformed("unsupported range unit"));
    }
    if set.contains(',') {
        return Err(RangeError::Malformed("multiple ranges are not supported"));
    }

    let (first, last) = set
        .split_once('-')
        .ok_or(RangeError::Malformed("missing `-` separator"))?;
    let first = first.trim();
    let last = last.trim();

    match (first.is_empty(), last.is_empty()) {
        (false, false) => {
            let start = parse_offset(first)?;
            let end = parse_offset(last)?;
            if start > end {
                return Err(RangeError::Malformed("range start is after range end"));
            }
            Ok(RangeSpec::Bounded(start, end))
        }
        (false, true) => Ok(RangeSpec::From(parse_offset(first)?)),
        (true, false) => Ok(RangeSpec::Suffix(parse_offset(last)?)),
        (true, true) => Err(RangeError::Malformed("empty range")),
    }
}

/// Offsets too large for `u64` saturate: they lie past the end of any file,
/// so the range is still well formed but cannot be satisfied.
fn parse_offset(digits: &str) -> Result<u64, RangeError> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed("range offset is not a number"));
    }
    Ok(digits.parse::<u64>().unwrap_or(u64::MAX))
}

fn resolve(spec: RangeSpec, total: u64) -> Result<ByteRange, RangeError> {
    let unsatisfiable = RangeError::NotSatisfiable { total };
    let (start, end) = match spec {
        RangeSpec::Bounded(start, end) => (start, end),
        RangeSpec::From(start) => (start, total.checked_sub(1).ok_or(unsatisfiable.clone())?),
        RangeSpec::Suffix(0) => return Err(unsatisfiable),
        RangeSpec::Suffix(n) => {
            let end = total.checked_sub(1).ok_or(unsatisfiable.clone())?;
            (total.saturating_sub(n), end)
        }
    };
    ByteRange::new(start, end, total).ok_or(unsatisfiable)
}
