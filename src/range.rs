//! `Range` header parsing and resolution.
//!
//! [`parse_range_header`] maps the raw header text to normalized byte spans,
//! [`resolve_ranges`] decides what kind of response those spans call for.
//! Both are pure; the router feeds their output to the response builder.

use std::cmp;

/// Ranges closer together than this are merged into one part, since a
/// multipart boundary plus part headers costs about this many bytes on the
/// wire (RFC 7233 §6.1).
pub const COALESCE_GAP: u64 = 80;

/// An inclusive span `[start, end]` of a resource's bytes.
///
/// `start <= end` holds for every range the resolver emits. Parser output may
/// transiently violate it (`bytes=500-200` is grammatical); such ranges are
/// dropped as unsatisfiable, never repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes covered. Only meaningful when `start <= end`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// What the parser made of a `Range` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeParse {
    /// Header absent, in units we don't serve, or malformed. The request is
    /// treated as if no `Range` header were present.
    Ignored,
    /// Normalized spans in their original textual order.
    Ranges(Vec<ByteRange>),
}

/// How a request's ranges play out against a resource of a given size.
///
/// Built fresh per request and never mutated. `Partial` always carries at
/// least one part; a request whose ranges all miss resolves to
/// `Unsatisfiable` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Serve the whole resource with a 200.
    Full,
    /// Serve the listed parts with a 206. `multipart` is keyed off how many
    /// ranges were *requested*, not how many survived coalescing.
    Partial {
        parts: Vec<ByteRange>,
        multipart: bool,
    },
    /// No requested range intersects the resource; respond 416.
    Unsatisfiable,
}

/// Parses a raw `Range` header value against a resource size.
///
/// Returns [`RangeParse::Ignored`] unless the header uses the `bytes` unit
/// and every comma-separated spec matches the RFC 7233 grammar (`N-M`, `N-`,
/// or `-N`). One bad spec invalidates the whole header: a malformed header is
/// treated as absent rather than rejected.
pub fn parse_range_header(header: &str, size: u64) -> RangeParse {
    let Some(specs) = header.strip_prefix("bytes=") else {
        return RangeParse::Ignored;
    };

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        match parse_spec(spec.trim(), size) {
            Some(range) => ranges.push(range),
            None => return RangeParse::Ignored,
        }
    }
    RangeParse::Ranges(ranges)
}

/// Normalizes one byte-range-spec to an absolute inclusive span.
///
/// Suffix starts clamp to 0, ends clamp to the last byte. Saturation keeps
/// the math total for empty resources; the degenerate spans that produces
/// are weeded out by [`resolve_ranges`].
fn parse_spec(spec: &str, size: u64) -> Option<ByteRange> {
    let last = size.saturating_sub(1);
    let (first, rest) = spec.split_once('-')?;

    match (first.is_empty(), rest.is_empty()) {
        // "-N": the final N bytes
        (true, false) => {
            let n = parse_offset(rest)?;
            Some(ByteRange::new(size.saturating_sub(n), last))
        }
        // "N-": from N to the end
        (false, true) => {
            let n = parse_offset(first)?;
            Some(ByteRange::new(n, last))
        }
        // "N-M"
        (false, false) => {
            let start = parse_offset(first)?;
            let end = parse_offset(rest)?;
            Some(ByteRange::new(start, cmp::min(end, last)))
        }
        (true, true) => None,
    }
}

fn parse_offset(text: &str) -> Option<u64> {
    // 1*DIGIT, no sign, no whitespace
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Classifies parsed ranges against the resource size.
///
/// Unsatisfiable ranges (start beyond the resource, or inverted) are dropped.
/// Survivors are coalesced with a single left-to-right pass in request order:
/// each range is compared against the last appended part only, and merged
/// when the two lie within [`COALESCE_GAP`] of each other. Out-of-order
/// requests can therefore miss merges a sorted pass would find; requested
/// order is the contract, minimal part count is not.
pub fn resolve_ranges(parse: RangeParse, size: u64) -> RangeOutcome {
    let requested = match parse {
        RangeParse::Ignored => return RangeOutcome::Full,
        RangeParse::Ranges(ranges) if ranges.is_empty() => return RangeOutcome::Full,
        RangeParse::Ranges(ranges) => ranges,
    };

    // The framing decision looks at what was asked for, before filtering
    // and coalescing.
    let multipart = requested.len() > 1;

    let mut parts: Vec<ByteRange> = Vec::new();
    for cur in requested {
        if cur.start >= size || cur.start > cur.end {
            continue;
        }
        match parts.last_mut() {
            Some(last) if within_gap(last, &cur) => {
                last.start = cmp::min(last.start, cur.start);
                last.end = cmp::max(last.end, cur.end);
            }
            _ => parts.push(cur),
        }
    }

    if parts.is_empty() {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial { parts, multipart }
}

/// Merge test: `last.end > cur.start - GAP && last.start - GAP < cur.end`,
/// rearranged so the subtractions cannot underflow.
fn within_gap(last: &ByteRange, cur: &ByteRange) -> bool {
    last.end.saturating_add(COALESCE_GAP) > cur.start
        && last.start < cur.end.saturating_add(COALESCE_GAP)
}
