//! Line-level frame extraction.
//!
//! Recognizes log lines of the shape
//!
//! ```text
//! <ns> | <LEVEL> | <tid:pid> | <file:line> | [msg] <json>
//! ```
//!
//! and pulls out the leading nanosecond timestamp plus the JSON payload span.
//! Only WS-level lines whose payload starts with `{` or `[` are frames; every
//! other line is rejected without detail, since capture logs mix many
//! unrelated line kinds.

/// Level marker that must appear in an eligible line.
pub const WS_LEVEL_MARKER: &[u8] = b"| WS";
/// Marker preceding the JSON payload.
pub const MSG_MARKER: &[u8] = b"[msg]";

/// One accepted (timestamp, payload) pair.
///
/// `json` borrows the line it was extracted from and is only valid while
/// that line buffer is; copy it out if it must outlive the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFrame<'a> {
    /// Leading nanoseconds of the log line.
    pub ns: u64,
    /// JSON payload, trailing whitespace trimmed.
    pub json: &'a [u8],
}

/// Try to extract a frame from one raw line.
///
/// An empty filter behaves like no filter. The filter is a case-sensitive
/// literal substring matched against the whole raw line.
pub fn try_extract<'a>(line: &'a [u8], filter: Option<&[u8]>) -> Option<LogFrame<'a>> {
    find(line, WS_LEVEL_MARKER)?;

    if let Some(f) = filter.filter(|f| !f.is_empty()) {
        find(line, f)?;
    }

    let ns = parse_ns_prefix(line)?;
    let json = find_json(line)?;
    Some(LogFrame { ns, json: trim_end(json) })
}

/// Parse the leading unsigned decimal timestamp.
///
/// Leading ASCII whitespace and a single `+` are skipped; values that do not
/// fit in a `u64` saturate. `None` means no digit was consumed.
fn parse_ns_prefix(line: &[u8]) -> Option<u64> {
    let mut rest = line.trim_ascii_start();
    if let Some(r) = rest.strip_prefix(b"+") {
        rest = r;
    }
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let ns = rest[..digits].iter().fold(0u64, |acc, d| {
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    });
    Some(ns)
}

/// Locate the payload after `[msg]`, skipping spaces and tabs.
fn find_json(line: &[u8]) -> Option<&[u8]> {
    let at = find(line, MSG_MARKER)? + MSG_MARKER.len();
    let rest = &line[at..];
    let skip = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    let rest = &rest[skip..];
    match rest.first() {
        Some(b'{') | Some(b'[') => Some(rest),
        _ => None,
    }
}

fn trim_end(mut s: &[u8]) -> &[u8] {
    while let [head @ .., b'\n' | b'\r' | b' ' | b'\t'] = s {
        s = head;
    }
    s
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
