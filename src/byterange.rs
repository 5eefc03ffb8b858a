use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// start == SUFFIX marks a suffix range; end then holds the suffix length
// ("last end bytes"). All other negative values are invalid.
const SUFFIX: i64 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid byte range")]
    Invalid,
    #[error("suffix range requires a known content length")]
    UnknownContentLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "s")]
    pub start: i64,
    #[serde(rename = "e")]
    pub end: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    // "last n bytes", resolved against the content length before any set math
    pub fn suffix(n: i64) -> Self {
        Self { start: SUFFIX, end: n }
    }

    pub fn is_suffix(self) -> bool {
        self.start == SUFFIX
    }

    pub fn is_valid(self) -> bool {
        if self.is_suffix() {
            return self.end >= 0;
        }
        self.start >= 0 && self.end >= self.start
    }

    pub fn len(self) -> i64 {
        if self.is_suffix() {
            return self.end;
        }
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    pub fn is_empty(self) -> bool {
        self.len() <= 0
    }

    pub fn contains(self, other: Range) -> bool {
        !self.is_suffix() && !other.is_suffix() && self.start <= other.start && self.end >= other.end
    }

    fn resolve(self, content_length: i64) -> Result<Option<Range>, RangeError> {
        if self.is_suffix() {
            if content_length < 0 {
                return Err(RangeError::UnknownContentLength);
            }
            if self.end == 0 || content_length == 0 {
                return Ok(None);
            }
            let start = (content_length - self.end).max(0);
            return Ok(Some(Range::new(start, content_length - 1)));
        }
        if !self.is_valid() {
            return Err(RangeError::Invalid);
        }
        if content_length < 0 {
            return Ok(Some(self));
        }
        if self.start >= content_length {
            return Ok(None);
        }
        Ok(Some(Range::new(self.start, self.end.min(content_length - 1))))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_suffix() {
            return write!(f, "-{}", self.end);
        }
        if self.end == i64::MAX {
            return write!(f, "{}-", self.start);
        }
        write!(f, "{}-{}", self.start, self.end)
    }
}

// Ordered byte-range set. Always normalized: sorted by start, overlapping
// or touching runs coalesced. Suffix ranges sort ahead of resolved ones and
// are never coalesced before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranges(Vec<Range>);

impl Ranges {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_ranges(ranges: Vec<Range>) -> Self {
        Self(normalize(ranges))
    }

    pub fn single(start: i64, end: i64) -> Self {
        Self(vec![Range::new(start, end)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Range] {
        &self.0
    }

    pub fn contains(&self, r: Range) -> bool {
        self.0.iter().any(|own| own.contains(r))
    }

    // Total bytes covered; meaningful only on resolved sets.
    pub fn coverage(&self) -> i64 {
        self.0.iter().map(|r| r.len()).sum()
    }

    // Resolves suffix ranges against the content length, clamps everything to
    // it, and drops ranges that fall entirely past the end of the object.
    pub fn resolve(&self, content_length: i64) -> Result<Ranges, RangeError> {
        let mut out = Vec::with_capacity(self.0.len());
        for r in &self.0 {
            if let Some(resolved) = r.resolve(content_length)? {
                if !resolved.is_empty() {
                    out.push(resolved);
                }
            }
        }
        Ok(Ranges(normalize(out)))
    }

    // Minimal set of sub-ranges needed to complete `self` given that `stored`
    // is already held. Both sides are resolved first; a suffix range with an
    // unknown content length is an error.
    pub fn calculate_delta(&self, stored: &Ranges, content_length: i64) -> Result<Ranges, RangeError> {
        let want = self.resolve(content_length)?;
        let have = stored.resolve(content_length)?;

        let mut out = Vec::new();
        for w in &want.0 {
            let mut cursor = w.start;
            for h in &have.0 {
                if h.end < cursor {
                    continue;
                }
                if h.start > w.end {
                    break;
                }
                if h.start > cursor {
                    out.push(Range::new(cursor, h.start - 1));
                }
                cursor = cursor.max(h.end.saturating_add(1));
                if cursor > w.end {
                    break;
                }
            }
            if cursor <= w.end {
                out.push(Range::new(cursor, w.end));
            }
        }
        Ok(Ranges(normalize(out)))
    }

    pub fn union(&self, other: &Ranges) -> Ranges {
        let mut all = self.0.clone();
        all.extend_from_slice(&other.0);
        Ranges(normalize(all))
    }

    pub fn intersection(&self, other: &Ranges) -> Ranges {
        let mut out = Vec::new();
        for a in &self.0 {
            for b in &other.0 {
                if a.is_suffix() || b.is_suffix() {
                    continue;
                }
                let start = a.start.max(b.start);
                let end = a.end.min(b.end);
                if start <= end {
                    out.push(Range::new(start, end));
                }
            }
        }
        Ranges(normalize(out))
    }

    // Parses a Range request header: "bytes=0-5,10-20,-30".
    pub fn from_header(header: &str) -> Result<Ranges, RangeError> {
        let spec = header.trim().strip_prefix("bytes=").ok_or(RangeError::Invalid)?;
        if spec.is_empty() {
            return Err(RangeError::Invalid);
        }
        let mut out = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            let (start_str, end_str) = part.split_once('-').ok_or(RangeError::Invalid)?;
            if start_str.is_empty() {
                // suffix range: bytes=-N
                let n: i64 = end_str.parse().map_err(|_| RangeError::Invalid)?;
                out.push(Range::suffix(n));
                continue;
            }
            let start: i64 = start_str.parse().map_err(|_| RangeError::Invalid)?;
            let end: i64 = if end_str.is_empty() {
                i64::MAX
            } else {
                end_str.parse().map_err(|_| RangeError::Invalid)?
            };
            let r = Range::new(start, end);
            if !r.is_valid() {
                return Err(RangeError::Invalid);
            }
            out.push(r);
        }
        Ok(Ranges(normalize(out)))
    }
}

impl fmt::Display for Ranges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.retain(|r| r.is_valid() && !r.is_empty());
    ranges.sort_by_key(|r| (r.start, r.end));

    let mut out: Vec<Range> = Vec::with_capacity(ranges.len());
    for r in ranges {
        if r.is_suffix() {
            if !out.iter().any(|o| *o == r) {
                out.push(r);
            }
            continue;
        }
        match out.last_mut() {
            Some(last) if !last.is_suffix() && r.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(r.end);
            }
            _ => out.push(r),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub range: Range,
    pub content_length: i64,
}

// Parses a Content-Range response header: "bytes start-end/size".
pub fn parse_content_range(header: &str) -> Option<ContentRange> {
    let rest = header.trim().strip_prefix("bytes")?.trim_start();
    let (range_part, size_part) = rest.split_once('/')?;
    let (start, end) = range_part.split_once('-')?;
    let start: i64 = start.trim().parse().ok()?;
    let end: i64 = end.trim().parse().ok()?;
    let content_length: i64 = match size_part.trim() {
        "*" => -1,
        s => s.parse().ok()?,
    };
    let range = Range::new(start, end);
    if !range.is_valid() {
        return None;
    }
    Some(ContentRange { range, content_length })
}

pub fn build_content_range(range: Range, content_length: i64) -> String {
    if content_length < 0 {
        return format!("bytes {}-{}/*", range.start, range.end);
    }
    format!("bytes {}-{}/{}", range.start, range.end, content_length)
}
