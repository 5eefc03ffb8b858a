use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::byterange::{parse_content_range, Range, Ranges};
use crate::constants;
use crate::multipart;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("error encoding cache document: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("error decoding cache document: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("range part length mismatch: declared {declared} bytes, got {actual}")]
    RangePartLength { declared: i64, actual: usize },
    #[error("malformed partial content body: {0}")]
    MalformedPartialContent(&'static str),
}

// Response freshness and transform policy carried with a cached document.
// Client-conditional state is per-request and reset before the document is
// shared through a cache.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingPolicy {
    #[serde(rename = "nt", default)]
    pub no_transform: bool,
    #[serde(rename = "nc", default)]
    pub no_cache: bool,
    #[serde(rename = "fr", default)]
    pub is_fresh: bool,
    #[serde(rename = "fl", default)]
    pub freshness_lifetime: i64,
    #[serde(rename = "cr", default)]
    pub can_revalidate: bool,
    #[serde(rename = "mr", default)]
    pub must_revalidate: bool,
    #[serde(rename = "et", default)]
    pub etag: String,
    #[serde(rename = "lm", default)]
    pub last_modified: i64,
    #[serde(rename = "ex", default)]
    pub expires: i64,
    #[serde(rename = "dt", default)]
    pub date: i64,
    #[serde(rename = "inm", default)]
    pub if_none_match: String,
    #[serde(rename = "im", default)]
    pub if_match: String,
    #[serde(rename = "ims", default)]
    pub if_modified_since: i64,
    #[serde(rename = "ius", default)]
    pub if_unmodified_since: i64,
}

impl CachingPolicy {
    pub fn reset_client_conditionals(&mut self) {
        self.if_none_match.clear();
        self.if_match.clear();
        self.if_modified_since = 0;
        self.if_unmodified_since = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePart {
    #[serde(rename = "r")]
    pub range: Range,
    #[serde(rename = "b")]
    pub content: Bytes,
}

impl RangePart {
    pub fn new(range: Range, content: Bytes) -> Self {
        Self { range, content }
    }
}

// An HTTP-response-shaped cache artifact. Either `body` holds the whole
// object, or `ranges` + `range_parts` hold the cached byte ranges; for range
// documents `body` doubles as a content-length-sized sparse buffer so that
// reference caches can drop the parts without losing bytes.
#[derive(Debug, Clone)]
pub struct HttpDocument {
    pub status_code: u16,
    pub status: String,
    pub headers: HeaderMap,
    pub content_type: String,
    pub content_length: i64,
    pub body: Bytes,
    pub ranges: Ranges,
    pub range_parts: Vec<RangePart>,
    pub caching_policy: Option<CachingPolicy>,

    // never serialized; re-zeroed on every load
    is_fulfillment: bool,
    is_loaded: bool,
    range_parts_loaded: bool,
}

impl Default for HttpDocument {
    fn default() -> Self {
        Self {
            status_code: 0,
            status: String::new(),
            headers: HeaderMap::new(),
            content_type: String::new(),
            content_length: -1,
            body: Bytes::new(),
            ranges: Ranges::new(),
            range_parts: Vec::new(),
            caching_policy: None,
            is_fulfillment: false,
            is_loaded: false,
            range_parts_loaded: false,
        }
    }
}

impl HttpDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fulfillment(&self) -> bool {
        self.is_fulfillment
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn range_parts_loaded(&self) -> bool {
        self.range_parts_loaded
    }

    pub(crate) fn mark_fulfillment(&mut self) {
        self.is_fulfillment = true;
    }

    pub(crate) fn reset_transients(&mut self) {
        self.is_fulfillment = false;
        self.is_loaded = false;
        self.range_parts_loaded = false;
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
        self.ranges = Ranges::new();
        self.range_parts.clear();
        self.is_loaded = true;
    }

    // Installs cached byte ranges. The parts' bytes are additionally written
    // into a content-length-sized sparse body buffer when the length is known.
    pub fn set_range_parts(&mut self, parts: Vec<RangePart>, content_length: i64) -> Result<(), DocumentError> {
        for part in &parts {
            let declared = part.range.len();
            if part.range.start < 0
                || declared != part.content.len() as i64
                || (content_length >= 0 && part.range.end >= content_length)
            {
                return Err(DocumentError::RangePartLength {
                    declared,
                    actual: part.content.len(),
                });
            }
        }

        self.content_length = content_length;
        self.ranges = Ranges::from_ranges(parts.iter().map(|p| p.range).collect());

        if content_length >= 0 {
            let mut buf = vec![0u8; content_length as usize];
            for part in &parts {
                let start = part.range.start as usize;
                buf[start..start + part.content.len()].copy_from_slice(&part.content);
            }
            self.body = Bytes::from(buf);
        }

        self.range_parts = parts;
        self.range_parts_loaded = true;
        self.is_loaded = true;
        Ok(())
    }

    // Rebuilds `range_parts` from the sparse body buffer; a no-op when parts
    // are already present or the document has no ranges.
    pub fn load_range_parts(&mut self) {
        if self.range_parts_loaded {
            return;
        }
        if !self.ranges.is_empty() && self.range_parts.is_empty() {
            self.range_parts = self.derive_parts();
        }
        self.range_parts_loaded = true;
    }

    // Slices range parts back out of the sparse body buffer.
    fn derive_parts(&self) -> Vec<RangePart> {
        let len = self.body.len() as i64;
        self.ranges
            .iter()
            .filter(|r| !r.is_suffix() && r.end < len)
            .map(|r| RangePart::new(*r, self.body.slice(r.start as usize..=r.end as usize)))
            .collect()
    }

    // Assembles the full body from the cached parts once every byte of the
    // object is present; leaves the document untouched otherwise.
    pub fn fulfill_content_body(&mut self) -> bool {
        if self.ranges.is_empty() || self.content_length < 0 {
            return false;
        }
        let whole = Ranges::single(0, self.content_length - 1);
        if self.ranges != whole {
            return false;
        }
        // sparse buffer is fully populated at this point
        let body = self.body.clone();
        self.set_body(body);
        true
    }

    // Splits a 206 response body into range parts: multipart/byteranges
    // bodies by boundary with a Content-Range per part, single-range bodies
    // by the response's own Content-Range header.
    pub fn parse_partial_content(&mut self, headers: &HeaderMap, body: Bytes) -> Result<(), DocumentError> {
        let content_type = header_str(headers, &header::CONTENT_TYPE);

        if content_type.starts_with(constants::VALUE_MULTIPART_BYTERANGES) {
            let boundary = multipart::boundary_from_content_type(&content_type)
                .ok_or(DocumentError::MalformedPartialContent("missing boundary"))?;

            let mut parts = Vec::new();
            let mut content_length = self.content_length;
            for part in multipart::split_parts(&body, &boundary) {
                let cr = part
                    .header("content-range")
                    .and_then(parse_content_range)
                    .ok_or(DocumentError::MalformedPartialContent("missing part content-range"))?;
                if cr.content_length >= 0 {
                    content_length = cr.content_length;
                }
                if self.content_type.is_empty() {
                    if let Some(ct) = part.header("content-type") {
                        self.content_type = ct.to_string();
                    }
                }
                parts.push(RangePart::new(cr.range, Bytes::copy_from_slice(part.content)));
            }
            if parts.is_empty() {
                return Err(DocumentError::MalformedPartialContent("no byterange parts"));
            }
            return self.set_range_parts(parts, content_length);
        }

        let cr = headers
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or(DocumentError::MalformedPartialContent("missing content-range"))?;
        self.set_range_parts(vec![RangePart::new(cr.range, body)], cr.content_length)
    }

    // Volatile response metadata is stripped before a document is persisted.
    pub fn strip_volatile_headers(&mut self) {
        self.headers.remove(header::DATE);
        self.headers.remove(header::TRANSFER_ENCODING);
        self.headers.remove(header::CONTENT_RANGE);
        self.headers.remove(constants::RESULT_HEADER);
    }

    pub fn content_encoding(&self) -> String {
        header_str(&self.headers, &header::CONTENT_ENCODING)
    }

    pub fn encode(&self) -> Result<Vec<u8>, DocumentError> {
        // derive parts from the sparse buffer when needed so the wire form
        // stays self-contained
        let range_parts = if !self.ranges.is_empty() && self.range_parts.is_empty() {
            self.derive_parts()
        } else {
            self.range_parts.clone()
        };

        let wire = DocumentWire {
            status_code: self.status_code,
            status: self.status.clone(),
            headers: headers_to_wire(&self.headers),
            content_type: self.content_type.clone(),
            content_length: self.content_length,
            body: if self.ranges.is_empty() { self.body.clone() } else { Bytes::new() },
            ranges: self.ranges.clone(),
            range_parts,
            caching_policy: self.caching_policy.clone(),
        };

        let mut buf = Vec::new();
        let mut ser = rmp_serde::Serializer::new(&mut buf).with_struct_map();
        wire.serialize(&mut ser)?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<HttpDocument, DocumentError> {
        let wire: DocumentWire = rmp_serde::from_slice(data)?;

        let mut doc = HttpDocument {
            status_code: wire.status_code,
            status: wire.status,
            headers: headers_from_wire(&wire.headers),
            content_type: wire.content_type,
            content_length: wire.content_length,
            body: Bytes::new(),
            ranges: Ranges::new(),
            range_parts: Vec::new(),
            caching_policy: wire.caching_policy,
            is_fulfillment: false,
            is_loaded: false,
            range_parts_loaded: false,
        };

        if !wire.body.is_empty() || wire.ranges.is_empty() {
            // full body is authoritative; any stray parts are dropped
            doc.body = wire.body;
            return Ok(doc);
        }

        doc.set_range_parts(wire.range_parts, wire.content_length)?;
        doc.reset_transients();
        Ok(doc)
    }
}

// Builds a document from an upstream response. 206 responses are split into
// range parts; everything else is cached whole.
pub fn document_from_response(
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    policy: Option<CachingPolicy>,
) -> Result<HttpDocument, DocumentError> {
    let mut doc = HttpDocument::new();
    doc.status_code = status.as_u16();
    doc.status = match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    };
    doc.caching_policy = policy;

    let content_type = header_str(&headers, &header::CONTENT_TYPE);
    if !content_type.starts_with(constants::VALUE_MULTIPART_BYTERANGES) {
        doc.content_type = content_type;
    }
    doc.content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(-1);
    doc.headers = headers;

    if doc.status_code == StatusCode::PARTIAL_CONTENT.as_u16() && !body.is_empty() {
        let response_headers = doc.headers.clone();
        doc.parse_partial_content(&response_headers, body)?;
        doc.fulfill_content_body();
    } else {
        if doc.content_length < 0 {
            doc.content_length = body.len() as i64;
        }
        doc.set_body(body);
    }
    Ok(doc)
}

#[derive(Serialize, Deserialize)]
struct DocumentWire {
    #[serde(rename = "sc", default)]
    status_code: u16,
    #[serde(rename = "st", default)]
    status: String,
    #[serde(rename = "h", default)]
    headers: BTreeMap<String, Vec<String>>,
    #[serde(rename = "ct", default)]
    content_type: String,
    #[serde(rename = "cl", default = "unknown_length")]
    content_length: i64,
    #[serde(rename = "b", default)]
    body: Bytes,
    #[serde(rename = "r", default)]
    ranges: Ranges,
    #[serde(rename = "rp", default)]
    range_parts: Vec<RangePart>,
    #[serde(rename = "cp", default, skip_serializing_if = "Option::is_none")]
    caching_policy: Option<CachingPolicy>,
}

fn unknown_length() -> i64 {
    -1
}

// Sorted map form keeps the encoded bytes deterministic.
fn headers_to_wire(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        out.insert(name.as_str().to_string(), values);
    }
    out
}

fn headers_from_wire(map: &BTreeMap<String, Vec<String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in map {
        let Ok(name) = name.parse::<HeaderName>() else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
