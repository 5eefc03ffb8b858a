// Minimal multipart body scanner. Covers the two shapes the cache cares
// about: multipart/form-data request bodies (key derivation) and
// multipart/byteranges 206 response bodies (document model). Tolerates both
// CRLF and bare-LF part framing.

pub struct Part<'a> {
    pub headers: Vec<(String, String)>,
    pub content: &'a [u8],
}

impl Part<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mime: mime::Mime = content_type.parse().ok()?;
    mime.get_param(mime::BOUNDARY).map(|b| b.as_str().to_string())
}

pub fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut offsets = Vec::new();
    let mut from = 0;
    while let Some(pos) = find(body, delimiter, from) {
        offsets.push(pos);
        from = pos + delimiter.len();
    }

    for pair in offsets.windows(2) {
        let chunk_start = pair[0] + delimiter.len();
        let chunk = &body[chunk_start..pair[1]];
        if let Some(part) = parse_part(chunk) {
            parts.push(part);
        }
    }
    parts
}

// Splits "name=value" pairs out of a multipart/form-data body.
pub fn form_fields(body: &[u8], boundary: &str) -> Vec<(String, String)> {
    split_parts(body, boundary)
        .into_iter()
        .filter_map(|part| {
            let disposition = part.header("content-disposition")?;
            let name = disposition_name(disposition)?;
            let value = String::from_utf8(part.content.to_vec()).ok()?;
            Some((name, value))
        })
        .collect()
}

fn parse_part(chunk: &[u8]) -> Option<Part<'_>> {
    let chunk = strip_prefix_newline(chunk);
    if chunk.starts_with(b"--") {
        // closing delimiter
        return None;
    }

    let (header_bytes, content) = match find(chunk, b"\r\n\r\n", 0) {
        Some(pos) => (&chunk[..pos], &chunk[pos + 4..]),
        None => {
            let pos = find(chunk, b"\n\n", 0)?;
            (&chunk[..pos], &chunk[pos + 2..])
        }
    };

    let mut headers = Vec::new();
    for line in String::from_utf8_lossy(header_bytes).lines() {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    Some(Part {
        headers,
        content: strip_suffix_newline(content),
    })
}

fn disposition_name(disposition: &str) -> Option<String> {
    let rest = &disposition[disposition.find("name=\"")? + 6..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn strip_prefix_newline(data: &[u8]) -> &[u8] {
    if let Some(rest) = data.strip_prefix(b"\r\n") {
        return rest;
    }
    data.strip_prefix(b"\n").unwrap_or(data)
}

fn strip_suffix_newline(data: &[u8]) -> &[u8] {
    if let Some(rest) = data.strip_suffix(b"\r\n") {
        return rest;
    }
    data.strip_suffix(b"\n").unwrap_or(data)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}
