use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap};
use http::Method;
use md5::{Digest, Md5};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::PathConfig;
use crate::constants;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("could not find key: {0}")]
    FieldNotFound(String),
}

// Replaces the built-in fingerprint wholesale. The body is handed to the
// hasher and whatever it returns becomes the request body again, so the
// upstream fetch can still read it.
pub trait KeyHasher: Send + Sync {
    fn derive(
        &self,
        path: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
        body: Option<Bytes>,
        extra: &str,
    ) -> (String, Option<Bytes>);
}

pub type SharedKeyHasher = Arc<dyn KeyHasher>;

// Transport-free view of the request fields that participate in the
// fingerprint. `url` may be absent (body-only requests); the path then
// defaults to "/" and the param set is empty.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub method: Method,
    pub url: Option<Url>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl CacheRequest {
    pub fn new(method: Method, url: Option<Url>, headers: HeaderMap, body: Option<Bytes>) -> Self {
        Self { method, url, headers, body }
    }
}

// Derives the deterministic cache fingerprint for a request under a path
// configuration. Entries are rendered as "name.value.", sorted, and digested
// together with the request path and the caller-supplied extra string; any
// emission order of params, headers, fields, or JSON keys yields the same
// digest.
pub fn derive_cache_key(req: &mut CacheRequest, path_config: Option<&PathConfig>, extra: &str) -> String {
    let path = req
        .url
        .as_ref()
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| "/".to_string());

    let Some(pc) = path_config else {
        return md5_hex(format!("{path}{extra}").as_bytes());
    };

    let raw_params: Vec<(String, String)> = req
        .url
        .as_ref()
        .map(|u| {
            u.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    if let Some(hasher) = pc.key_hasher.first() {
        let body = req.body.take();
        let (key, body) = hasher.derive(&path, &raw_params, &req.headers, body, extra);
        req.body = body;
        return key;
    }

    let mut vals: Vec<String> = Vec::new();

    if let Some(auth) = req.headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if !auth.is_empty() {
            vals.push(format!("Authorization.{auth}."));
        }
    }

    vals.push(format!("method.{}.", req.method));

    collect_params(&mut vals, &raw_params, &pc.cache_key_params);

    for name in &pc.cache_key_headers {
        if let Some(value) = req.headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
            if !value.is_empty() {
                vals.push(format!("{name}.{value}."));
            }
        }
    }

    if req.method == Method::POST || req.method == Method::PUT || req.method == Method::PATCH {
        collect_body_fields(&mut vals, req, pc);
    }

    vals.sort();
    md5_hex(format!("{path}.{}{extra}", vals.concat()).as_bytes())
}

fn collect_params(vals: &mut Vec<String>, raw: &[(String, String)], selected: &[String]) {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (k, v) in raw {
        grouped.entry(k.as_str()).or_default().push(v.as_str());
    }

    let wildcard = selected.len() == 1 && selected[0] == "*";
    for (name, mut values) in grouped {
        if !wildcard && !selected.iter().any(|s| s == name) {
            continue;
        }
        values.sort_unstable();
        let joined = values.join(",");
        if !joined.is_empty() {
            vals.push(format!("{name}.{joined}."));
        }
    }
}

fn collect_body_fields(vals: &mut Vec<String>, req: &CacheRequest, pc: &PathConfig) {
    let Some(body) = req.body.as_ref() else {
        return;
    };
    let content_type = req
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Ok(media_type) = content_type.parse::<mime::Mime>() else {
        return;
    };

    match media_type.essence_str() {
        constants::VALUE_FORM_URLENCODED if !pc.cache_key_form_fields.is_empty() => {
            let fields: Vec<(String, String)> = url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            push_form_fields(vals, &fields, &pc.cache_key_form_fields);
        }
        constants::VALUE_MULTIPART_FORM_DATA if !pc.cache_key_form_fields.is_empty() => {
            let Some(boundary) = media_type.get_param(mime::BOUNDARY) else {
                return;
            };
            let fields = crate::multipart::form_fields(body, boundary.as_str());
            push_form_fields(vals, &fields, &pc.cache_key_form_fields);
        }
        constants::VALUE_APPLICATION_JSON if !pc.cache_key_json_paths.is_empty() => {
            let document = match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => map,
                // an unparseable body contributes nothing; the reduced key
                // still resolves, it just caches less effectively
                _ => {
                    log::debug!("json body unusable for cache key derivation");
                    return;
                }
            };
            for path in &pc.cache_key_json_paths {
                match deep_search(&document, path) {
                    Ok(value) => vals.push(format!("{path}.{value}.")),
                    Err(err) => log::debug!("cache key json path skipped: {err}"),
                }
            }
        }
        _ => {}
    }
}

fn push_form_fields(vals: &mut Vec<String>, fields: &[(String, String)], selected: &[String]) {
    for name in selected {
        let value = fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
        if let Some(value) = value {
            if !value.is_empty() {
                vals.push(format!("{name}.{value}."));
            }
        }
    }
}

// Navigates a JSON object by slash-separated segments. Only scalar leaves
// resolve; arrays and objects at the leaf, absent keys, and traversal into a
// non-object all report not-found.
pub fn deep_search(document: &serde_json::Map<String, Value>, path: &str) -> Result<String, KeyError> {
    if path.is_empty() {
        return Err(KeyError::FieldNotFound(path.to_string()));
    }
    let not_found = || KeyError::FieldNotFound(path.to_string());

    let mut current = document;
    let segments: Vec<&str> = path.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        let value = current.get(*segment).ok_or_else(not_found)?;
        if i < segments.len() - 1 {
            current = value.as_object().ok_or_else(not_found)?;
            continue;
        }
        return match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(not_found()),
        };
    }
    Err(not_found())
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
