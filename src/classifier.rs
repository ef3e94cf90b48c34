use reqwest::Url;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::RelayError;

/// How much of an unparsable structured body is kept for display
pub const RAW_PREVIEW_LIMIT: usize = 1000;

/// Top-level fields that identify a record; checked in order
const IDENTITY_FIELDS: &[&str] = &["id", "uuid", "guid"];

const IMAGE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png"];
const VIDEO_SUFFIXES: &[&str] = &[".mp4", ".mov"];
const DOCUMENT_SUFFIXES: &[&str] = &[".pdf", ".txt", ".docx"];

/// Value used to detect that an endpoint's content changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Explicit identity field of a structured response
    Identity(String),
    /// SHA-256 of the raw response bytes
    Digest([u8; 32]),
}

impl Fingerprint {
    pub fn of_bytes(body: &[u8]) -> Self {
        Fingerprint::Digest(Sha256::digest(body).into())
    }
}

/// Where a media item's content comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Url(String),
    Bytes { data: Vec<u8>, file_name: String },
}

/// One renderable piece of a response
#[derive(Debug, Clone, PartialEq)]
pub enum RenderablePayload {
    /// Ordered label → value pairs
    TextFields(Vec<(String, String)>),
    Image { label: String, source: MediaSource },
    Video { label: String, source: MediaSource },
    Document { label: String, source: MediaSource },
    Link { label: String, url: String },
}

/// Result of classifying one response
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub items: Vec<RenderablePayload>,
    pub fingerprint: Fingerprint,
}

/// Coarse kind of a response, from its declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Structured,
    Text,
    Image,
    Video,
    Document,
    Unknown,
}

impl ContentKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ContentKind::Unknown;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/json" | "text/json" => ContentKind::Structured,
            m if m.ends_with("+json") => ContentKind::Structured,
            "application/pdf" => ContentKind::Document,
            "application/xml" | "application/xhtml+xml" => ContentKind::Text,
            m if m.ends_with("+xml") || m.starts_with("text/") => ContentKind::Text,
            m if m.starts_with("image/") => ContentKind::Image,
            m if m.starts_with("video/") => ContentKind::Video,
            _ => ContentKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
    Document,
}

/// Turn a response into renderable items plus its fingerprint.
///
/// Never fails: bodies that cannot be interpreted degrade to raw text.
/// `base_url` is the endpoint the body came from, used to resolve relative
/// media paths and to caption raw media uploads.
pub fn classify(body: &[u8], content_type: Option<&str>, base_url: Option<&str>) -> Classification {
    let text = || String::from_utf8_lossy(body).into_owned();

    match ContentKind::from_content_type(content_type) {
        ContentKind::Structured => match serde_json::from_slice::<Value>(body) {
            Ok(value) => classify_structured(&value, body, base_url),
            Err(e) => {
                debug!("{}; keeping raw text", RelayError::Parse(e.to_string()));
                let preview: String = text().chars().take(RAW_PREVIEW_LIMIT).collect();
                Classification {
                    items: vec![single_field("raw", preview)],
                    fingerprint: Fingerprint::of_bytes(body),
                }
            }
        },
        ContentKind::Text => Classification {
            items: vec![single_field("content", text())],
            fingerprint: Fingerprint::of_bytes(body),
        },
        ContentKind::Image => raw_media(MediaKind::Image, body, content_type, base_url),
        ContentKind::Video => raw_media(MediaKind::Video, body, content_type, base_url),
        ContentKind::Document => raw_media(MediaKind::Document, body, content_type, base_url),
        ContentKind::Unknown => Classification {
            items: vec![single_field("raw_data", text())],
            fingerprint: Fingerprint::of_bytes(body),
        },
    }
}

fn single_field(label: &str, value: String) -> RenderablePayload {
    if value.trim().is_empty() {
        RenderablePayload::TextFields(Vec::new())
    } else {
        RenderablePayload::TextFields(vec![(label.to_string(), value)])
    }
}

fn classify_structured(value: &Value, body: &[u8], base_url: Option<&str>) -> Classification {
    let fingerprint = identity_of(value)
        .map(Fingerprint::Identity)
        .unwrap_or_else(|| Fingerprint::of_bytes(body));

    let mut flat = Vec::new();
    match value {
        Value::Object(map) if map.is_empty() => {}
        Value::Array(list) if list.is_empty() => {}
        _ => flatten("", value, &mut flat),
    }

    let mut fields = Vec::new();
    let mut extracted = Vec::new();
    for (label, text) in flat {
        match reclassify(&label, &text, base_url) {
            Some(item) => extracted.push(item),
            None => fields.push((label, text)),
        }
    }

    let mut items = Vec::with_capacity(extracted.len() + 1);
    if !fields.is_empty() {
        items.push(RenderablePayload::TextFields(fields));
    }
    items.extend(extracted);

    Classification { items, fingerprint }
}

fn identity_of(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    IDENTITY_FIELDS.iter().find_map(|field| match object.get(*field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };

    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten(&join(key), child, out);
            }
        }
        Value::Array(list) if !list.is_empty() => {
            for (i, child) in list.iter().enumerate() {
                flatten(&join(&i.to_string()), child, out);
            }
        }
        other => {
            let label = if prefix.is_empty() { "value" } else { prefix };
            out.push((label.to_string(), scalar_text(other)));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pull URL-like values out of the text fields as media or links
fn reclassify(label: &str, value: &str, base_url: Option<&str>) -> Option<RenderablePayload> {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return None;
    }

    let url = if has_http_scheme(value) {
        value.to_string()
    } else {
        resolve(value, base_url)?
    };
    let kind = media_kind(&path_of(&url));
    let label = label.to_string();
    let source = MediaSource::Url(url.clone());

    Some(match kind {
        Some(MediaKind::Image) => RenderablePayload::Image { label, source },
        Some(MediaKind::Video) => RenderablePayload::Video { label, source },
        Some(MediaKind::Document) => RenderablePayload::Document { label, source },
        None => RenderablePayload::Link { label, url },
    })
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Lowercased path of a URL or bare path, without query or fragment
fn path_of(value: &str) -> String {
    match Url::parse(value) {
        Ok(url) => url.path().to_ascii_lowercase(),
        Err(_) => value
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    }
}

fn media_kind(path: &str) -> Option<MediaKind> {
    let has = |suffixes: &[&str]| suffixes.iter().any(|s| path.ends_with(s));
    if has(IMAGE_SUFFIXES) {
        Some(MediaKind::Image)
    } else if has(VIDEO_SUFFIXES) {
        Some(MediaKind::Video)
    } else if has(DOCUMENT_SUFFIXES) {
        Some(MediaKind::Document)
    } else {
        None
    }
}

/// Rooted paths such as `/img/a.png` resolve against the endpoint; bare names never do
fn resolve(path: &str, base_url: Option<&str>) -> Option<String> {
    if !path.starts_with('/') || path.starts_with("//") {
        return None;
    }
    let url = Url::parse(base_url?).ok()?.join(path).ok()?;
    media_kind(&path_of(url.as_str()))?;
    Some(url.to_string())
}

fn raw_media(
    kind: MediaKind,
    body: &[u8],
    content_type: Option<&str>,
    base_url: Option<&str>,
) -> Classification {
    let fingerprint = Fingerprint::of_bytes(body);
    if body.is_empty() {
        return Classification {
            items: vec![RenderablePayload::TextFields(Vec::new())],
            fingerprint,
        };
    }

    let (stem, fallback_ext) = match kind {
        MediaKind::Image => ("image", "png"),
        MediaKind::Video => ("video", "mp4"),
        MediaKind::Document => ("document", "pdf"),
    };
    let ext = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.trim().split('/').nth(1))
        .map(|sub| sub.trim_start_matches("x-").split('+').next().unwrap_or(sub))
        .filter(|sub| !sub.is_empty())
        .unwrap_or(fallback_ext)
        .to_ascii_lowercase();

    let label = base_url.unwrap_or(stem).to_string();
    let source = MediaSource::Bytes {
        data: body.to_vec(),
        file_name: format!("{}.{}", stem, ext),
    };
    let item = match kind {
        MediaKind::Image => RenderablePayload::Image { label, source },
        MediaKind::Video => RenderablePayload::Video { label, source },
        MediaKind::Document => RenderablePayload::Document { label, source },
    };

    Classification {
        items: vec![item],
        fingerprint,
    }
}
