//! `multipart/related` MIME bodies
//!
//! Used for content-bearing SOAP calls (MTOM/XOP) in both directions and for
//! Google Drive media uploads.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{Error, Result};

/// One body part
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Part {
    /// Content-ID without angle brackets
    pub content_id: String,
    pub content_type: String,
    /// Extra headers, written after Content-Type and Content-ID
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Part {
    pub fn new<S: Into<String>>(content_type: S, body: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            body,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_content_id<S: Into<String>>(mut self, content_id: S) -> Self {
        self.content_id = content_id.into();
        self
    }

    #[must_use]
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A `multipart/related` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedMultipart {
    boundary: String,
    /// `type` parameter: media type of the root part
    root_type: Option<String>,
    /// `start-info` parameter
    start_info: Option<String>,
    parts: Vec<Part>,
}

impl Default for RelatedMultipart {
    fn default() -> Self {
        Self::new()
    }
}

impl RelatedMultipart {
    /// Empty message with a random boundary
    pub fn new() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self {
            boundary: format!("----=_Part_{token}"),
            root_type: None,
            start_info: None,
            parts: Vec::new(),
        }
    }

    /// Declare the root part type, as MTOM requires
    /// (`application/xop+xml` with `start-info` `text/xml`)
    #[must_use]
    pub fn with_root_type<S: Into<String>>(mut self, root_type: S, start_info: Option<S>) -> Self {
        self.root_type = Some(root_type.into());
        self.start_info = start_info.map(Into::into);
        self
    }

    pub fn add_part(&mut self, part: Part) {
        self.parts.push(part);
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Value for the Content-Type header of the whole message
    pub fn content_type(&self) -> String {
        let mut ct = String::from("multipart/related");
        if let Some(root_type) = &self.root_type {
            ct.push_str(&format!("; type=\"{root_type}\""));
        }
        if let Some(root) = self.parts.first().filter(|p| !p.content_id.is_empty()) {
            ct.push_str(&format!("; start=\"<{}>\"", root.content_id));
        }
        if let Some(info) = &self.start_info {
            ct.push_str(&format!("; start-info=\"{info}\""));
        }
        ct.push_str(&format!("; boundary=\"{}\"", self.boundary));
        ct
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            out.extend_from_slice(format!("Content-Type: {}\r\n", part.content_type).as_bytes());
            if !part.content_id.is_empty() {
                out.extend_from_slice(format!("Content-ID: <{}>\r\n", part.content_id).as_bytes());
            }
            for (k, v) in &part.headers {
                out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }

    /// Split a received body using the boundary from `content_type`
    pub fn parse(content_type: &str, body: &[u8]) -> Result<Self> {
        let boundary = content_type_param(content_type, "boundary")
            .ok_or_else(|| Error::Parse("multipart body without boundary".into()))?;
        let delimiter = format!("--{boundary}");
        let delimiter = delimiter.as_bytes();

        let mut parts = Vec::new();
        let mut pos = find(body, delimiter, 0)
            .ok_or_else(|| Error::Parse("multipart boundary not found in body".into()))?;
        loop {
            let start = pos + delimiter.len();
            if body[start..].starts_with(b"--") {
                break;
            }
            let Some(next) = find(body, delimiter, start) else {
                break;
            };
            parts.push(parse_part(&body[start..next])?);
            pos = next;
        }

        let mut message = Self {
            boundary,
            root_type: content_type_param(content_type, "type"),
            start_info: content_type_param(content_type, "start-info"),
            parts,
        };

        // Move the declared start part to the front
        if let Some(start) = content_type_param(content_type, "start") {
            let start = strip_cid(&start).to_string();
            if let Some(idx) = message.parts.iter().position(|p| p.content_id == start) {
                let root = message.parts.remove(idx);
                message.parts.insert(0, root);
            }
        }
        Ok(message)
    }

    /// Root part: the declared start part, otherwise the first
    pub fn root(&self) -> Option<&Part> {
        self.parts.first()
    }

    /// Part by Content-ID; accepts `cid:` references and angle brackets
    pub fn part(&self, cid: &str) -> Option<&Part> {
        let cid = strip_cid(cid);
        self.parts.iter().find(|p| p.content_id == cid)
    }
}

fn parse_part(raw: &[u8]) -> Result<Part> {
    let raw = raw
        .strip_prefix(b"\r\n")
        .or_else(|| raw.strip_prefix(b"\n"))
        .unwrap_or(raw);
    let (head, body) = match find(raw, b"\r\n\r\n", 0) {
        Some(i) => (&raw[..i], &raw[i + 4..]),
        None => match find(raw, b"\n\n", 0) {
            Some(i) => (&raw[..i], &raw[i + 2..]),
            None => return Err(Error::Parse("multipart part without header block".into())),
        },
    };
    let body = body
        .strip_suffix(b"\r\n")
        .or_else(|| body.strip_suffix(b"\n"))
        .unwrap_or(body);

    let mut part = Part::new("", body.to_vec());
    for line in String::from_utf8_lossy(head).lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-type") {
            part.content_type = value.to_string();
        } else if name.trim().eq_ignore_ascii_case("content-id") {
            part.content_id = strip_cid(value).to_string();
        } else {
            part.headers.push((name.trim().to_string(), value.to_string()));
        }
    }
    Ok(part)
}

fn strip_cid(cid: &str) -> &str {
    let cid = cid.trim();
    let cid = cid.strip_prefix("cid:").unwrap_or(cid);
    cid.trim_start_matches('<').trim_end_matches('>')
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Parameter of a Content-Type value, unquoted. Parameter names are
/// case-insensitive.
pub fn content_type_param(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        Some(v.trim().trim_matches('"').to_string())
    })
}

/// Whether a Content-Type is `multipart/related`
pub fn is_multipart_related(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("multipart/related"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_type_params() {
        let ct = r#"multipart/related; type="application/xop+xml"; boundary="uuid:abc"; start="<root.message@cxf.apache.org>"; start-info="text/xml""#;
        assert!(is_multipart_related(ct));
        assert_eq!(content_type_param(ct, "boundary").as_deref(), Some("uuid:abc"));
        assert_eq!(content_type_param(ct, "Type").as_deref(), Some("application/xop+xml"));
        assert_eq!(content_type_param(ct, "charset"), None);
        assert!(!is_multipart_related("text/xml; charset=UTF-8"));
    }

    #[test]
    fn test_written_message_parses_back() {
        let mut msg = RelatedMultipart::new().with_root_type("application/xop+xml", Some("text/xml"));
        msg.add_part(
            Part::new("application/xop+xml; charset=UTF-8; type=\"text/xml\"", b"<env/>".to_vec())
                .with_content_id("root"),
        );
        msg.add_part(
            Part::new("application/pdf", b"%PDF\r\nbinary\r\n".to_vec())
                .with_content_id("content")
                .with_header("Content-Transfer-Encoding", "binary"),
        );

        let ct = msg.content_type();
        assert!(ct.contains("start=\"<root>\""));

        let parsed = RelatedMultipart::parse(&ct, &msg.to_bytes()).unwrap();
        assert_eq!(parsed.parts().len(), 2);
        assert_eq!(parsed.root().unwrap().text(), "<env/>");
        let content = parsed.part("cid:content").unwrap();
        assert_eq!(content.body, b"%PDF\r\nbinary\r\n".to_vec());
        assert_eq!(content.header("content-transfer-encoding"), Some("binary"));
    }

    #[test]
    fn test_start_part_moves_to_front() {
        let body = b"--b\r\nContent-Type: application/octet-stream\r\nContent-ID: <data>\r\n\r\nxyz\r\n--b\r\nContent-Type: text/xml\r\nContent-ID: <main>\r\n\r\n<r/>\r\n--b--\r\n";
        let msg = RelatedMultipart::parse("multipart/related; boundary=b; start=\"<main>\"", body)
            .unwrap();
        assert_eq!(msg.root().unwrap().content_id, "main");
        assert_eq!(msg.part("<data>").unwrap().text(), "xyz");
    }

    #[test]
    fn test_missing_boundary_is_an_error() {
        assert!(RelatedMultipart::parse("multipart/related", b"--x\r\n").is_err());
    }
}
