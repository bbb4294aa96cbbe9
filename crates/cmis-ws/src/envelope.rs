//! SOAP envelopes, faults and MTOM packaging

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use cmis_core::multipart::{is_multipart_related, Part, RelatedMultipart};
use cmis_core::property::format_date_time;
use cmis_core::xml::Element;
use cmis_core::{Error, ErrorKind, HttpResponse, Namespaces, Result, SoapFault};

/// Content-ID of the attachment carrying an uploaded content stream
pub const CONTENT_CID: &str = "content";

const ROOT_CID: &str = "root";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

/// WS-Security UsernameToken credentials
#[derive(Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for UsernameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameToken")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// `wsse:Security` header with a timestamp valid for 24 hours
pub fn security_header(ns: &Namespaces, token: &UsernameToken, now: DateTime<Utc>) -> Element {
    let created = format_date_time(&now);
    let expires = format_date_time(&(now + Duration::hours(24)));
    let mut security = ns.element("wsse:Security");
    ns.declare(&mut security, &["wsse", "wsu"]);
    security
        .with_child(
            ns.element("wsu:Timestamp")
                .with_child(ns.element("wsu:Created").with_text(created.clone()))
                .with_child(ns.element("wsu:Expires").with_text(expires)),
        )
        .with_child(
            ns.element("wsse:UsernameToken")
                .with_child(ns.element("wsse:Username").with_text(token.username.as_str()))
                .with_child(
                    ns.element("wsse:Password")
                        .with_attr("Type", PASSWORD_TEXT)
                        .with_text(token.password.as_str()),
                )
                .with_child(ns.element("wsu:Created").with_text(created)),
        )
}

/// Wrap a request element in a SOAP 1.1 envelope
pub fn envelope(ns: &Namespaces, token: Option<&UsernameToken>, request: Element) -> Element {
    let mut env = ns.element("soap-env:Envelope");
    ns.declare(&mut env, &["soap-env", "cmis", "cmism", "xop"]);
    let mut header = ns.element("soap-env:Header");
    if let Some(token) = token {
        header.push_child(security_header(ns, token, Utc::now()));
    }
    env.with_child(header)
        .with_child(ns.element("soap-env:Body").with_child(request))
}

/// A serialized request: body bytes and the Content-Type to send them with
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl SoapRequest {
    /// Plain `text/xml` request
    pub fn plain(envelope: &Element) -> Result<Self> {
        Ok(Self {
            content_type: "text/xml; charset=UTF-8".to_string(),
            body: envelope.to_document()?.into_bytes(),
        })
    }

    /// MTOM request: the envelope as the XOP root part, followed by the
    /// attachment referenced from `xop:Include href="cid:content"`
    pub fn mtom(envelope: &Element, attachment_type: &str, attachment: Vec<u8>) -> Result<Self> {
        let mut message = RelatedMultipart::new().with_root_type("application/xop+xml", Some("text/xml"));
        message.add_part(
            Part::new(
                "application/xop+xml; charset=UTF-8; type=\"text/xml\"",
                envelope.to_document()?.into_bytes(),
            )
            .with_content_id(ROOT_CID),
        );
        message.add_part(
            Part::new(attachment_type, attachment)
                .with_content_id(CONTENT_CID)
                .with_header("Content-Transfer-Encoding", "binary"),
        );
        Ok(Self {
            content_type: message.content_type(),
            body: message.to_bytes(),
        })
    }
}

/// A decoded response: the element inside `soap-env:Body` and any MTOM
/// attachments
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub body: Element,
    pub attachments: Option<RelatedMultipart>,
}

impl SoapResponse {
    /// Decode an HTTP response. A fault in the body becomes
    /// [`Error::SoapFault`] whatever the HTTP status; a non-SOAP error
    /// response maps through its status.
    pub fn decode(ns: &Namespaces, response: HttpResponse) -> Result<Self> {
        let (xml, attachments) = if is_multipart_related(response.content_type()) {
            let message = RelatedMultipart::parse(response.content_type(), &response.body)?;
            let root = message
                .root()
                .map(|p| p.body.clone())
                .ok_or_else(|| Error::Parse("MTOM response without parts".into()))?;
            (root, Some(message))
        } else {
            (response.body.clone(), None)
        };

        let envelope = Element::parse_bytes(&xml)
            .ok()
            .filter(|env| env.is(ns, "soap-env:Envelope"));
        let Some(envelope) = envelope else {
            response.error_for_status()?;
            return Err(Error::Parse("response is not a SOAP envelope".into()));
        };

        let body = envelope
            .child(ns, "soap-env:Body")
            .ok_or_else(|| Error::Parse("SOAP envelope without Body".into()))?;
        let content = body
            .elements()
            .next()
            .ok_or_else(|| Error::Parse("empty SOAP Body".into()))?;
        if content.is(ns, "soap-env:Fault") {
            return Err(Error::SoapFault(parse_fault(content)));
        }
        if !response.is_success() {
            return Err(Error::from_http_status(
                response.status,
                format!("SOAP call failed with HTTP {}", response.status),
            ));
        }
        Ok(Self {
            body: content.clone(),
            attachments,
        })
    }

    /// Bytes of a binary element: either inline base64 or an `xop:Include`
    /// pointing at an attachment
    pub fn binary(&self, ns: &Namespaces, element: &Element) -> Result<Vec<u8>> {
        if let Some(include) = element.child(ns, "xop:Include") {
            let href = include
                .attr("href")
                .ok_or_else(|| Error::Parse("xop:Include without href".into()))?;
            let part = self
                .attachments
                .as_ref()
                .and_then(|m| m.part(href))
                .ok_or_else(|| Error::Parse(format!("missing MTOM attachment {href}")))?;
            return Ok(part.body.clone());
        }
        let text: String = element.text().split_whitespace().collect();
        STANDARD
            .decode(text)
            .map_err(|e| Error::Parse(format!("invalid base64 stream: {e}")))
    }
}

/// Read `faultcode`, `faultstring` and the `cmisFault` detail
pub fn parse_fault(fault: &Element) -> SoapFault {
    let text = |local: &str| fault.child_local(local).map(|e| e.text().trim().to_string());
    let cmis_fault = fault
        .child_local("detail")
        .and_then(|d| d.child_local("cmisFault"));
    let detail_text = |local: &str| {
        cmis_fault
            .and_then(|f| f.child_local(local))
            .map(|e| e.text().trim().to_string())
    };
    SoapFault {
        code: text("faultcode").unwrap_or_default(),
        message: text("faultstring").unwrap_or_default(),
        cmis_type: detail_text("type").and_then(|t| ErrorKind::parse(&t)),
        cmis_code: detail_text("code").and_then(|c| c.parse().ok()),
        detail: detail_text("message").unwrap_or_default(),
    }
}
