//! Owned XML element tree built on `quick-xml`.
//!
//! CMIS responses are small documents that get walked many times (object
//! properties, allowable actions, renditions, links), so they are read once
//! into an [`Element`] tree and queried with prefixed paths such as
//! `cmis:properties/cmis:propertyId`. Prefixes in a query are resolved through
//! a [`Namespaces`] table handed in by the session, never through the
//! prefixes the server happened to use in its document.

use std::borrow::Cow;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;

use crate::error::{Error, Result};

pub const NS_CMIS: &str = "http://docs.oasis-open.org/ns/cmis/core/200908/";
pub const NS_CMISRA: &str = "http://docs.oasis-open.org/ns/cmis/restatom/200908/";
pub const NS_CMISM: &str = "http://docs.oasis-open.org/ns/cmis/messaging/200908/";
pub const NS_CMISW: &str = "http://docs.oasis-open.org/ns/cmis/ws/200908/";
pub const NS_APP: &str = "http://www.w3.org/2007/app";
pub const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
pub const NS_SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const NS_WSDL: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const NS_SOAP: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const NS_SOAP12: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const NS_XOP: &str = "http://www.w3.org/2004/08/xop/include";
pub const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Prefix → namespace URI table used to resolve query paths and to declare
/// namespaces on serialized documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    entries: Vec<(String, String)>,
}

impl Default for Namespaces {
    /// The CMIS prefix table
    fn default() -> Self {
        let entries = [
            ("cmis", NS_CMIS),
            ("cmisra", NS_CMISRA),
            ("cmism", NS_CMISM),
            ("cmisw", NS_CMISW),
            ("app", NS_APP),
            ("atom", NS_ATOM),
            ("soap-env", NS_SOAP_ENV),
            ("wsdl", NS_WSDL),
            ("soap", NS_SOAP),
            ("soap12", NS_SOAP12),
            ("xop", NS_XOP),
            ("wsse", NS_WSSE),
            ("wsu", NS_WSU),
            ("xsi", NS_XSI),
        ];
        Self {
            entries: entries
                .iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect(),
        }
    }
}

impl Namespaces {
    /// An empty table
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a prefix binding
    pub fn with(mut self, prefix: &str, uri: &str) -> Self {
        self.entries.retain(|(p, _)| p != prefix);
        self.entries.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Namespace URI bound to `prefix`
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }

    /// Build an empty element named by a prefixed name like `cmis:value`.
    ///
    /// The namespace URI is taken from this table so the element matches
    /// queries before it is ever serialized.
    pub fn element(&self, qname: &str) -> Element {
        let (prefix, local) = split_qname(qname);
        Element {
            prefix: prefix.map(str::to_string),
            local_name: local.to_string(),
            namespace: prefix.and_then(|p| self.uri(p)).map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add `xmlns:prefix` declarations for `prefixes` to `element`
    pub fn declare(&self, element: &mut Element, prefixes: &[&str]) {
        for prefix in prefixes {
            if let Some(uri) = self.uri(prefix) {
                element.set_attr(&format!("xmlns:{prefix}"), uri);
            }
        }
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// A node in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with resolved namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    /// Attributes keyed by their qualified name as written
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Parse a complete document and return its root element
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = NsReader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let (ns, event) = reader.read_resolved_event()?;
            let namespace = match ns {
                ResolveResult::Bound(ns) => {
                    Some(String::from_utf8_lossy(ns.into_inner()).into_owned())
                }
                _ => None,
            };

            match event {
                Event::Start(e) => {
                    stack.push(Self::from_start(&e, namespace)?);
                }
                Event::Empty(e) => {
                    let element = Self::from_start(&e, namespace)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Parse("unbalanced end tag".into()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(t.unescape()?.into_owned()));
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| Error::Parse("document has no root element".into()))
    }

    /// Parse raw bytes, replacing invalid UTF-8
    pub fn parse_bytes(bytes: &[u8]) -> Result<Element> {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    fn from_start(e: &BytesStart<'_>, namespace: Option<String>) -> Result<Element> {
        let name = e.name();
        let prefix = name
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
        let local_name = String::from_utf8_lossy(name.local_name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Element {
            prefix,
            local_name,
            namespace,
            attributes,
            children: Vec::new(),
        })
    }

    /// Local part of the element name
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Resolved namespace URI
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name as written, including the prefix
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(p) => Cow::Owned(format!("{p}:{}", self.local_name)),
            None => Cow::Borrowed(&self.local_name),
        }
    }

    /// Check the element against a prefixed name resolved through `ns`.
    ///
    /// An unprefixed query or a prefix missing from the table matches on the
    /// local name alone.
    pub fn is(&self, ns: &Namespaces, qname: &str) -> bool {
        let (prefix, local) = split_qname(qname);
        if self.local_name != local {
            return false;
        }
        match prefix.and_then(|p| ns.uri(p)) {
            Some(uri) => self.namespace.as_deref() == Some(uri),
            None => true,
        }
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All child nodes
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// First child matching `qname`
    pub fn child(&self, ns: &Namespaces, qname: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, qname))
    }

    /// All children matching `qname`
    pub fn children<'a>(
        &'a self,
        ns: &'a Namespaces,
        qname: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(ns, qname))
    }

    /// First child with the given local name, in any namespace
    pub fn child_local(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name == local)
    }

    /// All children with the given local name, in any namespace
    pub fn children_local<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.local_name == local)
    }

    /// Follow a `/`-separated path of prefixed names from this element.
    ///
    /// A leading `//` searches the first step among all descendants
    /// (document order), like the XPath descendant axis.
    pub fn find(&self, ns: &Namespaces, path: &str) -> Option<&Element> {
        let (descendant, path) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut steps = path.split('/').filter(|s| !s.is_empty());
        let first = steps.next()?;
        let mut current = if descendant {
            self.descendants().find(|e| e.is(ns, first))?
        } else {
            self.child(ns, first)?
        };
        for step in steps {
            current = current.child(ns, step)?;
        }
        Some(current)
    }

    /// All elements reached by `path`; the last step may match several.
    pub fn find_all<'a>(&'a self, ns: &Namespaces, path: &str) -> Vec<&'a Element> {
        let path = path.trim_start_matches('/');
        match path.rsplit_once('/') {
            Some((parent, last)) => match self.find(ns, parent) {
                Some(p) => p.elements().filter(|e| e.is(ns, last)).collect(),
                None => Vec::new(),
            },
            None => self.elements().filter(|e| e.is(ns, path)).collect(),
        }
    }

    /// Depth-first iterator over every descendant element
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.elements().collect::<Vec<_>>().into_iter().rev().collect(),
        }
    }

    /// Concatenated text of this element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Text of the first child matching `qname`
    pub fn child_text(&self, ns: &Namespaces, qname: &str) -> Option<String> {
        self.child(ns, qname).map(Element::text)
    }

    /// Attribute by qualified name, falling back to the local part
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| split_qname(k).1 == name && !k.starts_with("xmlns"))
            })
            .map(|(_, v)| v.as_str())
    }

    /// All attributes as written
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    #[must_use]
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Write this element and its subtree
    pub fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let name = self.qualified_name();
        let mut start = BytesStart::new(name.as_ref());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(name.as_ref())))?;
        Ok(())
    }

    /// Serialize as a standalone document with an XML declaration
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write(&mut writer)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Serialize as a fragment, without declaration
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

/// Iterator returned by [`Element::descendants`]
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        let mut children: Vec<&Element> = next.elements().collect();
        children.reverse();
        self.stack.extend(children);
        Some(next)
    }
}

/// Parse an XML Schema boolean (`true`/`false`/`1`/`0`)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"<?xml version="1.0"?>
<a:root xmlns:a="http://docs.oasis-open.org/ns/cmis/core/200908/" xmlns:b="urn:other" id="r">
    <a:first>one</a:first>
    <b:first>two</b:first>
    <a:nested><a:leaf attr="x &amp; y">deep &lt;text&gt;</a:leaf></a:nested>
    <a:empty/>
</a:root>"#;

    #[test]
    fn test_parse_resolves_server_prefixes() {
        let ns = Namespaces::default();
        let root = Element::parse(DOC).unwrap();

        assert!(root.is(&ns, "cmis:root"));
        assert_eq!(root.attr("id"), Some("r"));
        // The document uses `a:` for the CMIS namespace; the query uses `cmis:`.
        assert_eq!(root.child_text(&ns, "cmis:first").as_deref(), Some("one"));
        assert_eq!(root.children_local("first").count(), 2);
        assert_eq!(root.children(&ns, "cmis:first").count(), 1);
    }

    #[test]
    fn test_find_paths() {
        let ns = Namespaces::default();
        let root = Element::parse(DOC).unwrap();

        let leaf = root.find(&ns, "cmis:nested/cmis:leaf").unwrap();
        assert_eq!(leaf.text(), "deep <text>");
        assert_eq!(leaf.attr("attr"), Some("x & y"));

        let leaf = root.find(&ns, "//cmis:leaf").unwrap();
        assert_eq!(leaf.local_name(), "leaf");
        assert!(root.find(&ns, "cmis:missing").is_none());
        assert!(root.find(&ns, "cmis:empty").is_some());
        assert_eq!(root.find_all(&ns, "cmis:nested/cmis:leaf").len(), 1);
    }

    #[test]
    fn test_write_round_trip() {
        let ns = Namespaces::default();
        let mut props = ns.element("cmis:properties");
        ns.declare(&mut props, &["cmis"]);
        let props = props.with_child(
            ns.element("cmis:propertyString")
                .with_attr("propertyDefinitionId", "cmis:name")
                .with_child(ns.element("cmis:value").with_text("a & b")),
        );

        let xml = props.to_xml().unwrap();
        assert!(xml.contains("a &amp; b"));

        let parsed = Element::parse(&xml).unwrap();
        let value = parsed.find(&ns, "cmis:propertyString/cmis:value").unwrap();
        assert_eq!(value.text(), "a & b");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
    }
}
