//! Atom entries and feeds carrying CMIS objects

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use cmis_core::property::{format_date_time, properties_element};
use cmis_core::xml::Element;
use cmis_core::{
    BindingKind, ContentStream, Namespaces, Object, PropertyMap, Rendition, TypeResolver,
};

pub const MEDIA_ENTRY: &str = "application/atom+xml;type=entry";
pub const MEDIA_FEED: &str = "application/atom+xml;type=feed";

/// Link relations used by the binding
pub mod rel {
    pub const SELF: &str = "self";
    pub const EDIT: &str = "edit";
    pub const EDIT_MEDIA: &str = "edit-media";
    pub const DOWN: &str = "down";
    pub const UP: &str = "up";
    pub const NEXT: &str = "next";
    pub const ALTERNATE: &str = "alternate";
    pub const FOLDER_TREE: &str = "http://docs.oasis-open.org/ns/cmis/link/200908/foldertree";
}

/// An `atom:link`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub media_type: String,
    /// `cmisra:renditionKind` on alternate links
    pub rendition_kind: String,
    /// `cmisra:id` on alternate links: the rendition stream id
    pub stream_id: String,
}

/// Navigation data of an entry, kept by the session per object id
#[derive(Debug, Clone, Default)]
pub struct EntryLinks {
    pub links: Vec<Link>,
    /// `src` of `atom:content`
    pub content_src: Option<String>,
}

impl EntryLinks {
    pub fn from_node(entry: &Element, ns: &Namespaces) -> Self {
        let links = entry
            .children(ns, "atom:link")
            .filter_map(|l| {
                Some(Link {
                    rel: l.attr("rel")?.to_string(),
                    href: l.attr("href")?.to_string(),
                    media_type: l.attr("type").unwrap_or_default().to_string(),
                    rendition_kind: l.attr("renditionKind").unwrap_or_default().to_string(),
                    stream_id: l.attr("id").unwrap_or_default().to_string(),
                })
            })
            .collect();
        let content_src = entry
            .child(ns, "atom:content")
            .and_then(|c| c.attr("src"))
            .map(str::to_string);
        Self { links, content_src }
    }

    /// First link with relation `rel`
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == rel)
            .map(|l| l.href.as_str())
    }

    /// First link with relation `rel` whose media type starts with
    /// `media_type`, ignoring whitespace
    pub fn typed_link(&self, rel: &str, media_type: &str) -> Option<&str> {
        let wanted: String = media_type.split_whitespace().collect();
        self.links
            .iter()
            .find(|l| {
                let have: String = l.media_type.split_whitespace().collect();
                l.rel == rel && have.starts_with(&wanted)
            })
            .map(|l| l.href.as_str())
    }

    /// Where the object's content can be downloaded
    pub fn content_url(&self) -> Option<&str> {
        self.content_src
            .as_deref()
            .or_else(|| self.link(rel::EDIT_MEDIA))
    }
}

/// An entry: the parsed object and its links
#[derive(Debug, Clone)]
pub struct Entry {
    pub object: Object,
    pub links: EntryLinks,
}

impl Entry {
    /// Parse an `atom:entry` holding a `cmisra:object`; `None` when the entry
    /// carries no object
    pub fn from_node(entry: &Element, ns: &Namespaces, resolver: &dyn TypeResolver) -> Option<Self> {
        let object_node = entry.child(ns, "cmisra:object")?;
        let links = EntryLinks::from_node(entry, ns);
        let mut object = Object::from_node(object_node, resolver, BindingKind::AtomPub);
        let renditions = rendition_urls(object.renditions(), &links);
        if !renditions.is_empty() {
            object = object.with_renditions(renditions);
        }
        Some(Self { object, links })
    }
}

/// Fill rendition URLs from alternate links, or build renditions from the
/// links alone when the object lists none.
fn rendition_urls(renditions: &[Rendition], links: &EntryLinks) -> Vec<Rendition> {
    let alternates: Vec<&Link> = links
        .links
        .iter()
        .filter(|l| l.rel == rel::ALTERNATE && !l.rendition_kind.is_empty())
        .collect();
    if alternates.is_empty() {
        return Vec::new();
    }
    if renditions.is_empty() {
        return alternates
            .iter()
            .map(|l| Rendition {
                stream_id: l.stream_id.clone(),
                mime_type: l.media_type.clone(),
                kind: l.rendition_kind.clone(),
                url: l.href.clone(),
                ..Default::default()
            })
            .collect();
    }
    renditions
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if let Some(link) = alternates
                .iter()
                .find(|l| l.stream_id == r.stream_id)
                .or_else(|| alternates.iter().find(|l| l.rendition_kind == r.kind))
            {
                r.url = link.href.clone();
            }
            r
        })
        .collect()
}

/// A feed page
#[derive(Debug, Clone)]
pub struct Feed {
    pub entries: Vec<Entry>,
    /// URL of the next page
    pub next: Option<String>,
}

impl Feed {
    pub fn from_node(feed: &Element, ns: &Namespaces, resolver: &dyn TypeResolver) -> Self {
        let entries = feed
            .children(ns, "atom:entry")
            .filter_map(|e| Entry::from_node(e, ns, resolver))
            .collect();
        let next = feed
            .children(ns, "atom:link")
            .find(|l| l.attr("rel") == Some(rel::NEXT))
            .and_then(|l| l.attr("href"))
            .map(str::to_string);
        Self { entries, next }
    }
}

/// Entry document for creating or updating an object
pub fn object_entry(
    ns: &Namespaces,
    title: &str,
    properties: &PropertyMap,
    content: Option<&ContentStream>,
) -> Element {
    let mut entry = ns.element("atom:entry");
    ns.declare(&mut entry, &["atom", "app", "cmis", "cmisra"]);
    entry.push_child(ns.element("atom:id").with_text("urn:uuid:00000000-0000-0000-0000-000000000000"));
    entry.push_child(ns.element("atom:title").with_text(title));
    entry.push_child(ns.element("atom:updated").with_text(format_date_time(&Utc::now())));

    if let Some(content) = content {
        entry.push_child(
            ns.element("cmisra:content")
                .with_child(ns.element("cmisra:mediatype").with_text(content.mime_type()))
                .with_child(ns.element("cmisra:base64").with_text(STANDARD.encode(&content.data))),
        );
    }

    entry.push_child(ns.element("cmisra:object").with_child(properties_element(ns, properties)));
    entry
}
