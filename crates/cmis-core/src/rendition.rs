//! Renditions

use crate::xml::Element;

/// Kind reported for thumbnails
pub const THUMBNAIL_KIND: &str = "cmis:thumbnail";

/// An alternate representation of an object's content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendition {
    pub stream_id: String,
    pub mime_type: String,
    pub kind: String,
    /// Download location, when the binding provides one
    pub url: String,
    pub title: String,
    pub length: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rendition_document_id: String,
}

impl Rendition {
    /// Parse a `cmis:rendition` element
    pub fn from_node(node: &Element) -> Self {
        let mut r = Rendition::default();
        for child in node.elements() {
            let text = child.text();
            match child.local_name() {
                "streamId" => r.stream_id = text,
                "mimetype" | "mimeType" => r.mime_type = text,
                "kind" => r.kind = text,
                "title" => r.title = text,
                "length" => r.length = text.trim().parse().ok(),
                "width" => r.width = text.trim().parse().ok(),
                "height" => r.height = text.trim().parse().ok(),
                "renditionDocumentId" => r.rendition_document_id = text,
                _ => {}
            }
        }
        r
    }

    pub fn is_thumbnail(&self) -> bool {
        self.kind == THUMBNAIL_KIND
    }
}
