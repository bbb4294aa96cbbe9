//! Property definitions

use std::rc::Rc;

use crate::object_type::ObjectType;
use crate::xml::{parse_bool, Element};

/// Value kind of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyKind {
    #[default]
    String,
    Integer,
    Decimal,
    Bool,
    DateTime,
}

/// Schema of one property, either parsed from a type definition or
/// synthesized from a property node when no definition was available.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyType {
    id: String,
    local_name: String,
    local_namespace: String,
    display_name: String,
    query_name: String,
    kind: PropertyKind,
    /// Wire type as used in element names: `String`, `Id`, `DateTime`...
    xml_type: String,
    multi_valued: bool,
    updatable: bool,
    inherited: bool,
    required: bool,
    queryable: bool,
    orderable: bool,
    open_choice: bool,
    temporary: bool,
}

impl PropertyType {
    /// Create a definition with the given id and kind; every name defaults to the id
    pub fn new<S: Into<String>>(id: S, kind: PropertyKind) -> Self {
        let id = id.into();
        Self {
            local_name: id.clone(),
            display_name: id.clone(),
            query_name: id.clone(),
            id,
            local_namespace: String::new(),
            kind,
            xml_type: default_xml_type(kind).to_string(),
            multi_valued: false,
            updatable: false,
            inherited: false,
            required: false,
            queryable: false,
            orderable: false,
            open_choice: false,
            temporary: false,
        }
    }

    /// Parse a `cmis:property*Definition` element
    pub fn from_node(node: &Element) -> Self {
        let mut ty = Self::new("", PropertyKind::String);
        ty.local_name.clear();
        ty.display_name.clear();
        ty.query_name.clear();

        for child in node.elements() {
            let text = child.text();
            match child.local_name() {
                "id" => ty.id = text,
                "localName" => ty.local_name = text,
                "localNamespace" => ty.local_namespace = text,
                "displayName" => ty.display_name = text,
                "queryName" => ty.query_name = text,
                "propertyType" => ty.set_type_from_xml(&text),
                "cardinality" => ty.multi_valued = text.trim() == "multi",
                "updatability" => ty.updatable = text.trim() != "readonly",
                "inherited" => ty.inherited = parse_bool(&text).unwrap_or(false),
                "required" => ty.required = parse_bool(&text).unwrap_or(false),
                "queryable" => ty.queryable = parse_bool(&text).unwrap_or(false),
                "orderable" => ty.orderable = parse_bool(&text).unwrap_or(false),
                "openChoice" => ty.open_choice = parse_bool(&text).unwrap_or(false),
                _ => {}
            }
        }
        ty
    }

    /// Synthesize a temporary definition from a property value node such as
    /// `<cmis:propertyId propertyDefinitionId="..." ...>`.
    pub fn from_property_node(node: &Element) -> Self {
        let id = node.attr("propertyDefinitionId").unwrap_or_default();
        let mut ty = Self::new(id, PropertyKind::String);
        if let Some(v) = node.attr("localName") {
            ty.local_name = v.to_string();
        }
        if let Some(v) = node.attr("displayName") {
            ty.display_name = v.to_string();
        }
        if let Some(v) = node.attr("queryName") {
            ty.query_name = v.to_string();
        }

        let tag = node.local_name();
        let tag = tag.strip_prefix("property").unwrap_or(tag);
        ty.set_type_from_xml(tag);
        ty.multi_valued = node.elements().filter(|e| e.local_name() == "value").count() > 1;
        ty.temporary = true;
        ty
    }

    /// Set kind and wire type from a schema tag such as `datetime` or `Id`.
    /// Unrecognized tags are strings.
    pub fn set_type_from_xml(&mut self, tag: &str) {
        let (kind, xml_type) = match tag.trim().to_ascii_lowercase().as_str() {
            "datetime" => (PropertyKind::DateTime, "DateTime"),
            "integer" => (PropertyKind::Integer, "Integer"),
            "decimal" => (PropertyKind::Decimal, "Decimal"),
            "boolean" => (PropertyKind::Bool, "Boolean"),
            "html" => (PropertyKind::String, "Html"),
            "id" => (PropertyKind::String, "Id"),
            "uri" => (PropertyKind::String, "Uri"),
            _ => (PropertyKind::String, "String"),
        };
        self.kind = kind;
        self.xml_type = xml_type.to_string();
    }

    /// Replace every field with the definition of the same id found in
    /// `types`, if this definition is still temporary.
    ///
    /// Returns whether a definition was adopted; after the first success the
    /// type is no longer temporary and further calls do nothing.
    pub fn update(&mut self, types: &[Rc<ObjectType>]) -> bool {
        if !self.temporary {
            return false;
        }
        let found = types
            .iter()
            .find_map(|t| t.property_type(&self.id))
            .filter(|def| !def.temporary);
        match found {
            Some(def) => {
                *self = def.as_ref().clone();
                self.temporary = false;
                true
            }
            None => false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn local_namespace(&self) -> &str {
        &self.local_namespace
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn xml_type(&self) -> &str {
        &self.xml_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    pub fn is_orderable(&self) -> bool {
        self.orderable
    }

    pub fn is_open_choice(&self) -> bool {
        self.open_choice
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    #[must_use]
    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = name.into();
        self
    }

    #[must_use]
    pub fn multi_valued(mut self, multi: bool) -> Self {
        self.multi_valued = multi;
        self
    }

    #[must_use]
    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    #[must_use]
    pub fn with_xml_type(mut self, tag: &str) -> Self {
        self.set_type_from_xml(tag);
        self
    }

    #[must_use]
    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
}

fn default_xml_type(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::String => "String",
        PropertyKind::Integer => "Integer",
        PropertyKind::Decimal => "Decimal",
        PropertyKind::Bool => "Boolean",
        PropertyKind::DateTime => "DateTime",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_tags() {
        let cases = [
            ("datetime", PropertyKind::DateTime, "DateTime"),
            ("integer", PropertyKind::Integer, "Integer"),
            ("decimal", PropertyKind::Decimal, "Decimal"),
            ("boolean", PropertyKind::Bool, "Boolean"),
            ("html", PropertyKind::String, "Html"),
            ("id", PropertyKind::String, "Id"),
            ("uri", PropertyKind::String, "Uri"),
            ("string", PropertyKind::String, "String"),
            ("something-else", PropertyKind::String, "String"),
        ];
        for (tag, kind, xml) in cases {
            let ty = PropertyType::new("x", PropertyKind::Integer).with_xml_type(tag);
            assert_eq!(ty.kind(), kind, "tag {tag}");
            assert_eq!(ty.xml_type(), xml, "tag {tag}");
        }
    }

    #[test]
    fn test_from_definition_node() {
        let node = Element::parse(
            r#"<cmis:propertyIntegerDefinition xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/">
                <cmis:id>cmis:contentStreamLength</cmis:id>
                <cmis:localName>contentStreamLength</cmis:localName>
                <cmis:displayName>Content Length</cmis:displayName>
                <cmis:queryName>cmis:contentStreamLength</cmis:queryName>
                <cmis:propertyType>integer</cmis:propertyType>
                <cmis:cardinality>single</cmis:cardinality>
                <cmis:updatability>readonly</cmis:updatability>
                <cmis:inherited>false</cmis:inherited>
                <cmis:required>false</cmis:required>
                <cmis:queryable>true</cmis:queryable>
                <cmis:orderable>true</cmis:orderable>
            </cmis:propertyIntegerDefinition>"#,
        )
        .unwrap();

        let ty = PropertyType::from_node(&node);
        assert_eq!(ty.id(), "cmis:contentStreamLength");
        assert_eq!(ty.display_name(), "Content Length");
        assert_eq!(ty.kind(), PropertyKind::Integer);
        assert!(!ty.is_multi_valued());
        assert!(!ty.is_updatable());
        assert!(ty.is_queryable());
        assert!(ty.is_orderable());
        assert!(!ty.is_temporary());
    }

    #[test]
    fn test_from_property_node_is_temporary() {
        let node = Element::parse(
            r#"<cmis:propertyDateTime xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/"
                   propertyDefinitionId="my:date" localName="date" displayName="My Date" queryName="my:date">
                <cmis:value>2024-01-02T03:04:05.000Z</cmis:value>
            </cmis:propertyDateTime>"#,
        )
        .unwrap();

        let ty = PropertyType::from_property_node(&node);
        assert_eq!(ty.id(), "my:date");
        assert_eq!(ty.local_name(), "date");
        assert_eq!(ty.display_name(), "My Date");
        assert_eq!(ty.kind(), PropertyKind::DateTime);
        assert_eq!(ty.xml_type(), "DateTime");
        assert!(ty.is_temporary());
    }
}
