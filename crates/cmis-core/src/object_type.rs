//! Object type definitions

use std::rc::Rc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use log::debug;

use crate::error::{Error, Result};
use crate::property_type::PropertyType;
use crate::session::{BindingKind, Session};
use crate::xml::{parse_bool, Element};

/// Base type ids
pub const BASE_DOCUMENT: &str = "cmis:document";
pub const BASE_FOLDER: &str = "cmis:folder";
pub const BASE_RELATIONSHIP: &str = "cmis:relationship";
pub const BASE_POLICY: &str = "cmis:policy";
pub const BASE_ITEM: &str = "cmis:item";
pub const BASE_SECONDARY: &str = "cmis:secondary";

/// Whether documents of a type carry content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentStreamAllowed {
    #[default]
    Allowed,
    NotAllowed,
    Required,
}

impl ContentStreamAllowed {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "notallowed" => ContentStreamAllowed::NotAllowed,
            "required" => ContentStreamAllowed::Required,
            _ => ContentStreamAllowed::Allowed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStreamAllowed::Allowed => "allowed",
            ContentStreamAllowed::NotAllowed => "notallowed",
            ContentStreamAllowed::Required => "required",
        }
    }
}

/// A type definition with its property definitions.
///
/// Types are owned by the session's type registry and shared as
/// `Rc<ObjectType>`. A type parsed outside a session is unbound and cannot
/// navigate to its parent, base type or children.
#[derive(Debug, Clone)]
pub struct ObjectType {
    id: String,
    local_name: String,
    local_namespace: String,
    display_name: String,
    query_name: String,
    description: String,
    parent_type_id: String,
    base_type_id: String,
    creatable: bool,
    fileable: bool,
    queryable: bool,
    fulltext_indexed: bool,
    included_in_supertype_query: bool,
    controllable_policy: bool,
    controllable_acl: bool,
    versionable: bool,
    content_stream_allowed: ContentStreamAllowed,
    property_types: AHashMap<String, Rc<PropertyType>>,
    refresh_timestamp: DateTime<Utc>,
    binding: Option<BindingKind>,
}

impl ObjectType {
    /// An empty definition for `id` deriving from `base_type_id`
    pub fn new<S: Into<String>, B: Into<String>>(id: S, base_type_id: B) -> Self {
        let id = id.into();
        Self {
            local_name: id.clone(),
            display_name: id.clone(),
            query_name: id.clone(),
            id,
            local_namespace: String::new(),
            description: String::new(),
            parent_type_id: String::new(),
            base_type_id: base_type_id.into(),
            creatable: false,
            fileable: false,
            queryable: false,
            fulltext_indexed: false,
            included_in_supertype_query: false,
            controllable_policy: false,
            controllable_acl: false,
            versionable: false,
            content_stream_allowed: ContentStreamAllowed::default(),
            property_types: AHashMap::new(),
            refresh_timestamp: Utc::now(),
            binding: None,
        }
    }

    /// Parse a type definition element (`cmisra:type`, or the `type` of a
    /// Web-Services response).
    ///
    /// Known children fill the scalar fields; every other child element is
    /// read as a property definition and registered by id.
    pub fn from_node(node: &Element) -> Self {
        let mut ty = Self::new("", "");
        ty.local_name.clear();
        ty.display_name.clear();
        ty.query_name.clear();

        for child in node.elements() {
            let text = || child.text();
            let flag = || parse_bool(&child.text()).unwrap_or(false);
            match child.local_name() {
                "id" => ty.id = text(),
                "localName" => ty.local_name = text(),
                "localNamespace" => ty.local_namespace = text(),
                "displayName" => ty.display_name = text(),
                "queryName" => ty.query_name = text(),
                "description" => ty.description = text(),
                "baseId" => ty.base_type_id = text(),
                "parentId" => ty.parent_type_id = text(),
                "creatable" => ty.creatable = flag(),
                "fileable" => ty.fileable = flag(),
                "queryable" => ty.queryable = flag(),
                "fulltextIndexed" => ty.fulltext_indexed = flag(),
                "includedInSupertypeQuery" => ty.included_in_supertype_query = flag(),
                "controllablePolicy" => ty.controllable_policy = flag(),
                "controllableACL" => ty.controllable_acl = flag(),
                "versionable" => ty.versionable = flag(),
                "contentStreamAllowed" => {
                    ty.content_stream_allowed = ContentStreamAllowed::parse(&text())
                }
                _ => {
                    let prop = PropertyType::from_node(child);
                    if prop.id().is_empty() {
                        debug!("skipping type child {} without id", child.local_name());
                        continue;
                    }
                    ty.property_types.insert(prop.id().to_string(), Rc::new(prop));
                }
            }
        }
        ty.refresh_timestamp = Utc::now();
        ty
    }

    /// Mark the type as owned by a session of the given binding
    #[must_use]
    pub fn bound_to(mut self, binding: BindingKind) -> Self {
        self.binding = Some(binding);
        self
    }

    #[must_use]
    pub fn with_parent<S: Into<String>>(mut self, parent_type_id: S) -> Self {
        self.parent_type_id = parent_type_id.into();
        self
    }

    #[must_use]
    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = name.into();
        self
    }

    #[must_use]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_content_stream_allowed(mut self, allowed: ContentStreamAllowed) -> Self {
        self.content_stream_allowed = allowed;
        self
    }

    /// Set the creatable, fileable and queryable flags at once
    #[must_use]
    pub fn with_flags(mut self, creatable: bool, fileable: bool, queryable: bool) -> Self {
        self.creatable = creatable;
        self.fileable = fileable;
        self.queryable = queryable;
        self
    }

    #[must_use]
    pub fn versionable(mut self, versionable: bool) -> Self {
        self.versionable = versionable;
        self
    }

    #[must_use]
    pub fn with_property_type(mut self, property_type: PropertyType) -> Self {
        self.property_types
            .insert(property_type.id().to_string(), Rc::new(property_type));
        self
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

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parent_type_id(&self) -> &str {
        &self.parent_type_id
    }

    pub fn base_type_id(&self) -> &str {
        &self.base_type_id
    }

    pub fn is_creatable(&self) -> bool {
        self.creatable
    }

    pub fn is_fileable(&self) -> bool {
        self.fileable
    }

    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    pub fn is_fulltext_indexed(&self) -> bool {
        self.fulltext_indexed
    }

    pub fn is_included_in_supertype_query(&self) -> bool {
        self.included_in_supertype_query
    }

    pub fn is_controllable_policy(&self) -> bool {
        self.controllable_policy
    }

    pub fn is_controllable_acl(&self) -> bool {
        self.controllable_acl
    }

    pub fn is_versionable(&self) -> bool {
        self.versionable
    }

    pub fn content_stream_allowed(&self) -> ContentStreamAllowed {
        self.content_stream_allowed
    }

    pub fn is_base_type(&self) -> bool {
        self.parent_type_id.is_empty()
    }

    pub fn binding(&self) -> Option<BindingKind> {
        self.binding
    }

    pub fn refresh_timestamp(&self) -> DateTime<Utc> {
        self.refresh_timestamp
    }

    /// Property definition by id
    pub fn property_type(&self, id: &str) -> Option<&Rc<PropertyType>> {
        self.property_types.get(id)
    }

    /// All property definitions, in no particular order
    pub fn property_types(&self) -> impl Iterator<Item = &Rc<PropertyType>> {
        self.property_types.values()
    }

    fn require_binding(&self) -> Result<()> {
        match self.binding {
            Some(_) => Ok(()),
            None => Err(Error::not_supported(format!(
                "type {} is not bound to a session",
                self.id
            ))),
        }
    }

    /// Parent type, or `None` for a base type
    pub fn parent_type(&self, session: &dyn Session) -> Result<Option<Rc<ObjectType>>> {
        self.require_binding()?;
        if self.parent_type_id.is_empty() {
            return Ok(None);
        }
        session.get_type(&self.parent_type_id).map(Some)
    }

    pub fn base_type(&self, session: &dyn Session) -> Result<Rc<ObjectType>> {
        self.require_binding()?;
        if self.base_type_id.is_empty() || self.base_type_id == self.id {
            return session.get_type(&self.id);
        }
        session.get_type(&self.base_type_id)
    }

    /// Direct subtypes
    pub fn children(&self, session: &dyn Session) -> Result<Vec<Rc<ObjectType>>> {
        self.require_binding()?;
        session.get_type_children(&self.id)
    }

    /// Re-fetch this definition, replacing the registry entry
    pub fn refresh(&self, session: &dyn Session) -> Result<Rc<ObjectType>> {
        self.require_binding()?;
        session.refresh_type(&self.id)
    }
}
