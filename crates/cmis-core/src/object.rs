//! Objects, folders and documents

use std::ops::Deref;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use log::warn;
use once_cell::unsync::OnceCell;

use crate::allowable_actions::AllowableActions;
use crate::content::ContentStream;
use crate::error::{Error, Result};
use crate::object_type::{ObjectType, BASE_DOCUMENT, BASE_FOLDER};
use crate::property::{parse_properties, properties_element, Property, PropertyMap};
use crate::property_type::PropertyType;
use crate::rendition::Rendition;
use crate::session::{BindingKind, Session, TypeResolver};
use crate::xml::{Element, Namespaces};

/// Well-known property ids
pub mod ids {
    pub const OBJECT_ID: &str = "cmis:objectId";
    pub const NAME: &str = "cmis:name";
    pub const DESCRIPTION: &str = "cmis:description";
    pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
    pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
    pub const SECONDARY_OBJECT_TYPE_IDS: &str = "cmis:secondaryObjectTypeIds";
    pub const CREATED_BY: &str = "cmis:createdBy";
    pub const CREATION_DATE: &str = "cmis:creationDate";
    pub const LAST_MODIFIED_BY: &str = "cmis:lastModifiedBy";
    pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
    pub const CHANGE_TOKEN: &str = "cmis:changeToken";

    pub const PARENT_ID: &str = "cmis:parentId";
    pub const PATH: &str = "cmis:path";
    pub const ALLOWED_CHILD_OBJECT_TYPE_IDS: &str = "cmis:allowedChildObjectTypeIds";

    pub const IS_IMMUTABLE: &str = "cmis:isImmutable";
    pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
    pub const IS_MAJOR_VERSION: &str = "cmis:isMajorVersion";
    pub const IS_LATEST_MAJOR_VERSION: &str = "cmis:isLatestMajorVersion";
    pub const VERSION_LABEL: &str = "cmis:versionLabel";
    pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
    pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
    pub const VERSION_SERIES_CHECKED_OUT_BY: &str = "cmis:versionSeriesCheckedOutBy";
    pub const CHECKIN_COMMENT: &str = "cmis:checkinComment";
    pub const CONTENT_STREAM_LENGTH: &str = "cmis:contentStreamLength";
    pub const CONTENT_STREAM_MIME_TYPE: &str = "cmis:contentStreamMimeType";
    pub const CONTENT_STREAM_FILE_NAME: &str = "cmis:contentStreamFileName";
    pub const CONTENT_STREAM_ID: &str = "cmis:contentStreamId";
}

/// Properties for creating an object of `type_id` named `name`
pub fn creation_properties(type_id: &str, name: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(
        ids::OBJECT_TYPE_ID.to_string(),
        Property::id(ids::OBJECT_TYPE_ID, vec![type_id.to_string()]),
    );
    props.insert(ids::NAME.to_string(), Property::string(ids::NAME, name));
    props
}

/// A repository object as returned by one call.
///
/// Objects are snapshots: operations that change the server state return a
/// new `Object` instead of mutating this one.
#[derive(Debug, Clone)]
pub struct Object {
    properties: PropertyMap,
    allowable_actions: Option<AllowableActions>,
    renditions: Vec<Rendition>,
    /// Type id seen at parse time
    type_id: String,
    object_type: OnceCell<Rc<ObjectType>>,
    refresh_timestamp: DateTime<Utc>,
    binding: BindingKind,
}

impl Object {
    /// Parse an object element (`cmisra:object`, or `object` in a
    /// Web-Services response).
    ///
    /// The owning type is fetched through `resolver`; when that fails the
    /// properties are parsed with temporary definitions instead.
    pub fn from_node(node: &Element, resolver: &dyn TypeResolver, binding: BindingKind) -> Self {
        // An Atom entry may be handed in whole; nested objects (relationships,
        // children) must not leak their fragments into this one.
        let own = node.child_local("object").unwrap_or(node);
        let allowable_actions = own
            .child_local("allowableActions")
            .or_else(|| node.child_local("allowableActions"))
            .map(AllowableActions::from_node);

        let props_node = own
            .child_local("properties")
            .or_else(|| node.child_local("properties"));

        let type_id = props_node
            .and_then(|p| {
                p.elements()
                    .find(|e| e.attr("propertyDefinitionId") == Some(ids::OBJECT_TYPE_ID))
            })
            .and_then(|p| p.child_local("value"))
            .map(Element::text)
            .unwrap_or_default();

        let object_type = if type_id.is_empty() {
            None
        } else {
            match resolver.get_type(&type_id) {
                Ok(ty) => Some(ty),
                Err(e) => {
                    warn!("could not resolve type {type_id}: {e}");
                    None
                }
            }
        };

        let properties = props_node
            .map(|p| parse_properties(p, object_type.as_deref()))
            .unwrap_or_default();

        let renditions = own
            .children_local("rendition")
            .map(Rendition::from_node)
            .collect();

        let mut object = Self {
            properties,
            allowable_actions,
            renditions,
            type_id,
            object_type: OnceCell::new(),
            refresh_timestamp: Utc::now(),
            binding,
        };
        if let Some(ty) = object_type {
            let _ = object.object_type.set(ty);
        }
        object.reconcile_secondary_types(resolver);
        object
    }

    /// Build an object from already mapped properties
    pub fn from_properties(
        properties: PropertyMap,
        object_type: Option<Rc<ObjectType>>,
        binding: BindingKind,
    ) -> Self {
        let type_id = properties
            .get(ids::OBJECT_TYPE_ID)
            .map(|p| p.first_str().to_string())
            .or_else(|| object_type.as_ref().map(|t| t.id().to_string()))
            .unwrap_or_default();
        let cell = OnceCell::new();
        if let Some(ty) = object_type {
            let _ = cell.set(ty);
        }
        Self {
            properties,
            allowable_actions: None,
            renditions: Vec::new(),
            type_id,
            object_type: cell,
            refresh_timestamp: Utc::now(),
            binding,
        }
    }

    #[must_use]
    pub fn with_allowable_actions(mut self, actions: AllowableActions) -> Self {
        self.allowable_actions = Some(actions);
        self
    }

    #[must_use]
    pub fn with_renditions(mut self, renditions: Vec<Rendition>) -> Self {
        self.renditions = renditions;
        self
    }

    /// Adopt secondary type definitions for properties that were parsed
    /// without one.
    fn reconcile_secondary_types(&mut self, resolver: &dyn TypeResolver) {
        if !self
            .properties
            .values()
            .any(|p| p.property_type().is_temporary())
        {
            return;
        }
        let types: Vec<Rc<ObjectType>> = self
            .secondary_type_ids()
            .iter()
            .filter_map(|id| match resolver.get_type(id) {
                Ok(ty) => Some(ty),
                Err(e) => {
                    warn!("could not resolve secondary type {id}: {e}");
                    None
                }
            })
            .collect();
        if types.is_empty() {
            return;
        }
        for prop in self.properties.values_mut() {
            prop.reconcile(&types);
        }
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    fn first(&self, id: &str) -> &str {
        self.property(id).map(Property::first_str).unwrap_or("")
    }

    fn first_opt(&self, id: &str) -> Option<&str> {
        Some(self.first(id)).filter(|s| !s.is_empty())
    }

    fn first_date(&self, id: &str) -> Option<DateTime<Utc>> {
        self.property(id)
            .and_then(|p| p.date_time_values().first().copied())
    }

    fn first_bool(&self, id: &str) -> Option<bool> {
        self.property(id).and_then(|p| p.bool_values().first().copied())
    }

    pub fn allowable_actions(&self) -> Option<&AllowableActions> {
        self.allowable_actions.as_ref()
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    pub fn binding(&self) -> BindingKind {
        self.binding
    }

    pub fn refresh_timestamp(&self) -> DateTime<Utc> {
        self.refresh_timestamp
    }

    pub fn id(&self) -> &str {
        self.first(ids::OBJECT_ID)
    }

    pub fn name(&self) -> &str {
        self.first(ids::NAME)
    }

    pub fn description(&self) -> &str {
        self.first(ids::DESCRIPTION)
    }

    pub fn base_type(&self) -> &str {
        match self.first(ids::BASE_TYPE_ID) {
            "" => self
                .object_type
                .get()
                .map(|t| t.base_type_id())
                .unwrap_or(""),
            base => base,
        }
    }

    /// Type id, falling back to the one seen at parse time
    pub fn type_id(&self) -> &str {
        match self.first(ids::OBJECT_TYPE_ID) {
            "" => &self.type_id,
            id => id,
        }
    }

    pub fn created_by(&self) -> &str {
        self.first(ids::CREATED_BY)
    }

    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.first_date(ids::CREATION_DATE)
    }

    pub fn last_modified_by(&self) -> &str {
        self.first(ids::LAST_MODIFIED_BY)
    }

    pub fn last_modification_date(&self) -> Option<DateTime<Utc>> {
        self.first_date(ids::LAST_MODIFICATION_DATE)
    }

    pub fn change_token(&self) -> Option<&str> {
        self.first_opt(ids::CHANGE_TOKEN)
    }

    pub fn secondary_type_ids(&self) -> Vec<String> {
        self.property(ids::SECONDARY_OBJECT_TYPE_IDS)
            .map(|p| p.str_values().to_vec())
            .unwrap_or_default()
    }

    pub fn is_folder(&self) -> bool {
        self.base_type() == BASE_FOLDER
    }

    pub fn is_document(&self) -> bool {
        self.base_type() == BASE_DOCUMENT
    }

    /// The owning type, resolved on first use and cached in this object
    pub fn object_type(&self, resolver: &dyn TypeResolver) -> Result<Rc<ObjectType>> {
        self.object_type
            .get_or_try_init(|| {
                if self.type_id().is_empty() {
                    return Err(Error::runtime("object carries no type id"));
                }
                resolver.get_type(self.type_id())
            })
            .map(Rc::clone)
    }

    /// Download location of the first thumbnail rendition
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.renditions
            .iter()
            .find(|r| r.is_thumbnail())
            .map(|r| r.url.as_str())
    }

    /// Fetch this object again
    pub fn refresh(&self, session: &dyn Session) -> Result<Object> {
        session.get_object(self.id())
    }

    pub fn update_properties(&self, session: &dyn Session, properties: &PropertyMap) -> Result<Object> {
        session.update_properties(self.id(), properties, self.change_token())
    }

    pub fn delete(&self, session: &dyn Session, all_versions: bool) -> Result<()> {
        session.delete_object(self.id(), all_versions)
    }

    fn secondary_ids_definition(&self, session: &dyn Session) -> Result<Rc<PropertyType>> {
        let ty = self.object_type(session.as_resolver())?;
        ty.property_type(ids::SECONDARY_OBJECT_TYPE_IDS)
            .cloned()
            .ok_or_else(|| {
                Error::constraint(format!(
                    "type {} does not support secondary types",
                    ty.id()
                ))
            })
    }

    /// Attach a secondary type, setting `new_properties` in the same update.
    /// Adding a type that is already attached does not duplicate it.
    pub fn add_secondary_type(
        &self,
        session: &dyn Session,
        type_id: &str,
        new_properties: PropertyMap,
    ) -> Result<Object> {
        let definition = self.secondary_ids_definition(session)?;
        let mut type_ids = self.secondary_type_ids();
        if !type_ids.iter().any(|id| id == type_id) {
            type_ids.push(type_id.to_string());
        }
        let mut properties = new_properties;
        properties.insert(
            ids::SECONDARY_OBJECT_TYPE_IDS.to_string(),
            Property::new(definition, type_ids),
        );
        self.update_properties(session, &properties)
    }

    /// Detach a secondary type; no request is sent when it is not attached
    pub fn remove_secondary_type(&self, session: &dyn Session, type_id: &str) -> Result<Object> {
        let definition = self.secondary_ids_definition(session)?;
        let current = self.secondary_type_ids();
        let remaining: Vec<String> = current.iter().filter(|id| *id != type_id).cloned().collect();
        if remaining.len() == current.len() {
            return Ok(self.clone());
        }
        let mut properties = PropertyMap::new();
        properties.insert(
            ids::SECONDARY_OBJECT_TYPE_IDS.to_string(),
            Property::new(definition, remaining),
        );
        self.update_properties(session, &properties)
    }

    /// `cmis:properties` element holding every property
    pub fn properties_element(&self, ns: &Namespaces) -> Element {
        properties_element(ns, &self.properties)
    }

    pub fn to_xml(&self, ns: &Namespaces) -> Result<String> {
        let mut el = self.properties_element(ns);
        ns.declare(&mut el, &["cmis"]);
        el.to_xml()
    }
}

/// An object whose base type is `cmis:folder`
#[derive(Debug, Clone)]
pub struct Folder(Object);

impl Folder {
    pub fn into_inner(self) -> Object {
        self.0
    }

    pub fn path(&self) -> &str {
        self.first(ids::PATH)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.first_opt(ids::PARENT_ID)
    }

    pub fn allowed_child_type_ids(&self) -> Vec<String> {
        self.property(ids::ALLOWED_CHILD_OBJECT_TYPE_IDS)
            .map(|p| p.str_values().to_vec())
            .unwrap_or_default()
    }

    pub fn is_root(&self, session: &dyn Session) -> bool {
        let root_id = session.repository().root_id();
        if !root_id.is_empty() {
            return root_id == self.id();
        }
        self.path() == "/"
    }

    pub fn children(&self, session: &dyn Session) -> Result<Vec<Object>> {
        session.get_children(self.id())
    }

    /// Parent folder, `None` for the root
    pub fn parent(&self, session: &dyn Session) -> Result<Option<Folder>> {
        if self.is_root(session) {
            return Ok(None);
        }
        session.get_folder_parent(self.id()).map(Some)
    }

    pub fn create_folder(&self, session: &dyn Session, properties: &PropertyMap) -> Result<Folder> {
        session.create_folder(self.id(), properties)
    }

    pub fn create_document(
        &self,
        session: &dyn Session,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document> {
        session.create_document(self.id(), properties, content)
    }

    /// Delete this folder and everything below it; returns ids that failed
    pub fn remove_tree(
        &self,
        session: &dyn Session,
        all_versions: bool,
        continue_on_failure: bool,
    ) -> Result<Vec<String>> {
        session.delete_tree(self.id(), all_versions, continue_on_failure)
    }
}

impl Deref for Folder {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

impl TryFrom<Object> for Folder {
    type Error = Error;

    fn try_from(object: Object) -> Result<Self> {
        if object.is_folder() {
            Ok(Folder(object))
        } else {
            Err(Error::invalid_argument(format!(
                "object {} is not a folder",
                object.id()
            )))
        }
    }
}

/// An object whose base type is `cmis:document`
#[derive(Debug, Clone)]
pub struct Document(Object);

impl Document {
    pub fn into_inner(self) -> Object {
        self.0
    }

    pub fn content_stream(&self, session: &dyn Session) -> Result<ContentStream> {
        session.get_content_stream(self.id())
    }

    pub fn content_stream_length(&self) -> Option<u64> {
        self.property(ids::CONTENT_STREAM_LENGTH)
            .and_then(|p| p.long_values().first().copied())
            .and_then(|v| u64::try_from(v).ok())
    }

    pub fn content_mime_type(&self) -> &str {
        self.first(ids::CONTENT_STREAM_MIME_TYPE)
    }

    pub fn content_filename(&self) -> &str {
        self.first(ids::CONTENT_STREAM_FILE_NAME)
    }

    pub fn content_stream_id(&self) -> Option<&str> {
        self.first_opt(ids::CONTENT_STREAM_ID)
    }

    pub fn is_immutable(&self) -> bool {
        self.first_bool(ids::IS_IMMUTABLE).unwrap_or(false)
    }

    pub fn is_latest_version(&self) -> bool {
        self.first_bool(ids::IS_LATEST_VERSION).unwrap_or(false)
    }

    pub fn is_major_version(&self) -> bool {
        self.first_bool(ids::IS_MAJOR_VERSION).unwrap_or(false)
    }

    pub fn is_latest_major_version(&self) -> bool {
        self.first_bool(ids::IS_LATEST_MAJOR_VERSION).unwrap_or(false)
    }

    pub fn version_label(&self) -> &str {
        self.first(ids::VERSION_LABEL)
    }

    pub fn version_series_id(&self) -> &str {
        self.first(ids::VERSION_SERIES_ID)
    }

    pub fn is_checked_out(&self) -> bool {
        self.first_bool(ids::IS_VERSION_SERIES_CHECKED_OUT)
            .unwrap_or(false)
    }

    pub fn checked_out_by(&self) -> &str {
        self.first(ids::VERSION_SERIES_CHECKED_OUT_BY)
    }

    pub fn checkin_comment(&self) -> &str {
        self.first(ids::CHECKIN_COMMENT)
    }
}

impl Deref for Document {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

impl TryFrom<Object> for Document {
    type Error = Error;

    fn try_from(object: Object) -> Result<Self> {
        if object.is_document() {
            Ok(Document(object))
        } else {
            Err(Error::invalid_argument(format!(
                "object {} is not a document",
                object.id()
            )))
        }
    }
}
