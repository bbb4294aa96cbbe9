//! Fixed type schema of the REST dialects
//!
//! Neither Google Drive nor SharePoint publishes CMIS type definitions, so
//! the dialects expose `cmis:document` and `cmis:folder` built from this
//! table.

use std::rc::Rc;

use cmis_core::object_type::{BASE_DOCUMENT, BASE_FOLDER};
use cmis_core::{
    ids, BindingKind, ContentStreamAllowed, Error, ObjectType, Property, PropertyKind, PropertyMap,
    PropertyType, Result,
};

struct Def {
    id: &'static str,
    name: &'static str,
    kind: PropertyKind,
    updatable: bool,
    multi_valued: bool,
}

const fn def(id: &'static str, name: &'static str, kind: PropertyKind, updatable: bool) -> Def {
    Def {
        id,
        name,
        kind,
        updatable,
        multi_valued: false,
    }
}

const COMMON: &[Def] = &[
    def(ids::OBJECT_ID, "Object Id", PropertyKind::String, false),
    def(ids::NAME, "Name", PropertyKind::String, true),
    def(ids::DESCRIPTION, "Description", PropertyKind::String, true),
    def(ids::BASE_TYPE_ID, "Base Type Id", PropertyKind::String, false),
    def(ids::OBJECT_TYPE_ID, "Object Type Id", PropertyKind::String, false),
    def(ids::CREATED_BY, "Created By", PropertyKind::String, false),
    def(ids::CREATION_DATE, "Creation Date", PropertyKind::DateTime, false),
    def(ids::LAST_MODIFIED_BY, "Last Modified By", PropertyKind::String, false),
    def(ids::LAST_MODIFICATION_DATE, "Last Modification Date", PropertyKind::DateTime, false),
    def(ids::CHANGE_TOKEN, "Change Token", PropertyKind::String, false),
];

const FOLDER: &[Def] = &[
    def(ids::PARENT_ID, "Parent Id", PropertyKind::String, false),
    def(ids::PATH, "Path", PropertyKind::String, false),
    Def {
        id: ids::ALLOWED_CHILD_OBJECT_TYPE_IDS,
        name: "Allowed Child Object Type Ids",
        kind: PropertyKind::String,
        updatable: false,
        multi_valued: true,
    },
];

const DOCUMENT: &[Def] = &[
    def(ids::IS_IMMUTABLE, "Is Immutable", PropertyKind::Bool, false),
    def(ids::IS_LATEST_VERSION, "Is Latest Version", PropertyKind::Bool, false),
    def(ids::IS_MAJOR_VERSION, "Is Major Version", PropertyKind::Bool, false),
    def(ids::VERSION_LABEL, "Version Label", PropertyKind::String, false),
    def(ids::VERSION_SERIES_ID, "Version Series Id", PropertyKind::String, false),
    def(ids::IS_VERSION_SERIES_CHECKED_OUT, "Is Checked Out", PropertyKind::Bool, false),
    def(ids::CONTENT_STREAM_LENGTH, "Content Length", PropertyKind::Integer, false),
    def(ids::CONTENT_STREAM_MIME_TYPE, "Mime Type", PropertyKind::String, true),
    def(ids::CONTENT_STREAM_FILE_NAME, "File Name", PropertyKind::String, false),
    def(ids::CONTENT_STREAM_ID, "Content Stream Id", PropertyKind::String, false),
];

fn build(binding: BindingKind, id: &str, specific: &[Def], display_name: &str) -> ObjectType {
    let mut ty = ObjectType::new(id, id)
        .bound_to(binding)
        .with_display_name(display_name)
        .with_flags(true, true, true);
    for d in COMMON.iter().chain(specific) {
        ty = ty.with_property_type(
            PropertyType::new(d.id, d.kind)
                .with_display_name(d.name)
                .updatable(d.updatable)
                .multi_valued(d.multi_valued),
        );
    }
    ty
}

/// Definition of `type_id` for a REST dialect
pub fn static_type(binding: BindingKind, type_id: &str) -> Result<ObjectType> {
    match type_id {
        BASE_DOCUMENT => Ok(build(binding, BASE_DOCUMENT, DOCUMENT, "Document")
            .with_content_stream_allowed(ContentStreamAllowed::Allowed)),
        BASE_FOLDER => Ok(build(binding, BASE_FOLDER, FOLDER, "Folder")
            .with_content_stream_allowed(ContentStreamAllowed::NotAllowed)),
        _ => Err(Error::not_found(format!("{binding} has no type {type_id}"))),
    }
}

/// The type ids a dialect knows
pub const TYPE_IDS: [&str; 2] = [BASE_DOCUMENT, BASE_FOLDER];

/// Collects property values for an object of a static type.
///
/// Values are typed by the type's definitions; empty values are skipped so
/// absent fields read as missing properties.
pub struct PropertyBuilder {
    object_type: Rc<ObjectType>,
    properties: PropertyMap,
}

impl PropertyBuilder {
    pub fn new(object_type: Rc<ObjectType>) -> Self {
        let mut builder = Self {
            object_type,
            properties: PropertyMap::new(),
        };
        let type_id = builder.object_type.id().to_string();
        let base_id = builder.object_type.base_type_id().to_string();
        builder.set(ids::OBJECT_TYPE_ID, type_id);
        builder.set(ids::BASE_TYPE_ID, base_id);
        builder
    }

    pub fn set<S: Into<String>>(&mut self, id: &str, value: S) -> &mut Self {
        let value = value.into();
        if !value.is_empty() {
            self.set_values(id, vec![value]);
        }
        self
    }

    pub fn set_opt<S: Into<String>>(&mut self, id: &str, value: Option<S>) -> &mut Self {
        if let Some(value) = value {
            self.set(id, value);
        }
        self
    }

    pub fn set_values(&mut self, id: &str, values: Vec<String>) -> &mut Self {
        let property = match self.object_type.property_type(id) {
            Some(pt) => Property::new(Rc::clone(pt), values),
            None => Property::with_kind(id, PropertyKind::String, values),
        };
        self.properties.insert(id.to_string(), property);
        self
    }

    pub fn object_type(&self) -> &Rc<ObjectType> {
        &self.object_type
    }

    pub fn build(self) -> PropertyMap {
        self.properties
    }
}

/// Property value as written in a JSON payload; `None` when absent
pub fn json_value(properties: &PropertyMap, id: &str) -> Option<serde_json::Value> {
    properties
        .get(id)
        .filter(|p| !p.is_empty())
        .map(Property::to_json)
}
