//! Session contract shared by every binding

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::content::ContentStream;
use crate::error::Result;
use crate::object::{Document, Folder, Object};
use crate::object_type::ObjectType;
use crate::property::PropertyMap;
use crate::repository::Repository;

/// The wire bindings a session can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    AtomPub,
    WebServices,
    GoogleDrive,
    SharePoint,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::AtomPub => "atompub",
            BindingKind::WebServices => "webservices",
            BindingKind::GoogleDrive => "gdrive",
            BindingKind::SharePoint => "sharepoint",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves type ids to definitions. Object parsing only needs this part of
/// a session.
pub trait TypeResolver {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>>;
}

/// Repository and type discovery
pub trait RepositoryService: TypeResolver {
    /// Every repository the endpoint advertises
    fn repositories(&self) -> Result<Vec<Repository>>;

    /// The repository this session is bound to
    fn repository(&self) -> &Repository;

    /// Fetch a type definition again, replacing the cached one
    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>>;

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>>;

    /// Direct subtypes of `type_id`
    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>>;
}

/// Object retrieval and manipulation
pub trait ObjectService {
    fn get_object(&self, id: &str) -> Result<Object>;

    fn get_object_by_path(&self, path: &str) -> Result<Object>;

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder>;

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document>;

    /// Apply `properties` and return the object as the server now has it
    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        change_token: Option<&str>,
    ) -> Result<Object>;

    fn delete_object(&self, id: &str, all_versions: bool) -> Result<()>;

    /// Delete a folder and its descendants; returns the ids that failed
    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        continue_on_failure: bool,
    ) -> Result<Vec<String>>;

    fn get_content_stream(&self, id: &str) -> Result<ContentStream>;
}

/// Folder tree navigation
pub trait NavigationService {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>>;

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder>;
}

/// A connection to one repository over one binding
pub trait Session: RepositoryService + ObjectService + NavigationService {
    fn binding(&self) -> BindingKind;

    /// This session seen as a type resolver
    fn as_resolver(&self) -> &dyn TypeResolver;

    fn get_folder(&self, id: &str) -> Result<Folder> {
        Folder::try_from(self.get_object(id)?)
    }

    fn get_document(&self, id: &str) -> Result<Document> {
        Document::try_from(self.get_object(id)?)
    }

    fn root_folder(&self) -> Result<Folder> {
        let root_id = self.repository().root_id().to_string();
        self.get_folder(&root_id)
    }
}

/// Session-scoped registry owning type definitions
#[derive(Debug, Default)]
pub struct TypeCache {
    types: RefCell<AHashMap<String, Rc<ObjectType>>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Rc<ObjectType>> {
        self.types.borrow().get(id).cloned()
    }

    /// Cached definition, or the one produced by `fetch`, which is then cached
    pub fn get_or_fetch<F>(&self, id: &str, fetch: F) -> Result<Rc<ObjectType>>
    where
        F: FnOnce() -> Result<ObjectType>,
    {
        if let Some(ty) = self.get(id) {
            return Ok(ty);
        }
        let ty = Rc::new(fetch()?);
        self.types
            .borrow_mut()
            .insert(id.to_string(), Rc::clone(&ty));
        Ok(ty)
    }

    /// Store a definition, replacing any previous one with the same id
    pub fn insert(&self, ty: ObjectType) -> Rc<ObjectType> {
        let ty = Rc::new(ty);
        self.types
            .borrow_mut()
            .insert(ty.id().to_string(), Rc::clone(&ty));
        ty
    }

    pub fn len(&self) -> usize {
        self.types.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.types.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_type_cache_fetches_once() {
        let cache = TypeCache::new();
        let mut calls = 0;
        let first = cache
            .get_or_fetch("cmis:folder", || {
                calls += 1;
                Ok(ObjectType::new("cmis:folder", "cmis:folder"))
            })
            .unwrap();
        let second = cache
            .get_or_fetch("cmis:folder", || Err(Error::runtime("not called")))
            .unwrap();

        assert_eq!(calls, 1);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_type_cache_errors_are_not_cached() {
        let cache = TypeCache::new();
        assert!(cache
            .get_or_fetch("x", || Err(Error::not_found("x")))
            .is_err());
        assert!(cache.is_empty());

        let replaced = cache.insert(ObjectType::new("x", "cmis:document"));
        assert_eq!(cache.get("x").unwrap().id(), replaced.id());
    }
}
