//! Object operations that delegate to a session, checked against an
//! in-memory session.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use cmis_core::object_type::{BASE_DOCUMENT, BASE_FOLDER};
use cmis_core::{
    creation_properties, ids, BindingKind, ContentStream, Document, Error, ErrorKind, Folder,
    NavigationService, Object, ObjectService, ObjectType, Property, PropertyKind, PropertyMap,
    PropertyType, Repository, RepositoryService, Result, Session, TypeCache, TypeResolver,
};
use pretty_assertions::assert_eq;

struct MemorySession {
    repository: Repository,
    types: TypeCache,
    objects: RefCell<BTreeMap<String, PropertyMap>>,
    parents: RefCell<BTreeMap<String, String>>,
    updates: Cell<usize>,
    next_id: Cell<usize>,
}

impl MemorySession {
    fn new() -> Self {
        let types = TypeCache::new();
        types.insert(
            ObjectType::new(BASE_FOLDER, BASE_FOLDER)
                .bound_to(BindingKind::AtomPub)
                .with_property_type(PropertyType::new(ids::PATH, PropertyKind::String)),
        );
        types.insert(
            ObjectType::new(BASE_DOCUMENT, BASE_DOCUMENT)
                .bound_to(BindingKind::AtomPub)
                .with_property_type(
                    PropertyType::new(ids::SECONDARY_OBJECT_TYPE_IDS, PropertyKind::String)
                        .with_xml_type("id")
                        .multi_valued(true)
                        .updatable(true),
                ),
        );
        types.insert(ObjectType::new("plain:document", BASE_DOCUMENT).with_parent(BASE_DOCUMENT));
        types.insert(
            ObjectType::new("my:tagged", "cmis:secondary")
                .with_parent("cmis:secondary")
                .with_property_type(PropertyType::new("my:tag", PropertyKind::String)),
        );

        let session = Self {
            repository: Repository::new("mem").with_root_id("root"),
            types,
            objects: RefCell::new(BTreeMap::new()),
            parents: RefCell::new(BTreeMap::new()),
            updates: Cell::new(0),
            next_id: Cell::new(0),
        };
        let mut root = creation_properties(BASE_FOLDER, "");
        root.insert(ids::OBJECT_ID.into(), Property::id(ids::OBJECT_ID, vec!["root".into()]));
        root.insert(ids::PATH.into(), Property::string(ids::PATH, "/"));
        session.store("root", root);
        session
    }

    fn store(&self, id: &str, mut props: PropertyMap) {
        props.insert(ids::OBJECT_ID.into(), Property::id(ids::OBJECT_ID, vec![id.into()]));
        let type_id = props
            .get(ids::OBJECT_TYPE_ID)
            .map(|p| p.first_str().to_string())
            .unwrap_or_default();
        let base = self
            .types
            .get(&type_id)
            .map(|t| t.base_type_id().to_string())
            .unwrap_or_default();
        props.insert(ids::BASE_TYPE_ID.into(), Property::id(ids::BASE_TYPE_ID, vec![base]));
        self.objects.borrow_mut().insert(id.to_string(), props);
    }

    fn create(&self, parent_id: &str, props: &PropertyMap) -> String {
        let id = format!("obj-{}", self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.store(&id, props.clone());
        self.parents.borrow_mut().insert(id.clone(), parent_id.to_string());
        id
    }
}

impl TypeResolver for MemorySession {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.types.get(id).ok_or_else(|| Error::not_found(id))
    }
}

impl RepositoryService for MemorySession {
    fn repositories(&self) -> Result<Vec<Repository>> {
        Ok(vec![self.repository.clone()])
    }

    fn repository(&self) -> &Repository {
        &self.repository
    }

    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.get_type(id)
    }

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>> {
        Ok(vec![self.get_type(BASE_DOCUMENT)?, self.get_type(BASE_FOLDER)?])
    }

    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>> {
        let all = ["plain:document", "my:tagged"];
        Ok(all
            .iter()
            .filter_map(|id| self.types.get(id))
            .filter(|t| t.parent_type_id() == type_id)
            .collect())
    }
}

impl ObjectService for MemorySession {
    fn get_object(&self, id: &str) -> Result<Object> {
        let props = self
            .objects
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))?;
        let ty = props
            .get(ids::OBJECT_TYPE_ID)
            .and_then(|p| self.types.get(p.first_str()));
        Ok(Object::from_properties(props, ty, BindingKind::AtomPub))
    }

    fn get_object_by_path(&self, path: &str) -> Result<Object> {
        match path {
            "/" => self.get_object("root"),
            _ => Err(Error::not_found(path)),
        }
    }

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder> {
        let id = self.create(parent_id, properties);
        self.get_folder(&id)
    }

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        _content: Option<&ContentStream>,
    ) -> Result<Document> {
        let id = self.create(parent_id, properties);
        self.get_document(&id)
    }

    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        _change_token: Option<&str>,
    ) -> Result<Object> {
        self.updates.set(self.updates.get() + 1);
        {
            let mut objects = self.objects.borrow_mut();
            let stored = objects.get_mut(id).ok_or_else(|| Error::not_found(id))?;
            for (key, prop) in properties {
                stored.insert(key.clone(), prop.clone());
            }
        }
        self.get_object(id)
    }

    fn delete_object(&self, id: &str, _all_versions: bool) -> Result<()> {
        self.objects.borrow_mut().remove(id);
        Ok(())
    }

    fn delete_tree(&self, folder_id: &str, _all_versions: bool, _continue: bool) -> Result<Vec<String>> {
        let children: Vec<String> = self
            .parents
            .borrow()
            .iter()
            .filter(|(_, p)| *p == folder_id)
            .map(|(c, _)| c.clone())
            .collect();
        for child in children {
            self.objects.borrow_mut().remove(&child);
        }
        self.objects.borrow_mut().remove(folder_id);
        Ok(Vec::new())
    }

    fn get_content_stream(&self, id: &str) -> Result<ContentStream> {
        Err(Error::not_supported(id))
    }
}

impl NavigationService for MemorySession {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>> {
        let ids: Vec<String> = self
            .parents
            .borrow()
            .iter()
            .filter(|(_, p)| *p == folder_id)
            .map(|(c, _)| c.clone())
            .collect();
        ids.iter().map(|id| self.get_object(id)).collect()
    }

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder> {
        let parent = self
            .parents
            .borrow()
            .get(folder_id)
            .cloned()
            .ok_or_else(|| Error::not_found(folder_id))?;
        self.get_folder(&parent)
    }
}

impl Session for MemorySession {
    fn binding(&self) -> BindingKind {
        BindingKind::AtomPub
    }

    fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}

#[test]
fn test_add_secondary_type_does_not_duplicate() {
    let session = MemorySession::new();
    let root = session.root_folder().unwrap();
    let doc = root
        .create_document(&session, &creation_properties(BASE_DOCUMENT, "a.txt"), None)
        .unwrap();

    let mut tag = PropertyMap::new();
    tag.insert("my:tag".into(), Property::string("my:tag", "red"));
    let once = doc.add_secondary_type(&session, "my:tagged", tag).unwrap();
    let twice = once
        .add_secondary_type(&session, "my:tagged", PropertyMap::new())
        .unwrap();

    assert_eq!(twice.secondary_type_ids(), vec!["my:tagged".to_string()]);
    assert_eq!(twice.property("my:tag").unwrap().first_str(), "red");
    // the original snapshot is untouched
    assert!(doc.secondary_type_ids().is_empty());
}

#[test]
fn test_remove_secondary_type() {
    let session = MemorySession::new();
    let root = session.root_folder().unwrap();
    let doc = root
        .create_document(&session, &creation_properties(BASE_DOCUMENT, "b.txt"), None)
        .unwrap();

    let unchanged = doc.remove_secondary_type(&session, "my:tagged").unwrap();
    assert_eq!(session.updates.get(), 0);
    assert_eq!(unchanged.id(), doc.id());

    let tagged = doc
        .add_secondary_type(&session, "my:tagged", PropertyMap::new())
        .unwrap();
    let untagged = tagged.remove_secondary_type(&session, "my:tagged").unwrap();
    assert_eq!(session.updates.get(), 2);
    assert!(untagged.secondary_type_ids().is_empty());
}

#[test]
fn test_secondary_types_need_declared_property() {
    let session = MemorySession::new();
    let root = session.root_folder().unwrap();
    let doc = root
        .create_document(&session, &creation_properties("plain:document", "c.txt"), None)
        .unwrap();

    let err = doc
        .add_secondary_type(&session, "my:tagged", PropertyMap::new())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Constraint));
}

#[test]
fn test_folder_navigation() {
    let session = MemorySession::new();
    let root = session.root_folder().unwrap();
    assert!(root.is_root(&session));
    assert!(root.parent(&session).unwrap().is_none());
    assert_eq!(root.path(), "/");

    let sub = root
        .create_folder(&session, &creation_properties(BASE_FOLDER, "Reports"))
        .unwrap();
    sub.create_document(&session, &creation_properties(BASE_DOCUMENT, "q1.pdf"), None)
        .unwrap();

    assert!(!sub.is_root(&session));
    assert_eq!(sub.parent(&session).unwrap().unwrap().id(), "root");
    let children = sub.children(&session).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), "q1.pdf");

    let failed = sub.remove_tree(&session, true, false).unwrap();
    assert!(failed.is_empty());
    assert!(session.get_object(sub.id()).is_err());
}

#[test]
fn test_update_properties_returns_new_object() {
    let session = MemorySession::new();
    let root = session.root_folder().unwrap();
    let doc = root
        .create_document(&session, &creation_properties(BASE_DOCUMENT, "old.txt"), None)
        .unwrap();

    let mut rename = PropertyMap::new();
    rename.insert(ids::NAME.into(), Property::string(ids::NAME, "new.txt"));
    let renamed = doc.update_properties(&session, &rename).unwrap();

    assert_eq!(renamed.name(), "new.txt");
    assert_eq!(doc.name(), "old.txt");
    assert_eq!(doc.refresh(&session).unwrap().name(), "new.txt");
}

#[test]
fn test_type_navigation() {
    let session = MemorySession::new();
    let doc_type = session.get_type(BASE_DOCUMENT).unwrap();

    assert!(doc_type.parent_type(&session).unwrap().is_none());
    assert_eq!(doc_type.base_type(&session).unwrap().id(), BASE_DOCUMENT);
    let children = doc_type.children(&session).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id(), "plain:document");

    // unbound types cannot navigate
    let plain = session.get_type("plain:document").unwrap();
    let err = plain.parent_type(&session).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotSupported));
}
