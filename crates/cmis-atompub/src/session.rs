//! AtomPub session

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use log::{debug, warn};

use cmis_core::multipart::content_type_param;
use cmis_core::object_type::ObjectType;
use cmis_core::xml::Element;
use cmis_core::{
    ids, BindingKind, ContentStream, Credentials, Document, Error, Folder, HttpRequest,
    HttpResponse, HttpTransport, Method, Namespaces, NavigationService, Object, ObjectService,
    PropertyMap, Repository, RepositoryService, Result, Session, SessionParameters, TypeCache,
    TypeResolver,
};

use crate::entry::{object_entry, rel, Entry, EntryLinks, Feed, MEDIA_ENTRY, MEDIA_FEED};
use crate::service::{collections, templates, ServiceDocument, Workspace};

/// Session speaking the AtomPub binding.
///
/// Every operation is one HTTP exchange against a URL taken from the
/// service document or from links of a previously seen entry. Entry links
/// are remembered per object id; an object seen for the first time costs one
/// extra GET to learn its links.
pub struct AtomPubSession {
    transport: Rc<dyn HttpTransport>,
    credentials: Option<Credentials>,
    ns: Namespaces,
    service: ServiceDocument,
    workspace: Workspace,
    types: TypeCache,
    links: RefCell<AHashMap<String, EntryLinks>>,
}

impl AtomPubSession {
    /// Check `params.url` as a service document and open the requested
    /// repository (the first one when none is requested).
    ///
    /// Returns `Ok(None)` when the URL is not an AtomPub endpoint or does not
    /// serve the requested repository. Exactly one request is sent.
    pub fn connect(
        transport: Rc<dyn HttpTransport>,
        params: &SessionParameters,
    ) -> Result<Option<Self>> {
        let ns = Namespaces::default();
        let credentials = params.credentials();
        let Some(service) =
            ServiceDocument::fetch(transport.as_ref(), &params.url, credentials.clone(), &ns)?
        else {
            return Ok(None);
        };
        let Some(workspace) = service.workspace(params.repository_id.as_deref()).cloned() else {
            warn!(
                "{} has no repository {}",
                params.url,
                params.repository_id.as_deref().unwrap_or("")
            );
            return Ok(None);
        };
        debug!("AtomPub session on repository {}", workspace.repository.id());

        Ok(Some(Self {
            transport,
            credentials,
            ns,
            service,
            workspace,
            types: TypeCache::new(),
            links: RefCell::new(AHashMap::new()),
        }))
    }

    /// Repositories of an AtomPub endpoint, or `None` when the URL is not one
    pub fn list_repositories(
        transport: &dyn HttpTransport,
        params: &SessionParameters,
    ) -> Result<Option<Vec<Repository>>> {
        let ns = Namespaces::default();
        Ok(
            ServiceDocument::fetch(transport, &params.url, params.credentials(), &ns)?
                .map(|doc| doc.repositories()),
        )
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.with_credentials(self.credentials.clone());
        self.transport.execute(request)?.error_for_status()
    }

    fn get_xml(&self, url: &str) -> Result<Element> {
        let response = self.send(HttpRequest::get(url))?;
        Element::parse_bytes(&response.body)
    }

    fn parse_entry(&self, node: &Element) -> Result<Entry> {
        let entry = Entry::from_node(node, &self.ns, self)
            .ok_or_else(|| Error::Parse("entry without cmisra:object".into()))?;
        self.remember(&entry);
        Ok(entry)
    }

    fn remember(&self, entry: &Entry) {
        let id = entry.object.id();
        if !id.is_empty() {
            self.links
                .borrow_mut()
                .insert(id.to_string(), entry.links.clone());
        }
    }

    fn object_url(&self, id: &str) -> Result<String> {
        self.workspace.expand(
            templates::OBJECT_BY_ID,
            &[
                ("id", id),
                ("includeAllowableActions", "true"),
                ("includeRelationships", "none"),
                ("renditionFilter", "cmis:thumbnail"),
                ("includePolicyIds", "false"),
                ("includeACL", "false"),
            ],
        )
    }

    fn fetch_entry(&self, url: &str) -> Result<Entry> {
        let root = self.get_xml(url)?;
        self.parse_entry(&root)
    }

    /// Links of an object, fetching its entry if it was not seen yet
    fn entry_links(&self, id: &str) -> Result<EntryLinks> {
        if let Some(links) = self.links.borrow().get(id) {
            return Ok(links.clone());
        }
        let url = self.object_url(id)?;
        Ok(self.fetch_entry(&url)?.links)
    }

    /// Every entry of a feed, following `next` links
    fn feed_entries(&self, url: &str) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next.take() {
            let root = self.get_xml(&url)?;
            let feed = Feed::from_node(&root, &self.ns, self);
            for entry in &feed.entries {
                self.remember(entry);
            }
            entries.extend(feed.entries);
            next = feed.next.filter(|n| *n != url);
        }
        Ok(entries)
    }

    /// Type definitions of a type feed
    fn type_feed(&self, url: &str) -> Result<Vec<Rc<ObjectType>>> {
        let mut types = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next.take() {
            let root = self.get_xml(&url)?;
            for entry in root.children(&self.ns, "atom:entry") {
                if let Some(ty) = entry.child(&self.ns, "cmisra:type") {
                    let ty = ObjectType::from_node(ty).bound_to(BindingKind::AtomPub);
                    types.push(self.types.insert(ty));
                }
            }
            next = root
                .children(&self.ns, "atom:link")
                .find(|l| l.attr("rel") == Some(rel::NEXT))
                .and_then(|l| l.attr("href"))
                .map(str::to_string)
                .filter(|n| *n != url);
        }
        Ok(types)
    }

    fn type_entry(&self, id: &str) -> Result<Element> {
        let url = self.workspace.expand(templates::TYPE_BY_ID, &[("id", id)])?;
        self.get_xml(&url)
    }

    fn fetch_type(&self, id: &str) -> Result<ObjectType> {
        let root = self.type_entry(id)?;
        let node = root
            .find(&self.ns, "//cmisra:type")
            .ok_or_else(|| Error::not_found(format!("no definition for type {id}")))?;
        Ok(ObjectType::from_node(node).bound_to(BindingKind::AtomPub))
    }

    fn children_url(&self, folder_id: &str) -> Result<String> {
        let links = self.entry_links(folder_id)?;
        links
            .typed_link(rel::DOWN, MEDIA_FEED)
            .or_else(|| links.link(rel::DOWN))
            .map(str::to_string)
            .ok_or_else(|| Error::constraint(format!("object {folder_id} has no children feed")))
    }

    fn create(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Object> {
        let url = self.children_url(parent_id)?;
        let title = properties
            .get(ids::NAME)
            .map(|p| p.first_str().to_string())
            .unwrap_or_default();
        let body = object_entry(&self.ns, &title, properties, content).to_document()?;
        let response = self.send(
            HttpRequest::post(url).with_body(MEDIA_ENTRY, body.into_bytes()),
        )?;
        let root = Element::parse_bytes(&response.body)?;
        Ok(self.parse_entry(&root)?.object)
    }
}

/// `url` with extra query parameters appended
fn with_query(url: &str, params: &[(&str, &str)]) -> String {
    let mut out = url.to_string();
    for (k, v) in params {
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(k);
        out.push('=');
        out.extend(url::form_urlencoded::byte_serialize(v.as_bytes()));
    }
    out
}

impl TypeResolver for AtomPubSession {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.types.get_or_fetch(id, || self.fetch_type(id))
    }
}

impl RepositoryService for AtomPubSession {
    fn repositories(&self) -> Result<Vec<Repository>> {
        Ok(self.service.repositories())
    }

    fn repository(&self) -> &Repository {
        &self.workspace.repository
    }

    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        let ty = self.fetch_type(id)?;
        Ok(self.types.insert(ty))
    }

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>> {
        let url = self
            .workspace
            .collection(collections::TYPES)
            .ok_or_else(|| Error::not_supported("no types collection"))?
            .to_string();
        self.type_feed(&url)
    }

    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>> {
        let root = self.type_entry(type_id)?;
        let links = EntryLinks::from_node(&root, &self.ns);
        match links.typed_link(rel::DOWN, MEDIA_FEED) {
            Some(url) => self.type_feed(url),
            None => Ok(Vec::new()),
        }
    }
}

impl ObjectService for AtomPubSession {
    fn get_object(&self, id: &str) -> Result<Object> {
        let url = self.object_url(id)?;
        Ok(self.fetch_entry(&url)?.object)
    }

    fn get_object_by_path(&self, path: &str) -> Result<Object> {
        let url = self.workspace.expand(
            templates::OBJECT_BY_PATH,
            &[
                ("path", path),
                ("includeAllowableActions", "true"),
                ("includeRelationships", "none"),
                ("renditionFilter", "cmis:thumbnail"),
                ("includePolicyIds", "false"),
                ("includeACL", "false"),
            ],
        )?;
        Ok(self.fetch_entry(&url)?.object)
    }

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder> {
        Folder::try_from(self.create(parent_id, properties, None)?)
    }

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document> {
        Document::try_from(self.create(parent_id, properties, content)?)
    }

    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        change_token: Option<&str>,
    ) -> Result<Object> {
        let links = self.entry_links(id)?;
        let url = links
            .link(rel::EDIT)
            .or_else(|| links.link(rel::SELF))
            .ok_or_else(|| Error::constraint(format!("object {id} has no edit link")))?;
        let url = match change_token {
            Some(token) => with_query(url, &[("changeToken", token)]),
            None => url.to_string(),
        };
        let title = properties
            .get(ids::NAME)
            .map(|p| p.first_str().to_string())
            .unwrap_or_default();
        let body = object_entry(&self.ns, &title, properties, None).to_document()?;
        let response = self.send(
            HttpRequest::new(Method::Put, url).with_body(MEDIA_ENTRY, body.into_bytes()),
        )?;
        if response.body.is_empty() {
            return self.get_object(id);
        }
        let root = Element::parse_bytes(&response.body)?;
        Ok(self.parse_entry(&root)?.object)
    }

    fn delete_object(&self, id: &str, all_versions: bool) -> Result<()> {
        let links = self.entry_links(id)?;
        let url = links
            .link(rel::EDIT)
            .or_else(|| links.link(rel::SELF))
            .ok_or_else(|| Error::constraint(format!("object {id} has no self link")))?;
        let url = with_query(url, &[("allVersions", bool_str(all_versions))]);
        self.send(HttpRequest::new(Method::Delete, url))?;
        self.links.borrow_mut().remove(id);
        Ok(())
    }

    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        continue_on_failure: bool,
    ) -> Result<Vec<String>> {
        let links = self.entry_links(folder_id)?;
        let url = links
            .link(rel::FOLDER_TREE)
            .or_else(|| links.typed_link(rel::DOWN, "application/cmistree+xml"))
            .ok_or_else(|| Error::not_supported(format!("folder {folder_id} has no tree link")))?;
        let url = with_query(
            url,
            &[
                ("allVersions", bool_str(all_versions)),
                ("continueOnFailure", bool_str(continue_on_failure)),
                ("unfileObjects", "delete"),
            ],
        );
        let response = self
            .transport
            .execute(HttpRequest::new(Method::Delete, url).with_credentials(self.credentials.clone()))?;
        if response.is_success() {
            self.links.borrow_mut().remove(folder_id);
            return Ok(Vec::new());
        }

        // Partial failure: the body lists the objects that were not deleted
        if let Ok(root) = Element::parse_bytes(&response.body) {
            if root.is(&self.ns, "atom:feed") {
                let failed: Vec<String> = Feed::from_node(&root, &self.ns, self)
                    .entries
                    .iter()
                    .map(|e| e.object.id().to_string())
                    .collect();
                if !failed.is_empty() {
                    return Ok(failed);
                }
            }
        }
        response.error_for_status().map(|_| Vec::new())
    }

    fn get_content_stream(&self, id: &str) -> Result<ContentStream> {
        let links = self.entry_links(id)?;
        let url = links
            .content_url()
            .ok_or_else(|| Error::constraint(format!("object {id} has no content")))?;
        let response = self.send(HttpRequest::get(url))?;
        let filename = response
            .header("content-disposition")
            .and_then(|cd| content_type_param(cd, "filename"));
        Ok(ContentStream {
            mime_type: response.content_type().to_string(),
            filename,
            data: response.body,
        })
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

impl NavigationService for AtomPubSession {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>> {
        let url = self.children_url(folder_id)?;
        Ok(self
            .feed_entries(&url)?
            .into_iter()
            .map(|e| e.object)
            .collect())
    }

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder> {
        let links = self.entry_links(folder_id)?;
        let url = links
            .link(rel::UP)
            .ok_or_else(|| Error::invalid_argument(format!("folder {folder_id} has no parent")))?
            .to_string();
        Folder::try_from(self.fetch_entry(&url)?.object)
    }
}

impl Session for AtomPubSession {
    fn binding(&self) -> BindingKind {
        BindingKind::AtomPub
    }

    fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("http://h/x", &[("a", "1")]), "http://h/x?a=1");
        assert_eq!(
            with_query("http://h/x?id=3", &[("changeToken", "t 1"), ("b", "2")]),
            "http://h/x?id=3&changeToken=t+1&b=2"
        );
    }
}
