//! SharePoint dialect
//!
//! Talks to the SharePoint REST API (`/_api/web`) in OData verbose JSON.
//! Object ids are the `__metadata.uri` of folders and files, so an id can be
//! requested as is. Writes carry a form digest from `/_api/contextinfo`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use cmis_core::object_type::{BASE_DOCUMENT, BASE_FOLDER};
use cmis_core::{
    ids, Action, AllowableActions, BindingKind, Capability, ContentStream, Credentials, Document,
    Error, ErrorKind, Folder, HttpRequest, HttpResponse, HttpTransport, NavigationService, Object,
    ObjectService, ObjectType, PropertyMap, Repository, RepositoryService, Result, Session,
    SessionParameters, TypeCache, TypeResolver,
};

use crate::schema::{static_type, PropertyBuilder, TYPE_IDS};

const ACCEPT: &str = "application/json;odata=verbose";
const CONTENT_TYPE: &str = "application/json;odata=verbose";
const WEB_TYPE: &str = "SP.Web";
const FOLDER_TYPE: &str = "SP.Folder";
const FILE_TYPE: &str = "SP.File";
/// `CheckOutType` of a file nobody has checked out
const CHECKOUT_NONE: i64 = 2;
/// Digest lifetime when the server does not state one
const DIGEST_TIMEOUT_SECS: u64 = 1800;
/// Digests are renewed this long before the server lets them lapse
const DIGEST_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Verbose<T> {
    d: T,
}

#[derive(Debug, Deserialize)]
struct Results<T> {
    results: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Metadata {
    uri: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Web {
    #[serde(rename = "__metadata")]
    metadata: Metadata,
    id: String,
    title: String,
    description: String,
}

/// A folder or a file; which one is told by `__metadata.type`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Item {
    #[serde(rename = "__metadata")]
    metadata: Metadata,
    name: String,
    server_relative_url: String,
    time_created: Option<String>,
    time_last_modified: Option<String>,
    /// A string in verbose JSON
    length: Option<Value>,
    #[serde(rename = "UIVersionLabel")]
    ui_version_label: Option<String>,
    check_out_type: Option<i64>,
    major_version: Option<i64>,
    minor_version: Option<i64>,
}

impl Item {
    fn is_folder(&self) -> bool {
        self.metadata.kind == FOLDER_TYPE
    }

    fn length(&self) -> Option<String> {
        match self.length.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ListItem {
    #[serde(rename = "__metadata")]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct ContextInfo {
    #[serde(rename = "GetContextWebInformation")]
    info: FormDigest,
}

#[derive(Debug, Deserialize)]
struct FormDigest {
    #[serde(rename = "FormDigestValue")]
    value: String,
    #[serde(rename = "FormDigestTimeoutSeconds", default)]
    timeout_secs: Option<u64>,
}

/// A form digest and when it stops being accepted
#[derive(Debug, Clone)]
struct CachedDigest {
    value: String,
    renew_at: Instant,
}

impl CachedDigest {
    fn new(digest: FormDigest) -> Self {
        let lifetime = Duration::from_secs(digest.timeout_secs.unwrap_or(DIGEST_TIMEOUT_SECS));
        Self {
            value: digest.value,
            renew_at: Instant::now() + lifetime.saturating_sub(DIGEST_MARGIN),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.renew_at
    }
}

/// `'` doubled, as OData string literals require
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn parent_url(server_relative_url: &str) -> &str {
    match server_relative_url.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &server_relative_url[..i],
    }
}

/// Session on a SharePoint site
pub struct SharePointSession {
    transport: Rc<dyn HttpTransport>,
    credentials: Option<Credentials>,
    web_url: String,
    repository: Repository,
    root_path: String,
    digest: RefCell<Option<CachedDigest>>,
    types: TypeCache,
}

impl SharePointSession {
    /// Check `params.url` for a SharePoint web.
    ///
    /// Returns `Ok(None)` when the URL does not answer like one.
    pub fn connect(
        transport: Rc<dyn HttpTransport>,
        params: &SessionParameters,
    ) -> Result<Option<Self>> {
        let credentials = params.credentials();
        let web_url = params.url.trim_end_matches('/').to_string();
        let request = HttpRequest::get(web_url.as_str())
            .with_header("Accept", ACCEPT)
            .with_credentials(credentials.clone());
        let response = transport.execute(request)?;
        if matches!(response.status, 401 | 403) {
            return Err(Error::permission_denied(format!(
                "{web_url} answered {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Ok(None);
        }
        let web = match serde_json::from_slice::<Verbose<Web>>(&response.body) {
            Ok(web) if web.d.metadata.kind == WEB_TYPE => web.d,
            _ => return Ok(None),
        };
        let id = if web.id.is_empty() { "SharePoint".to_string() } else { web.id.clone() };
        if let Some(wanted) = params.repository_id.as_deref().filter(|r| *r != id) {
            warn!("{web_url} has no repository {wanted}");
            return Ok(None);
        }

        let mut session = Self {
            transport,
            credentials,
            web_url,
            repository: Repository::default(),
            root_path: String::from("/"),
            digest: RefCell::new(None),
            types: TypeCache::new(),
        };
        let root: Item = session.get_json(&format!("{}/rootFolder", session.web_url))?;
        debug!("SharePoint root folder is {}", root.server_relative_url);
        session.root_path = root.server_relative_url.trim_end_matches('/').to_string();
        session.repository = Repository::new(id)
            .with_name(web.title)
            .with_description(web.description)
            .with_vendor("Microsoft", "SharePoint", "")
            .with_root_id(root.metadata.uri)
            .with_cmis_version("1.0")
            .with_capability(Capability::GetDescendants, "false")
            .with_capability(Capability::GetFolderTree, "false")
            .with_capability(Capability::Multifiling, "false")
            .with_capability(Capability::Unfiling, "false")
            .with_capability(Capability::ContentStreamUpdatability, "anytime")
            .with_capability(Capability::Renditions, "none")
            .with_capability(Capability::Query, "none")
            .with_capability(Capability::Acl, "none");
        Ok(Some(session))
    }

    /// `api_root()/contextinfo` hands out form digests
    fn api_root(&self) -> &str {
        match self.web_url.find("/_api") {
            Some(i) => &self.web_url[..i + "/_api".len()],
            None => &self.web_url,
        }
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request
            .with_header("Accept", ACCEPT)
            .with_credentials(self.credentials.clone());
        self.transport.execute(request)?.error_for_status()
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(HttpRequest::get(url))?;
        let value: Verbose<T> = serde_json::from_slice(&response.body)?;
        Ok(value.d)
    }

    /// Current form digest, fetched again once it is about to expire
    fn form_digest(&self) -> Result<String> {
        if let Some(digest) = self.digest.borrow().as_ref().filter(|d| d.is_fresh()) {
            return Ok(digest.value.clone());
        }
        let url = format!("{}/contextinfo", self.api_root());
        let response = self.send(HttpRequest::post(url))?;
        let info: Verbose<ContextInfo> = serde_json::from_slice(&response.body)?;
        let digest = CachedDigest::new(info.d.info);
        let value = digest.value.clone();
        *self.digest.borrow_mut() = Some(digest);
        Ok(value)
    }

    /// Send a POST with a form digest, tunnelling `method` through
    /// `X-HTTP-Method`.
    ///
    /// A 403 may mean the server dropped the digest early; the request is
    /// sent once more with a new one.
    fn write(&self, request: HttpRequest, method: Option<&str>) -> Result<HttpResponse> {
        let request = match method {
            Some(method) => request
                .with_header("X-HTTP-Method", method)
                .with_header("IF-MATCH", "*"),
            None => request,
        };
        let first = request
            .clone()
            .with_header("X-RequestDigest", self.form_digest()?);
        match self.send(first) {
            Err(e) if e.is_permission_denied() => {
                debug!("SharePoint rejected the form digest, renewing it");
                self.digest.borrow_mut().take();
                self.send(request.with_header("X-RequestDigest", self.form_digest()?))
            }
            other => other,
        }
    }

    fn item(&self, id: &str) -> Result<Item> {
        self.get_json(id)
    }

    fn items(&self, url: &str) -> Result<Vec<Item>> {
        Ok(self.get_json::<Results<Item>>(url)?.results)
    }

    /// Repository path of a server-relative URL
    fn cmis_path(&self, server_relative_url: &str) -> String {
        let rest = server_relative_url
            .strip_prefix(self.root_path.as_str())
            .unwrap_or(server_relative_url);
        if rest.is_empty() {
            "/".to_string()
        } else if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        }
    }

    fn by_server_url(&self, server_relative_url: &str) -> Result<Item> {
        let folder = format!(
            "{}/GetFolderByServerRelativeUrl({})",
            self.web_url,
            literal(server_relative_url)
        );
        match self.item(&folder) {
            Err(e) if e.kind() == Some(ErrorKind::ObjectNotFound) => {
                let file = format!(
                    "{}/GetFileByServerRelativeUrl({})",
                    self.web_url,
                    literal(server_relative_url)
                );
                self.item(&file)
            }
            other => other,
        }
    }

    fn to_object(&self, item: Item) -> Result<Object> {
        let folder = item.is_folder();
        if !folder && item.metadata.kind != FILE_TYPE {
            return Err(Error::not_supported(format!(
                "{} is a {}",
                item.metadata.uri, item.metadata.kind
            )));
        }
        let ty = self.get_type(if folder { BASE_FOLDER } else { BASE_DOCUMENT })?;
        let mut props = PropertyBuilder::new(Rc::clone(&ty));
        props
            .set(ids::OBJECT_ID, &item.metadata.uri)
            .set(ids::NAME, &item.name)
            .set_opt(ids::CREATION_DATE, item.time_created.as_ref())
            .set_opt(ids::LAST_MODIFICATION_DATE, item.time_last_modified.as_ref());

        let mut actions = AllowableActions::new();
        actions.set(Action::GetProperties, true);
        actions.set(Action::UpdateProperties, true);
        actions.set(Action::DeleteObject, true);
        if folder {
            let path = self.cmis_path(&item.server_relative_url);
            let is_root = path == "/";
            props.set(ids::PATH, path);
            actions.set(Action::GetChildren, true);
            actions.set(Action::CreateDocument, true);
            actions.set(Action::CreateFolder, true);
            actions.set(Action::DeleteTree, true);
            actions.set(Action::GetFolderParent, !is_root);
        } else {
            let checked_out = item.check_out_type.map_or(false, |t| t != CHECKOUT_NONE);
            let is_major = item.minor_version == Some(0) && item.major_version.is_some();
            props
                .set(ids::CONTENT_STREAM_FILE_NAME, &item.name)
                .set_opt(ids::CONTENT_STREAM_LENGTH, item.length())
                .set_opt(ids::VERSION_LABEL, item.ui_version_label.as_ref())
                .set(ids::VERSION_SERIES_ID, &item.metadata.uri)
                .set(ids::IS_LATEST_VERSION, "true")
                .set(ids::IS_MAJOR_VERSION, is_major.to_string())
                .set(ids::IS_VERSION_SERIES_CHECKED_OUT, checked_out.to_string());
            actions.set(Action::GetContentStream, true);
            actions.set(Action::SetContentStream, !checked_out);
            actions.set(Action::CheckOut, !checked_out);
            actions.set(Action::CheckIn, checked_out);
            actions.set(Action::CancelCheckOut, checked_out);
        }

        Ok(Object::from_properties(props.build(), Some(ty), BindingKind::SharePoint)
            .with_allowable_actions(actions))
    }

    fn name_of(properties: &PropertyMap) -> Result<String> {
        properties
            .get(ids::NAME)
            .map(|p| p.first_str().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::invalid_argument("cmis:name is required"))
    }
}

impl TypeResolver for SharePointSession {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.types
            .get_or_fetch(id, || static_type(BindingKind::SharePoint, id))
    }
}

impl RepositoryService for SharePointSession {
    fn repositories(&self) -> Result<Vec<Repository>> {
        Ok(vec![self.repository.clone()])
    }

    fn repository(&self) -> &Repository {
        &self.repository
    }

    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        Ok(self.types.insert(static_type(BindingKind::SharePoint, id)?))
    }

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>> {
        TYPE_IDS.iter().map(|id| self.get_type(id)).collect()
    }

    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>> {
        self.get_type(type_id)?;
        Ok(Vec::new())
    }
}

impl ObjectService for SharePointSession {
    fn get_object(&self, id: &str) -> Result<Object> {
        let item = self.item(id)?;
        self.to_object(item)
    }

    fn get_object_by_path(&self, path: &str) -> Result<Object> {
        let path = path.trim_matches('/');
        let item = if path.is_empty() {
            self.item(self.repository.root_id())?
        } else {
            self.by_server_url(&format!("{}/{path}", self.root_path))?
        };
        self.to_object(item)
    }

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder> {
        let name = Self::name_of(properties)?;
        let url = format!("{parent_id}/Folders/add({})", literal(&name));
        let response = self.write(HttpRequest::post(url), None)?;
        let item: Verbose<Item> = serde_json::from_slice(&response.body)?;
        Folder::try_from(self.to_object(item.d)?)
    }

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document> {
        let name = Self::name_of(properties)?;
        let url = format!("{parent_id}/Files/add(overwrite=true,url={})", literal(&name));
        let mut request = HttpRequest::post(url);
        if let Some(content) = content {
            request = request.with_body(content.mime_type(), content.data.clone());
        }
        let response = self.write(request, None)?;
        let item: Verbose<Item> = serde_json::from_slice(&response.body)?;
        Document::try_from(self.to_object(item.d)?)
    }

    /// Only `cmis:name` can change; the file or folder is renamed through
    /// its list item.
    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        change_token: Option<&str>,
    ) -> Result<Object> {
        if change_token.is_some() {
            debug!("SharePoint ignores change tokens");
        }
        for key in properties.keys().filter(|k| k.as_str() != ids::NAME) {
            debug!("SharePoint cannot update {key}, skipping");
        }
        let Ok(name) = Self::name_of(properties) else {
            return self.get_object(id);
        };
        let item = self.item(id)?;
        if item.name == name {
            return self.to_object(item);
        }

        let list_item_url = format!("{id}/ListItemAllFields");
        let list_item: ListItem = self.get_json(&list_item_url)?;
        let body = json!({
            "__metadata": { "type": list_item.metadata.kind },
            "FileLeafRef": name,
        });
        let request = HttpRequest::post(list_item_url)
            .with_body(CONTENT_TYPE, serde_json::to_vec(&body)?);
        self.write(request, Some("MERGE"))?;

        let parent = parent_url(&item.server_relative_url);
        let renamed = format!("{}/{name}", parent.trim_end_matches('/'));
        let item = self.by_server_url(&renamed)?;
        self.to_object(item)
    }

    fn delete_object(&self, id: &str, _all_versions: bool) -> Result<()> {
        self.write(HttpRequest::post(id), Some("DELETE"))?;
        Ok(())
    }

    /// Deleting a folder removes its whole subtree
    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        _continue_on_failure: bool,
    ) -> Result<Vec<String>> {
        self.delete_object(folder_id, all_versions)?;
        Ok(Vec::new())
    }

    fn get_content_stream(&self, id: &str) -> Result<ContentStream> {
        let item = self.item(id)?;
        if item.is_folder() {
            return Err(Error::constraint(format!("{id} is a folder")));
        }
        let response = self.send(HttpRequest::get(format!("{id}/$value")))?;
        Ok(ContentStream::new(response.content_type().to_string(), response.body).with_filename(item.name))
    }
}

impl NavigationService for SharePointSession {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>> {
        let mut items = self.items(&format!("{folder_id}/Folders"))?;
        items.extend(self.items(&format!("{folder_id}/Files"))?);
        items.into_iter().map(|item| self.to_object(item)).collect()
    }

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder> {
        if folder_id == self.repository.root_id() {
            return Err(Error::invalid_argument("the root folder has no parent"));
        }
        let item = self.item(&format!("{folder_id}/ParentFolder"))?;
        Folder::try_from(self.to_object(item)?)
    }
}

impl Session for SharePointSession {
    fn binding(&self) -> BindingKind {
        BindingKind::SharePoint
    }

    fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}
