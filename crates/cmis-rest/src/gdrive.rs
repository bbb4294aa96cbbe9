//! Google Drive dialect
//!
//! Maps Drive v3 file resources onto CMIS objects. Folders are files with
//! the folder mime type; every other file is a document. Requests carry the
//! OAuth2 bearer token of the session's [`OAuth2Handler`].

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::form_urlencoded;

use cmis_core::multipart::{Part, RelatedMultipart};
use cmis_core::rendition::THUMBNAIL_KIND;
use cmis_core::object_type::{BASE_DOCUMENT, BASE_FOLDER};
use cmis_core::{
    ids, Action, AllowableActions, BindingKind, Capability, ContentStream, Document, Error,
    Folder, HttpRequest, HttpResponse, HttpTransport, Method, NavigationService, Object,
    ObjectService, ObjectType, PropertyMap, Rendition, Repository, RepositoryService, Result,
    Session, SessionParameters, TypeCache, TypeResolver,
};

use crate::oauth2::OAuth2Handler;
use crate::schema::{json_value, static_type, PropertyBuilder, TYPE_IDS};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";
const EXPORT_MIME: &str = "application/pdf";
const REPOSITORY_ID: &str = "GoogleDrive";
const FIELDS: &str = "id,name,mimeType,description,parents,createdTime,modifiedTime,size,version,\
thumbnailLink,owners(displayName),lastModifyingUser(displayName),\
capabilities(canEdit,canDelete,canDownload,canAddChildren,canListChildren,canRename)";

/// Whether `url` points at the Drive API
pub fn is_drive_url(url: &str) -> bool {
    url.contains("googleapis.com/drive")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DriveUser {
    display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DriveCapabilities {
    can_edit: bool,
    can_delete: bool,
    can_download: bool,
    can_add_children: bool,
    can_list_children: bool,
    can_rename: bool,
}

/// A Drive v3 file resource, limited to the fields the session asks for
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    description: Option<String>,
    parents: Vec<String>,
    created_time: Option<String>,
    modified_time: Option<String>,
    size: Option<String>,
    version: Option<String>,
    thumbnail_link: Option<String>,
    owners: Vec<DriveUser>,
    last_modifying_user: Option<DriveUser>,
    capabilities: Option<DriveCapabilities>,
}

impl DriveFile {
    fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    fn is_native(&self) -> bool {
        self.mime_type.starts_with(NATIVE_MIME_PREFIX) && !self.is_folder()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileList {
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Session on a Google Drive account
pub struct GdriveSession {
    transport: Rc<dyn HttpTransport>,
    auth: RefCell<OAuth2Handler>,
    base_url: String,
    repository: Repository,
    types: TypeCache,
}

impl GdriveSession {
    /// Authenticate with the OAuth2 data of `params` and open the drive.
    ///
    /// Returns `Ok(None)` when `params` carries no OAuth2 data or the URL is
    /// not a Drive API URL.
    pub fn connect(
        transport: Rc<dyn HttpTransport>,
        params: &SessionParameters,
    ) -> Result<Option<Self>> {
        let Some(oauth2) = params.oauth2.clone().filter(|_| is_drive_url(&params.url)) else {
            return Ok(None);
        };
        let mut handler = OAuth2Handler::new(Rc::clone(&transport), oauth2);
        handler.authenticate(params.username(), params.password())?;
        Self::open(transport, &params.url, handler).map(Some)
    }

    /// Open the drive with an already authenticated handler
    pub fn open(
        transport: Rc<dyn HttpTransport>,
        base_url: &str,
        handler: OAuth2Handler,
    ) -> Result<Self> {
        let mut session = Self {
            transport,
            auth: RefCell::new(handler),
            base_url: base_url.trim_end_matches('/').to_string(),
            repository: Repository::default(),
            types: TypeCache::new(),
        };
        let root: DriveFile = session.get_json(&session.url("files/root", &[("fields", "id")]))?;
        debug!("Google Drive root folder is {}", root.id);
        session.repository = Repository::new(REPOSITORY_ID)
            .with_name("Google Drive")
            .with_description("Google Drive repository")
            .with_vendor("Google", "Google Drive", "v3")
            .with_root_id(root.id)
            .with_cmis_version("1.1")
            .with_capability(Capability::GetDescendants, "false")
            .with_capability(Capability::Multifiling, "true")
            .with_capability(Capability::ContentStreamUpdatability, "anytime")
            .with_capability(Capability::Renditions, "read")
            .with_capability(Capability::Query, "none")
            .with_capability(Capability::Acl, "none");
        Ok(session)
    }

    /// The handler holding the session's tokens, e.g. to refresh them
    pub fn auth(&self) -> &RefCell<OAuth2Handler> {
        &self.auth
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{path}", self.base_url);
        if !query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (k, v) in query {
                serializer.append_pair(k, v);
            }
            url.push('?');
            url.push_str(&serializer.finish());
        }
        url
    }

    fn upload_url(&self) -> String {
        let base = self.base_url.replacen("/drive/", "/upload/drive/", 1);
        format!("{base}/files?uploadType=multipart&fields={}", encode(FIELDS))
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.with_credentials(self.auth.borrow().credentials());
        self.transport.execute(request)?.error_for_status()
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(HttpRequest::get(url))?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    fn send_json(&self, method: Method, url: &str, body: &Value) -> Result<DriveFile> {
        let request = HttpRequest::new(method, url)
            .with_body("application/json; charset=UTF-8", serde_json::to_vec(body)?);
        let response = self.send(request)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    fn file(&self, id: &str) -> Result<DriveFile> {
        self.get_json(&self.url(&format!("files/{id}"), &[("fields", FIELDS)]))
    }

    fn list(&self, query: &str) -> Result<Vec<DriveFile>> {
        let fields = format!("nextPageToken,files({FIELDS})");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![("q", query), ("fields", fields.as_str())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.as_str()));
            }
            let page: FileList = self.get_json(&self.url("files", &params))?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if Some(&token) != page_token.as_ref() => page_token = Some(token),
                _ => return Ok(files),
            }
        }
    }

    fn to_object(&self, file: DriveFile) -> Result<Object> {
        let folder = file.is_folder();
        let ty = self.get_type(if folder { BASE_FOLDER } else { BASE_DOCUMENT })?;
        let mut props = PropertyBuilder::new(Rc::clone(&ty));
        props
            .set(ids::OBJECT_ID, &file.id)
            .set(ids::NAME, &file.name)
            .set_opt(ids::DESCRIPTION, file.description.as_ref())
            .set_opt(ids::CREATED_BY, file.owners.first().map(|o| &o.display_name))
            .set_opt(ids::CREATION_DATE, file.created_time.as_ref())
            .set_opt(
                ids::LAST_MODIFIED_BY,
                file.last_modifying_user.as_ref().map(|u| &u.display_name),
            )
            .set_opt(ids::LAST_MODIFICATION_DATE, file.modified_time.as_ref())
            .set_opt(ids::CHANGE_TOKEN, file.version.as_ref());

        if folder {
            props.set_opt(ids::PARENT_ID, file.parents.first());
            if file.id == self.repository.root_id() || file.parents.is_empty() {
                props.set(ids::PATH, "/");
            }
        } else {
            props
                .set(ids::CONTENT_STREAM_FILE_NAME, &file.name)
                .set(ids::CONTENT_STREAM_MIME_TYPE, &file.mime_type)
                .set_opt(ids::CONTENT_STREAM_LENGTH, file.size.as_ref())
                .set_opt(ids::VERSION_LABEL, file.version.as_ref())
                .set(ids::VERSION_SERIES_ID, &file.id)
                .set(ids::IS_LATEST_VERSION, "true")
                .set(ids::IS_VERSION_SERIES_CHECKED_OUT, "false");
        }

        let caps = file.capabilities.clone().unwrap_or_default();
        let mut actions = AllowableActions::new();
        actions.set(Action::GetProperties, true);
        actions.set(Action::UpdateProperties, caps.can_edit || caps.can_rename);
        actions.set(Action::DeleteObject, caps.can_delete);
        if folder {
            actions.set(Action::GetChildren, caps.can_list_children);
            actions.set(Action::CreateDocument, caps.can_add_children);
            actions.set(Action::CreateFolder, caps.can_add_children);
            actions.set(Action::DeleteTree, caps.can_delete);
            actions.set(Action::GetFolderParent, !file.parents.is_empty());
        } else {
            actions.set(Action::GetContentStream, caps.can_download);
            actions.set(Action::SetContentStream, caps.can_edit);
        }

        let mut object = Object::from_properties(props.build(), Some(ty), BindingKind::GoogleDrive)
            .with_allowable_actions(actions);
        if let Some(link) = file.thumbnail_link {
            object = object.with_renditions(vec![Rendition {
                stream_id: format!("{}-thumbnail", file.id),
                mime_type: "image/png".to_string(),
                kind: THUMBNAIL_KIND.to_string(),
                url: link,
                ..Default::default()
            }]);
        }
        Ok(object)
    }

    /// JSON metadata for writable properties
    fn metadata(properties: &PropertyMap) -> Map<String, Value> {
        let mut meta = Map::new();
        for (id, field) in [
            (ids::NAME, "name"),
            (ids::DESCRIPTION, "description"),
            (ids::CONTENT_STREAM_MIME_TYPE, "mimeType"),
        ] {
            if let Some(value) = json_value(properties, id) {
                meta.insert(field.to_string(), value);
            }
        }
        meta
    }

    fn create(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        folder: bool,
        content: Option<&ContentStream>,
    ) -> Result<Object> {
        let mut meta = Self::metadata(properties);
        if !meta.contains_key("name") {
            return Err(Error::invalid_argument("cmis:name is required"));
        }
        meta.insert("parents".to_string(), json!([parent_id]));
        if folder {
            meta.insert("mimeType".to_string(), json!(FOLDER_MIME));
        }
        let meta = Value::Object(meta);

        let file = match content {
            Some(content) => {
                let mut message = RelatedMultipart::new();
                message.add_part(Part::new(
                    "application/json; charset=UTF-8",
                    serde_json::to_vec(&meta)?,
                ));
                message.add_part(Part::new(content.mime_type(), content.data.clone()));
                let request = HttpRequest::post(self.upload_url())
                    .with_body(message.content_type(), message.to_bytes());
                let response = self.send(request)?;
                serde_json::from_slice(&response.body)?
            }
            None => self.send_json(Method::Post, &self.url("files", &[("fields", FIELDS)]), &meta)?,
        };
        self.to_object(file)
    }
}

fn encode(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Literal for a Drive search query
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl TypeResolver for GdriveSession {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.types
            .get_or_fetch(id, || static_type(BindingKind::GoogleDrive, id))
    }
}

impl RepositoryService for GdriveSession {
    fn repositories(&self) -> Result<Vec<Repository>> {
        Ok(vec![self.repository.clone()])
    }

    fn repository(&self) -> &Repository {
        &self.repository
    }

    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        Ok(self.types.insert(static_type(BindingKind::GoogleDrive, id)?))
    }

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>> {
        TYPE_IDS.iter().map(|id| self.get_type(id)).collect()
    }

    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>> {
        self.get_type(type_id)?;
        Ok(Vec::new())
    }
}

impl ObjectService for GdriveSession {
    fn get_object(&self, id: &str) -> Result<Object> {
        let file = self.file(id)?;
        self.to_object(file)
    }

    fn get_object_by_path(&self, path: &str) -> Result<Object> {
        let mut file = self.file(self.repository.root_id())?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let query = format!(
                "{} in parents and name = {} and trashed = false",
                quote(&file.id),
                quote(segment)
            );
            file = self
                .list(&query)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found(format!("no object at {path}")))?;
        }
        self.to_object(file)
    }

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder> {
        Folder::try_from(self.create(parent_id, properties, true, None)?)
    }

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document> {
        Document::try_from(self.create(parent_id, properties, false, content)?)
    }

    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        change_token: Option<&str>,
    ) -> Result<Object> {
        if let Some(token) = change_token {
            debug!("Google Drive ignores change token {token}");
        }
        let meta = Value::Object(Self::metadata(properties));
        let url = self.url(&format!("files/{id}"), &[("fields", FIELDS)]);
        let file = self.send_json(Method::Patch, &url, &meta)?;
        self.to_object(file)
    }

    fn delete_object(&self, id: &str, _all_versions: bool) -> Result<()> {
        self.send(HttpRequest::new(Method::Delete, self.url(&format!("files/{id}"), &[])))?;
        Ok(())
    }

    /// Drive removes a folder with everything below it in one call
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
        let file = self.file(id)?;
        if file.is_folder() {
            return Err(Error::constraint(format!("{id} is a folder")));
        }
        let (url, mime_type) = if file.is_native() {
            let url = self.url(&format!("files/{id}/export"), &[("mimeType", EXPORT_MIME)]);
            (url, EXPORT_MIME.to_string())
        } else {
            (self.url(&format!("files/{id}"), &[("alt", "media")]), file.mime_type.clone())
        };
        let response = self.send(HttpRequest::get(url))?;
        let mime_type = match response.content_type() {
            "" => mime_type,
            ct => ct.to_string(),
        };
        Ok(ContentStream {
            mime_type,
            filename: Some(file.name),
            data: response.body,
        })
    }
}

impl NavigationService for GdriveSession {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>> {
        let query = format!("{} in parents and trashed = false", quote(folder_id));
        self.list(&query)?
            .into_iter()
            .map(|file| self.to_object(file))
            .collect()
    }

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder> {
        let file = self.file(folder_id)?;
        let parent = file
            .parents
            .first()
            .ok_or_else(|| Error::invalid_argument(format!("{folder_id} has no parent")))?;
        self.get_folder(parent)
    }
}

impl Session for GdriveSession {
    fn binding(&self) -> BindingKind {
        BindingKind::GoogleDrive
    }

    fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drive_file_fields() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"f1","name":"Docs","mimeType":"application/vnd.google-apps.folder",
                "parents":["root1"],"owners":[{"displayName":"Ann"}],
                "capabilities":{"canAddChildren":true}}"#,
        )
        .unwrap();
        assert!(file.is_folder());
        assert!(!file.is_native());
        assert_eq!(file.owners[0].display_name, "Ann");
        assert!(file.capabilities.unwrap().can_add_children);
    }

    #[test]
    fn test_query_quoting() {
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote(r"a\b"), r"'a\\b'");
        assert!(is_drive_url("https://www.googleapis.com/drive/v3"));
        assert!(!is_drive_url("https://example.com/cmis/atom"));
    }
}
