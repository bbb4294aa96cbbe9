//! Web-Services session

use std::rc::Rc;

use log::{debug, warn};

use cmis_core::object_type::ObjectType;
use cmis_core::xml::{parse_bool, Element};
use cmis_core::{
    BindingKind, ContentStream, Credentials, Document, Error, ErrorKind, Folder, HttpRequest,
    HttpTransport, Namespaces, NavigationService, Object, ObjectService, PropertyMap, Repository,
    RepositoryService, Result, Session, SessionParameters, TypeCache, TypeResolver,
};

use crate::envelope::{envelope, SoapRequest, SoapResponse, UsernameToken, CONTENT_CID};
use crate::wsdl::{services, ServiceMap};

/// Session speaking the Web-Services binding.
///
/// Endpoints come from the WSDL fetched at connect time. Each operation is
/// one SOAP call, sent as MTOM when it carries content.
pub struct WsSession {
    transport: Rc<dyn HttpTransport>,
    credentials: Option<Credentials>,
    token: Option<UsernameToken>,
    ns: Namespaces,
    services: ServiceMap,
    repository: Repository,
    types: TypeCache,
}

impl WsSession {
    /// Check `params.url` as a CMIS WSDL and open the requested repository
    /// (the first one when none is requested).
    ///
    /// Returns `Ok(None)` when the URL serves no CMIS WSDL or the repository
    /// is unknown to the server.
    pub fn connect(
        transport: Rc<dyn HttpTransport>,
        params: &SessionParameters,
    ) -> Result<Option<Self>> {
        let ns = Namespaces::default();
        let credentials = params.credentials();
        let Some(services) =
            ServiceMap::fetch(transport.as_ref(), &params.url, credentials.clone(), &ns)?
        else {
            return Ok(None);
        };
        let token = params.username.as_ref().map(|username| UsernameToken {
            username: username.clone(),
            password: params.password().to_string(),
        });

        let mut session = Self {
            transport,
            credentials,
            token,
            ns,
            services,
            repository: Repository::default(),
            types: TypeCache::new(),
        };

        let repository_id = match &params.repository_id {
            Some(id) => id.clone(),
            None => match session.repositories()?.into_iter().next() {
                Some(repo) => repo.id().to_string(),
                None => {
                    warn!("{} publishes no repository", params.url);
                    return Ok(None);
                }
            },
        };
        match session.get_repository_info(&repository_id) {
            Ok(repository) => session.repository = repository,
            Err(e) if is_unknown_repository(&e) => {
                warn!("{} has no repository {repository_id}: {e}", params.url);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        debug!("Web-Services session on repository {repository_id}");
        Ok(Some(session))
    }

    /// Repositories of a Web-Services endpoint, or `None` when the URL is
    /// not one
    pub fn list_repositories(
        transport: Rc<dyn HttpTransport>,
        params: &SessionParameters,
    ) -> Result<Option<Vec<Repository>>> {
        let params = SessionParameters {
            repository_id: None,
            ..params.clone()
        };
        match Self::connect(transport, &params)? {
            Some(session) => session.repositories().map(Some),
            None => Ok(None),
        }
    }

    /// Full description of a repository, from `getRepositoryInfo`
    pub fn get_repository_info(&self, repository_id: &str) -> Result<Repository> {
        let request = self.request("getRepositoryInfo", &[("repositoryId", repository_id)]);
        let response = self.call(services::REPOSITORY, request, None)?;
        let info = self.expect_child(&response.body, "repositoryInfo")?;
        Ok(Repository::from_node(info))
    }

    /// `cmism:{operation}` element with simple text fields, in order
    fn request(&self, operation: &str, fields: &[(&str, &str)]) -> Element {
        let mut element = self.ns.element(&format!("cmism:{operation}"));
        for (name, value) in fields {
            element.push_child(self.field(name, value));
        }
        element
    }

    fn field(&self, name: &str, value: &str) -> Element {
        self.ns.element(&format!("cmism:{name}")).with_text(value)
    }

    fn properties(&self, properties: &PropertyMap) -> Element {
        let mut element = self.ns.element("cmism:properties");
        for property in properties.values() {
            element.push_child(property.to_element(&self.ns));
        }
        element
    }

    fn call(
        &self,
        service: &str,
        request: Element,
        content: Option<&ContentStream>,
    ) -> Result<SoapResponse> {
        let url = self.services.require(service)?;
        let operation = request.local_name().to_string();
        let env = envelope(&self.ns, self.token.as_ref(), request);
        let soap = match content {
            Some(content) => SoapRequest::mtom(&env, content.mime_type(), content.data.clone())?,
            None => SoapRequest::plain(&env)?,
        };
        debug!("SOAP {operation} -> {url}");
        let request = HttpRequest::post(url)
            .with_header("SOAPAction", "\"\"")
            .with_body(soap.content_type, soap.body)
            .with_credentials(self.credentials.clone());
        SoapResponse::decode(&self.ns, self.transport.execute(request)?)
    }

    fn expect_child<'a>(&self, element: &'a Element, local: &str) -> Result<&'a Element> {
        element.child_local(local).ok_or_else(|| {
            Error::Parse(format!("{} has no {local}", element.local_name()))
        })
    }

    fn parse_object(&self, node: &Element) -> Object {
        Object::from_node(node, self, BindingKind::WebServices)
    }

    fn fetch_type(&self, id: &str) -> Result<ObjectType> {
        let request = self.request(
            "getTypeDefinition",
            &[("repositoryId", self.repository.id()), ("typeId", id)],
        );
        let response = self.call(services::REPOSITORY, request, None)?;
        let node = self.expect_child(&response.body, "type")?;
        Ok(ObjectType::from_node(node).bound_to(BindingKind::WebServices))
    }

    /// Every page of `getTypeChildren`; `None` asks for the base types
    fn type_children(&self, type_id: Option<&str>) -> Result<Vec<Rc<ObjectType>>> {
        let mut types = Vec::new();
        loop {
            let skip = types.len().to_string();
            let mut request = self.request("getTypeChildren", &[("repositoryId", self.repository.id())]);
            if let Some(type_id) = type_id {
                request.push_child(self.field("typeId", type_id));
            }
            request.push_child(self.field("includePropertyDefinitions", "true"));
            request.push_child(self.field("skipCount", &skip));

            let response = self.call(services::REPOSITORY, request, None)?;
            let list = self.expect_child(&response.body, "types")?;
            let before = types.len();
            for node in list.children_local("types") {
                let ty = ObjectType::from_node(node).bound_to(BindingKind::WebServices);
                types.push(self.types.insert(ty));
            }
            if types.len() == before || !has_more_items(list) {
                return Ok(types);
            }
        }
    }

    fn created_object(&self, response: &SoapResponse) -> Result<Object> {
        let id = self.expect_child(&response.body, "objectId")?.text();
        self.get_object(id.trim())
    }

    fn create(
        &self,
        operation: &str,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Object> {
        let mut request = self.request(operation, &[("repositoryId", self.repository.id())]);
        request.push_child(self.properties(properties));
        request.push_child(self.field("folderId", parent_id));
        if let Some(content) = content {
            let mut stream = self
                .ns
                .element("cmism:contentStream")
                .with_child(self.field("length", &content.len().to_string()))
                .with_child(self.field("mimeType", content.mime_type()));
            if let Some(filename) = &content.filename {
                stream.push_child(self.field("filename", filename));
            }
            stream.push_child(
                self.ns.element("cmism:stream").with_child(
                    self.ns
                        .element("xop:Include")
                        .with_attr("href", &format!("cid:{CONTENT_CID}")),
                ),
            );
            request.push_child(stream);
        }
        let response = self.call(services::OBJECT, request, content)?;
        self.created_object(&response)
    }

    fn object_request(&self, operation: &str, object_id: &str) -> Element {
        self.request(
            operation,
            &[
                ("repositoryId", self.repository.id()),
                ("objectId", object_id),
                ("includeAllowableActions", "true"),
                ("includeRelationships", "none"),
                ("renditionFilter", "cmis:thumbnail"),
            ],
        )
    }
}

fn has_more_items(list: &Element) -> bool {
    list.child_local("hasMoreItems")
        .and_then(|e| parse_bool(&e.text()))
        .unwrap_or(false)
}

/// Faults a server answers with when asked for a repository it does not host
fn is_unknown_repository(error: &Error) -> bool {
    matches!(
        error.kind(),
        Some(ErrorKind::InvalidArgument | ErrorKind::ObjectNotFound)
    )
}

impl TypeResolver for WsSession {
    fn get_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        self.types.get_or_fetch(id, || self.fetch_type(id))
    }
}

impl RepositoryService for WsSession {
    /// Repository ids and names; only the session's own repository carries
    /// the full description
    fn repositories(&self) -> Result<Vec<Repository>> {
        let response = self.call(services::REPOSITORY, self.request("getRepositories", &[]), None)?;
        Ok(response
            .body
            .children_local("repositories")
            .map(|entry| {
                let id = entry.child_local("repositoryId").map(|e| e.text()).unwrap_or_default();
                let name = entry.child_local("repositoryName").map(|e| e.text()).unwrap_or_default();
                Repository::new(id).with_name(name)
            })
            .collect())
    }

    fn repository(&self) -> &Repository {
        &self.repository
    }

    fn refresh_type(&self, id: &str) -> Result<Rc<ObjectType>> {
        let ty = self.fetch_type(id)?;
        Ok(self.types.insert(ty))
    }

    fn get_base_types(&self) -> Result<Vec<Rc<ObjectType>>> {
        self.type_children(None)
    }

    fn get_type_children(&self, type_id: &str) -> Result<Vec<Rc<ObjectType>>> {
        self.type_children(Some(type_id))
    }
}

impl ObjectService for WsSession {
    fn get_object(&self, id: &str) -> Result<Object> {
        let response = self.call(services::OBJECT, self.object_request("getObject", id), None)?;
        Ok(self.parse_object(self.expect_child(&response.body, "object")?))
    }

    fn get_object_by_path(&self, path: &str) -> Result<Object> {
        let request = self.request(
            "getObjectByPath",
            &[
                ("repositoryId", self.repository.id()),
                ("path", path),
                ("includeAllowableActions", "true"),
                ("includeRelationships", "none"),
                ("renditionFilter", "cmis:thumbnail"),
            ],
        );
        let response = self.call(services::OBJECT, request, None)?;
        Ok(self.parse_object(self.expect_child(&response.body, "object")?))
    }

    fn create_folder(&self, parent_id: &str, properties: &PropertyMap) -> Result<Folder> {
        Folder::try_from(self.create("createFolder", parent_id, properties, None)?)
    }

    fn create_document(
        &self,
        parent_id: &str,
        properties: &PropertyMap,
        content: Option<&ContentStream>,
    ) -> Result<Document> {
        Document::try_from(self.create("createDocument", parent_id, properties, content)?)
    }

    fn update_properties(
        &self,
        id: &str,
        properties: &PropertyMap,
        change_token: Option<&str>,
    ) -> Result<Object> {
        let mut request = self.request(
            "updateProperties",
            &[("repositoryId", self.repository.id()), ("objectId", id)],
        );
        if let Some(token) = change_token {
            request.push_child(self.field("changeToken", token));
        }
        request.push_child(self.properties(properties));
        let response = self.call(services::OBJECT, request, None)?;
        // The server may answer with a new id (new version)
        let new_id = response
            .body
            .child_local("objectId")
            .map(|e| e.text().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.to_string());
        self.get_object(&new_id)
    }

    fn delete_object(&self, id: &str, all_versions: bool) -> Result<()> {
        let request = self.request(
            "deleteObject",
            &[
                ("repositoryId", self.repository.id()),
                ("objectId", id),
                ("allVersions", bool_str(all_versions)),
            ],
        );
        self.call(services::OBJECT, request, None)?;
        Ok(())
    }

    fn delete_tree(
        &self,
        folder_id: &str,
        all_versions: bool,
        continue_on_failure: bool,
    ) -> Result<Vec<String>> {
        let request = self.request(
            "deleteTree",
            &[
                ("repositoryId", self.repository.id()),
                ("folderId", folder_id),
                ("allVersions", bool_str(all_versions)),
                ("unfileObjects", "delete"),
                ("continueOnFailure", bool_str(continue_on_failure)),
            ],
        );
        let response = self.call(services::OBJECT, request, None)?;
        Ok(response
            .body
            .child_local("failedToDelete")
            .map(|failed| {
                failed
                    .children_local("objectIds")
                    .map(|e| e.text().trim().to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_content_stream(&self, id: &str) -> Result<ContentStream> {
        let request = self.request(
            "getContentStream",
            &[("repositoryId", self.repository.id()), ("objectId", id)],
        );
        let response = self.call(services::OBJECT, request, None)?;
        let stream = self.expect_child(&response.body, "contentStream")?;
        let data = response.binary(&self.ns, self.expect_child(stream, "stream")?)?;
        Ok(ContentStream {
            mime_type: stream.child_local("mimeType").map(|e| e.text()).unwrap_or_default(),
            filename: stream
                .child_local("filename")
                .map(|e| e.text())
                .filter(|s| !s.is_empty()),
            data,
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

impl NavigationService for WsSession {
    fn get_children(&self, folder_id: &str) -> Result<Vec<Object>> {
        let mut children = Vec::new();
        loop {
            let skip = children.len().to_string();
            let request = self.request(
                "getChildren",
                &[
                    ("repositoryId", self.repository.id()),
                    ("folderId", folder_id),
                    ("includeAllowableActions", "true"),
                    ("renditionFilter", "cmis:thumbnail"),
                    ("skipCount", skip.as_str()),
                ],
            );
            let response = self.call(services::NAVIGATION, request, None)?;
            let list = self.expect_child(&response.body, "objects")?;
            let before = children.len();
            children.extend(
                list.children_local("objects")
                    .filter_map(|entry| entry.child_local("object"))
                    .map(|node| self.parse_object(node)),
            );
            if children.len() == before || !has_more_items(list) {
                return Ok(children);
            }
        }
    }

    fn get_folder_parent(&self, folder_id: &str) -> Result<Folder> {
        let request = self.request(
            "getFolderParent",
            &[("repositoryId", self.repository.id()), ("folderId", folder_id)],
        );
        let response = self.call(services::NAVIGATION, request, None)?;
        Folder::try_from(self.parse_object(self.expect_child(&response.body, "object")?))
    }
}

impl Session for WsSession {
    fn binding(&self) -> BindingKind {
        BindingKind::WebServices
    }

    fn as_resolver(&self) -> &dyn TypeResolver {
        self
    }
}
