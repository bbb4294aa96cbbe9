//! AtomPub service document

use ahash::AHashMap;
use log::debug;

use cmis_core::xml::Element;
use cmis_core::{
    Credentials, Error, HttpRequest, HttpTransport, Namespaces, Repository, Result,
};

/// Collection types advertised in a workspace
pub mod collections {
    pub const ROOT: &str = "root";
    pub const TYPES: &str = "types";
    pub const QUERY: &str = "query";
    pub const CHECKED_OUT: &str = "checkedout";
    pub const UNFILED: &str = "unfiled";
}

/// URI template types advertised in a workspace
pub mod templates {
    pub const OBJECT_BY_ID: &str = "objectbyid";
    pub const OBJECT_BY_PATH: &str = "objectbypath";
    pub const TYPE_BY_ID: &str = "typebyid";
    pub const QUERY: &str = "query";
}

/// One `app:workspace`: a repository with its entry points
#[derive(Debug, Clone)]
pub struct Workspace {
    pub repository: Repository,
    collections: AHashMap<String, String>,
    templates: AHashMap<String, String>,
}

impl Workspace {
    pub fn from_node(node: &Element, ns: &Namespaces) -> Self {
        let repository = node
            .child(ns, "cmisra:repositoryInfo")
            .map(Repository::from_node)
            .unwrap_or_default();

        let mut collections = AHashMap::new();
        for coll in node.children(ns, "app:collection") {
            let (Some(href), Some(kind)) = (coll.attr("href"), coll.child_text(ns, "cmisra:collectionType"))
            else {
                continue;
            };
            collections.insert(kind.trim().to_string(), href.to_string());
        }

        let mut templates = AHashMap::new();
        for tpl in node.children(ns, "cmisra:uritemplate") {
            let (Some(template), Some(kind)) = (
                tpl.child_text(ns, "cmisra:template"),
                tpl.child_text(ns, "cmisra:type"),
            ) else {
                continue;
            };
            templates.insert(kind.trim().to_string(), template.trim().to_string());
        }

        Self {
            repository,
            collections,
            templates,
        }
    }

    /// Collection URL by `cmisra:collectionType`
    pub fn collection(&self, kind: &str) -> Option<&str> {
        self.collections.get(kind).map(String::as_str)
    }

    /// Expand a URI template by type; fails when the server does not
    /// advertise it
    pub fn expand(&self, kind: &str, params: &[(&str, &str)]) -> Result<String> {
        let template = self
            .templates
            .get(kind)
            .ok_or_else(|| Error::not_supported(format!("no {kind} URI template")))?;
        Ok(expand_template(template, params))
    }
}

/// Replace `{name}` placeholders with URL-encoded values; placeholders
/// without a value become empty.
pub fn expand_template(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        if let Some((_, value)) = params.iter().find(|(k, _)| *k == name) {
            out.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// A parsed `app:service` document
#[derive(Debug, Clone)]
pub struct ServiceDocument {
    pub workspaces: Vec<Workspace>,
}

impl ServiceDocument {
    /// Parse a service document; `None` when the root is not `app:service`
    pub fn from_node(root: &Element, ns: &Namespaces) -> Option<Self> {
        if !root.is(ns, "app:service") {
            return None;
        }
        let workspaces = root
            .children(ns, "app:workspace")
            .map(|w| Workspace::from_node(w, ns))
            .collect();
        Some(Self { workspaces })
    }

    /// Fetch and parse the service document with a single GET.
    ///
    /// Returns `Ok(None)` when the URL does not serve a service document;
    /// rejected credentials are a `permissionDenied` error.
    pub fn fetch(
        transport: &dyn HttpTransport,
        url: &str,
        credentials: Option<Credentials>,
        ns: &Namespaces,
    ) -> Result<Option<Self>> {
        let response =
            transport.execute(HttpRequest::get(url).with_credentials(credentials))?;
        if matches!(response.status, 401 | 403) {
            return Err(Error::permission_denied(format!(
                "authentication rejected by {url}"
            )));
        }
        if !response.is_success() {
            debug!("{url} answered {}, not an AtomPub endpoint", response.status);
            return Ok(None);
        }
        let root = match Element::parse_bytes(&response.body) {
            Ok(root) => root,
            Err(e) => {
                debug!("{url} is not XML: {e}");
                return Ok(None);
            }
        };
        Ok(Self::from_node(&root, ns))
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.workspaces.iter().map(|w| w.repository.clone()).collect()
    }

    /// Workspace of the given repository, or the first one
    pub fn workspace(&self, repository_id: Option<&str>) -> Option<&Workspace> {
        match repository_id {
            Some(id) => self.workspaces.iter().find(|w| w.repository.id() == id),
            None => self.workspaces.first(),
        }
    }
}
