//! Repository descriptor

use std::fmt;

use ahash::AHashMap;

use crate::xml::{parse_bool, Element};

/// Repository capabilities advertised in `repositoryInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Acl,
    AllVersionsSearchable,
    Changes,
    ContentStreamUpdatability,
    GetDescendants,
    GetFolderTree,
    OrderBy,
    Multifiling,
    PwcSearchable,
    PwcUpdatable,
    Query,
    Renditions,
    Unfiling,
    VersionSpecificFiling,
    Join,
}

impl Capability {
    pub const ALL: [Capability; 15] = [
        Capability::Acl,
        Capability::AllVersionsSearchable,
        Capability::Changes,
        Capability::ContentStreamUpdatability,
        Capability::GetDescendants,
        Capability::GetFolderTree,
        Capability::OrderBy,
        Capability::Multifiling,
        Capability::PwcSearchable,
        Capability::PwcUpdatable,
        Capability::Query,
        Capability::Renditions,
        Capability::Unfiling,
        Capability::VersionSpecificFiling,
        Capability::Join,
    ];

    /// Element name inside `capabilities`
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Acl => "capabilityACL",
            Capability::AllVersionsSearchable => "capabilityAllVersionsSearchable",
            Capability::Changes => "capabilityChanges",
            Capability::ContentStreamUpdatability => "capabilityContentStreamUpdatability",
            Capability::GetDescendants => "capabilityGetDescendants",
            Capability::GetFolderTree => "capabilityGetFolderTree",
            Capability::OrderBy => "capabilityOrderBy",
            Capability::Multifiling => "capabilityMultifiling",
            Capability::PwcSearchable => "capabilityPWCSearchable",
            Capability::PwcUpdatable => "capabilityPWCUpdatable",
            Capability::Query => "capabilityQuery",
            Capability::Renditions => "capabilityRenditions",
            Capability::Unfiling => "capabilityUnfiling",
            Capability::VersionSpecificFiling => "capabilityVersionSpecificFiling",
            Capability::Join => "capabilityJoin",
        }
    }

    pub fn parse(s: &str) -> Option<Capability> {
        Capability::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one repository, fetched once per session
#[derive(Debug, Clone, Default)]
pub struct Repository {
    id: String,
    name: String,
    description: String,
    vendor_name: String,
    product_name: String,
    product_version: String,
    root_id: String,
    cmis_version_supported: String,
    thin_client_uri: String,
    principal_anonymous: String,
    principal_anyone: String,
    capabilities: AHashMap<Capability, String>,
}

impl Repository {
    /// A repository with only an id; the remaining fields are filled by the
    /// `with_*` builders. Used by bindings that synthesize their descriptor.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Parse a `repositoryInfo` element (AtomPub `cmisra:repositoryInfo` or
    /// the Web-Services `repositoryInfo` response).
    pub fn from_node(node: &Element) -> Self {
        let mut repo = Repository::default();
        for child in node.elements() {
            let text = || child.text();
            match child.local_name() {
                "repositoryId" => repo.id = text(),
                "repositoryName" => repo.name = text(),
                "repositoryDescription" => repo.description = text(),
                "vendorName" => repo.vendor_name = text(),
                "productName" => repo.product_name = text(),
                "productVersion" => repo.product_version = text(),
                "rootFolderId" => repo.root_id = text(),
                "cmisVersionSupported" => repo.cmis_version_supported = text(),
                "thinClientURI" => repo.thin_client_uri = text(),
                "principalAnonymous" => repo.principal_anonymous = text(),
                "principalAnyone" => repo.principal_anyone = text(),
                "capabilities" => {
                    for cap in child.elements() {
                        if let Some(c) = Capability::parse(cap.local_name()) {
                            repo.capabilities.insert(c, cap.text());
                        }
                    }
                }
                _ => {}
            }
        }
        repo
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn product_version(&self) -> &str {
        &self.product_version
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn cmis_version_supported(&self) -> &str {
        &self.cmis_version_supported
    }

    pub fn thin_client_uri(&self) -> &str {
        &self.thin_client_uri
    }

    pub fn principal_anonymous(&self) -> &str {
        &self.principal_anonymous
    }

    pub fn principal_anyone(&self) -> &str {
        &self.principal_anyone
    }

    /// Raw capability setting
    pub fn capability(&self, cap: Capability) -> Option<&str> {
        self.capabilities.get(&cap).map(String::as_str)
    }

    /// Capability setting read as a boolean; missing or non-boolean is false
    pub fn capability_bool(&self, cap: Capability) -> bool {
        self.capability(cap).and_then(parse_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_vendor<S: Into<String>>(mut self, vendor: S, product: S, version: S) -> Self {
        self.vendor_name = vendor.into();
        self.product_name = product.into();
        self.product_version = version.into();
        self
    }

    #[must_use]
    pub fn with_root_id<S: Into<String>>(mut self, root_id: S) -> Self {
        self.root_id = root_id.into();
        self
    }

    #[must_use]
    pub fn with_cmis_version<S: Into<String>>(mut self, version: S) -> Self {
        self.cmis_version_supported = version.into();
        self
    }

    #[must_use]
    pub fn with_capability<S: Into<String>>(mut self, cap: Capability, value: S) -> Self {
        self.capabilities.insert(cap, value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_node() {
        let node = Element::parse(
            r#"<cmisra:repositoryInfo xmlns:cmisra="http://docs.oasis-open.org/ns/cmis/restatom/200908/"
                                     xmlns:cmis="http://docs.oasis-open.org/ns/cmis/core/200908/">
                <cmis:repositoryId>A1</cmis:repositoryId>
                <cmis:repositoryName>Main Repository</cmis:repositoryName>
                <cmis:vendorName>Acme</cmis:vendorName>
                <cmis:productName>Acme CMS</cmis:productName>
                <cmis:productVersion>7.1</cmis:productVersion>
                <cmis:rootFolderId>100</cmis:rootFolderId>
                <cmis:capabilities>
                    <cmis:capabilityACL>manage</cmis:capabilityACL>
                    <cmis:capabilityGetDescendants>true</cmis:capabilityGetDescendants>
                    <cmis:capabilityUnknownFuture>x</cmis:capabilityUnknownFuture>
                </cmis:capabilities>
                <cmis:cmisVersionSupported>1.1</cmis:cmisVersionSupported>
            </cmisra:repositoryInfo>"#,
        )
        .unwrap();

        let repo = Repository::from_node(&node);
        assert_eq!(repo.id(), "A1");
        assert_eq!(repo.name(), "Main Repository");
        assert_eq!(repo.product_version(), "7.1");
        assert_eq!(repo.root_id(), "100");
        assert_eq!(repo.cmis_version_supported(), "1.1");
        assert_eq!(repo.capability(Capability::Acl), Some("manage"));
        assert!(repo.capability_bool(Capability::GetDescendants));
        assert!(!repo.capability_bool(Capability::Acl));
        assert_eq!(repo.capability(Capability::Join), None);
    }
}
