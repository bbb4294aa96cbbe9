//! WSDL service map

use ahash::AHashMap;
use log::debug;

use cmis_core::xml::Element;
use cmis_core::{Credentials, Error, HttpRequest, HttpTransport, Namespaces, Result};

/// CMIS service names as published in the WSDL
pub mod services {
    pub const REPOSITORY: &str = "RepositoryService";
    pub const NAVIGATION: &str = "NavigationService";
    pub const OBJECT: &str = "ObjectService";
    pub const VERSIONING: &str = "VersioningService";
    pub const DISCOVERY: &str = "DiscoveryService";
    pub const MULTI_FILING: &str = "MultiFilingService";
    pub const RELATIONSHIP: &str = "RelationshipService";
    pub const POLICY: &str = "PolicyService";
    pub const ACL: &str = "ACLService";
}

/// Service name → endpoint URL, read from `wsdl:service` elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMap {
    endpoints: AHashMap<String, String>,
}

impl ServiceMap {
    /// Read the endpoints of a `wsdl:definitions` document. Returns `None` for
    /// any other document.
    pub fn from_node(root: &Element, ns: &Namespaces) -> Option<Self> {
        if !root.is(ns, "wsdl:definitions") {
            return None;
        }
        let mut endpoints = AHashMap::new();
        for service in root.children(ns, "wsdl:service") {
            let Some(name) = service.attr("name") else {
                continue;
            };
            let location = service
                .children(ns, "wsdl:port")
                .flat_map(|port| port.elements())
                .find(|addr| addr.is(ns, "soap:address") || addr.is(ns, "soap12:address"))
                .and_then(|addr| addr.attr("location"));
            if let Some(location) = location {
                endpoints.insert(name.to_string(), location.to_string());
            }
        }
        Some(Self { endpoints })
    }

    /// Fetch the WSDL with one GET; `Ok(None)` when the URL does not serve a
    /// CMIS WSDL.
    pub fn fetch(
        transport: &dyn HttpTransport,
        url: &str,
        credentials: Option<Credentials>,
        ns: &Namespaces,
    ) -> Result<Option<Self>> {
        let response = transport.execute(HttpRequest::get(url).with_credentials(credentials))?;
        if matches!(response.status, 401 | 403) {
            return Err(Error::permission_denied(format!(
                "authentication rejected by {url}"
            )));
        }
        if !response.is_success() {
            debug!("{url} answered {}, not a WSDL", response.status);
            return Ok(None);
        }
        let root = match Element::parse_bytes(&response.body) {
            Ok(root) => root,
            Err(e) => {
                debug!("{url} is not XML: {e}");
                return Ok(None);
            }
        };
        Ok(Self::from_node(&root, ns).filter(|map| map.endpoint(services::REPOSITORY).is_some()))
    }

    pub fn endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints.get(service).map(String::as_str)
    }

    /// Endpoint of a service the session needs
    pub fn require(&self, service: &str) -> Result<&str> {
        self.endpoint(service)
            .ok_or_else(|| Error::not_supported(format!("WSDL has no {service} endpoint")))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
