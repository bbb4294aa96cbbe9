//! Binding detection and session creation

use std::rc::Rc;

use log::{debug, info};

use cmis_core::{
    BindingKind, HttpTransport, ReqwestTransport, Repository, Result, Session, SessionParameters,
};

/// Opens sessions on whatever binding a URL speaks.
///
/// Bindings are tried in a fixed order: AtomPub, Web Services, SharePoint.
/// When the parameters carry OAuth2 data, Google Drive is tried first. A
/// binding that does not recognize the endpoint moves on to the next one; only
/// a rejected authentication on a recognized binding stops the search.
pub struct SessionFactory {
    transport: Rc<dyn HttpTransport>,
}

impl SessionFactory {
    /// Factory over a blocking `reqwest` transport with default settings
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(Rc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(transport: Rc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Rc<dyn HttpTransport> {
        &self.transport
    }

    /// Bindings to try for `params`, in order
    pub fn detection_order(params: &SessionParameters) -> Vec<BindingKind> {
        let mut order = vec![
            BindingKind::AtomPub,
            BindingKind::WebServices,
            BindingKind::SharePoint,
        ];
        if params.oauth2.is_some() {
            order.insert(0, BindingKind::GoogleDrive);
        }
        order
    }

    /// Open a session on the first binding that recognizes `params.url`.
    ///
    /// Returns `Ok(None)` when no binding does. The only error is a
    /// `permissionDenied` from a binding that recognized the endpoint but
    /// rejected the credentials.
    pub fn create_session(&self, params: &SessionParameters) -> Result<Option<Box<dyn Session>>> {
        for binding in Self::detection_order(params) {
            if let Some(session) = self.try_connect(binding, params)? {
                info!("Connected to {} over {binding}", params.url);
                return Ok(Some(session));
            }
        }
        debug!("No binding recognizes {}", params.url);
        Ok(None)
    }

    /// Repositories behind `params.url`, without opening one of them
    pub fn get_repositories(&self, params: &SessionParameters) -> Result<Option<Vec<Repository>>> {
        for binding in Self::detection_order(params) {
            let listed = match binding {
                #[cfg(feature = "atompub")]
                BindingKind::AtomPub => {
                    cmis_atompub::AtomPubSession::list_repositories(self.transport.as_ref(), params)
                }
                #[cfg(feature = "ws")]
                BindingKind::WebServices => {
                    cmis_ws::WsSession::list_repositories(Rc::clone(&self.transport), params)
                }
                _ => self
                    .try_connect(binding, params)
                    .and_then(|s| s.map(|s| s.repositories()).transpose()),
            };
            if let Some(repositories) = recognized(binding, listed)? {
                return Ok(Some(repositories));
            }
        }
        Ok(None)
    }

    fn try_connect(
        &self,
        binding: BindingKind,
        params: &SessionParameters,
    ) -> Result<Option<Box<dyn Session>>> {
        let transport = Rc::clone(&self.transport);
        let result: Result<Option<Box<dyn Session>>> = match binding {
            #[cfg(feature = "atompub")]
            BindingKind::AtomPub => cmis_atompub::AtomPubSession::connect(transport, params)
                .map(|s| s.map(|s| Box::new(s) as Box<dyn Session>)),
            #[cfg(feature = "ws")]
            BindingKind::WebServices => cmis_ws::WsSession::connect(transport, params)
                .map(|s| s.map(|s| Box::new(s) as Box<dyn Session>)),
            #[cfg(feature = "rest")]
            BindingKind::GoogleDrive => cmis_rest::GdriveSession::connect(transport, params)
                .map(|s| s.map(|s| Box::new(s) as Box<dyn Session>)),
            #[cfg(feature = "rest")]
            BindingKind::SharePoint => cmis_rest::SharePointSession::connect(transport, params)
                .map(|s| s.map(|s| Box::new(s) as Box<dyn Session>)),
            #[allow(unreachable_patterns)]
            _ => Ok(None),
        };
        recognized(binding, result)
    }
}

/// Keep a binding's answer, turning failures other than a rejected login into
/// "not this binding"
fn recognized<T>(binding: BindingKind, result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(e) if e.is_permission_denied() => Err(e),
        Err(e) => {
            debug!("{binding} detection failed: {e}");
            Ok(None)
        }
        ok => ok,
    }
}

/// Open a session over a default `reqwest` transport
pub fn create_session(params: &SessionParameters) -> Result<Option<Box<dyn Session>>> {
    SessionFactory::new()?.create_session(params)
}

/// List the repositories behind `params.url` over a default `reqwest`
/// transport
pub fn get_repositories(params: &SessionParameters) -> Result<Option<Vec<Repository>>> {
    SessionFactory::new()?.get_repositories(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmis_core::{Error, OAuth2Data};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detection_order() {
        let params = SessionParameters::new("http://h/cmis");
        assert_eq!(
            SessionFactory::detection_order(&params),
            vec![
                BindingKind::AtomPub,
                BindingKind::WebServices,
                BindingKind::SharePoint
            ]
        );
        let params = params.with_oauth2(OAuth2Data::default());
        assert_eq!(SessionFactory::detection_order(&params)[0], BindingKind::GoogleDrive);
    }

    #[test]
    fn test_only_permission_denied_stops_probing() {
        let denied = recognized::<()>(BindingKind::AtomPub, Err(Error::permission_denied("no")));
        assert!(denied.is_err());

        let broken = recognized::<()>(BindingKind::WebServices, Err(Error::Parse("junk".into())));
        assert!(broken.unwrap().is_none());

        let found = recognized(BindingKind::SharePoint, Ok(Some(3)));
        assert_eq!(found.unwrap(), Some(3));
    }
}
