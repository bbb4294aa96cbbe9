//! Session configuration

use crate::transport::Credentials;

/// OAuth2 client registration used by the REST dialects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuth2Data {
    /// Authorization endpoint serving the login page
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    pub scope: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuth2Data {
    pub fn new<S: Into<String>>(auth_url: S, token_url: S, client_id: S, client_secret: S) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_redirect_uri<S: Into<String>>(mut self, redirect_uri: S) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// All endpoints and the client id are set
    pub fn is_complete(&self) -> bool {
        !self.auth_url.is_empty() && !self.token_url.is_empty() && !self.client_id.is_empty()
    }
}

/// Parameters for creating a session
///
/// # Example
///
/// ```rust
/// use cmis_core::SessionParameters;
///
/// let params = SessionParameters::new("http://localhost:8080/cmis/atom")
///     .with_credentials("admin", "admin")
///     .with_repository("A1");
/// assert_eq!(params.repository_id.as_deref(), Some("A1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParameters {
    /// Binding URL: AtomPub service document, WSDL, or REST endpoint
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Repository to open; the first one advertised when unset
    pub repository_id: Option<String>,
    pub oauth2: Option<OAuth2Data>,
}

impl SessionParameters {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_credentials<S: Into<String>>(mut self, username: S, password: S) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_repository<S: Into<String>>(mut self, repository_id: S) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    #[must_use]
    pub fn with_oauth2(mut self, oauth2: OAuth2Data) -> Self {
        self.oauth2 = Some(oauth2);
        self
    }

    /// Basic credentials when a username is set
    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials::Basic {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}
