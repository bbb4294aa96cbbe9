//! # cmis-rest
//!
//! REST dialects of the CMIS client: Google Drive and SharePoint, plus the
//! OAuth2 authorization-code flow Google Drive sessions authenticate with.
//!
//! Neither service speaks CMIS. Both sessions map their native JSON
//! resources onto the shared object model, using a fixed `cmis:document` /
//! `cmis:folder` schema (see [`schema`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use cmis_core::{OAuth2Data, ReqwestTransport, SessionParameters};
//! use cmis_rest::GdriveSession;
//!
//! # fn main() -> cmis_core::Result<()> {
//! let params = SessionParameters {
//!     url: "https://www.googleapis.com/drive/v3".into(),
//!     username: Some("me@example.com".into()),
//!     password: Some("secret".into()),
//!     oauth2: Some(OAuth2Data {
//!         auth_url: "https://accounts.google.com/o/oauth2/auth".into(),
//!         token_url: "https://oauth2.googleapis.com/token".into(),
//!         scope: "https://www.googleapis.com/auth/drive".into(),
//!         redirect_uri: "urn:ietf:wg:oauth:2.0:oob".into(),
//!         client_id: "client".into(),
//!         client_secret: "secret".into(),
//!     }),
//!     ..Default::default()
//! };
//! let session = GdriveSession::connect(Rc::new(ReqwestTransport::new()?), &params)?;
//! # Ok(())
//! # }
//! ```

pub mod gdrive;
pub mod oauth2;
pub mod schema;
pub mod sharepoint;

// Re-exports for convenience
pub use gdrive::{is_drive_url, GdriveSession};
pub use oauth2::{AuthState, HtmlForm, OAuth2Handler, TokenSet};
pub use sharepoint::SharePointSession;
