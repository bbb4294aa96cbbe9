//! # cmis
//!
//! A client for Content Management Interoperability Services (CMIS)
//! repositories.
//!
//! One object, type and property model is served over every binding a
//! repository may speak:
//!
//! - AtomPub (feature `atompub`)
//! - SOAP Web Services (feature `ws`)
//! - the Google Drive and SharePoint REST APIs (feature `rest`)
//!
//! [`SessionFactory`] inspects a URL, picks the binding that answers and
//! returns a [`Session`] that hides which one it is.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmis::prelude::*;
//!
//! # fn main() -> cmis::Result<()> {
//! let params = SessionParameters::new("http://localhost:8080/cmis/atom")
//!     .with_credentials("admin", "admin");
//! let factory = SessionFactory::new()?;
//! if let Some(session) = factory.create_session(&params)? {
//!     let root = session.root_folder()?;
//!     for child in root.children(session.as_ref())? {
//!         println!("{} ({})", child.name(), child.type_id());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod prelude;

pub use factory::{create_session, get_repositories, SessionFactory};

// Re-export the object model
pub use cmis_core::{
    creation_properties, ids, Action, AllowableActions, BindingKind, Capability, ContentStream,
    ContentStreamAllowed, Credentials, Document, Error, ErrorKind, Folder, HttpRequest,
    HttpResponse, HttpTransport, Method, NavigationService, OAuth2Data, Object, ObjectService,
    ObjectType, Property, PropertyKind, PropertyMap, PropertyType, Rendition, Repository,
    RepositoryService, Result, Session, SessionParameters, SoapFault, TypeCache, TypeResolver,
};
pub use cmis_core::{ReqwestTransport, ReqwestTransportConfig};

// Re-export the bindings
#[cfg(feature = "atompub")]
pub use cmis_atompub::AtomPubSession;
#[cfg(feature = "rest")]
pub use cmis_rest::{AuthState, GdriveSession, OAuth2Handler, SharePointSession, TokenSet};
#[cfg(feature = "ws")]
pub use cmis_ws::WsSession;
