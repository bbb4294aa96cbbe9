//! # cmis-core
//!
//! Object, type and property model shared by the CMIS bindings.
//!
//! This crate provides the pieces every binding builds on:
//! - [`Property`], [`PropertyType`] and [`ObjectType`] - the typed property model
//! - [`Object`], [`Folder`], [`Document`] - repository objects with their
//!   [`AllowableActions`] and [`Rendition`]s
//! - [`Repository`] - the repository descriptor
//! - [`Session`] and its service traits - the contract each binding implements
//! - [`HttpTransport`] - the HTTP seam, with a blocking `reqwest` implementation
//! - [`xml::Element`] - the owned XML tree used by the XML bindings
//!
//! ## Example
//!
//! ```rust
//! use cmis_core::{Property, PropertyKind};
//!
//! let count = Property::with_kind(
//!     "my:count",
//!     PropertyKind::Integer,
//!     vec!["3".into(), "x".into(), "7".into()],
//! );
//! assert_eq!(count.long_values(), &[3, 7]);
//! assert_eq!(count.str_values().len(), 3);
//! ```

pub mod allowable_actions;
pub mod config;
pub mod content;
pub mod error;
pub mod multipart;
pub mod object;
pub mod object_type;
pub mod property;
pub mod property_type;
pub mod rendition;
pub mod repository;
pub mod session;
pub mod transport;
pub mod xml;

// Re-exports for convenience
pub use allowable_actions::{Action, AllowableActions};
pub use config::{OAuth2Data, SessionParameters};
pub use content::ContentStream;
pub use error::{Error, ErrorKind, Result, SoapFault};
pub use object::{creation_properties, ids, Document, Folder, Object};
pub use object_type::{ContentStreamAllowed, ObjectType};
pub use property::{Property, PropertyMap};
pub use property_type::{PropertyKind, PropertyType};
pub use rendition::Rendition;
pub use repository::{Capability, Repository};
pub use session::{
    BindingKind, NavigationService, ObjectService, RepositoryService, Session, TypeCache,
    TypeResolver,
};
pub use transport::{Credentials, HttpRequest, HttpResponse, HttpTransport, Method};
#[cfg(feature = "reqwest")]
pub use transport::{ReqwestTransport, ReqwestTransportConfig};
pub use xml::Namespaces;
