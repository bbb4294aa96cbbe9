//! Prelude module - common imports for CMIS client users
//!
//! ```rust
//! use cmis::prelude::*;
//! ```

// Sessions
pub use crate::{
    NavigationService, ObjectService, RepositoryService, Session, SessionFactory,
    SessionParameters, TypeResolver,
};

// Objects, types and properties
pub use crate::{
    ContentStream, Document, Folder, Object, ObjectType, Property, PropertyKind, PropertyMap,
    Repository,
};

// Errors
pub use crate::{Error, ErrorKind, Result};
