//! # cmis-atompub
//!
//! AtomPub binding for the CMIS client.
//!
//! A session is opened from the repository's service document. Objects
//! travel as Atom entries holding a `cmisra:object`; folder children and type
//! lists as Atom feeds, which are followed page by page.

pub mod entry;
pub mod service;
pub mod session;

pub use entry::{Entry, EntryLinks, Feed, Link};
pub use service::{ServiceDocument, Workspace};
pub use session::AtomPubSession;
