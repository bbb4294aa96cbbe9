//! # cmis-ws
//!
//! Web-Services (SOAP 1.1) binding for the CMIS client.
//!
//! - [`ServiceMap`] - service endpoints read from the repository WSDL
//! - [`WsSession`] - a [`cmis_core::Session`] issuing one SOAP call per operation
//!
//! Requests carry a WS-Security `UsernameToken` when credentials are set.
//! Content streams travel as MTOM/XOP attachments; faults surface as
//! [`cmis_core::Error::SoapFault`].

pub mod envelope;
pub mod session;
pub mod wsdl;

// Re-exports for convenience
pub use envelope::{SoapRequest, SoapResponse, UsernameToken};
pub use session::WsSession;
pub use wsdl::{services, ServiceMap};
