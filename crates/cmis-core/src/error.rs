//! Error types for cmis-core

use std::fmt;

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// CMIS error types, as named by the CMIS exception list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    ObjectNotFound,
    NotSupported,
    PermissionDenied,
    Runtime,
    Constraint,
    ContentAlreadyExists,
    FilterNotValid,
    NameConstraintViolation,
    Storage,
    StreamNotSupported,
    UpdateConflict,
    Versioning,
}

impl ErrorKind {
    /// The CMIS error-type string (e.g. `permissionDenied`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalidArgument",
            ErrorKind::ObjectNotFound => "objectNotFound",
            ErrorKind::NotSupported => "notSupported",
            ErrorKind::PermissionDenied => "permissionDenied",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Constraint => "constraint",
            ErrorKind::ContentAlreadyExists => "contentAlreadyExists",
            ErrorKind::FilterNotValid => "filterNotValid",
            ErrorKind::NameConstraintViolation => "nameConstraintViolation",
            ErrorKind::Storage => "storage",
            ErrorKind::StreamNotSupported => "streamNotSupported",
            ErrorKind::UpdateConflict => "updateConflict",
            ErrorKind::Versioning => "versioning",
        }
    }

    /// Parse a CMIS error-type string. Matching ignores ASCII case since
    /// SOAP servers disagree on `permissionDenied` vs `PermissionDenied`.
    pub fn parse(s: &str) -> Option<Self> {
        const ALL: [ErrorKind; 13] = [
            ErrorKind::InvalidArgument,
            ErrorKind::ObjectNotFound,
            ErrorKind::NotSupported,
            ErrorKind::PermissionDenied,
            ErrorKind::Runtime,
            ErrorKind::Constraint,
            ErrorKind::ContentAlreadyExists,
            ErrorKind::FilterNotValid,
            ErrorKind::NameConstraintViolation,
            ErrorKind::Storage,
            ErrorKind::StreamNotSupported,
            ErrorKind::UpdateConflict,
            ErrorKind::Versioning,
        ];
        let s = s.trim();
        ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(s))
    }

    /// Map an HTTP status code onto the CMIS error taxonomy
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::InvalidArgument,
            401 | 403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::ObjectNotFound,
            405 => ErrorKind::NotSupported,
            409 => ErrorKind::Constraint,
            _ => ErrorKind::Runtime,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SOAP fault returned by a Web-Services endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    /// `faultcode` element, e.g. `soap-env:Server`
    pub code: String,
    /// `faultstring` element
    pub message: String,
    /// CMIS error type from the `cmisFault` detail, if any
    pub cmis_type: Option<ErrorKind>,
    /// Numeric code from the `cmisFault` detail, if any
    pub cmis_code: Option<i64>,
    /// Message from the `cmisFault` detail
    pub detail: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(kind) = self.cmis_type {
            write!(f, " ({kind})")?;
        }
        Ok(())
    }
}

/// Errors that can occur while talking to a CMIS repository
#[derive(Debug, Error)]
pub enum Error {
    /// A CMIS-level error with its error type
    #[error("{kind}: {message}")]
    Cmis { kind: ErrorKind, message: String },

    /// SOAP fault from a Web-Services endpoint
    #[error("SOAP fault {0}")]
    SoapFault(SoapFault),

    /// Non-success HTTP status without a more specific mapping
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection-level failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OAuth2 token acquisition failed
    #[error("OAuth2 error: {0}")]
    OAuth2(String),

    /// A response could not be understood
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Create a CMIS error of the given kind
    pub fn cmis<S: Into<String>>(kind: ErrorKind, msg: S) -> Self {
        Error::Cmis {
            kind,
            message: msg.into(),
        }
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::PermissionDenied, msg)
    }

    pub fn constraint<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::Constraint, msg)
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::ObjectNotFound, msg)
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::InvalidArgument, msg)
    }

    pub fn not_supported<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::NotSupported, msg)
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        Self::cmis(ErrorKind::Runtime, msg)
    }

    /// Build the error for a failed HTTP exchange.
    ///
    /// Statuses with a CMIS meaning become [`Error::Cmis`]; anything else
    /// stays an [`Error::Http`].
    pub fn from_http_status<S: Into<String>>(status: u16, msg: S) -> Self {
        match status {
            400 | 401 | 403 | 404 | 405 | 409 => Self::cmis(ErrorKind::from_http_status(status), msg),
            _ => Error::Http {
                status,
                message: msg.into(),
            },
        }
    }

    /// The CMIS error type this error maps to, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Cmis { kind, .. } => Some(*kind),
            Error::SoapFault(fault) => fault.cmis_type,
            Error::Http { status, .. } => Some(ErrorKind::from_http_status(*status)),
            Error::OAuth2(_) => Some(ErrorKind::PermissionDenied),
            Error::Transport(_) | Error::Io(_) | Error::Xml(_) | Error::Json(_) | Error::Parse(_) => None,
        }
    }

    /// The CMIS error-type string, `runtime` for errors outside the taxonomy
    pub fn type_str(&self) -> &'static str {
        self.kind().unwrap_or(ErrorKind::Runtime).as_str()
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind() == Some(ErrorKind::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_parse_back() {
        for kind in [
            ErrorKind::PermissionDenied,
            ErrorKind::Constraint,
            ErrorKind::ObjectNotFound,
            ErrorKind::UpdateConflict,
        ] {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(
            ErrorKind::parse("PermissionDenied"),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(ErrorKind::parse("nope"), None);
    }

    #[test]
    fn test_http_status_mapping() {
        assert!(Error::from_http_status(401, "auth").is_permission_denied());
        assert!(Error::from_http_status(403, "auth").is_permission_denied());
        assert_eq!(
            Error::from_http_status(404, "gone").kind(),
            Some(ErrorKind::ObjectNotFound)
        );
        let err = Error::from_http_status(502, "bad gateway");
        assert!(matches!(err, Error::Http { status: 502, .. }));
        assert_eq!(err.type_str(), "runtime");
    }

    #[test]
    fn test_soap_fault_kind() {
        let err = Error::SoapFault(SoapFault {
            code: "soap-env:Server".into(),
            message: "denied".into(),
            cmis_type: Some(ErrorKind::PermissionDenied),
            cmis_code: Some(0),
            detail: String::new(),
        });
        assert!(err.is_permission_denied());
        assert_eq!(err.to_string(), "SOAP fault soap-env:Server: denied (permissionDenied)");
    }
}
