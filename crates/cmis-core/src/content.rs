//! Document content

/// Bytes of a document with their media type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentStream {
    pub mime_type: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl ContentStream {
    pub fn new<S: Into<String>>(mime_type: S, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: None,
            data,
        }
    }

    #[must_use]
    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Media type, falling back to `application/octet-stream`
    pub fn mime_type(&self) -> &str {
        if self.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.mime_type
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
