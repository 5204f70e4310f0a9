use serde::{Deserialize, Serialize};
use std::{fmt, future::Future};

/// Location of a MIDI resource: a filesystem path or URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

pub trait SourcePort: Send + Sync {
    /// Fetch the raw bytes behind `source`. No retries.
    fn fetch(
        &self,
        source: &SourceRef,
    ) -> impl Future<Output = Result<Vec<u8>, SourceError>> + Send;
}
