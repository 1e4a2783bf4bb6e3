//! Core primitives shared by the resiliencebench backend capabilities.

/// The common backend error.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{kind} not found: {namespace}/{name}")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} already exists: {namespace}/{name}")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// The caller wrote against a stale resource version.
    #[error("conflict updating {kind} {namespace}/{name}: stale resource version")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn conflict(kind: &'static str, namespace: &str, name: &str) -> Self {
        Self::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether retrying the same operation against fresh state may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Utility type alias for backend results.
pub type BackendResult<T> = Result<T, BackendError>;
