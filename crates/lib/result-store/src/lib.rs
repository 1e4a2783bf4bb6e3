//! Storage for result documents.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

pub use resiliencebench_backends_core::{BackendError, BackendResult};

/// Backend capability for reading and writing result blobs by path.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn write(&self, path: &str, content: &str, content_type: Option<&str>)
    -> BackendResult<()>;

    /// Contents of `path`, or `None` when nothing was written there.
    async fn read_to_string(&self, path: &str) -> BackendResult<Option<String>>;
}

/// File store on the local filesystem.
///
/// Absolute paths are used as-is unless a root is configured, in which case
/// every path is resolved underneath it.
#[derive(Clone, Debug, Default)]
pub struct LocalFileStore {
    root: Option<PathBuf>,
}

impl LocalFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => Path::new(path).to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn write(
        &self,
        path: &str,
        content: &str,
        content_type: Option<&str>,
    ) -> BackendResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        debug!(path = %target.display(), content_type, bytes = content.len(), "wrote result file");
        Ok(())
    }

    async fn read_to_string(&self, path: &str) -> BackendResult<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
