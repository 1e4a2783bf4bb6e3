use resiliencebench_backends_core::BackendResult;
use resiliencebench_result_store::FileStore;

#[async_trait::async_trait]
impl FileStore for crate::MemoryBackend {
    async fn write(
        &self,
        path: &str,
        content: &str,
        _content_type: Option<&str>,
    ) -> BackendResult<()> {
        self.insert_file(path, content);
        Ok(())
    }

    async fn read_to_string(&self, path: &str) -> BackendResult<Option<String>> {
        Ok(self.files.lock().expect("files poisoned").get(path).cloned())
    }
}
