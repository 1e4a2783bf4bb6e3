//! JSON manifests seeded into the in-memory backend at startup.
//!
//! Each `*.json` file in the manifest directory holds one document or an
//! array of documents, each tagged with a `kind`:
//!
//! ```json
//! {"kind": "Workload", "metadata": {"namespace": "default", "name": "w1"}, "spec": {...}}
//! ```
//!
//! Files are applied in file-name order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use resiliencebench_backend_memory::MemoryBackend;
use resiliencebench_cluster_backend::Deployment;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    Benchmark, ExecutionQueue, ResilientService, Resource, Workload,
};

/// Load every manifest in `dir`. Returns the number of documents applied.
pub async fn load_manifests(backend: &MemoryBackend, dir: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read manifest directory {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut applied = 0;
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        let documents = match value {
            Value::Array(documents) => documents,
            document => vec![document],
        };
        for document in documents {
            apply_manifest(backend, document)
                .await
                .with_context(|| format!("failed to apply manifest from {}", path.display()))?;
            applied += 1;
        }
    }
    info!(dir = %dir.display(), applied, "manifests loaded");
    Ok(applied)
}

/// Create the object described by one tagged document.
pub async fn apply_manifest(backend: &MemoryBackend, document: Value) -> Result<()> {
    let Some(kind) = document.get("kind").and_then(Value::as_str) else {
        bail!("manifest has no kind");
    };
    match kind {
        "Benchmark" => create::<Benchmark>(backend, document).await,
        "Workload" => create::<Workload>(backend, document).await,
        "ResilientService" => create::<ResilientService>(backend, document).await,
        "ExecutionQueue" => create::<ExecutionQueue>(backend, document).await,
        "Deployment" => {
            let deployment: Deployment =
                serde_json::from_value(document).context("invalid Deployment")?;
            info!(namespace = %deployment.namespace, name = %deployment.name, "deployment seeded");
            backend.insert_deployment(deployment);
            Ok(())
        }
        other => bail!("unsupported manifest kind {other}"),
    }
}

async fn create<T>(backend: &MemoryBackend, document: Value) -> Result<()>
where
    T: Resource + DeserializeOwned,
    MemoryBackend: ResourceBackend<T>,
{
    let resource: T =
        serde_json::from_value(document).with_context(|| format!("invalid {}", T::KIND))?;
    let created = backend.create(&resource).await?;
    info!(kind = T::KIND, object = %created.object_ref(), "manifest applied");
    Ok(())
}
