use std::collections::BTreeMap;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use resiliencebench_backends_core::{BackendError, BackendResult};
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{ObjectMeta, ObjectRef, Resource};

use crate::ObjectKey;

fn object_key<T: Resource>(namespace: &str, name: &str) -> ObjectKey {
    (T::KIND, namespace.to_string(), name.to_string())
}

fn decode<T: Resource>(value: Value) -> BackendResult<T> {
    Ok(serde_json::from_value(value)?)
}

fn stored_meta(value: &Value) -> BackendResult<ObjectMeta> {
    Ok(serde_json::from_value(
        value.get("metadata").cloned().unwrap_or(Value::Null),
    )?)
}

fn set_field(document: &mut Value, field: &str, value: Option<Value>) {
    if let Value::Object(map) = document {
        match value {
            Some(value) if !value.is_null() => {
                map.insert(field.to_string(), value);
            }
            _ => {
                map.remove(field);
            }
        }
    }
}

#[async_trait::async_trait]
impl<T: Resource> ResourceBackend<T> for crate::MemoryBackend {
    async fn find(&self, namespace: &str, name: &str) -> BackendResult<Option<T>> {
        let value = self
            .objects
            .lock()
            .expect("objects poisoned")
            .get(&object_key::<T>(namespace, name))
            .cloned();
        value.map(decode).transpose()
    }

    async fn create(&self, resource: &T) -> BackendResult<T> {
        let mut created = resource.clone();
        let key = object_key::<T>(resource.namespace(), resource.name());
        {
            let mut guard = self.objects.lock().expect("objects poisoned");
            if guard.contains_key(&key) {
                return Err(BackendError::AlreadyExists {
                    kind: T::KIND,
                    namespace: key.1,
                    name: key.2,
                });
            }
            let meta = created.meta_mut();
            meta.generation = 1;
            meta.resource_version = self.next_resource_version();
            meta.creation_timestamp.get_or_insert_with(Utc::now);
            guard.insert(key, serde_json::to_value(&created)?);
        }
        self.publish(T::KIND, created.object_ref());
        Ok(created)
    }

    async fn update(&self, resource: &T) -> BackendResult<T> {
        let (namespace, name) = (resource.namespace(), resource.name());
        let key = object_key::<T>(namespace, name);
        let (updated, spec_changed) = {
            let mut guard = self.objects.lock().expect("objects poisoned");
            let current = guard
                .get(&key)
                .ok_or_else(|| BackendError::not_found(T::KIND, namespace, name))?;
            let current_meta = stored_meta(current)?;
            if current_meta.resource_version != resource.meta().resource_version {
                return Err(BackendError::conflict(T::KIND, namespace, name));
            }

            let mut next = serde_json::to_value(resource)?;
            let spec_changed = next.get("spec") != current.get("spec");
            set_field(&mut next, "status", current.get("status").cloned());

            let mut meta = resource.meta().clone();
            meta.generation = current_meta.generation + i64::from(spec_changed);
            meta.resource_version = self.next_resource_version();
            meta.creation_timestamp = current_meta.creation_timestamp;
            set_field(&mut next, "metadata", Some(serde_json::to_value(&meta)?));

            guard.insert(key, next.clone());
            (next, spec_changed)
        };
        if spec_changed {
            self.publish(T::KIND, ObjectRef::new(namespace, name));
        }
        decode(updated)
    }

    async fn update_status(&self, resource: &T) -> BackendResult<T> {
        let (namespace, name) = (resource.namespace(), resource.name());
        let key = object_key::<T>(namespace, name);
        let updated = {
            let mut guard = self.objects.lock().expect("objects poisoned");
            let current = guard
                .get(&key)
                .ok_or_else(|| BackendError::not_found(T::KIND, namespace, name))?;
            let mut meta = stored_meta(current)?;
            if meta.resource_version != resource.meta().resource_version {
                return Err(BackendError::conflict(T::KIND, namespace, name));
            }

            let incoming = serde_json::to_value(resource)?;
            let mut next = current.clone();
            set_field(&mut next, "status", incoming.get("status").cloned());
            meta.resource_version = self.next_resource_version();
            set_field(&mut next, "metadata", Some(serde_json::to_value(&meta)?));

            guard.insert(key, next.clone());
            next
        };
        decode(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> BackendResult<bool> {
        let removed = self
            .objects
            .lock()
            .expect("objects poisoned")
            .remove(&object_key::<T>(namespace, name))
            .is_some();
        if removed {
            self.publish(T::KIND, ObjectRef::new(namespace, name));
        }
        Ok(removed)
    }

    async fn delete_all(&self, namespace: &str) -> BackendResult<usize> {
        ResourceBackend::<T>::delete_matching(self, namespace, &BTreeMap::new()).await
    }

    async fn delete_matching(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> BackendResult<usize> {
        let removed = {
            let mut guard = self.objects.lock().expect("objects poisoned");
            let mut doomed = Vec::new();
            for (key, value) in guard.iter() {
                if key.0 != T::KIND || key.1 != namespace {
                    continue;
                }
                if stored_meta(value)?.matches_labels(labels) {
                    doomed.push(key.clone());
                }
            }
            for key in &doomed {
                guard.remove(key);
            }
            doomed
        };
        for (_, namespace, name) in &removed {
            self.publish(T::KIND, ObjectRef::new(namespace, name));
        }
        Ok(removed.len())
    }

    async fn list(&self, namespace: Option<&str>) -> BackendResult<Vec<T>> {
        let values: Vec<Value> = self
            .objects
            .lock()
            .expect("objects poisoned")
            .iter()
            .filter(|(key, _)| key.0 == T::KIND && namespace.is_none_or(|ns| key.1 == ns))
            .map(|(_, value)| value.clone())
            .collect();
        values.into_iter().map(decode).collect()
    }

    fn watch(&self) -> BoxStream<'static, ObjectRef> {
        BroadcastStream::new(self.changes.subscribe())
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.kind == T::KIND => Some(event.object),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(kind = T::KIND, error = %err, "resource watch lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}
