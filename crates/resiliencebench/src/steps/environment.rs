use serde_json::Value;
use tracing::{info, warn};

use resiliencebench_backends_core::BackendError;
use resiliencebench_cluster_backend::DeploymentBackend;
use resiliencebench_resource_backend::ResourceBackend;
use resiliencebench_resources::{
    EnvVar, ExecutionQueue, ResilientService, Resource, Scenario, ServiceEndpoint,
};

use super::{ExecutorStep, StepError};
use crate::backend::OperatorBackend;
use crate::retry::{RetryConfig, with_retry};

/// Overrides container environment variables of the deployments behind
/// connector endpoints. Only variables the container already defines are
/// overridden.
pub struct EnvironmentStep<B> {
    backend: B,
    retry: RetryConfig,
}

impl<B> EnvironmentStep<B> {
    pub fn new(backend: B, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn endpoints(scenario: &Scenario) -> impl Iterator<Item = &ServiceEndpoint> {
    scenario
        .spec
        .connectors
        .iter()
        .flat_map(|connector| [&connector.source, &connector.destination])
        .filter(|endpoint| !endpoint.envs.is_empty())
}

impl<B: OperatorBackend> EnvironmentStep<B> {
    async fn apply_endpoint(
        &self,
        namespace: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<(), StepError> {
        let service =
            match ResourceBackend::<ResilientService>::get(&self.backend, namespace, &endpoint.name)
                .await
            {
                Ok(service) => service,
                Err(err) if err.is_not_found() => {
                    return Err(StepError::Failed {
                        step: "environment",
                        message: format!("resilient service {namespace}/{} not found", endpoint.name),
                    });
                }
                Err(err) => return Err(err.into()),
            };

        let Some(mut deployment) = self
            .backend
            .find_deployment(namespace, &service.spec.selector)
            .await?
        else {
            warn!(service = %endpoint.name, "no deployment matches service selector");
            return Ok(());
        };
        let container_name = service.spec.app_container_name.as_str();
        let Some(container) = deployment.container_mut(container_name) else {
            warn!(
                service = %endpoint.name,
                deployment = %deployment.name,
                container = container_name,
                "app container not found in deployment"
            );
            return Ok(());
        };

        self.save_environment(&service, container.env.clone()).await?;

        let mut overridden = 0;
        for var in container.env.iter_mut() {
            if let Some(value) = endpoint.envs.get(&var.name) {
                var.value = Some(env_value(value));
                overridden += 1;
            }
        }
        self.backend.update_deployment(&deployment).await?;
        info!(
            service = %endpoint.name,
            deployment = %deployment.name,
            overridden,
            "deployment environment updated"
        );
        Ok(())
    }

    /// Persist the environment as it was before this step touched it.
    async fn save_environment(
        &self,
        service: &ResilientService,
        envs: Vec<EnvVar>,
    ) -> Result<(), BackendError> {
        let backend = &self.backend;
        let key = service.object_ref();
        let key = &key;
        let envs = &envs;
        with_retry(self.retry, "save service environment", || async move {
            let mut latest =
                ResourceBackend::<ResilientService>::get(backend, &key.namespace, &key.name).await?;
            if latest.spec.envs == *envs {
                return Ok(());
            }
            latest.spec.envs = envs.clone();
            ResourceBackend::<ResilientService>::update(backend, &latest)
                .await
                .map(|_| ())
        })
        .await
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for EnvironmentStep<B> {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        endpoints(scenario).next().is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        for endpoint in endpoints(scenario) {
            self.apply_endpoint(scenario.namespace(), endpoint).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use resiliencebench_backend_memory::MemoryBackend;
    use resiliencebench_cluster_backend::{Container, Deployment};
    use resiliencebench_resources::{
        Connector, ExecutionQueueSpec, ObjectMeta, ResilientServiceSpec, ScenarioSpec,
        ScenarioWorkload,
    };

    use super::*;

    fn scenario(source: ServiceEndpoint) -> Scenario {
        Scenario::new(
            ObjectMeta::new("default", "s1"),
            ScenarioSpec {
                scenario: "env".to_string(),
                workload: ScenarioWorkload {
                    workload_name: "w1".to_string(),
                    users: 5,
                },
                connectors: vec![Connector {
                    name: "api-to-db".to_string(),
                    source,
                    destination: ServiceEndpoint::new("db"),
                    mesh: None,
                }],
                fault: None,
            },
        )
    }

    fn queue() -> ExecutionQueue {
        ExecutionQueue::new(
            ObjectMeta::new("default", "q1"),
            ExecutionQueueSpec {
                result_file: "/results/q1.json".to_string(),
                items: Vec::new(),
                benchmark: "b1".to_string(),
            },
        )
    }

    fn selector() -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), "api".to_string())])
    }

    async fn seed(backend: &MemoryBackend) {
        ResourceBackend::<ResilientService>::create(
            backend,
            &ResilientService::new(
                ObjectMeta::new("default", "api"),
                ResilientServiceSpec {
                    selector: selector(),
                    envs: Vec::new(),
                    app_container_name: "app".to_string(),
                    fault_container_name: None,
                },
            ),
        )
        .await
        .expect("create service");
        backend.insert_deployment(Deployment {
            namespace: "default".to_string(),
            name: "api".to_string(),
            labels: selector(),
            containers: vec![Container {
                name: "app".to_string(),
                env: vec![EnvVar::new("MAX_RETRIES", "1"), EnvVar::new("MODE", "fast")],
            }],
        });
    }

    #[tokio::test]
    async fn overrides_matching_variables_and_saves_the_previous_environment() {
        let backend = MemoryBackend::new();
        seed(&backend).await;
        let step = EnvironmentStep::new(backend.clone(), RetryConfig::default());
        let scenario = scenario(
            ServiceEndpoint::new("api")
                .with_env("MAX_RETRIES", 5)
                .with_env("UNKNOWN", "ignored"),
        );
        assert!(step.is_applicable(&scenario));

        step.apply(&scenario, &queue()).await.expect("apply");

        let deployment = backend.deployment("default", "api").expect("deployment");
        let env = &deployment.container("app").expect("container").env;
        assert_eq!(
            env,
            &vec![EnvVar::new("MAX_RETRIES", "5"), EnvVar::new("MODE", "fast")]
        );

        let service = ResourceBackend::<ResilientService>::get(&backend, "default", "api")
            .await
            .expect("service");
        assert_eq!(
            service.spec.envs,
            vec![EnvVar::new("MAX_RETRIES", "1"), EnvVar::new("MODE", "fast")]
        );
    }

    #[tokio::test]
    async fn missing_service_fails_the_step() {
        let backend = MemoryBackend::new();
        let step = EnvironmentStep::new(backend, RetryConfig::default());
        let scenario = scenario(ServiceEndpoint::new("api").with_env("MAX_RETRIES", 5));

        let err = step.apply(&scenario, &queue()).await.expect_err("missing");
        assert!(matches!(err, StepError::Failed { step: "environment", .. }));
    }

    #[tokio::test]
    async fn missing_deployment_is_only_a_warning() {
        let backend = MemoryBackend::new();
        ResourceBackend::<ResilientService>::create(
            &backend,
            &ResilientService::new(
                ObjectMeta::new("default", "api"),
                ResilientServiceSpec {
                    selector: selector(),
                    envs: Vec::new(),
                    app_container_name: "app".to_string(),
                    fault_container_name: None,
                },
            ),
        )
        .await
        .expect("create service");
        let step = EnvironmentStep::new(backend, RetryConfig::default());
        let scenario = scenario(ServiceEndpoint::new("api").with_env("MAX_RETRIES", 5));

        step.apply(&scenario, &queue()).await.expect("tolerated");
    }

    #[test]
    fn endpoints_without_overrides_are_inapplicable() {
        let step = EnvironmentStep::new(MemoryBackend::new(), RetryConfig::default());
        assert!(!step.is_applicable(&scenario(ServiceEndpoint::new("api"))));
    }
}
