//! Mesh policy steps. Every policy is applied to traffic addressed to the
//! connector's destination service.

use std::time::Duration;

use tracing::{debug, info};

use resiliencebench_cluster_backend::MeshPolicyBackend;
use resiliencebench_resources::{
    Connector, ConnectorFault, ExecutionQueue, MeshPolicy, Resource, Scenario,
};

use super::{ExecutorStep, StepError};
use crate::backend::OperatorBackend;

fn mesh_policies<'a, T: 'a>(
    scenario: &'a Scenario,
    select: impl Fn(&'a MeshPolicy) -> Option<T> + 'a,
) -> impl Iterator<Item = (&'a Connector, T)> + 'a {
    scenario.spec.connectors.iter().filter_map(move |connector| {
        let policy = select(connector.mesh.as_ref()?)?;
        Some((connector, policy))
    })
}

pub struct MeshRetryStep<B> {
    backend: B,
}

impl<B> MeshRetryStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for MeshRetryStep<B> {
    fn name(&self) -> &'static str {
        "mesh-retry"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        mesh_policies(scenario, |mesh| mesh.retry.as_ref())
            .next()
            .is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        for (connector, policy) in mesh_policies(scenario, |mesh| mesh.retry.as_ref()) {
            let service = &connector.destination.name;
            self.backend
                .apply_retry(scenario.namespace(), service, policy)
                .await?;
            debug!(connector = %connector.name, service, attempts = policy.attempts, "retry policy applied");
        }
        Ok(())
    }
}

pub struct MeshCircuitBreakerStep<B> {
    backend: B,
}

impl<B> MeshCircuitBreakerStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for MeshCircuitBreakerStep<B> {
    fn name(&self) -> &'static str {
        "mesh-circuit-breaker"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        mesh_policies(scenario, |mesh| mesh.circuit_breaker.as_ref())
            .next()
            .is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        for (connector, policy) in mesh_policies(scenario, |mesh| mesh.circuit_breaker.as_ref()) {
            let service = &connector.destination.name;
            self.backend
                .apply_circuit_breaker(scenario.namespace(), service, policy)
                .await?;
            debug!(connector = %connector.name, service, "circuit breaker applied");
        }
        Ok(())
    }
}

pub struct MeshTimeoutStep<B> {
    backend: B,
}

impl<B> MeshTimeoutStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for MeshTimeoutStep<B> {
    fn name(&self) -> &'static str {
        "mesh-timeout"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        mesh_policies(scenario, |mesh| mesh.timeout_ms)
            .next()
            .is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        for (connector, timeout_ms) in mesh_policies(scenario, |mesh| mesh.timeout_ms) {
            let service = &connector.destination.name;
            self.backend
                .apply_timeout(
                    scenario.namespace(),
                    service,
                    Duration::from_millis(timeout_ms),
                )
                .await?;
            debug!(connector = %connector.name, service, timeout_ms, "timeout applied");
        }
        Ok(())
    }
}

/// Connector faults with neither a delay nor an abort are ignored.
pub struct MeshFaultStep<B> {
    backend: B,
}

impl<B> MeshFaultStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for MeshFaultStep<B> {
    fn name(&self) -> &'static str {
        "mesh-fault"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        mesh_policies(scenario, |mesh| {
            mesh.fault.as_ref().filter(|fault| fault.is_effective())
        })
        .next()
        .is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        let faults = mesh_policies(scenario, |mesh| {
            mesh.fault.as_ref().filter(|fault| fault.is_effective())
        });
        for (connector, fault) in faults {
            let service = &connector.destination.name;
            self.backend
                .apply_fault(scenario.namespace(), service, fault)
                .await?;
            debug!(
                connector = %connector.name,
                service,
                percentage = fault.percentage,
                "fault applied"
            );
        }
        Ok(())
    }
}

/// HTTP status returned by requests aborted by a scenario-level fault.
pub const SCENARIO_FAULT_ABORT_STATUS: u16 = 503;

/// Aborts the scenario's fault percentage of requests on every service the
/// scenario's fault names.
pub struct ScenarioFaultStep<B> {
    backend: B,
}

impl<B> ScenarioFaultStep<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl<B: OperatorBackend> ExecutorStep for ScenarioFaultStep<B> {
    fn name(&self) -> &'static str {
        "scenario-fault"
    }

    fn is_applicable(&self, scenario: &Scenario) -> bool {
        scenario.spec.fault.is_some()
    }

    async fn apply(&self, scenario: &Scenario, _queue: &ExecutionQueue) -> Result<(), StepError> {
        let Some(fault) = &scenario.spec.fault else {
            return Ok(());
        };
        let abort = ConnectorFault {
            percentage: fault.percentage,
            delay_ms: None,
            abort_http_status: Some(SCENARIO_FAULT_ABORT_STATUS),
        };
        for service in &fault.services {
            self.backend
                .apply_fault(scenario.namespace(), service, &abort)
                .await?;
            info!(
                scenario = %scenario.name(),
                service,
                provider = %fault.provider,
                percentage = fault.percentage,
                "scenario fault applied"
            );
        }
        Ok(())
    }
}
