use serde_json::Value;

use resiliencebench_resources::{
    Benchmark, Connector, ObjectMeta, Scenario, ScenarioFault, ScenarioSpec, ScenarioTemplate,
    ScenarioWorkload, ServiceEndpoint, Workload, labels,
};

/// Lowercase `raw` and fold every run of characters outside `[a-z0-9]`
/// into a single `-`.
pub fn dns_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
        } else if !name.is_empty() && !name.ends_with('-') {
            name.push('-');
        }
    }
    while name.ends_with('-') {
        name.pop();
    }
    name
}

/// Expands benchmark templates into concrete scenarios.
///
/// Every template yields one scenario per combination of workload user
/// count, fault percentage (a single pass when the template declares no
/// fault) and connector environment variant, where an array-valued override
/// contributes one variant per element. Output order is deterministic.
pub struct ScenarioFactory;

impl ScenarioFactory {
    pub fn create(benchmark: &Benchmark, workload: &Workload) -> Vec<Scenario> {
        let mut scenarios = Vec::new();
        for template in &benchmark.spec.scenarios {
            let variants = connector_variants(&template.connectors);
            for &users in &workload.spec.users {
                for fault in fault_passes(template) {
                    for (index, connectors) in variants.iter().enumerate() {
                        let variant = (variants.len() > 1).then_some(index + 1);
                        scenarios.push(build(
                            benchmark,
                            workload,
                            template,
                            users,
                            fault.clone(),
                            connectors.clone(),
                            variant,
                        ));
                    }
                }
            }
        }
        scenarios
    }
}

fn build(
    benchmark: &Benchmark,
    workload: &Workload,
    template: &ScenarioTemplate,
    users: u32,
    fault: Option<ScenarioFault>,
    connectors: Vec<Connector>,
    variant: Option<usize>,
) -> Scenario {
    let mut raw = format!("{}-{}-{users}u", benchmark.metadata.name, template.name);
    if let Some(fault) = &fault {
        raw.push_str(&format!("-f{}", fault.percentage));
    }
    if let Some(variant) = variant {
        raw.push_str(&format!("-v{variant}"));
    }

    let benchmark_name = benchmark.metadata.name.as_str();
    let metadata = ObjectMeta::new(&benchmark.metadata.namespace, dns_name(&raw))
        .with_label(labels::BENCHMARK, benchmark_name)
        .with_label(labels::CREATED_BY, labels::CREATED_BY_VALUE)
        .with_annotation(labels::OWNED_BY, benchmark_name)
        .with_annotation(labels::QUEUE, benchmark.queue_name());

    Scenario::new(
        metadata,
        ScenarioSpec {
            scenario: template.name.clone(),
            workload: ScenarioWorkload {
                workload_name: workload.metadata.name.clone(),
                users,
            },
            connectors,
            fault,
        },
    )
}

fn fault_passes(template: &ScenarioTemplate) -> Vec<Option<ScenarioFault>> {
    match &template.fault {
        None => vec![None],
        Some(fault) => fault
            .percentage
            .iter()
            .map(|&percentage| {
                Some(ScenarioFault {
                    provider: fault.provider.clone(),
                    percentage,
                    services: fault.services.clone(),
                })
            })
            .collect(),
    }
}

fn endpoint_mut(connector: &mut Connector, destination: bool) -> &mut ServiceEndpoint {
    if destination {
        &mut connector.destination
    } else {
        &mut connector.source
    }
}

/// Cartesian product over every array-valued endpoint override.
fn connector_variants(connectors: &[Connector]) -> Vec<Vec<Connector>> {
    let mut variants = vec![connectors.to_vec()];
    for (index, connector) in connectors.iter().enumerate() {
        for (destination, endpoint) in [(false, &connector.source), (true, &connector.destination)]
        {
            for (key, value) in &endpoint.envs {
                let Value::Array(choices) = value else {
                    continue;
                };
                let mut expanded = Vec::with_capacity(variants.len() * choices.len());
                for variant in &variants {
                    for choice in choices {
                        let mut next = variant.clone();
                        endpoint_mut(&mut next[index], destination)
                            .envs
                            .insert(key.clone(), choice.clone());
                        expanded.push(next);
                    }
                }
                variants = expanded;
            }
        }
    }
    variants
}
