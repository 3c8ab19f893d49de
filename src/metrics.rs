//! Metrics sink
//!
//! Owned, explicitly-passed metrics state rendered in Prometheus exposition
//! format. TTL and deployment gauges are replaced wholesale once per scan
//! cycle so they always describe exactly the items seen in the latest pass;
//! deleted/error counters accumulate for the lifetime of the process.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

/// One TTL gauge sample for a resource group or generic resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTtlSample {
    pub resource_id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub resource_type: String,
    pub expiry: DateTime<Utc>,
    /// Values for the configured pass-through tag labels, positionally
    /// aligned with the sink's tag label schema.
    pub tag_values: Vec<String>,
}

/// One TTL gauge sample for a role assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignmentTtlSample {
    pub role_assignment_id: String,
    pub scope: String,
    pub principal_id: String,
    pub principal_type: String,
    pub role_definition_id: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub expiry: DateTime<Utc>,
}

/// Surviving-deployment count for one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentCountSample {
    pub subscription_id: String,
    /// Empty for subscription-scope deployments.
    pub resource_group: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CounterKey {
    subscription_id: String,
    resource_type: String,
}

#[derive(Debug, Default)]
struct GaugeState {
    cycle_duration_seconds: Option<f64>,
    resource_ttl: Vec<ResourceTtlSample>,
    role_assignment_ttl: Vec<RoleAssignmentTtlSample>,
    deployments: Vec<DeploymentCountSample>,
}

/// All exported metrics state. Counters are incremented concurrently by the
/// category runners; gauges are only written from the scheduler's publishing
/// phase.
pub struct MetricsSink {
    tag_labels: Vec<String>,
    deleted: Mutex<BTreeMap<CounterKey, u64>>,
    errors: Mutex<BTreeMap<CounterKey, u64>>,
    gauges: RwLock<GaugeState>,
}

impl MetricsSink {
    /// Create a sink whose resource TTL gauge carries one pass-through label
    /// per configured resource tag name.
    pub fn new(resource_tags: &[String]) -> Self {
        Self {
            tag_labels: resource_tags.iter().map(|name| tag_label(name)).collect(),
            deleted: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(BTreeMap::new()),
            gauges: RwLock::new(GaugeState::default()),
        }
    }

    pub fn inc_deleted(&self, subscription_id: &str, resource_type: &str) {
        let mut deleted = self.deleted.lock().expect("metrics lock");
        *deleted
            .entry(CounterKey {
                subscription_id: subscription_id.to_lowercase(),
                resource_type: resource_type.to_lowercase(),
            })
            .or_insert(0) += 1;
    }

    pub fn inc_error(&self, subscription_id: &str, resource_type: &str) {
        let mut errors = self.errors.lock().expect("metrics lock");
        *errors
            .entry(CounterKey {
                subscription_id: subscription_id.to_lowercase(),
                resource_type: resource_type.to_lowercase(),
            })
            .or_insert(0) += 1;
    }

    /// Replace the TTL and deployment gauges with this cycle's samples.
    /// Labels not present in the new samples disappear.
    pub fn publish_cycle(
        &self,
        resource_ttl: Vec<ResourceTtlSample>,
        role_assignment_ttl: Vec<RoleAssignmentTtlSample>,
        deployments: Vec<DeploymentCountSample>,
    ) {
        let mut gauges = self.gauges.write().expect("metrics lock");
        gauges.resource_ttl = resource_ttl;
        gauges.role_assignment_ttl = role_assignment_ttl;
        gauges.deployments = deployments;
    }

    pub fn set_cycle_duration(&self, seconds: f64) {
        let mut gauges = self.gauges.write().expect("metrics lock");
        gauges.cycle_duration_seconds = Some(seconds);
    }

    /// Render everything in Prometheus text exposition format. Families with
    /// no samples are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();

        {
            let gauges = self.gauges.read().expect("metrics lock");

            if let Some(duration) = gauges.cycle_duration_seconds {
                out.push_str("# HELP azurejanitor_duration AzureJanitor cleanup duration\n");
                out.push_str("# TYPE azurejanitor_duration gauge\n");
                out.push_str(&format!("azurejanitor_duration {duration}\n"));
            }

            if !gauges.deployments.is_empty() {
                out.push_str(
                    "# HELP azurejanitor_deployment AzureJanitor count of deployments on scope\n",
                );
                out.push_str("# TYPE azurejanitor_deployment gauge\n");
                for sample in &gauges.deployments {
                    let labels = render_labels(&[
                        ("subscriptionID", &sample.subscription_id),
                        ("resourceGroup", &sample.resource_group),
                    ]);
                    out.push_str(&format!("azurejanitor_deployment{{{labels}}} {}\n", sample.count));
                }
            }

            if !gauges.resource_ttl.is_empty() {
                out.push_str(
                    "# HELP azurejanitor_resource_ttl AzureJanitor resources with expiry time\n",
                );
                out.push_str("# TYPE azurejanitor_resource_ttl gauge\n");
                for sample in &gauges.resource_ttl {
                    let mut labels: Vec<(&str, &str)> = vec![
                        ("resourceID", &sample.resource_id),
                        ("subscriptionID", &sample.subscription_id),
                        ("resourceGroup", &sample.resource_group),
                        ("resourceType", &sample.resource_type),
                    ];
                    for (name, value) in self.tag_labels.iter().zip(&sample.tag_values) {
                        labels.push((name, value));
                    }
                    out.push_str(&format!(
                        "azurejanitor_resource_ttl{{{}}} {}\n",
                        render_labels(&labels),
                        sample.expiry.timestamp()
                    ));
                }
            }

            if !gauges.role_assignment_ttl.is_empty() {
                out.push_str(
                    "# HELP azurejanitor_roleassignment_ttl AzureJanitor roleassignments with expiry time\n",
                );
                out.push_str("# TYPE azurejanitor_roleassignment_ttl gauge\n");
                for sample in &gauges.role_assignment_ttl {
                    let labels = render_labels(&[
                        ("roleAssignmentId", &sample.role_assignment_id),
                        ("scope", &sample.scope),
                        ("principalId", &sample.principal_id),
                        ("principalType", &sample.principal_type),
                        ("roleDefinitionId", &sample.role_definition_id),
                        ("subscriptionID", &sample.subscription_id),
                        ("resourceGroup", &sample.resource_group),
                    ]);
                    out.push_str(&format!(
                        "azurejanitor_roleassignment_ttl{{{labels}}} {}\n",
                        sample.expiry.timestamp()
                    ));
                }
            }
        }

        render_counter_family(
            &mut out,
            "azurejanitor_resource_deleted_count",
            "AzureJanitor deleted resources",
            &self.deleted.lock().expect("metrics lock"),
        );
        render_counter_family(
            &mut out,
            "azurejanitor_error_count",
            "AzureJanitor error counter",
            &self.errors.lock().expect("metrics lock"),
        );

        out
    }
}

fn render_counter_family(
    out: &mut String,
    name: &str,
    help: &str,
    counters: &BTreeMap<CounterKey, u64>,
) {
    if counters.is_empty() {
        return;
    }
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    for (key, count) in counters {
        let labels = render_labels(&[
            ("subscriptionID", &key.subscription_id),
            ("resourceType", &key.resource_type),
        ]);
        out.push_str(&format!("{name}{{{labels}}} {count}\n"));
    }
}

fn render_labels(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Prometheus label name for a pass-through resource tag.
fn tag_label(tag_name: &str) -> String {
    let sanitized: String = tag_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("tag_{sanitized}")
}
