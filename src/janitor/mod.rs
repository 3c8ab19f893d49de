//! Janitor engine
//!
//! Drives the scan/reconcile loop: every interval, one cleanup task per
//! (subscription, enabled category) pair is spawned; each task lists its
//! category, evaluates expiry, deletes or updates resources, and sends one
//! telemetry batch back over a channel. When all tasks are done the TTL
//! gauges are rebuilt from the collected batches in a single step.
//!
//! # Module Structure
//!
//! - [`expiry`] - TTL tag parsing and expiry evaluation
//! - [`api_versions`] - per-subscription api-version catalog
//! - `resource_groups` / `resources` / `deployments` / `role_assignments` -
//!   the four category cleanup tasks

pub mod api_versions;
pub mod expiry;

mod deployments;
mod resource_groups;
mod resources;
mod role_assignments;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::azure::directory::ResourceDirectory;
use crate::azure::model::{Subscription, TagMap};
use crate::metrics::{
    DeploymentCountSample, MetricsSink, ResourceTtlSample, RoleAssignmentTtlSample,
};

pub use api_versions::ApiVersionMap;
pub use expiry::{parse_duration_value, Evaluation, ExpiryEvaluator};

/// Janitor settings, resolved from the CLI/environment configuration.
/// A category is enabled by giving it a config block.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub dry_run: bool,
    /// Pause between two scan cycles.
    pub interval: std::time::Duration,
    /// Source tag holding user-supplied TTL markers.
    pub tag: String,
    /// Target tag normalized absolute expiry values are written to.
    pub tag_target: String,
    /// Resource tag names exported as pass-through gauge labels.
    pub resource_tags: Vec<String>,
    pub resource_groups: Option<ResourceGroupsConfig>,
    pub resources: Option<ResourcesConfig>,
    pub deployments: Option<DeploymentsConfig>,
    pub role_assignments: Option<RoleAssignmentsConfig>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            interval: std::time::Duration::from_secs(60 * 60),
            tag: "ttl".to_string(),
            tag_target: "ttl_expiry".to_string(),
            resource_tags: Vec::new(),
            resource_groups: None,
            resources: None,
            deployments: None,
            role_assignments: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceGroupsConfig {
    /// Server-side `$filter` expression for the listing call.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourcesConfig {
    pub filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeploymentsConfig {
    /// Maximum age before a deployment is deleted.
    pub ttl: chrono::Duration,
    /// Maximum number of deployments kept per scope.
    pub limit: u64,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(8760),
            limit: 700,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleAssignmentsConfig {
    /// Default (and maximum) TTL counted from the assignment's creation.
    pub ttl: chrono::Duration,
    pub filter: Option<String>,
    /// Role definition IDs eligible for cleanup; matched case-insensitively,
    /// exact or suffix.
    pub role_definition_ids: Vec<String>,
    /// Pattern whose first capture group holds a TTL inside the assignment
    /// description.
    pub description_ttl: Option<Regex>,
}

impl Default for RoleAssignmentsConfig {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(6),
            filter: None,
            role_definition_ids: Vec::new(),
            description_ttl: None,
        }
    }
}

/// Telemetry produced by one cleanup task for one subscription. Batches are
/// sent whole once the task finishes, so a failed task contributes nothing.
pub(crate) enum TelemetryBatch {
    ResourceTtl(Vec<ResourceTtlSample>),
    RoleAssignmentTtl(Vec<RoleAssignmentTtlSample>),
    DeploymentCounts(Vec<DeploymentCountSample>),
}

/// Everything a cleanup task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct ScanContext {
    pub config: Arc<JanitorConfig>,
    pub directory: Arc<dyn ResourceDirectory>,
    pub api_versions: Arc<ApiVersionMap>,
    pub metrics: Arc<MetricsSink>,
    pub evaluator: ExpiryEvaluator,
}

/// One resource category's cleanup pass over a single subscription.
#[async_trait]
pub(crate) trait CleanupTask: Send + Sync {
    /// Task name for log context.
    fn name(&self) -> &'static str;
    /// Resource type used when counting listing errors.
    fn resource_type(&self) -> &'static str;
    async fn scan(&self, cx: &ScanContext, subscription: &Subscription)
        -> Result<TelemetryBatch>;
}

/// The scan scheduler: owns the configuration, the directory and the
/// metrics sink, and runs one cycle per interval forever.
pub struct Janitor {
    config: Arc<JanitorConfig>,
    directory: Arc<dyn ResourceDirectory>,
    api_versions: Arc<ApiVersionMap>,
    metrics: Arc<MetricsSink>,
    subscriptions: Vec<Subscription>,
    evaluator: ExpiryEvaluator,
    tasks: Vec<Arc<dyn CleanupTask>>,
}

impl Janitor {
    pub fn new(
        config: JanitorConfig,
        directory: Arc<dyn ResourceDirectory>,
        api_versions: ApiVersionMap,
        metrics: Arc<MetricsSink>,
        subscriptions: Vec<Subscription>,
    ) -> Self {
        let evaluator = ExpiryEvaluator::new(&config.tag, &config.tag_target, config.dry_run);

        let mut tasks: Vec<Arc<dyn CleanupTask>> = Vec::new();
        if let Some(task_config) = &config.resource_groups {
            tasks.push(Arc::new(resource_groups::ResourceGroupCleanup::new(task_config)));
        }
        if let Some(task_config) = &config.resources {
            tasks.push(Arc::new(resources::ResourceCleanup::new(task_config)));
        }
        if let Some(task_config) = &config.deployments {
            tasks.push(Arc::new(deployments::DeploymentCleanup::new(task_config)));
        }
        if let Some(task_config) = &config.role_assignments {
            tasks.push(Arc::new(role_assignments::RoleAssignmentCleanup::new(task_config)));
        }

        Self {
            config: Arc::new(config),
            directory,
            api_versions: Arc::new(api_versions),
            metrics,
            subscriptions,
            evaluator,
            tasks,
        }
    }

    /// Run scan cycles forever, sleeping the configured interval between
    /// them. Cycles never overlap.
    pub async fn run(self) {
        loop {
            let started = Instant::now();
            info!("starting janitor run");

            self.run_once().await;

            let duration = started.elapsed();
            self.metrics.set_cycle_duration(duration.as_secs_f64());
            info!(
                duration_seconds = duration.as_secs_f64(),
                "finished run, waiting {:?} until next run",
                self.config.interval
            );
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Execute one full scan cycle: fan cleanup tasks out over all
    /// subscriptions and enabled categories, collect their telemetry, then
    /// rebuild the TTL gauges from exactly this cycle's samples.
    pub async fn run_once(&self) {
        let (batch_tx, mut batch_rx) = mpsc::unbounded_channel::<TelemetryBatch>();

        // consumer side: drain until every producer handle is dropped
        let collector = tokio::spawn(async move {
            let mut resource_ttl = Vec::new();
            let mut role_assignment_ttl = Vec::new();
            let mut deployment_counts = Vec::new();
            while let Some(batch) = batch_rx.recv().await {
                match batch {
                    TelemetryBatch::ResourceTtl(samples) => resource_ttl.extend(samples),
                    TelemetryBatch::RoleAssignmentTtl(samples) => {
                        role_assignment_ttl.extend(samples)
                    }
                    TelemetryBatch::DeploymentCounts(samples) => deployment_counts.extend(samples),
                }
            }
            (resource_ttl, role_assignment_ttl, deployment_counts)
        });

        let mut scans = Vec::new();
        for subscription in &self.subscriptions {
            for task in &self.tasks {
                let cx = self.scan_context();
                let task = Arc::clone(task);
                let subscription = subscription.clone();
                let batch_tx = batch_tx.clone();

                scans.push(tokio::spawn(async move {
                    match task.scan(&cx, &subscription).await {
                        Ok(batch) => {
                            // the collector may already be gone if this cycle
                            // was abandoned; nothing to do then
                            let _ = batch_tx.send(batch);
                        }
                        Err(err) => {
                            error!(
                                subscription = %subscription.subscription_id,
                                task = task.name(),
                                error = format!("{err:#}"),
                                "scan failed, skipping this category for this subscription"
                            );
                            cx.metrics
                                .inc_error(&subscription.subscription_id, task.resource_type());
                        }
                    }
                }));
            }
        }
        // close the producer side so the collector can finish once all
        // spawned scans have dropped their clones
        drop(batch_tx);

        for result in join_all(scans).await {
            if let Err(err) = result {
                error!(error = %err, "scan task aborted");
            }
        }

        match collector.await {
            Ok((resource_ttl, role_assignment_ttl, deployment_counts)) => {
                self.metrics
                    .publish_cycle(resource_ttl, role_assignment_ttl, deployment_counts);
            }
            Err(err) => {
                // keep the previous gauge snapshot rather than publishing a
                // partial one
                error!(error = %err, "telemetry collector aborted, gauges not updated");
            }
        }
    }

    fn scan_context(&self) -> ScanContext {
        ScanContext {
            config: Arc::clone(&self.config),
            directory: Arc::clone(&self.directory),
            api_versions: Arc::clone(&self.api_versions),
            metrics: Arc::clone(&self.metrics),
            evaluator: self.evaluator.clone(),
        }
    }

    /// Names of the enabled cleanup tasks, for startup logging.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.name()).collect()
    }
}

/// Build a resource TTL gauge sample with lowercased identity labels and
/// the configured pass-through tag values.
pub(crate) fn ttl_sample(
    config: &JanitorConfig,
    subscription_id: &str,
    resource_id: &str,
    resource_group: &str,
    resource_type: &str,
    tags: &TagMap,
    expiry: DateTime<Utc>,
) -> ResourceTtlSample {
    let tag_values = config
        .resource_tags
        .iter()
        .map(|name| {
            tags.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .collect();

    ResourceTtlSample {
        resource_id: resource_id.to_lowercase(),
        subscription_id: subscription_id.to_lowercase(),
        resource_group: resource_group.to_lowercase(),
        resource_type: resource_type.to_lowercase(),
        expiry,
        tag_values,
    }
}
