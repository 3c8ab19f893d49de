//! Deployment history cleanup
//!
//! ARM keeps a capped per-scope deployment history (800 entries); once the
//! cap is hit, new deployments fail. This task walks the subscription scope
//! and every resource group scope, deletes deployments past the retention
//! limit or older than the configured TTL, and reports the number still
//! existing per scope. Deployments carry no tags, so the TTL tag evaluation
//! does not apply here.
//!
//! Scopes are scanned one after another; deployment deletion is never
//! parallelized within a subscription.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::azure::directory::DeploymentScope;
use crate::azure::model::Subscription;
use crate::metrics::DeploymentCountSample;

use super::{CleanupTask, DeploymentsConfig, ScanContext, TelemetryBatch};

pub(crate) const RESOURCE_TYPE: &str = "Microsoft.Resources/deployments";

pub(crate) struct DeploymentCleanup {
    ttl: Duration,
    limit: u64,
}

impl DeploymentCleanup {
    pub fn new(config: &DeploymentsConfig) -> Self {
        Self {
            ttl: config.ttl,
            limit: config.limit,
        }
    }

    async fn scan_scope(
        &self,
        cx: &ScanContext,
        subscription_id: &str,
        scope: &DeploymentScope,
    ) -> Result<DeploymentCountSample> {
        let deployments = cx.directory.list_deployments(subscription_id, scope).await?;
        let now = Utc::now();

        let mut position: u64 = 0;
        let mut existing: u64 = 0;
        let mut deleted: u64 = 0;

        for deployment in deployments {
            position += 1;

            let delete =
                marked_for_deletion(position, self.limit, deployment.created_at(), self.ttl, now);

            if delete && !cx.config.dry_run {
                match cx
                    .directory
                    .delete_deployment(subscription_id, scope, &deployment.name)
                    .await
                {
                    Ok(()) => {
                        info!(deployment = %deployment.id, "successfully deleted");
                        cx.metrics.inc_deleted(subscription_id, RESOURCE_TYPE);
                        deleted += 1;
                    }
                    Err(err) => {
                        error!(deployment = %deployment.id, error = format!("{err:#}"), "delete failed");
                        cx.metrics.inc_error(subscription_id, RESOURCE_TYPE);
                    }
                }
            } else {
                existing += 1;
            }
        }

        info!(
            scope = %scope,
            found = position,
            existing,
            deleted,
            "deployment cleanup finished"
        );

        Ok(DeploymentCountSample {
            subscription_id: subscription_id.to_lowercase(),
            resource_group: scope.resource_group().unwrap_or("").to_lowercase(),
            count: existing,
        })
    }
}

#[async_trait]
impl CleanupTask for DeploymentCleanup {
    fn name(&self) -> &'static str {
        "deployment"
    }

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn scan(
        &self,
        cx: &ScanContext,
        subscription: &Subscription,
    ) -> Result<TelemetryBatch> {
        let subscription_id = subscription.subscription_id.as_str();

        let mut scopes = vec![DeploymentScope::Subscription];
        for group in cx
            .directory
            .list_resource_groups(subscription_id, None)
            .await?
        {
            scopes.push(DeploymentScope::ResourceGroup(group.name));
        }

        let mut counts = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            counts.push(self.scan_scope(cx, subscription_id, scope).await?);
        }

        Ok(TelemetryBatch::DeploymentCounts(counts))
    }
}

/// Retention decision for the deployment at 1-based `position` in its
/// scope's history. The position limit keeps the history from filling up
/// even when every deployment is young.
fn marked_for_deletion(
    position: u64,
    limit: u64,
    created_at: Option<DateTime<Utc>>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> bool {
    if position >= limit {
        return true;
    }
    match created_at {
        Some(created_at) => now.signed_duration_since(created_at) > ttl,
        None => false,
    }
}
