//! Resource group cleanup
//!
//! Lists resource groups (optionally server-side filtered), evaluates the
//! TTL tags on each, rewrites relative TTLs to absolute expiry values and
//! deletes groups whose expiry has passed.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::azure::model::Subscription;

use super::{ttl_sample, CleanupTask, ResourceGroupsConfig, ScanContext, TelemetryBatch};

pub(crate) const RESOURCE_TYPE: &str = "Microsoft.Resources/resourceGroups";

pub(crate) struct ResourceGroupCleanup {
    filter: Option<String>,
}

impl ResourceGroupCleanup {
    pub fn new(config: &ResourceGroupsConfig) -> Self {
        Self {
            filter: config.filter.clone(),
        }
    }
}

#[async_trait]
impl CleanupTask for ResourceGroupCleanup {
    fn name(&self) -> &'static str {
        "resourceGroup"
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
        let groups = cx
            .directory
            .list_resource_groups(subscription_id, self.filter.as_deref())
            .await?;

        let mut samples = Vec::new();
        for group in groups {
            if group.tags.is_empty() {
                continue;
            }

            let evaluation = cx.evaluator.evaluate(&group.tags);

            if let Some(expiry) = evaluation.expiry_time {
                samples.push(ttl_sample(
                    &cx.config,
                    subscription_id,
                    &group.id,
                    &group.name,
                    RESOURCE_TYPE,
                    &group.tags,
                    expiry,
                ));
            }

            if evaluation.rewrite_needed && !cx.config.dry_run {
                if let Some(new_value) = &evaluation.new_tag_value {
                    info!(resource = %group.id, "tag update needed, updating resource");
                    let mut tags = group.tags.clone();
                    tags.insert(cx.evaluator.target_tag().to_string(), new_value.clone());

                    match cx
                        .directory
                        .update_resource_group_tags(subscription_id, &group.name, &tags)
                        .await
                    {
                        Ok(()) => info!(resource = %group.id, "successfully updated"),
                        Err(err) => {
                            error!(resource = %group.id, error = format!("{err:#}"), "tag update failed");
                            cx.metrics.inc_error(subscription_id, RESOURCE_TYPE);
                        }
                    }
                }
            }

            if evaluation.expired && !cx.config.dry_run {
                info!(resource = %group.id, "expired, trying to delete");
                match cx
                    .directory
                    .delete_resource_group(subscription_id, &group.name)
                    .await
                {
                    Ok(()) => {
                        info!(resource = %group.id, "successfully deleted");
                        cx.metrics.inc_deleted(subscription_id, RESOURCE_TYPE);
                    }
                    Err(err) => {
                        error!(resource = %group.id, error = format!("{err:#}"), "delete failed");
                        cx.metrics.inc_error(subscription_id, RESOURCE_TYPE);
                    }
                }
            }
        }

        Ok(TelemetryBatch::ResourceTtl(samples))
    }
}
