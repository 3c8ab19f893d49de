//! Individual resource cleanup
//!
//! Same TTL evaluation as the resource group task, applied to every
//! resource in the subscription. Mutating a resource needs a per-type api
//! version, so each resource is first resolved against the api-version
//! catalog; resources without a usable version are skipped and counted as
//! errors.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::azure::model::{self, Subscription};

use super::{ttl_sample, CleanupTask, ResourcesConfig, ScanContext, TelemetryBatch};

pub(crate) const RESOURCE_TYPE: &str = "Microsoft.Resources/resources";

pub(crate) struct ResourceCleanup {
    filter: Option<String>,
}

impl ResourceCleanup {
    pub fn new(config: &ResourcesConfig) -> Self {
        Self {
            filter: config.filter.clone(),
        }
    }
}

#[async_trait]
impl CleanupTask for ResourceCleanup {
    fn name(&self) -> &'static str {
        "resource"
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
        let resources = cx
            .directory
            .list_resources(subscription_id, self.filter.as_deref())
            .await?;

        let mut samples = Vec::new();
        for resource in resources {
            let api_version = match cx.api_versions.resolve(
                subscription_id,
                resource.location.as_deref(),
                &resource.resource_type,
            ) {
                Some(version) => version,
                None => {
                    error!(
                        resource = %resource.id,
                        resource_type = %resource.resource_type,
                        "no api version found for resource type, please report this as a bug"
                    );
                    cx.metrics.inc_error(subscription_id, &resource.resource_type);
                    continue;
                }
            };

            if resource.tags.is_empty() {
                continue;
            }

            let evaluation = cx.evaluator.evaluate(&resource.tags);

            if let Some(expiry) = evaluation.expiry_time {
                let resource_group =
                    model::resource_group_from_id(&resource.id).unwrap_or_default();
                samples.push(ttl_sample(
                    &cx.config,
                    subscription_id,
                    &resource.id,
                    &resource_group,
                    &resource.resource_type,
                    &resource.tags,
                    expiry,
                ));
            }

            if evaluation.rewrite_needed && !cx.config.dry_run {
                if let Some(new_value) = &evaluation.new_tag_value {
                    info!(resource = %resource.id, "tag update needed, updating resource");
                    let mut tags = resource.tags.clone();
                    tags.insert(cx.evaluator.target_tag().to_string(), new_value.clone());

                    match cx
                        .directory
                        .update_resource_tags_by_id(&resource.id, api_version, &tags)
                        .await
                    {
                        Ok(()) => info!(resource = %resource.id, "successfully updated"),
                        Err(err) => {
                            error!(resource = %resource.id, error = format!("{err:#}"), "tag update failed");
                            cx.metrics
                                .inc_error(subscription_id, &resource.resource_type);
                        }
                    }
                }
            }

            if evaluation.expired && !cx.config.dry_run {
                info!(resource = %resource.id, "expired, trying to delete");
                match cx
                    .directory
                    .delete_resource_by_id(&resource.id, api_version)
                    .await
                {
                    Ok(()) => {
                        info!(resource = %resource.id, "successfully deleted");
                        cx.metrics
                            .inc_deleted(subscription_id, &resource.resource_type);
                    }
                    Err(err) => {
                        error!(resource = %resource.id, error = format!("{err:#}"), "delete failed");
                        cx.metrics
                            .inc_error(subscription_id, &resource.resource_type);
                    }
                }
            }
        }

        Ok(TelemetryBatch::ResourceTtl(samples))
    }
}
