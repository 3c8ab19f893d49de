//! Role assignment cleanup
//!
//! Deletes role assignments that outlived their TTL, counted from the
//! assignment's creation time. Only assignments whose role definition ID is
//! on the configured allow-list are ever touched. The TTL defaults to the
//! configured value and can be shortened (never extended) by a duration
//! embedded in the assignment description, extracted with the configured
//! capture pattern.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::azure::model::{self, Subscription};
use crate::metrics::RoleAssignmentTtlSample;

use super::{
    parse_duration_value, CleanupTask, RoleAssignmentsConfig, ScanContext, TelemetryBatch,
};

pub(crate) const RESOURCE_TYPE: &str = "Microsoft.Authorization/roleAssignments";

pub(crate) struct RoleAssignmentCleanup {
    ttl: Duration,
    filter: Option<String>,
    role_definition_ids: Vec<String>,
    description_ttl: Option<Regex>,
}

impl RoleAssignmentCleanup {
    pub fn new(config: &RoleAssignmentsConfig) -> Self {
        Self {
            ttl: config.ttl,
            filter: config.filter.clone(),
            role_definition_ids: config.role_definition_ids.clone(),
            description_ttl: config.description_ttl.clone(),
        }
    }
}

#[async_trait]
impl CleanupTask for RoleAssignmentCleanup {
    fn name(&self) -> &'static str {
        "roleAssignment"
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
        let assignments = cx
            .directory
            .list_role_assignments(subscription_id, self.filter.as_deref())
            .await?;

        let now = Utc::now();
        let mut samples = Vec::new();

        for assignment in assignments {
            let properties = &assignment.properties;
            let (Some(role_definition_id), Some(created_on)) =
                (properties.role_definition_id.as_deref(), properties.created_on)
            else {
                continue;
            };

            if !role_definition_allowed(&self.role_definition_ids, role_definition_id) {
                continue;
            }

            let ttl = effective_ttl(
                self.ttl,
                self.description_ttl.as_ref(),
                properties.description.as_deref(),
            );
            debug!(role_assignment = %assignment.id, ttl = %ttl, "detected ttl");

            let Some(expiry) = created_on.checked_add_signed(ttl) else {
                warn!(role_assignment = %assignment.id, "expiry out of range, skipping");
                continue;
            };

            samples.push(RoleAssignmentTtlSample {
                role_assignment_id: assignment.id.to_lowercase(),
                scope: properties.scope.to_lowercase(),
                principal_id: properties.principal_id.to_lowercase(),
                principal_type: properties.principal_type.to_lowercase(),
                role_definition_id: role_definition_id.to_lowercase(),
                subscription_id: subscription_id.to_lowercase(),
                resource_group: model::resource_group_from_id(&properties.scope)
                    .unwrap_or_default(),
                expiry,
            });

            if now <= expiry {
                continue;
            }

            if cx.config.dry_run {
                info!(role_assignment = %assignment.id, "expired, but dry-run is active");
                continue;
            }

            info!(role_assignment = %assignment.id, "expired, trying to delete");
            match cx
                .directory
                .delete_role_assignment_by_id(&assignment.id)
                .await
            {
                Ok(()) => {
                    info!(role_assignment = %assignment.id, "successfully deleted");
                    cx.metrics.inc_deleted(subscription_id, RESOURCE_TYPE);
                }
                Err(err) => {
                    error!(role_assignment = %assignment.id, error = format!("{err:#}"), "delete failed");
                    cx.metrics.inc_error(subscription_id, RESOURCE_TYPE);
                }
            }
        }

        Ok(TelemetryBatch::RoleAssignmentTtl(samples))
    }
}

/// Case-insensitive allow-list check. A listed value matches as the full
/// role definition ID or as a trailing segment of it, so both full IDs and
/// bare definition GUIDs can be configured.
fn role_definition_allowed(allowed: &[String], role_definition_id: &str) -> bool {
    let candidate = role_definition_id.to_lowercase();
    allowed.iter().any(|definition| {
        let definition = definition.to_lowercase();
        !definition.is_empty() && candidate.ends_with(&definition)
    })
}

/// TTL for one assignment: the value captured from the description when it
/// parses and is shorter than the default, the default otherwise.
fn effective_ttl(
    default_ttl: Duration,
    description_ttl: Option<&Regex>,
    description: Option<&str>,
) -> Duration {
    let (Some(pattern), Some(description)) = (description_ttl, description) else {
        return default_ttl;
    };
    let Some(value) = pattern.captures(description).and_then(|captures| captures.get(1)) else {
        return default_ttl;
    };
    match parse_duration_value(value.as_str()) {
        Some(parsed) if parsed < default_ttl => parsed,
        _ => default_ttl,
    }
}
