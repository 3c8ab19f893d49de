//! Resource directory
//!
//! `ResourceDirectory` is the seam between the janitor and the cloud: it
//! exposes the listing, deletion and tag-update operations the category
//! runners need, scoped by subscription. `ArmDirectory` implements it
//! against the ARM REST API; tests substitute an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::client::ArmClient;
use super::model::{
    Deployment, GenericResource, Location, Provider, ResourceGroup, RoleAssignment, Subscription,
    TagMap,
};

/// Api versions for the fixed ARM route families. Generic resources use
/// versions resolved from provider metadata instead.
const API_VERSION_SUBSCRIPTIONS: &str = "2022-12-01";
const API_VERSION_RESOURCES: &str = "2021-04-01";
const API_VERSION_ROLE_ASSIGNMENTS: &str = "2022-04-01";

/// Scope a deployment listing or deletion applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentScope {
    Subscription,
    ResourceGroup(String),
}

impl DeploymentScope {
    /// Resource group name carried by the scope, if any.
    pub fn resource_group(&self) -> Option<&str> {
        match self {
            DeploymentScope::Subscription => None,
            DeploymentScope::ResourceGroup(name) => Some(name),
        }
    }
}

impl std::fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentScope::Subscription => write!(f, "subscription"),
            DeploymentScope::ResourceGroup(name) => write!(f, "resource group {name}"),
        }
    }
}

/// Listing, deletion and tag-update operations per resource category.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription>;
    async fn list_locations(&self, subscription_id: &str) -> Result<Vec<Location>>;
    async fn list_providers(&self, subscription_id: &str) -> Result<Vec<Provider>>;
    async fn list_resource_groups(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ResourceGroup>>;
    async fn list_resources(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<GenericResource>>;
    async fn list_deployments(
        &self,
        subscription_id: &str,
        scope: &DeploymentScope,
    ) -> Result<Vec<Deployment>>;
    async fn list_role_assignments(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<RoleAssignment>>;

    async fn delete_resource_group(&self, subscription_id: &str, name: &str) -> Result<()>;
    async fn update_resource_group_tags(
        &self,
        subscription_id: &str,
        name: &str,
        tags: &TagMap,
    ) -> Result<()>;
    async fn delete_resource_by_id(&self, resource_id: &str, api_version: &str) -> Result<()>;
    async fn update_resource_tags_by_id(
        &self,
        resource_id: &str,
        api_version: &str,
        tags: &TagMap,
    ) -> Result<()>;
    async fn delete_deployment(
        &self,
        subscription_id: &str,
        scope: &DeploymentScope,
        name: &str,
    ) -> Result<()>;
    async fn delete_role_assignment_by_id(&self, role_assignment_id: &str) -> Result<()>;
}

/// `ResourceDirectory` implementation over the ARM REST API.
#[derive(Clone)]
pub struct ArmDirectory {
    client: ArmClient,
}

impl ArmDirectory {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    fn filter_query<'a>(filter: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
        match filter {
            Some(filter) if !filter.is_empty() => vec![("$filter", filter)],
            _ => Vec::new(),
        }
    }

    fn deployments_path(subscription_id: &str, scope: &DeploymentScope) -> String {
        match scope {
            DeploymentScope::Subscription => format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Resources/deployments"
            ),
            DeploymentScope::ResourceGroup(name) => format!(
                "/subscriptions/{subscription_id}/resourcegroups/{}/providers/Microsoft.Resources/deployments",
                urlencoding::encode(name)
            ),
        }
    }
}

#[async_trait]
impl ResourceDirectory for ArmDirectory {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let url = self
            .client
            .management_url("/subscriptions", API_VERSION_SUBSCRIPTIONS, &[]);
        self.client.get_paged(&url).await
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let url = self.client.management_url(
            &format!("/subscriptions/{subscription_id}"),
            API_VERSION_SUBSCRIPTIONS,
            &[],
        );
        self.client.get(&url).await
    }

    async fn list_locations(&self, subscription_id: &str) -> Result<Vec<Location>> {
        let url = self.client.management_url(
            &format!("/subscriptions/{subscription_id}/locations"),
            API_VERSION_SUBSCRIPTIONS,
            &[],
        );
        self.client.get_paged(&url).await
    }

    async fn list_providers(&self, subscription_id: &str) -> Result<Vec<Provider>> {
        let url = self.client.management_url(
            &format!("/subscriptions/{subscription_id}/providers"),
            API_VERSION_RESOURCES,
            &[],
        );
        self.client.get_paged(&url).await
    }

    async fn list_resource_groups(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ResourceGroup>> {
        let url = self.client.management_url(
            &format!("/subscriptions/{subscription_id}/resourcegroups"),
            API_VERSION_RESOURCES,
            &Self::filter_query(filter),
        );
        self.client.get_paged(&url).await
    }

    async fn list_resources(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<GenericResource>> {
        let url = self.client.management_url(
            &format!("/subscriptions/{subscription_id}/resources"),
            API_VERSION_RESOURCES,
            &Self::filter_query(filter),
        );
        self.client.get_paged(&url).await
    }

    async fn list_deployments(
        &self,
        subscription_id: &str,
        scope: &DeploymentScope,
    ) -> Result<Vec<Deployment>> {
        let url = self.client.management_url(
            &Self::deployments_path(subscription_id, scope),
            API_VERSION_RESOURCES,
            &[],
        );
        self.client.get_paged(&url).await
    }

    async fn list_role_assignments(
        &self,
        subscription_id: &str,
        filter: Option<&str>,
    ) -> Result<Vec<RoleAssignment>> {
        let url = self.client.management_url(
            &format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Authorization/roleAssignments"
            ),
            API_VERSION_ROLE_ASSIGNMENTS,
            &Self::filter_query(filter),
        );
        self.client.get_paged(&url).await
    }

    async fn delete_resource_group(&self, subscription_id: &str, name: &str) -> Result<()> {
        let url = self.client.management_url(
            &format!(
                "/subscriptions/{subscription_id}/resourcegroups/{}",
                urlencoding::encode(name)
            ),
            API_VERSION_RESOURCES,
            &[],
        );
        self.client.delete(&url).await
    }

    async fn update_resource_group_tags(
        &self,
        subscription_id: &str,
        name: &str,
        tags: &TagMap,
    ) -> Result<()> {
        let url = self.client.management_url(
            &format!(
                "/subscriptions/{subscription_id}/resourcegroups/{}",
                urlencoding::encode(name)
            ),
            API_VERSION_RESOURCES,
            &[],
        );
        self.client.patch(&url, &json!({ "tags": tags })).await
    }

    async fn delete_resource_by_id(&self, resource_id: &str, api_version: &str) -> Result<()> {
        let url = self.client.management_url(resource_id, api_version, &[]);
        self.client.delete(&url).await
    }

    async fn update_resource_tags_by_id(
        &self,
        resource_id: &str,
        api_version: &str,
        tags: &TagMap,
    ) -> Result<()> {
        let url = self.client.management_url(resource_id, api_version, &[]);
        self.client.patch(&url, &json!({ "tags": tags })).await
    }

    async fn delete_deployment(
        &self,
        subscription_id: &str,
        scope: &DeploymentScope,
        name: &str,
    ) -> Result<()> {
        let url = self.client.management_url(
            &format!(
                "{}/{}",
                Self::deployments_path(subscription_id, scope),
                urlencoding::encode(name)
            ),
            API_VERSION_RESOURCES,
            &[],
        );
        self.client.delete(&url).await
    }

    async fn delete_role_assignment_by_id(&self, role_assignment_id: &str) -> Result<()> {
        let url = self
            .client
            .management_url(role_assignment_id, API_VERSION_ROLE_ASSIGNMENTS, &[]);
        self.client.delete(&url).await
    }
}
