//! Typed models for Azure Resource Manager API responses
//!
//! List endpoints wrap their results in an envelope with a `nextLink`
//! continuation URL; everything else maps straight onto the JSON shapes
//! documented for the ARM REST API.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

/// Resource tags as returned by ARM (string keys and values).
pub type TagMap = HashMap<String, String>;

static RESOURCE_GROUP_FROM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/resourceGroups/([^/]+)").expect("resource group pattern"));

/// Extract the (lowercased) resource group name from an ARM resource ID,
/// if the ID is scoped to one.
pub fn resource_group_from_id(resource_id: &str) -> Option<String> {
    RESOURCE_GROUP_FROM_ID
        .captures(resource_id)
        .map(|caps| caps[1].to_lowercase())
}

/// Envelope for paged ARM list responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// A region as listed by the subscription locations endpoint; `name` is the
/// canonical identifier ("westeurope"), `display_name` the human form
/// ("West Europe") that provider metadata refers to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub namespace: String,
    #[serde(default)]
    pub resource_types: Vec<ProviderResourceType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResourceType {
    pub resource_type: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub api_versions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: TagMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: TagMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: DeploymentProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    /// Last deployment operation timestamp; used as the creation time for
    /// age-based retention.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Deployment {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.properties.timestamp
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub id: String,
    #[serde(default)]
    pub properties: RoleAssignmentProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentProperties {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub principal_id: String,
    #[serde(default)]
    pub principal_type: String,
    pub role_definition_id: Option<String>,
    pub description: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
}
