//! Runtime configuration
//!
//! Every setting is a CLI flag with an environment variable fallback.
//! Durations accept the same grammar as TTL tag values ("1h30m", "PT1H"),
//! so operators only learn one format.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use regex::Regex;

use crate::janitor::{
    parse_duration_value, DeploymentsConfig, JanitorConfig, ResourceGroupsConfig, ResourcesConfig,
    RoleAssignmentsConfig,
};

/// TTL-based cleanup service for Azure subscriptions.
#[derive(Parser, Debug, Clone)]
#[command(name = "azure-janitor", version, about, long_about = None)]
pub struct Opts {
    /// Log what would be deleted without deleting anything
    #[arg(long, env = "JANITOR_DRYRUN")]
    pub dry_run: bool,

    /// Log level; RUST_LOG overrides with a full filter directive
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Azure cloud to talk to
    #[arg(long, value_enum, default_value = "public", env = "AZURE_ENVIRONMENT")]
    pub azure_environment: CloudEnvironment,

    /// Subscription IDs to scan; empty means every visible subscription
    #[arg(
        long = "azure-subscription",
        env = "AZURE_SUBSCRIPTION_ID",
        value_delimiter = ' '
    )]
    pub azure_subscriptions: Vec<String>,

    /// Resource tag names exported as gauge labels
    #[arg(
        long = "azure-resource-tag",
        env = "AZURE_RESOURCE_TAG",
        value_delimiter = ' ',
        default_value = "owner"
    )]
    pub azure_resource_tags: Vec<String>,

    /// Pause between two cleanup runs
    #[arg(
        long,
        env = "JANITOR_INTERVAL",
        default_value = "1h",
        value_parser = parse_interval
    )]
    pub janitor_interval: std::time::Duration,

    /// Tag holding user-supplied TTL values
    #[arg(long, env = "JANITOR_TAG", default_value = "ttl")]
    pub janitor_tag: String,

    /// Tag normalized absolute expiry values are written to
    #[arg(long, env = "JANITOR_TAG_TARGET", default_value = "ttl_expiry")]
    pub janitor_tag_target: String,

    /// Enable resource group cleanup
    #[arg(long, env = "JANITOR_RESOURCEGROUPS")]
    pub janitor_resourcegroups: bool,

    /// Additional $filter for the resource group listing
    #[arg(long, env = "JANITOR_RESOURCEGROUPS_FILTER")]
    pub janitor_resourcegroups_filter: Option<String>,

    /// Enable cleanup of individual resources
    #[arg(long, env = "JANITOR_RESOURCES")]
    pub janitor_resources: bool,

    /// $filter for the resource listing
    #[arg(long, env = "JANITOR_RESOURCES_FILTER")]
    pub janitor_resources_filter: Option<String>,

    /// Enable deployment history cleanup
    #[arg(long, env = "JANITOR_DEPLOYMENTS")]
    pub janitor_deployments: bool,

    /// Maximum deployment age
    #[arg(
        long,
        env = "JANITOR_DEPLOYMENTS_TTL",
        default_value = "8760h",
        value_parser = parse_ttl
    )]
    pub janitor_deployments_ttl: chrono::Duration,

    /// Maximum number of deployments kept per scope
    #[arg(long, env = "JANITOR_DEPLOYMENTS_LIMIT", default_value_t = 700)]
    pub janitor_deployments_limit: u64,

    /// Enable role assignment cleanup
    #[arg(long, env = "JANITOR_ROLEASSIGNMENTS")]
    pub janitor_roleassignments: bool,

    /// Default (and maximum) role assignment TTL
    #[arg(
        long,
        env = "JANITOR_ROLEASSIGNMENTS_TTL",
        default_value = "6h",
        value_parser = parse_ttl
    )]
    pub janitor_roleassignments_ttl: chrono::Duration,

    /// Role definition IDs eligible for cleanup (full ID or bare GUID)
    #[arg(
        long = "janitor-roleassignments-roledefinitionid",
        env = "JANITOR_ROLEASSIGNMENTS_ROLEDEFINITIONID",
        value_delimiter = ' '
    )]
    pub janitor_roleassignments_roledefinitionids: Vec<String>,

    /// $filter for the role assignment listing
    #[arg(long, env = "JANITOR_ROLEASSIGNMENTS_FILTER")]
    pub janitor_roleassignments_filter: Option<String>,

    /// Regex whose first capture group extracts a TTL from the description
    #[arg(long, env = "JANITOR_ROLEASSIGNMENTS_DESCRIPTIONTTL")]
    pub janitor_roleassignments_descriptionttl: Option<String>,

    /// Address the metrics/health endpoint listens on
    #[arg(long, env = "SERVER_BIND", default_value = "0.0.0.0:8080")]
    pub server_bind: SocketAddr,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Default `EnvFilter` directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudEnvironment {
    Public,
    China,
    Government,
}

impl CloudEnvironment {
    pub fn management_endpoint(self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://management.azure.com",
            CloudEnvironment::China => "https://management.chinacloudapi.cn",
            CloudEnvironment::Government => "https://management.usgovcloudapi.net",
        }
    }

    pub fn login_endpoint(self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://login.microsoftonline.com",
            CloudEnvironment::China => "https://login.chinacloudapi.cn",
            CloudEnvironment::Government => "https://login.microsoftonline.us",
        }
    }
}

impl Opts {
    /// Validate the cleanup settings and assemble the janitor configuration.
    pub fn janitor_config(&self) -> Result<JanitorConfig> {
        let resource_groups = self.janitor_resourcegroups.then(|| ResourceGroupsConfig {
            filter: Some(self.resource_groups_filter()),
        });

        let resources = self.janitor_resources.then(|| ResourcesConfig {
            filter: self
                .janitor_resources_filter
                .clone()
                .filter(|filter| !filter.trim().is_empty()),
        });

        let deployments = self.janitor_deployments.then(|| DeploymentsConfig {
            ttl: self.janitor_deployments_ttl,
            limit: self.janitor_deployments_limit,
        });

        let role_assignments = if self.janitor_roleassignments {
            let role_definition_ids: Vec<String> = self
                .janitor_roleassignments_roledefinitionids
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();
            if role_definition_ids.is_empty() {
                bail!(
                    "role assignment cleanup needs at least one --janitor-roleassignments-roledefinitionid"
                );
            }

            let description_ttl = self
                .janitor_roleassignments_descriptionttl
                .as_deref()
                .map(Regex::new)
                .transpose()
                .context("Failed to compile --janitor-roleassignments-descriptionttl pattern")?;

            Some(RoleAssignmentsConfig {
                ttl: self.janitor_roleassignments_ttl,
                filter: self.janitor_roleassignments_filter.clone(),
                role_definition_ids,
                description_ttl,
            })
        } else {
            None
        };

        Ok(JanitorConfig {
            dry_run: self.dry_run,
            interval: self.janitor_interval,
            tag: self.janitor_tag.clone(),
            tag_target: self.janitor_tag_target.clone(),
            resource_tags: self.azure_resource_tags.clone(),
            resource_groups,
            resources,
            deployments,
            role_assignments,
        })
    }

    /// Server-side `$filter` for the resource group listing: only groups
    /// carrying the TTL tag, AND-combined with any additional user filter.
    /// The resource listing gets no tag filter; filtering by tagName there
    /// makes ARM omit the tags from the response.
    fn resource_groups_filter(&self) -> String {
        let tag = self.janitor_tag.replace('\'', "''");
        match self.janitor_resourcegroups_filter.as_deref() {
            Some(additional) if !additional.trim().is_empty() => {
                format!("tagName eq '{tag}' and {additional}")
            }
            _ => format!("tagName eq '{tag}'"),
        }
    }
}

fn parse_interval(value: &str) -> Result<std::time::Duration, String> {
    parse_ttl(value)?
        .to_std()
        .map_err(|_| format!("duration must be positive: {value}"))
}

fn parse_ttl(value: &str) -> Result<chrono::Duration, String> {
    parse_duration_value(value).ok_or_else(|| format!("invalid duration: {value}"))
}
