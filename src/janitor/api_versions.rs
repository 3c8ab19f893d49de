//! Per-subscription API version catalog
//!
//! ARM mutation calls must carry an api-version parameter matching the
//! resource type, and the usable version can differ by region. The catalog
//! is built once at startup from the provider metadata of every
//! subscription and is read-only afterward; resolution misses mean the
//! resource is skipped rather than mutated with a guessed version.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::azure::directory::ResourceDirectory;
use crate::azure::model::{Location, Provider, Subscription};

/// Key for the location-independent fallback entry of a resource type.
const ANY_LOCATION: &str = "";

/// Immutable lookup of (subscription, location, resource type) → api-version.
#[derive(Debug, Default)]
pub struct ApiVersionMap {
    versions: HashMap<String, HashMap<(String, String), String>>,
}

impl ApiVersionMap {
    /// Fetch locations and provider metadata for every subscription and
    /// build the full catalog. Any listing failure aborts the build; the
    /// catalog must be complete before scanning starts.
    pub async fn build(
        directory: &dyn ResourceDirectory,
        subscriptions: &[Subscription],
    ) -> Result<Self> {
        let mut map = Self::default();
        for subscription in subscriptions {
            let id = subscription.subscription_id.as_str();
            let locations = directory
                .list_locations(id)
                .await
                .with_context(|| format!("failed to list locations for subscription {id}"))?;
            let providers = directory
                .list_providers(id)
                .await
                .with_context(|| format!("failed to list providers for subscription {id}"))?;
            map.insert_subscription(id, &locations, &providers);
        }

        info!(
            subscriptions = subscriptions.len(),
            entries = map.entry_count(),
            "api version catalog built"
        );
        Ok(map)
    }

    fn insert_subscription(
        &mut self,
        subscription_id: &str,
        locations: &[Location],
        providers: &[Provider],
    ) {
        // provider metadata names regions by display name ("West Europe");
        // translate those to canonical names ("westeurope")
        let mut location_map: HashMap<String, String> = HashMap::new();
        for location in locations {
            let canonical = location.name.to_lowercase();
            location_map.insert(canonical.clone(), canonical.clone());
            if !location.display_name.is_empty() {
                location_map.insert(location.display_name.to_lowercase(), canonical);
            }
        }

        let entries = self.versions.entry(subscription_id.to_string()).or_default();
        for provider in providers {
            for resource_type in &provider.resource_types {
                let Some(version) = select_api_version(&resource_type.api_versions) else {
                    continue;
                };
                let type_key = format!(
                    "{}/{}",
                    provider.namespace.to_lowercase(),
                    resource_type.resource_type.to_lowercase()
                );

                for location in &resource_type.locations {
                    let canonical = canonical_location(&location_map, location);
                    entries.insert((canonical, type_key.clone()), version.to_string());
                }
                entries.insert((ANY_LOCATION.to_string(), type_key.clone()), version.to_string());

                debug!(
                    subscription = %subscription_id,
                    resource_type = %type_key,
                    version = %version,
                    "selected api version"
                );
            }
        }
    }

    /// Look up the api-version for a resource type. Prefers the entry for
    /// the given location, falls back to the location-independent entry,
    /// and returns `None` on a total miss (the caller must then skip the
    /// mutation and count an error).
    pub fn resolve(
        &self,
        subscription_id: &str,
        location: Option<&str>,
        resource_type: &str,
    ) -> Option<&str> {
        let entries = self.versions.get(subscription_id)?;
        let type_key = resource_type.to_lowercase();

        if let Some(location) = location {
            let canonical = location.to_lowercase().replace(' ', "");
            if let Some(version) = entries.get(&(canonical, type_key.clone())) {
                return Some(version);
            }
        }

        entries
            .get(&(ANY_LOCATION.to_string(), type_key))
            .map(String::as_str)
    }

    pub fn entry_count(&self) -> usize {
        self.versions.values().map(HashMap::len).sum()
    }
}

/// Pick the lexicographically greatest non-preview version, or the greatest
/// preview version when no stable one exists.
fn select_api_version(api_versions: &[String]) -> Option<&str> {
    let mut stable: Option<&str> = None;
    let mut preview: Option<&str> = None;

    for version in api_versions {
        if version.contains("-preview") {
            if preview.map_or(true, |current| version.as_str() > current) {
                preview = Some(version);
            }
        } else if stable.map_or(true, |current| version.as_str() > current) {
            stable = Some(version);
        }
    }

    stable.or(preview)
}

fn canonical_location(location_map: &HashMap<String, String>, location: &str) -> String {
    location_map
        .get(&location.to_lowercase())
        .cloned()
        // unknown display names follow the ARM convention of lowercasing
        // and dropping spaces
        .unwrap_or_else(|| location.to_lowercase().replace(' ', ""))
}
