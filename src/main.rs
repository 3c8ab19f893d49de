use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use azure_janitor::azure::auth::AzureCredentials;
use azure_janitor::azure::client::ArmClient;
use azure_janitor::azure::directory::{ArmDirectory, ResourceDirectory};
use azure_janitor::azure::model::Subscription;
use azure_janitor::config::Opts;
use azure_janitor::janitor::{ApiVersionMap, Janitor, JanitorConfig};
use azure_janitor::metrics::MetricsSink;
use azure_janitor::server;

fn setup_logging(opts: &Opts) -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.log_level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .init();

    guard
}

fn log_enabled_tasks(config: &JanitorConfig) {
    if let Some(task) = &config.resource_groups {
        info!(filter = ?task.filter, "resource group cleanup enabled");
    }
    if let Some(task) = &config.resources {
        info!(filter = ?task.filter, "resource cleanup enabled");
    }
    if let Some(task) = &config.deployments {
        info!(ttl = %task.ttl, limit = task.limit, "deployment cleanup enabled");
    }
    if let Some(task) = &config.role_assignments {
        info!(
            ttl = %task.ttl,
            role_definitions = task.role_definition_ids.len(),
            "role assignment cleanup enabled"
        );
    }
    if config.resource_groups.is_none()
        && config.resources.is_none()
        && config.deployments.is_none()
        && config.role_assignments.is_none()
    {
        warn!("no cleanup category enabled, nothing will be deleted");
    }
}

async fn resolve_subscriptions(
    directory: &dyn ResourceDirectory,
    requested: &[String],
) -> Result<Vec<Subscription>> {
    let subscriptions = if requested.is_empty() {
        directory
            .list_subscriptions()
            .await
            .context("Failed to list subscriptions")?
    } else {
        let mut subscriptions = Vec::with_capacity(requested.len());
        for subscription_id in requested {
            let subscription = directory
                .get_subscription(subscription_id)
                .await
                .with_context(|| format!("Failed to fetch subscription {subscription_id}"))?;
            subscriptions.push(subscription);
        }
        subscriptions
    };

    if subscriptions.is_empty() {
        bail!("no subscriptions visible to these credentials");
    }
    for subscription in &subscriptions {
        info!(
            subscription = %subscription.subscription_id,
            name = %subscription.display_name,
            "using subscription"
        );
    }
    Ok(subscriptions)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let _log_guard = setup_logging(&opts);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dry_run = opts.dry_run,
        environment = ?opts.azure_environment,
        "starting azure-janitor"
    );

    let janitor_config = opts.janitor_config()?;
    log_enabled_tasks(&janitor_config);

    let http_client = ArmClient::build_http_client()?;
    let management_endpoint = opts.azure_environment.management_endpoint();
    let credentials = AzureCredentials::from_env(
        http_client.clone(),
        opts.azure_environment.login_endpoint(),
        format!("{management_endpoint}/.default"),
    )?;
    let arm_client = ArmClient::new(http_client, credentials, management_endpoint);
    let directory: Arc<dyn ResourceDirectory> = Arc::new(ArmDirectory::new(arm_client));

    let subscriptions = resolve_subscriptions(directory.as_ref(), &opts.azure_subscriptions).await?;

    let api_versions = ApiVersionMap::build(directory.as_ref(), &subscriptions)
        .await
        .context("Failed to build api-version catalog")?;

    let metrics = Arc::new(MetricsSink::new(&opts.azure_resource_tags));
    let janitor = Janitor::new(
        janitor_config,
        directory,
        api_versions,
        Arc::clone(&metrics),
        subscriptions,
    );

    tokio::spawn(janitor.run());

    server::serve(opts.server_bind, metrics).await
}
