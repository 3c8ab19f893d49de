//! Integration tests for the ARM directory using wiremock
//!
//! These tests run the real token acquisition and directory code against
//! mocked Azure endpoints, covering auth propagation, pagination, filters
//! and the delete/update mutations.

use serde_json::json;
use wiremock::matchers::{body_json, bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azure_janitor::azure::auth::AzureCredentials;
use azure_janitor::azure::client::ArmClient;
use azure_janitor::azure::directory::{ArmDirectory, DeploymentScope, ResourceDirectory};

const TENANT: &str = "test-tenant";
const TOKEN: &str = "test-token";

/// Mount the AAD token endpoint; limited mounts let tests assert on the
/// number of token requests actually made.
async fn mock_token_endpoint(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": TOKEN
        })))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Directory wired against the mock server for both login and management.
fn test_directory(server: &MockServer) -> ArmDirectory {
    let http = ArmClient::build_http_client().expect("HTTP client should build");
    let credentials = AzureCredentials::new(
        http.clone(),
        &server.uri(),
        TENANT,
        "client-id",
        "client-secret",
        format!("{}/.default", server.uri()),
    );
    ArmDirectory::new(ArmClient::new(http, credentials, &server.uri()))
}

mod auth_tests {
    use super::*;

    /// A fetched token is attached as bearer auth to management requests
    #[tokio::test]
    async fn test_token_is_acquired_and_sent() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(bearer_token(TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"subscriptionId": "sub-1", "displayName": "Playground"}
                ]
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let subscriptions = directory
            .list_subscriptions()
            .await
            .expect("Listing should succeed");

        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].subscription_id, "sub-1");
        assert_eq!(subscriptions[0].display_name, "Playground");
    }

    /// The token is cached; a second request must not hit the token endpoint
    /// again (the mock only answers once, a second POST would get a 404)
    #[tokio::test]
    async fn test_token_is_cached_across_requests() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(bearer_token(TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        directory
            .list_subscriptions()
            .await
            .expect("First request should succeed");
        directory
            .list_subscriptions()
            .await
            .expect("Second request should reuse the cached token");
    }

    /// Token endpoint failures surface without retrying the API call
    #[tokio::test]
    async fn test_token_failure_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let err = directory
            .list_subscriptions()
            .await
            .expect_err("Listing should fail without a token");

        assert!(format!("{err:#}").contains("Token request failed: 401"));
    }
}

mod listing_tests {
    use super::*;

    /// Paged listings follow the ARM nextLink until it is absent
    #[tokio::test]
    async fn test_list_resource_groups_follows_next_link() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        let next_link = format!(
            "{}/subscriptions/sub-1/resourcegroups?api-version=2021-04-01&page=2",
            server.uri()
        );

        // First page
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/subscriptions/sub-1/resourceGroups/rg-1", "name": "rg-1"},
                    {"id": "/subscriptions/sub-1/resourceGroups/rg-2", "name": "rg-2"}
                ],
                "nextLink": next_link
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Second page
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/subscriptions/sub-1/resourceGroups/rg-3", "name": "rg-3"}
                ]
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let groups = directory
            .list_resource_groups("sub-1", None)
            .await
            .expect("Listing should succeed");

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].name, "rg-3");
    }

    /// The $filter expression and api-version are sent as query parameters
    #[tokio::test]
    async fn test_list_resource_groups_sends_filter() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .and(query_param("api-version", "2021-04-01"))
            .and(query_param("$filter", "tagName eq 'ttl'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "id": "/subscriptions/sub-1/resourceGroups/rg-1",
                        "name": "rg-1",
                        "tags": {"ttl": "2d"}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let groups = directory
            .list_resource_groups("sub-1", Some("tagName eq 'ttl'"))
            .await
            .expect("Filtered listing should succeed");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tags["ttl"], "2d");
    }

    /// Generic resources come back with type, location and tags
    #[tokio::test]
    async fn test_list_resources_parses_items() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "id": "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/vm-1",
                        "name": "vm-1",
                        "type": "Microsoft.Compute/virtualMachines",
                        "location": "westeurope",
                        "tags": {"ttl": "2022-12-31"}
                    },
                    {
                        "id": "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/publicIPAddresses/ip-1",
                        "name": "ip-1",
                        "type": "Microsoft.Network/publicIPAddresses",
                        "location": "westeurope"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let resources = directory
            .list_resources("sub-1", None)
            .await
            .expect("Listing should succeed");

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].resource_type, "Microsoft.Compute/virtualMachines");
        assert_eq!(resources[0].tags["ttl"], "2022-12-31");
        assert!(resources[1].tags.is_empty());
    }

    /// Deployment listings address the right path for each scope
    #[tokio::test]
    async fn test_list_deployments_at_both_scopes() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path(
                "/subscriptions/sub-1/providers/Microsoft.Resources/deployments",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/deployment-sub", "name": "deployment-sub",
                     "properties": {"timestamp": "2026-01-01T00:00:00Z"}}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(
                "/subscriptions/sub-1/resourcegroups/rg-1/providers/Microsoft.Resources/deployments",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/deployment-rg", "name": "deployment-rg", "properties": {}}
                ]
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);

        let at_subscription = directory
            .list_deployments("sub-1", &DeploymentScope::Subscription)
            .await
            .expect("Subscription scope listing should succeed");
        assert_eq!(at_subscription[0].name, "deployment-sub");
        assert!(at_subscription[0].created_at().is_some());

        let at_group = directory
            .list_deployments("sub-1", &DeploymentScope::ResourceGroup("rg-1".to_string()))
            .await
            .expect("Resource group scope listing should succeed");
        assert_eq!(at_group[0].name, "deployment-rg");
        assert!(at_group[0].created_at().is_none());
    }

    /// Server errors surface as API errors with the status code
    #[tokio::test]
    async fn test_error_status_surfaces() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resources"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": "InternalServerError", "message": "boom"}
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let err = directory
            .list_resources("sub-1", None)
            .await
            .expect_err("Listing should fail");

        assert!(format!("{err:#}").contains("API request failed: 500"));
    }
}

mod mutation_tests {
    use super::*;

    /// Resource group deletion issues DELETE against the group URL
    #[tokio::test]
    async fn test_delete_resource_group() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("DELETE"))
            .and(path("/subscriptions/sub-1/resourcegroups/rg-1"))
            .and(bearer_token(TOKEN))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        directory
            .delete_resource_group("sub-1", "rg-1")
            .await
            .expect("Delete should succeed");
    }

    /// Delete failures carry the response status
    #[tokio::test]
    async fn test_delete_conflict_reports_status() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("DELETE"))
            .and(path("/subscriptions/sub-1/resourcegroups/rg-locked"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": "ScopeLocked"}
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let err = directory
            .delete_resource_group("sub-1", "rg-locked")
            .await
            .expect_err("Delete should fail");

        assert!(format!("{err:#}").contains("API request failed: 409"));
    }

    /// Tag updates PATCH the full replacement tag map
    #[tokio::test]
    async fn test_update_resource_group_tags_patches_json() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("PATCH"))
            .and(path("/subscriptions/sub-1/resourcegroups/rg-1"))
            .and(body_json(json!({
                "tags": {"ttl_expiry": "2026-09-01T00:00:00Z"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/subscriptions/sub-1/resourceGroups/rg-1",
                "name": "rg-1"
            })))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        let tags = [(
            "ttl_expiry".to_string(),
            "2026-09-01T00:00:00Z".to_string(),
        )]
        .into_iter()
        .collect();
        directory
            .update_resource_group_tags("sub-1", "rg-1", &tags)
            .await
            .expect("Tag update should succeed");
    }

    /// Resources are deleted by full ID with their resolved api-version
    #[tokio::test]
    async fn test_delete_resource_by_id_uses_api_version() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        let resource_id =
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/vm-1";

        Mock::given(method("DELETE"))
            .and(path(resource_id))
            .and(query_param("api-version", "2024-07-01"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        directory
            .delete_resource_by_id(resource_id, "2024-07-01")
            .await
            .expect("Delete should succeed");
    }

    /// Deployments are deleted inside their scope's history
    #[tokio::test]
    async fn test_delete_deployment_in_resource_group_scope() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        Mock::given(method("DELETE"))
            .and(path(
                "/subscriptions/sub-1/resourcegroups/rg-1/providers/Microsoft.Resources/deployments/deploy-42",
            ))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        directory
            .delete_deployment(
                "sub-1",
                &DeploymentScope::ResourceGroup("rg-1".to_string()),
                "deploy-42",
            )
            .await
            .expect("Delete should succeed");
    }

    /// Role assignments are deleted by their full ID
    #[tokio::test]
    async fn test_delete_role_assignment_by_id() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        let assignment_id =
            "/subscriptions/sub-1/providers/Microsoft.Authorization/roleAssignments/ra-1";

        Mock::given(method("DELETE"))
            .and(path(assignment_id))
            .and(query_param("api-version", "2022-04-01"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let directory = test_directory(&server);
        directory
            .delete_role_assignment_by_id(assignment_id)
            .await
            .expect("Delete should succeed");
    }
}
