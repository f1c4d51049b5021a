//! Integration tests for the metadata fetcher using wiremock

use cyclecloud_provision::metadata::azure::AzureImds;
use cyclecloud_provision::metadata::{MetadataSource, RetryPolicy, fetch_metadata};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

fn instance_request() -> MockBuilder {
    Mock::given(method("GET"))
        .and(path("/metadata/instance"))
        .and(query_param("api-version", "2017-08-01"))
        .and(header("Metadata", "true"))
}

fn instance_body() -> serde_json::Value {
    json!({
        "compute": {
            "location": "eastus",
            "name": "cyclecloud",
            "resourceGroupName": "rg1",
            "subscriptionId": "sub1",
            "vmSize": "Standard_D4s_v3"
        },
        "network": {}
    })
}

fn imds(server: &MockServer) -> AzureImds {
    AzureImds::with_base_url(&format!("{}/metadata", server.uri()), Duration::from_secs(2)).unwrap()
}

fn no_delay() -> RetryPolicy {
    RetryPolicy {
        attempts: 30,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_single_fetch() {
    let server = MockServer::start().await;
    instance_request()
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body()))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = imds(&server).fetch_once().await.unwrap();
    assert_eq!(metadata.subscription_id, "sub1");
    assert_eq!(metadata.location, "eastus");
    assert_eq!(metadata.resource_group_name, "rg1");
}

#[tokio::test]
async fn test_eventual_success_after_failures() {
    let server = MockServer::start().await;

    instance_request()
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;

    instance_request()
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body()))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = fetch_metadata(&imds(&server), &no_delay()).await.unwrap();
    assert_eq!(metadata.subscription_id, "sub1");
}

#[tokio::test]
async fn test_malformed_response_is_retried() {
    let server = MockServer::start().await;

    instance_request()
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>starting</html>"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    instance_request()
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body()))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = fetch_metadata(&imds(&server), &no_delay()).await;
    assert_eq!(metadata.unwrap().resource_group_name, "rg1");
}

#[tokio::test]
async fn test_exhaustion_after_thirty_attempts() {
    let server = MockServer::start().await;

    instance_request()
        .respond_with(ResponseTemplate::new(500))
        .expect(30)
        .mount(&server)
        .await;

    let metadata = fetch_metadata(&imds(&server), &no_delay()).await;
    assert!(metadata.is_none());
}

#[tokio::test]
async fn test_missing_header_is_not_answered() {
    let server = MockServer::start().await;

    // Only requests carrying `Metadata: true` get an answer
    instance_request()
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body()))
        .mount(&server)
        .await;

    let response = reqwest::Client::new()
        .get(format!(
            "{}/metadata/instance?api-version=2017-08-01",
            server.uri()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    assert!(imds(&server).fetch_once().await.is_ok());
}

#[tokio::test]
async fn test_unreachable_endpoint_gives_up() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let source =
        AzureImds::with_base_url(&format!("{}/metadata", uri), Duration::from_millis(200)).unwrap();
    let policy = RetryPolicy {
        attempts: 3,
        delay: Duration::ZERO,
    };

    assert!(fetch_metadata(&source, &policy).await.is_none());
}
