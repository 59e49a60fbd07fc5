//! Integration tests for the management endpoint client.
//!
//! These tests verify the authentication policy (retry once on 401 when
//! credentials exist, 403 rejects, refused connections disable remote
//! management) and the request bodies sent for discovery and builds.

use std::net::TcpListener;

use cctray_monitor::config::Credentials;
use cctray_monitor::directory::ProjectDirectory;
use cctray_monitor::management::{
    build_invocation, ManagementApi, ManagementClient, ManagementError, PROJECT_LISTING_QUERY,
};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

const LISTING: &str = "[Project core: idle] [Project web: building]";

/// `admin:secret`
const ADMIN_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

fn admin() -> Option<Credentials> {
    Some(Credentials::new("admin", "secret"))
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_listing_request_and_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/getattribute"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("accept", "text/plain"))
        .and(body_string(PROJECT_LISTING_QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), None);
    let mut directory = ProjectDirectory::new();

    let projects = directory.discover(&client).await.unwrap().to_vec();
    let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["core", "web"]);

    // Populated directories do not ask again.
    directory.discover(&client).await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_without_credentials_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), None);
    let err = client.project_listing().await.unwrap_err();

    assert!(matches!(err, ManagementError::AuthRequired));
}

#[tokio::test]
async fn test_unauthorized_retries_once_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", ADMIN_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), admin());
    let listing = client.project_listing().await.unwrap();

    assert_eq!(listing, LISTING);
}

#[tokio::test]
async fn test_unauthorized_after_retry_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), admin());
    let err = client.project_listing().await.unwrap_err();

    assert!(matches!(err, ManagementError::AuthRejected));
}

#[tokio::test]
async fn test_forbidden_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), admin());
    let err = client.project_listing().await.unwrap_err();

    assert!(matches!(err, ManagementError::AuthRejected));
}

#[tokio::test]
async fn test_server_error_is_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), None);
    let err = client.project_listing().await.unwrap_err();

    assert!(matches!(err, ManagementError::Status { status: 502 }));
}

#[tokio::test]
async fn test_refused_connection_is_remote_unavailable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = ManagementClient::new(format!("http://127.0.0.1:{port}"), None);
    let err = client.project_listing().await.unwrap_err();

    assert!(matches!(err, ManagementError::RemoteUnavailable { .. }));
}

// =============================================================================
// Remote builds
// =============================================================================

#[tokio::test]
async fn test_trigger_build_posts_invocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_string(build_invocation("core")))
        .respond_with(ResponseTemplate::new(200).set_body_string("Operation build invoked"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), None);
    tokio_test::assert_ok!(client.trigger_build("core").await);
}

#[tokio::test]
async fn test_trigger_build_uses_same_auth_policy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = ManagementClient::new(server.uri(), None);
    let err = client.trigger_build("core").await.unwrap_err();

    assert!(matches!(err, ManagementError::AuthRequired));
}
