//! Client for the CI server's management endpoint.
//!
//! The management endpoint is the HTTP adaptor in front of the server's
//! management beans. It serves two purposes here:
//!
//! - **Project discovery**: `POST /getattribute` returns a text rendering of
//!   the project collection, parsed by [`crate::directory`].
//! - **Remote builds**: `POST /invoke` forces a build of one project.
//!
//! # Authentication
//!
//! Requests are first sent without credentials. On `401` the request is
//! retried once with a preemptive basic-auth header if credentials are
//! configured, otherwise [`ManagementError::AuthRequired`] is returned. A
//! `403` (or a second `401`) yields [`ManagementError::AuthRejected`]. A
//! refused connection yields [`ManagementError::RemoteUnavailable`], which
//! the caller answers by disabling remote management.

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Credentials;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const ATTRIBUTE_PATH: &str = "/getattribute";
const INVOKE_PATH: &str = "/invoke";

/// Form body requesting the project collection from the manager bean.
pub const PROJECT_LISTING_QUERY: &str = "objectname=CruiseControl%20Manager:id=unique&attribute=Projects&format=collection&template=viewcollection";

/// Errors that can occur while talking to the management endpoint.
#[derive(Error, Debug)]
pub enum ManagementError {
    /// The endpoint refused the connection.
    #[error("connection refused by management endpoint {url}")]
    RemoteUnavailable { url: String },

    /// The endpoint demands credentials and none are configured.
    #[error("management endpoint requires a username and password")]
    AuthRequired,

    /// The configured credentials were rejected.
    #[error("management endpoint rejected the configured credentials")]
    AuthRejected,

    /// Any other transport failure, including timeouts.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint answered with an unexpected status.
    #[error("unexpected HTTP status {status} from management endpoint")]
    Status { status: u16 },

    /// Invalid header value (credentials contain invalid characters).
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Operations the monitor needs from the management endpoint.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Returns the raw text rendering of the project collection.
    async fn project_listing(&self) -> Result<String, ManagementError>;

    /// Forces a build of the named project.
    async fn trigger_build(&self, project: &str) -> Result<(), ManagementError>;
}

/// [`ManagementApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    base_url: String,
    credentials: Option<Credentials>,
    client: Client,
}

impl ManagementClient {
    /// Creates a client for `base_url` (e.g. `http://ci.example.com:8000`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts a form body, applying the 401-retry policy.
    async fn post_form(&self, path: &str, body: String) -> Result<String, ManagementError> {
        let url = format!("{}{}", self.base_url, path);

        debug!(url = %url, "Calling management endpoint");
        let response = self.send(&url, &body, None).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            let Some(credentials) = &self.credentials else {
                warn!(url = %url, "Management endpoint requires authentication");
                return Err(ManagementError::AuthRequired);
            };

            debug!(url = %url, "Retrying with basic authentication");
            let retry = self.send(&url, &body, Some(credentials)).await?;
            if retry.status() == StatusCode::UNAUTHORIZED {
                return Err(ManagementError::AuthRejected);
            }
            retry
        } else {
            response
        };

        match response.status() {
            StatusCode::FORBIDDEN => {
                warn!(url = %url, "Management endpoint rejected credentials");
                Err(ManagementError::AuthRejected)
            }
            status if status.is_success() => Ok(response.text().await?),
            status => Err(ManagementError::Status {
                status: status.as_u16(),
            }),
        }
    }

    async fn send(
        &self,
        url: &str,
        body: &str,
        credentials: Option<&Credentials>,
    ) -> Result<reqwest::Response, ManagementError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        if let Some(credentials) = credentials {
            headers.insert(AUTHORIZATION, basic_auth_header(credentials)?);
        }

        self.client
            .post(url)
            .headers(headers)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ManagementError::RemoteUnavailable {
                        url: url.to_string(),
                    }
                } else {
                    ManagementError::Network(e)
                }
            })
    }
}

#[async_trait]
impl ManagementApi for ManagementClient {
    async fn project_listing(&self) -> Result<String, ManagementError> {
        self.post_form(ATTRIBUTE_PATH, PROJECT_LISTING_QUERY.to_string())
            .await
    }

    async fn trigger_build(&self, project: &str) -> Result<(), ManagementError> {
        self.post_form(INVOKE_PATH, build_invocation(project)).await?;
        info!(project = %project, "Build triggered");
        Ok(())
    }
}

/// Form body invoking the build operation on a project bean.
#[must_use]
pub fn build_invocation(project: &str) -> String {
    let name: String = url::form_urlencoded::byte_serialize(project.as_bytes()).collect();
    format!("operation=build&objectname=CruiseControl+Project%3Aname%3D{name}")
}

/// Builds a standard `Basic base64(user:pass)` header value.
///
/// # Errors
///
/// Returns `ManagementError::InvalidHeader` if the encoded value is not a
/// valid header (cannot happen for base64 output, kept for the type).
pub fn basic_auth_header(credentials: &Credentials) -> Result<HeaderValue, ManagementError> {
    let token = BASE64_STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}
