//! Status page fetching and marker counting.
//!
//! Build health is inferred by counting non-overlapping occurrences of a
//! failure marker in the HTML of a status page. The CruiseControl index page
//! renders the marker twice for every failed build, so the number of broken
//! builds is `occurrences / 2`. This is a property of that page layout, not a
//! general contract; the [`StatusFetcher`] trait isolates it so a structured
//! status source can replace it without touching the transition logic.
//!
//! # Example
//!
//! ```
//! use cctray_monitor::fetcher::StatusPage;
//! use cctray_monitor::types::BuildStatus;
//!
//! let page = StatusPage::scan("<td>failed</td><td>failed</td>".to_string(), "failed", false);
//! assert_eq!(page.occurrences, 2);
//! assert_eq!(page.broken_builds(), 1);
//! assert_eq!(page.status(), BuildStatus::Broken);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::types::BuildStatus;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Marker occurrences rendered per failed build.
const OCCURRENCES_PER_FAILURE: usize = 2;

const ROW_START: &str = "<tr>";
const ROW_END: &str = "</tr>";
const LINK_START: &str = "<a href";
const LINK_END: &str = "</a>";

/// Errors that can occur while fetching a status page.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure, including timeouts and refused connections.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// One status page request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub marker: String,
    pub credentials: Option<Credentials>,

    /// Extract failed project names from table rows (index page only).
    pub extract_failures: bool,
}

/// A fetched page and what was counted in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPage {
    pub body: String,

    /// Non-overlapping occurrences of the failure marker.
    pub occurrences: usize,

    /// Display names of failed projects; advisory only.
    pub failed_names: Vec<String>,
}

impl StatusPage {
    /// Counts the marker in `body` and, if requested, extracts failed names.
    #[must_use]
    pub fn scan(body: String, marker: &str, extract_failures: bool) -> Self {
        let occurrences = count_occurrences(&body, marker);
        let failed_names = if extract_failures {
            extract_failed_names(&body, marker, occurrences / OCCURRENCES_PER_FAILURE)
        } else {
            Vec::new()
        };
        Self {
            body,
            occurrences,
            failed_names,
        }
    }

    /// Number of failed builds implied by the marker count.
    #[must_use]
    pub fn broken_builds(&self) -> usize {
        self.occurrences / OCCURRENCES_PER_FAILURE
    }

    #[must_use]
    pub fn status(&self) -> BuildStatus {
        BuildStatus::from_broken_count(self.broken_builds())
    }
}

/// Source of status pages.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Performs one request and scans the result.
    async fn fetch(&self, request: &FetchRequest) -> Result<StatusPage, FetchError>;
}

/// [`StatusFetcher`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: Client,
}

impl HttpStatusFetcher {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(4)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for HttpStatusFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<StatusPage, FetchError> {
        debug!(url = %request.url, marker = %request.marker, "Fetching status page");

        let mut builder = self.client.get(&request.url);
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %request.url, status = status.as_u16(), "Status page request failed");
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let page = StatusPage::scan(body, &request.marker, request.extract_failures);

        debug!(
            url = %request.url,
            occurrences = page.occurrences,
            broken = page.broken_builds(),
            "Status page scanned"
        );

        Ok(page)
    }
}

/// Counts non-overlapping occurrences of `marker` in `body`.
///
/// An empty marker never matches.
#[must_use]
pub fn count_occurrences(body: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    body.matches(marker).count()
}

/// Extracts the link text of the first anchor in every table row that
/// contains `marker`, stopping after `limit` names.
///
/// Rows without a well-formed anchor are skipped.
#[must_use]
pub fn extract_failed_names(body: &str, marker: &str, limit: usize) -> Vec<String> {
    let mut names = Vec::new();
    if marker.is_empty() || limit == 0 {
        return names;
    }

    let mut cursor = 0;
    while names.len() < limit {
        let Some(row_start) = find_from(body, ROW_START, cursor) else {
            break;
        };
        let Some(row_end) = find_from(body, ROW_END, row_start) else {
            break;
        };
        let row = &body[row_start..row_end];
        cursor = row_end + ROW_END.len();

        if !row.contains(marker) {
            continue;
        }

        match first_link_text(row) {
            Some(name) => names.push(name.to_string()),
            None => debug!(offset = row_start, "Failed row has no readable link"),
        }
    }

    names
}

fn first_link_text(row: &str) -> Option<&str> {
    let link = row.find(LINK_START)?;
    let end = find_from(row, LINK_END, link)?;
    let text_start = find_from(&row[..end], ">", link)? + 1;
    let text = row[text_start..end].trim();
    (!text.is_empty()).then_some(text)
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|i| i + from)
}
