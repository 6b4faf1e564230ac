//! GitHub collaborator: the only place network I/O happens.
//!
//! [`ReleaseHost`] is the seam the pipeline depends on; [`GitHubClient`] is
//! the reqwest-backed implementation. Error policy follows the run contract:
//! 404 on optional resources recovers locally, a rate-limit answer waits for
//! the advertised reset and retries exactly once, everything else is a
//! transport fault that aborts the run.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mockall::automock;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::config::OrgConfig;
use crate::model::{RawRelease, RawRepository, Release, RepositoryRef};

/// Release archives are selected by filename suffix before extraction.
pub const ARCHIVE_SUFFIX: &str = ".zip";

const PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("resource not found: {url}")]
    NotFound { url: String },
    #[error("rate limit persisted after back-off: {url}")]
    RateLimited { url: String },
    #[error("unexpected HTTP status {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Everything the pipeline needs from the hosting side, mockable for tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Ordered list of all public repositories of the organization.
    async fn org_repos(&self) -> Result<Vec<RepositoryRef>, FetchError>;

    /// Non-draft releases of one repository, newest first, archive assets only.
    async fn releases(&self, repo: &RepositoryRef) -> Result<Vec<Release>, FetchError>;

    /// Raw `dependencies.txt` of one repository; `None` if the file does not exist.
    async fn manifest_text(&self, repo: &RepositoryRef) -> Result<Option<String>, FetchError>;

    /// Raw bytes of one release asset; `None` if the asset is gone.
    async fn asset_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError>;
}

pub struct GitHubClient {
    http: reqwest::Client,
    org: OrgConfig,
    /// Serializes back-off sleeps so concurrent callers never stack waits.
    backoff: Mutex<()>,
}

impl GitHubClient {
    pub fn new(org: OrgConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("oam-index/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            org,
            backoff: Mutex::new(()),
        })
    }

    fn repos_page_url(&self, page: usize) -> String {
        format!(
            "{}/orgs/{}/repos?per_page={}&type=public&page={}",
            self.org.api_base_url, self.org.org_name, PER_PAGE, page
        )
    }

    fn manifest_url(&self, repo: &RepositoryRef) -> String {
        format!(
            "{}/{}/{}/{}/dependencies.txt",
            self.org.raw_base_url, self.org.org_name, repo.name, repo.default_branch
        )
    }

    /// One GET with the shared rate-limit policy applied.
    async fn get_with_backoff(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.http.get(url).send().await?;
        if !is_rate_limited(&response) {
            return Ok(response);
        }

        // The deadline is fixed at response time; how long a caller actually
        // sleeps depends on how much of the window passed while it queued.
        let deadline = Instant::now() + reset_wait(&response);
        self.backoff_until(url, deadline).await;

        let retried = self.http.get(url).send().await?;
        ensure_not_rate_limited(retried, url)
    }

    /// Sleep until `deadline`, serialized with every other back-off. Parallel
    /// fetch tasks hitting the limit together share one window: a caller whose
    /// deadline elapsed while it waited for the lock returns immediately.
    async fn backoff_until(&self, url: &str, deadline: Instant) {
        let _guard = self.backoff.lock().await;
        let wait = deadline.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            return;
        }
        warn!(url = %url, wait_secs = wait.as_secs(), "Rate limit exceeded; backing off");
        sleep_until(deadline).await;
    }

    async fn get_required(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.get_with_backoff(url).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_optional(&self, url: &str) -> Result<Option<Response>, FetchError> {
        let response = self.get_with_backoff(url).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(url = %url, "404 Not Found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(Some(response))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.get_required(url).await?;
        Ok(response.json().await?)
    }
}

/// A second rate-limit answer after the back-off is a transport fault.
fn ensure_not_rate_limited(response: Response, url: &str) -> Result<Response, FetchError> {
    if is_rate_limited(&response) {
        return Err(FetchError::RateLimited {
            url: url.to_string(),
        });
    }
    Ok(response)
}

fn is_rate_limited(response: &Response) -> bool {
    let status = response.status();
    (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
        && response.headers().contains_key("x-ratelimit-reset")
}

/// Time until the advertised reset, plus a safety margin of 5 seconds.
fn reset_wait(response: &Response) -> Duration {
    let reset = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Duration::from_secs(reset.saturating_sub(now) + 5)
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn org_repos(&self) -> Result<Vec<RepositoryRef>, FetchError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            info!(page, "Repo-list: reading page");
            let batch: Vec<RawRepository> = self.get_json(&self.repos_page_url(page)).await?;
            let last_page = batch.len() < PER_PAGE;
            all.extend(batch.into_iter().map(RawRepository::into_ref));
            if last_page {
                break;
            }
            page += 1;
        }
        info!(repos = all.len(), pages = page, "Repo-list complete");
        Ok(all)
    }

    async fn releases(&self, repo: &RepositoryRef) -> Result<Vec<Release>, FetchError> {
        info!(repo = %repo.name, url = %repo.releases_url, "Fetching release data");
        let raw: Vec<RawRelease> = self.get_json(&repo.releases_url).await?;
        Ok(raw
            .into_iter()
            .filter(|r| !r.draft)
            .map(|r| r.into_release(ARCHIVE_SUFFIX))
            .collect())
    }

    async fn manifest_text(&self, repo: &RepositoryRef) -> Result<Option<String>, FetchError> {
        let url = self.manifest_url(repo);
        match self.get_optional(&url).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    async fn asset_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        match self.get_optional(url).await? {
            Some(response) => Ok(Some(response.bytes().await?.to_vec())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrgConfig;

    fn client() -> GitHubClient {
        GitHubClient::new(OrgConfig::default()).expect("client builds")
    }

    #[test]
    fn repos_page_url_is_paginated_and_public() {
        let url = client().repos_page_url(3);
        assert_eq!(
            url,
            "https://api.github.com/orgs/OpenKNX/repos?per_page=100&type=public&page=3"
        );
    }

    #[test]
    fn manifest_url_uses_default_branch() {
        let repo = RepositoryRef {
            name: "OAM-LogicModule".into(),
            default_branch: "v1".into(),
            archived: false,
            description: None,
            releases_url: String::new(),
            html_url: String::new(),
        };
        assert_eq!(
            client().manifest_url(&repo),
            "https://raw.githubusercontent.com/OpenKNX/OAM-LogicModule/v1/dependencies.txt"
        );
    }

    fn rate_limit_response(status: StatusCode, reset: Option<&str>) -> Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(reset) = reset {
            builder = builder.header("x-ratelimit-reset", reset);
        }
        builder.body("").expect("response builds").into()
    }

    #[test]
    fn rate_limit_detection_requires_status_and_reset_header() {
        assert!(is_rate_limited(&rate_limit_response(
            StatusCode::FORBIDDEN,
            Some("0")
        )));
        assert!(is_rate_limited(&rate_limit_response(
            StatusCode::TOO_MANY_REQUESTS,
            Some("0")
        )));
        assert!(!is_rate_limited(&rate_limit_response(
            StatusCode::FORBIDDEN,
            None
        )));
        assert!(!is_rate_limited(&rate_limit_response(
            StatusCode::OK,
            Some("0")
        )));
    }

    #[test]
    fn reset_wait_adds_the_safety_margin() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs();
        let response = rate_limit_response(
            StatusCode::TOO_MANY_REQUESTS,
            Some(&(now + 100).to_string()),
        );
        let wait = reset_wait(&response).as_secs();
        assert!((100..=105).contains(&wait), "wait was {wait}s");
    }

    #[test]
    fn reset_wait_is_only_the_margin_for_an_elapsed_window() {
        let response = rate_limit_response(StatusCode::TOO_MANY_REQUESTS, Some("0"));
        assert_eq!(reset_wait(&response), Duration::from_secs(5));
    }

    #[test]
    fn persisting_rate_limit_answer_is_a_fault() {
        let retried = rate_limit_response(StatusCode::TOO_MANY_REQUESTS, Some("0"));
        let result = ensure_not_rate_limited(retried, "https://api.github.com/x");
        assert!(
            matches!(result, Err(FetchError::RateLimited { url }) if url == "https://api.github.com/x")
        );
    }

    #[test]
    fn clean_retry_passes_through() {
        let retried = rate_limit_response(StatusCode::OK, None);
        assert!(ensure_not_rate_limited(retried, "https://api.github.com/x").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_backoff_shares_one_wait_window() {
        let client = client();
        let deadline = Instant::now() + Duration::from_secs(10);
        let start = Instant::now();
        tokio::join!(
            client.backoff_until("https://api.github.com/a", deadline),
            client.backoff_until("https://api.github.com/b", deadline),
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(
            elapsed < Duration::from_secs(11),
            "a caller queued behind the sleep must not re-sleep an elapsed window, waited {elapsed:?}"
        );
    }
}
