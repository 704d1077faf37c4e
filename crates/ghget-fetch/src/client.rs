use std::future::Future;

use ghget_model::{ReleaseInfo, RepositoryId, RepositorySearchResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::EtagCache;
use crate::error::{FetchError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::rate;
use crate::wire::{WireRelease, WireSearch};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com/";
pub const DEFAULT_USER_AGENT: &str = "ghget/0.1";

/// How many recent releases are inspected when prereleases are allowed.
pub const PRERELEASE_WINDOW: u32 = 10;

const ACCEPT: &str = "application/vnd.github+json";
const MAX_SEARCH_RESULTS: u32 = 50;

/// Read-only queries against a release API.
pub trait ReleaseSource: Send + Sync {
    /// Latest qualifying release, or `None` if the repository has none.
    ///
    /// With `include_prerelease`, the most recent releases are scanned and
    /// the first stable one wins, then the first non-draft, then whatever
    /// came first.
    fn latest_release(
        &self,
        repository: &RepositoryId,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<ReleaseInfo>>> + Send;

    fn recent_releases(
        &self,
        repository: &RepositoryId,
        count: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<ReleaseInfo>>> + Send;

    fn search_repositories(
        &self,
        keyword: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<RepositorySearchResult>>> + Send;

    /// Whether requests carry a credential.
    fn has_token(&self) -> bool;
}

impl<T: ReleaseSource> ReleaseSource for &T {
    fn latest_release(
        &self,
        repository: &RepositoryId,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<ReleaseInfo>>> + Send {
        (**self).latest_release(repository, include_prerelease, cancel)
    }

    fn recent_releases(
        &self,
        repository: &RepositoryId,
        count: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<ReleaseInfo>>> + Send {
        (**self).recent_releases(repository, count, cancel)
    }

    fn search_repositories(
        &self,
        keyword: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<RepositorySearchResult>>> + Send {
        (**self).search_repositories(keyword, count, cancel)
    }

    fn has_token(&self) -> bool {
        (**self).has_token()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub token: Option<String>,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Picks the preferred release out of a newest-first list.
pub(crate) fn pick_latest(releases: Vec<ReleaseInfo>) -> Option<ReleaseInfo> {
    let idx = releases
        .iter()
        .position(ReleaseInfo::is_stable)
        .or_else(|| releases.iter().position(|r| !r.draft))
        .or(if releases.is_empty() { None } else { Some(0) })?;
    releases.into_iter().nth(idx)
}

/// Release API client over any [`HttpClient`], with every GET made
/// conditional on the ETag cached for its URL.
pub struct GitHubClient<C, K> {
    http: C,
    cache: K,
    base_url: String,
    token: Option<String>,
    user_agent: String,
}

impl<C: HttpClient, K: EtagCache> GitHubClient<C, K> {
    pub fn new(http: C, cache: K, options: ClientOptions) -> Self {
        let mut base_url = options.base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let token = options
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self {
            http,
            cache,
            base_url,
            token,
            user_agent: options.user_agent,
        }
    }

    pub fn cache(&self) -> &K {
        &self.cache
    }

    fn repo_url(&self, repository: &RepositoryId, tail: &str) -> String {
        format!(
            "{}repos/{}/{}/{}",
            self.base_url,
            urlencoding::encode(&repository.owner),
            urlencoding::encode(&repository.repo),
            tail
        )
    }

    fn headers(&self, url: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept".to_string(), ACCEPT.to_string()),
        ];
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        match self.cache.get_etag(url) {
            Ok(Some(etag)) if !etag.trim().is_empty() => {
                headers.push(("If-None-Match".to_string(), etag));
            }
            Ok(_) => {}
            Err(err) => warn!(url, error = %err, "etag cache read failed"),
        }
        headers
    }

    async fn send(&self, url: &str, cancel: &CancellationToken) -> Result<HttpResponse> {
        let headers = self.headers(url);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.http.get(url, &headers) => response.map_err(FetchError::network)?,
        };
        debug!(url, status = response.status, "api response");

        if let Some(etag) = response.header("etag") {
            if let Err(err) = self.cache.set_etag(url, etag) {
                warn!(url, error = %err, "etag cache write failed");
            }
        }
        Ok(response)
    }

    /// `Ok(None)` for the "no data" statuses, the response for success and
    /// a typed error for everything else.
    fn check(&self, url: &str, response: HttpResponse) -> Result<Option<HttpResponse>> {
        if matches!(response.status, 304 | 404) {
            return Ok(None);
        }
        if response.is_success() {
            return Ok(Some(response));
        }
        if let Some(limited) = rate::classify(&response, self.token.is_some()) {
            warn!(url, reset_at = ?limited.reset_at, "rate limited");
            return Err(limited.into());
        }
        Err(FetchError::Status {
            status: response.status,
            url: url.to_string(),
        })
    }
}

impl<C: HttpClient, K: EtagCache> ReleaseSource for GitHubClient<C, K> {
    async fn latest_release(
        &self,
        repository: &RepositoryId,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<ReleaseInfo>> {
        if include_prerelease {
            let releases = self
                .recent_releases(repository, PRERELEASE_WINDOW, cancel)
                .await?;
            return Ok(pick_latest(releases));
        }

        let url = self.repo_url(repository, "releases/latest");
        let response = self.send(&url, cancel).await?;
        let Some(response) = self.check(&url, response)? else {
            return Ok(None);
        };

        let wire: WireRelease = serde_json::from_slice(&response.body)
            .map_err(|source| FetchError::Malformed { url, source })?;
        Ok(Some(wire.into()))
    }

    async fn recent_releases(
        &self,
        repository: &RepositoryId,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReleaseInfo>> {
        let url = self.repo_url(repository, &format!("releases?per_page={count}"));
        let response = self.send(&url, cancel).await?;
        let Some(response) = self.check(&url, response)? else {
            return Ok(Vec::new());
        };

        let value: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|source| FetchError::Malformed {
                url: url.clone(),
                source,
            })?;
        if !value.is_array() {
            return Ok(Vec::new());
        }
        let wire: Vec<WireRelease> = serde_json::from_value(value)
            .map_err(|source| FetchError::Malformed { url, source })?;
        Ok(wire.into_iter().map(ReleaseInfo::from).collect())
    }

    async fn search_repositories(
        &self,
        keyword: &str,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<RepositorySearchResult>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let count = count.clamp(1, MAX_SEARCH_RESULTS);
        let url = format!(
            "{}search/repositories?q={}&sort=updated&order=desc&per_page={count}",
            self.base_url,
            urlencoding::encode(keyword)
        );
        let response = self.send(&url, cancel).await?;
        let Some(response) = self.check(&url, response)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_slice::<WireSearch>(&response.body) {
            Ok(search) => Ok(search.into_results()),
            Err(err) => {
                warn!(url, error = %err, "malformed search response");
                Ok(Vec::new())
            }
        }
    }

    fn has_token(&self) -> bool {
        self.token.is_some()
    }
}
