use futures_util::{StreamExt, stream};
use ghget_fetch::ReleaseSource;
use ghget_model::{ReleaseInfo, RepositoryId, RepositorySearchResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub repository: RepositorySearchResult,
    pub release: ReleaseInfo,
}

/// Searches repositories, then looks up each one's latest release with at
/// most `max_concurrent` lookups in flight.
///
/// Repositories without a release are dropped, as are lookups that fail for
/// any reason other than rate limiting. The first rate-limit failure drops
/// every outstanding lookup and is returned. Hits are ordered by full name,
/// ignoring case.
pub async fn search_with_releases<R: ReleaseSource>(
    source: &R,
    keyword: &str,
    count: u32,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> Result<Vec<SearchHit>> {
    let repositories = source.search_repositories(keyword, count, cancel).await?;

    let mut lookups = stream::iter(repositories)
        .map(|repository| async move {
            let release = match RepositoryId::new(repository.owner.as_str(), repository.repo.as_str()) {
                Ok(id) => source.latest_release(&id, true, cancel).await,
                Err(_) => Ok(None),
            };
            (repository, release)
        })
        .buffer_unordered(max_concurrent.max(1));

    let mut hits = Vec::new();
    while let Some((repository, release)) = lookups.next().await {
        match release {
            Ok(Some(release)) => hits.push(SearchHit { repository, release }),
            Ok(None) => {}
            Err(err) if err.rate_limit().is_some() || err.is_cancelled() => return Err(err.into()),
            Err(err) => debug!(repository = %repository.full_name, error = %err, "release lookup failed"),
        }
    }

    hits.sort_by_cached_key(|hit| hit.repository.full_name.to_lowercase());
    Ok(hits)
}
