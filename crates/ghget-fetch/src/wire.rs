//! JSON payloads of the release API and their conversion into domain types.

use chrono::{DateTime, Utc};
use ghget_model::{ReleaseAsset, ReleaseInfo, RepositoryId, RepositorySearchResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct WireRelease {
    id: i64,
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Option<Vec<WireAsset>>,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    browser_download_url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSearch {
    #[serde(default)]
    items: Vec<WireRepository>,
}

#[derive(Debug, Deserialize)]
struct WireRepository {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner: Option<WireOwner>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireOwner {
    #[serde(default)]
    login: Option<String>,
}

fn parse_published(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl From<WireRelease> for ReleaseInfo {
    fn from(wire: WireRelease) -> Self {
        ReleaseInfo {
            id: wire.id,
            tag_name: wire.tag_name.unwrap_or_default(),
            name: wire.name,
            published_at: parse_published(wire.published_at.as_deref()),
            prerelease: wire.prerelease,
            draft: wire.draft,
            html_url: wire.html_url.unwrap_or_default(),
            body: wire.body,
            assets: wire
                .assets
                .unwrap_or_default()
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    size: a.size,
                    download_url: a.browser_download_url.unwrap_or_default(),
                    content_type: a.content_type,
                })
                .collect(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl WireRepository {
    /// `None` when neither the owner object nor `full_name` yield an
    /// owner and repo.
    fn into_result(self) -> Option<RepositorySearchResult> {
        let full_name = non_blank(self.full_name);
        let mut repo = non_blank(self.name);
        let mut owner = non_blank(self.owner.and_then(|o| o.login));

        if owner.is_none() {
            if let Some(parsed) = full_name.as_deref().and_then(|f| RepositoryId::parse(f).ok()) {
                owner = Some(parsed.owner);
                repo = repo.or(Some(parsed.repo));
            }
        }

        let (owner, repo) = (owner?, repo?);
        Some(RepositorySearchResult {
            full_name: full_name.unwrap_or_else(|| format!("{owner}/{repo}")),
            owner,
            repo,
            description: self.description,
            html_url: self.html_url,
        })
    }
}

impl WireSearch {
    pub(crate) fn into_results(self) -> Vec<RepositorySearchResult> {
        self.items
            .into_iter()
            .filter_map(WireRepository::into_result)
            .collect()
    }
}
