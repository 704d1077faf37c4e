use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::install::InstallKind;

/// An `owner/repo` pair identifying an upstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub repo: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let owner = owner.into().trim().to_string();
        let repo = repo.into().trim().to_string();
        if owner.is_empty() {
            return Err(ModelError::EmptyOwner);
        }
        if repo.is_empty() {
            return Err(ModelError::EmptyRepo);
        }
        Ok(Self { owner, repo })
    }

    /// Parses `owner/repo`. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ModelError::EmptyRepository);
        }

        let mut parts = input.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.trim().is_empty() && !repo.trim().is_empty() => {
                Self::new(owner, repo)
            }
            _ => Err(ModelError::InvalidRepository(input.to_string())),
        }
    }
}

impl FromStr for RepositoryId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub download_url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Point-in-time snapshot of a published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub id: i64,
    pub tag_name: String,
    pub name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub prerelease: bool,
    pub draft: bool,
    pub html_url: String,
    pub body: Option<String>,
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    /// Title if present and non-blank.
    pub fn title(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySearchResult {
    pub owner: String,
    pub repo: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: Option<String>,
}

/// The asset chosen by the selector, with its inferred install mechanism
/// and winning score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAsset {
    pub asset: ReleaseAsset,
    pub install_kind: InstallKind,
    pub score: i32,
}
