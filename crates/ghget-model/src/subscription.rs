use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::install::InstallKind;
use crate::lenient;
use crate::release::RepositoryId;
use crate::rules::AssetRuleSet;

pub const DEFAULT_TIMEOUT_SECS: u32 = 1800;
pub const MIN_TIMEOUT_SECS: u32 = 1;
pub const MAX_TIMEOUT_SECS: u32 = 86_400;

/// How a selected artifact is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    pub kind: InstallKind,
    pub silent_args: Option<String>,
    pub msi_args: Option<String>,
    pub require_admin: bool,
    pub timeout_secs: u32,
    pub allow_reboot: bool,
    pub expected_publisher: Option<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            kind: InstallKind::Auto,
            silent_args: None,
            msi_args: None,
            require_admin: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            allow_reboot: false,
            expected_publisher: None,
        }
    }
}

/// Optional script run between download and install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreInstallScript {
    pub enabled: bool,
    /// Absolute, or relative to the scripts root. `None` selects the
    /// per-project default.
    pub path: Option<String>,
    pub args: Option<String>,
    pub require_admin: bool,
}

/// A tracked upstream repository together with its selection and install
/// policy and the bookkeeping of what was last seen.
///
/// The id is stable; changing owner/repo does not create a new subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub include_prerelease: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub asset_rules: AssetRuleSet,
    #[serde(default)]
    pub install: InstallSettings,
    #[serde(default)]
    pub pre_install: PreInstallScript,
    #[serde(default)]
    pub last_seen_release_id: Option<i64>,
    #[serde(default)]
    pub last_seen_tag: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// A new subscription with default policy and a fresh id.
    pub fn new(repository: RepositoryId) -> Self {
        Self {
            id: crate::new_id(),
            owner: repository.owner,
            repo: repository.repo,
            display_name: None,
            include_prerelease: false,
            asset_rules: AssetRuleSet::default(),
            install: InstallSettings::default(),
            pre_install: PreInstallScript::default(),
            last_seen_release_id: None,
            last_seen_tag: None,
            last_checked_at: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(ModelError::EmptyOwner);
        }
        if self.repo.trim().is_empty() {
            return Err(ModelError::EmptyRepo);
        }
        let timeout = self.install.timeout_secs;
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            return Err(ModelError::TimeoutOutOfRange {
                min: MIN_TIMEOUT_SECS,
                max: MAX_TIMEOUT_SECS,
                actual: timeout,
            });
        }
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn display_title(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.full_name(),
        }
    }

    pub fn repository_id(&self) -> Result<RepositoryId> {
        RepositoryId::new(self.owner.as_str(), self.repo.as_str())
    }

    /// Whether `release_id`/`tag` are exactly what was last recorded.
    ///
    /// Both must match: a moved tag with the same id, or a new id with the
    /// same tag, counts as a new release.
    pub fn has_seen(&self, release_id: i64, tag: &str) -> bool {
        self.last_seen_release_id == Some(release_id) && self.last_seen_tag.as_deref() == Some(tag)
    }

    pub fn with_last_seen(&self, release_id: i64, tag: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            last_seen_release_id: Some(release_id),
            last_seen_tag: Some(tag.into()),
            last_checked_at: Some(checked_at),
            ..self.clone()
        }
    }

    pub fn with_last_checked(&self, checked_at: DateTime<Utc>) -> Self {
        Self {
            last_checked_at: Some(checked_at),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subscription {
        Subscription::new(RepositoryId::parse("octo/widget").unwrap())
    }

    #[test]
    fn test_defaults() {
        let sub = sample();
        assert_eq!(sub.id.len(), 32);
        assert!(sub.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(sub.install.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(sub.install.kind, InstallKind::Auto);
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut sub = sample();
        sub.install.timeout_secs = 0;
        assert!(matches!(sub.validate(), Err(ModelError::TimeoutOutOfRange { actual: 0, .. })));
        sub.install.timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(sub.validate().is_err());
        sub.install.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_identity() {
        let mut sub = sample();
        sub.repo = " ".into();
        assert_eq!(sub.validate(), Err(ModelError::EmptyRepo));
    }

    #[test]
    fn test_display_title_falls_back_to_full_name() {
        let mut sub = sample();
        assert_eq!(sub.display_title(), "octo/widget");
        sub.display_name = Some("  ".into());
        assert_eq!(sub.display_title(), "octo/widget");
        sub.display_name = Some("Widget".into());
        assert_eq!(sub.display_title(), "Widget");
    }

    #[test]
    fn test_with_last_seen_returns_new_value() {
        let sub = sample();
        let now = Utc::now();
        let seen = sub.with_last_seen(7, "v7", now);
        assert_eq!(sub.last_seen_release_id, None);
        assert_eq!(seen.last_seen_release_id, Some(7));
        assert_eq!(seen.last_checked_at, Some(now));
        assert!(seen.has_seen(7, "v7"));
        assert!(!seen.has_seen(7, "v8"));
        assert!(!seen.has_seen(8, "v7"));
    }

    #[test]
    fn test_decodes_older_records() {
        let json = r#"{"id":"abc","owner":"o","repo":"r","asset_rules":42,"install":{"kind":"Bogus"}}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.asset_rules, AssetRuleSet::default());
        assert_eq!(sub.install.kind, InstallKind::Auto);
        assert_eq!(sub.install.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!sub.pre_install.enabled);
    }
}
