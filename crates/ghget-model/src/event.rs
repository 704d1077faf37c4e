use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::install::{PipelineResult, ProcessResult};
use crate::lenient;
use crate::release::{ReleaseInfo, SelectedAsset};

/// Captured process output is cut to this many characters before it is stored.
pub const MAX_LOG_CHARS: usize = 32_768;

/// Progress of one detected release through notification and installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpdateState {
    #[default]
    New,
    Notified,
    Downloaded,
    Installed,
    Failed,
}

impl UpdateState {
    pub const ALL: [UpdateState; 5] = [
        Self::New,
        Self::Notified,
        Self::Downloaded,
        Self::Installed,
        Self::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Notified => "Notified",
            Self::Downloaded => "Downloaded",
            Self::Installed => "Installed",
            Self::Failed => "Failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(name))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed)
    }

    pub fn can_transition_to(self, next: UpdateState) -> bool {
        use UpdateState::*;
        matches!(
            (self, next),
            (New, Notified | Downloaded | Installed | Failed)
                | (Notified, Downloaded | Installed | Failed)
                | (Downloaded, Installed | Failed)
        )
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UpdateState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw).unwrap_or_default())
    }
}

/// Truncates `text` to at most `max_chars` characters.
pub fn truncate_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn truncate_opt(text: Option<&str>) -> Option<String> {
    text.map(|t| truncate_log(t, MAX_LOG_CHARS))
}

/// Persisted audit record of one detected release, and of the install
/// pipeline run for it when there was one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub id: String,
    pub subscription_id: String,
    pub release_id: i64,
    pub tag: String,
    #[serde(default)]
    pub title: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub selected_asset: Option<SelectedAsset>,
    #[serde(default)]
    pub downloaded_file_path: Option<String>,
    #[serde(default)]
    pub script_path: Option<String>,
    #[serde(default)]
    pub script_exit_code: Option<i32>,
    #[serde(default)]
    pub script_stdout: Option<String>,
    #[serde(default)]
    pub script_stderr: Option<String>,
    #[serde(default)]
    pub install_exit_code: Option<i32>,
    #[serde(default)]
    pub install_stdout: Option<String>,
    #[serde(default)]
    pub install_stderr: Option<String>,
    #[serde(default)]
    pub processing_message: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: UpdateState,
    pub created_at: DateTime<Utc>,
}

impl UpdateEvent {
    /// A fresh `New` event for `release`.
    pub fn new(
        subscription_id: impl Into<String>,
        release: &ReleaseInfo,
        selected_asset: Option<SelectedAsset>,
    ) -> Self {
        Self {
            id: crate::new_id(),
            subscription_id: subscription_id.into(),
            release_id: release.id,
            tag: release.tag_name.clone(),
            title: release.name.clone(),
            published_at: release.published_at,
            html_url: release.html_url.clone(),
            body: release.body.clone(),
            selected_asset,
            downloaded_file_path: None,
            script_path: None,
            script_exit_code: None,
            script_stdout: None,
            script_stderr: None,
            install_exit_code: None,
            install_stdout: None,
            install_stderr: None,
            processing_message: None,
            processed_at: None,
            state: UpdateState::New,
            created_at: Utc::now(),
        }
    }

    /// Folds a pipeline outcome into a copy of this event. Captured output
    /// is truncated to [`MAX_LOG_CHARS`].
    pub fn with_pipeline_result(&self, result: &PipelineResult, processed_at: DateTime<Utc>) -> Self {
        let script = result.script_result.as_ref();
        let install = result.install_result.as_ref();
        Self {
            downloaded_file_path: result.downloaded_file_path.as_deref().map(display_path),
            script_path: result.script_path.as_deref().map(display_path),
            script_exit_code: script.and_then(|r| r.exit_code),
            script_stdout: truncate_opt(script.and_then(|r| r.stdout.as_deref())),
            script_stderr: truncate_opt(script.and_then(|r| r.stderr.as_deref())),
            install_exit_code: install.and_then(|r| r.exit_code),
            install_stdout: truncate_opt(install.and_then(|r| r.stdout.as_deref())),
            install_stderr: truncate_opt(install.and_then(|r| r.stderr.as_deref())),
            processing_message: result
                .message
                .clone()
                .or_else(|| process_message(install).or_else(|| process_message(script))),
            processed_at: Some(processed_at),
            state: result.state,
            ..self.clone()
        }
    }

    /// Marks the event as failed without any pipeline output.
    pub fn with_failure(&self, message: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            processing_message: Some(message.into()),
            processed_at: Some(processed_at),
            state: UpdateState::Failed,
            ..self.clone()
        }
    }

    pub fn with_state(&self, state: UpdateState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

fn process_message(result: Option<&ProcessResult>) -> Option<String> {
    result.and_then(|r| r.message.clone())
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::install::InstallKind;
    use crate::release::ReleaseAsset;

    fn release() -> ReleaseInfo {
        ReleaseInfo {
            id: 42,
            tag_name: "v2.0.0".into(),
            name: Some("Two".into()),
            published_at: DateTime::<Utc>::UNIX_EPOCH,
            prerelease: false,
            draft: false,
            html_url: "https://example.invalid/r/42".into(),
            body: Some("notes".into()),
            assets: vec![],
        }
    }

    #[test]
    fn test_transitions() {
        use UpdateState::*;
        assert!(New.can_transition_to(Notified));
        assert!(New.can_transition_to(Failed));
        assert!(Notified.can_transition_to(Installed));
        assert!(Downloaded.can_transition_to(Failed));
        assert!(!Notified.can_transition_to(New));
        assert!(!Downloaded.can_transition_to(Notified));
        for next in UpdateState::ALL {
            assert!(!Installed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Installed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_truncate_log_counts_chars() {
        assert_eq!(truncate_log("héllo", 2), "hé");
        assert_eq!(truncate_log("abc", 10), "abc");
        assert_eq!(truncate_log("", 0), "");
        let long = "é".repeat(MAX_LOG_CHARS + 5);
        assert_eq!(truncate_log(&long, MAX_LOG_CHARS).chars().count(), MAX_LOG_CHARS);
    }

    #[test]
    fn test_new_event_copies_release() {
        let event = UpdateEvent::new("sub", &release(), None);
        assert_eq!(event.state, UpdateState::New);
        assert_eq!(event.release_id, 42);
        assert_eq!(event.tag, "v2.0.0");
        assert_eq!(event.id.len(), 32);
    }

    #[test]
    fn test_pipeline_result_truncates_output() {
        let event = UpdateEvent::new("sub", &release(), None);
        let now = Utc::now();
        let mut result = PipelineResult::new(UpdateState::Installed);
        result.downloaded_file_path = Some(PathBuf::from("/d/app.msi"));
        result.install_result = Some(ProcessResult {
            succeeded: true,
            exit_code: Some(0),
            stdout: Some("x".repeat(MAX_LOG_CHARS * 2)),
            stderr: None,
            started_at: now,
            ended_at: now,
            message: Some("Installer completed.".into()),
        });

        let folded = event.with_pipeline_result(&result, now);
        assert_eq!(folded.state, UpdateState::Installed);
        assert_eq!(folded.install_exit_code, Some(0));
        assert_eq!(folded.install_stdout.as_ref().map(String::len), Some(MAX_LOG_CHARS));
        assert_eq!(folded.processing_message.as_deref(), Some("Installer completed."));
        assert_eq!(folded.downloaded_file_path.as_deref(), Some("/d/app.msi"));
        assert_eq!(folded.id, event.id);
    }

    #[test]
    fn test_malformed_selected_asset_decodes_to_none() {
        let event = UpdateEvent::new(
            "sub",
            &release(),
            Some(SelectedAsset {
                asset: ReleaseAsset {
                    name: "a.msi".into(),
                    size: 1,
                    download_url: "u".into(),
                    content_type: None,
                },
                install_kind: InstallKind::Msi,
                score: 300,
            }),
        );
        let mut value = serde_json::to_value(&event).unwrap();
        value["selected_asset"] = serde_json::json!({"nonsense": true});
        value["state"] = serde_json::json!("Exploded");

        let decoded: UpdateEvent = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.selected_asset, None);
        assert_eq!(decoded.state, UpdateState::New);
    }
}
