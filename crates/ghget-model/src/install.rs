use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::UpdateState;

/// How a downloaded artifact gets installed.
///
/// `Auto` defers to whatever the selector infers from the file name.
/// `None` means the artifact is only downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InstallKind {
    #[default]
    Auto,
    Msix,
    Msi,
    Exe,
    None,
}

impl InstallKind {
    pub const ALL: [InstallKind; 5] = [Self::Auto, Self::Msix, Self::Msi, Self::Exe, Self::None];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Msix => "Msix",
            Self::Msi => "Msi",
            Self::Exe => "Exe",
            Self::None => "None",
        }
    }

    /// Case-insensitive reverse of [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Infers the mechanism from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Self {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".msixbundle") || lower.ends_with(".msix") {
            Self::Msix
        } else if lower.ends_with(".msi") {
            Self::Msi
        } else if lower.ends_with(".exe") {
            Self::Exe
        } else {
            Self::Auto
        }
    }
}

impl fmt::Display for InstallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstallKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstallKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw).unwrap_or_default())
    }
}

/// Outcome of one external process invocation (script or installer).
///
/// Failures of the process itself are represented here, never as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message: Option<String>,
}

impl ProcessResult {
    /// A result for a process that never produced an exit code.
    pub fn failed(started_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            stdout: None,
            stderr: None,
            started_at,
            ended_at: Utc::now(),
            message: Some(message.into()),
        }
    }
}

pub type ScriptResult = ProcessResult;
pub type InstallResult = ProcessResult;

/// Values exposed to a pre-install script through its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    pub downloaded_file_path: PathBuf,
    pub download_directory: PathBuf,
    pub release_tag: String,
    pub release_title: Option<String>,
    pub release_url: String,
    pub subscription_id: String,
    pub subscription_name: String,
}

impl ScriptContext {
    pub const DOWNLOAD_PATH: &'static str = "GHGET_DOWNLOAD_PATH";
    pub const DOWNLOAD_DIR: &'static str = "GHGET_DOWNLOAD_DIR";
    pub const RELEASE_TAG: &'static str = "GHGET_RELEASE_TAG";
    pub const RELEASE_TITLE: &'static str = "GHGET_RELEASE_TITLE";
    pub const RELEASE_URL: &'static str = "GHGET_RELEASE_URL";
    pub const SUBSCRIPTION_ID: &'static str = "GHGET_SUBSCRIPTION_ID";
    pub const SUBSCRIPTION_NAME: &'static str = "GHGET_SUBSCRIPTION_NAME";

    /// Environment variable bindings, in a stable order.
    pub fn env_bindings(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::DOWNLOAD_PATH, path_string(&self.downloaded_file_path)),
            (Self::DOWNLOAD_DIR, path_string(&self.download_directory)),
            (Self::RELEASE_TAG, self.release_tag.clone()),
            (
                Self::RELEASE_TITLE,
                self.release_title.clone().unwrap_or_default(),
            ),
            (Self::RELEASE_URL, self.release_url.clone()),
            (Self::SUBSCRIPTION_ID, self.subscription_id.clone()),
            (Self::SUBSCRIPTION_NAME, self.subscription_name.clone()),
        ]
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A fully resolved pre-install script invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    pub script_path: PathBuf,
    pub args: Option<String>,
    pub require_admin: bool,
    pub timeout: Duration,
    pub context: ScriptContext,
}

/// A fully resolved installer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub file_path: PathBuf,
    pub kind: InstallKind,
    pub args: Option<String>,
    pub require_admin: bool,
    pub timeout: Duration,
    pub allow_reboot: bool,
    pub expected_publisher: Option<String>,
}

/// What the install pipeline did for one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub state: UpdateState,
    pub downloaded_file_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub script_result: Option<ScriptResult>,
    pub install_result: Option<InstallResult>,
    pub message: Option<String>,
}

impl PipelineResult {
    pub fn new(state: UpdateState) -> Self {
        Self {
            state,
            downloaded_file_path: None,
            script_path: None,
            script_result: None,
            install_result: None,
            message: None,
        }
    }
}
