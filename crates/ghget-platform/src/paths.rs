//! On-disk layout of a ghget data directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replaces characters that are invalid in a file name with `_`. Returns
/// `fallback` when nothing usable remains.
pub fn sanitize_segment(value: &str, fallback: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the per-user data directory.
    pub fn default_location() -> Result<Self> {
        crate::dir::app_data().map(Self::new).ok_or(Error::NoDataDir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("ghget.db")
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.join("cache").join("downloads")
    }

    pub fn scripts(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Default pre-install script for a project.
    pub fn project_script_path(&self, owner: &str, repo: &str) -> PathBuf {
        let file = if cfg!(windows) { "install.ps1" } else { "install.sh" };
        self.scripts()
            .join("projects")
            .join(sanitize_segment(owner, "unknown"))
            .join(sanitize_segment(repo, "unknown"))
            .join(file)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.downloads(), self.scripts(), self.logs()] {
            fs::create_dir_all(&dir).map_err(|source| Error::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        tracing::debug!(root = %self.root.display(), "data directories ready");
        Ok(())
    }
}
