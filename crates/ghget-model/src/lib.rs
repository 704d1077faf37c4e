//! Domain types shared by every ghget crate.
//!
//! Everything in here is plain data: subscriptions and their policies,
//! release snapshots from the upstream API, selection results, pipeline
//! requests/results and the persisted [`UpdateEvent`] audit record.
//!
//! Values are treated as immutable. Updates go through `with_*` methods that
//! return a new value instead of mutating in place.

mod error;
mod event;
mod install;
mod lenient;
mod release;
mod rules;
mod subscription;

pub use error::{ModelError, Result};
pub use event::{MAX_LOG_CHARS, UpdateEvent, UpdateState, truncate_log};
pub use install::{
    InstallKind, InstallRequest, InstallResult, PipelineResult, ProcessResult, ScriptContext,
    ScriptRequest, ScriptResult,
};
pub use release::{ReleaseAsset, ReleaseInfo, RepositoryId, RepositorySearchResult, SelectedAsset};
pub use rules::AssetRuleSet;
pub use subscription::{
    DEFAULT_TIMEOUT_SECS, InstallSettings, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS, PreInstallScript,
    Subscription,
};

/// Generates a new opaque identifier (32 lowercase hex characters).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
