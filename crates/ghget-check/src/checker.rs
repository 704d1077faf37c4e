use std::fmt;

use chrono::{DateTime, Utc};
use ghget_fetch::ReleaseSource;
use ghget_install::{InstallError, Pipeline};
use ghget_model::{Subscription, UpdateEvent, UpdateState};
use ghget_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{CheckError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheckOptions {
    /// Only check this subscription. An unknown id checks nothing.
    pub subscription_id: Option<String>,
    /// Run the install pipeline for every new release with a selected asset.
    pub install_assets: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheckSummary {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
    pub rate_limited: bool,
    /// Only meaningful when `rate_limited` is set.
    pub has_token: bool,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

impl UpdateCheckSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for UpdateCheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checked {}, Updated {}, Failed {}",
            self.checked, self.updated, self.failed
        )
    }
}

enum Checked {
    Unchanged,
    Updated { failed: bool },
}

/// Polls every subscription once, records new releases and optionally
/// installs them.
///
/// Subscriptions are processed one at a time in persisted order. The first
/// rate-limit failure ends the run, since every later request would hit the
/// same quota.
pub struct UpdateChecker<S, R, P> {
    store: S,
    source: R,
    pipeline: P,
    architecture: Option<String>,
}

impl<S: Store, R: ReleaseSource, P: Pipeline> UpdateChecker<S, R, P> {
    pub fn new(store: S, source: R, pipeline: P) -> Self {
        Self {
            store,
            source,
            pipeline,
            architecture: None,
        }
    }

    /// Scores assets against `architecture` instead of the detected one.
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load(&self, options: &UpdateCheckOptions) -> Result<Vec<Subscription>> {
        match options.subscription_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                let found = self.store.subscription(id)?;
                if found.is_none() {
                    warn!(id, "subscription not found");
                }
                Ok(found.into_iter().collect())
            }
            _ => Ok(self.store.subscriptions()?),
        }
    }

    #[instrument(skip_all, fields(only = ?options.subscription_id, install = options.install_assets))]
    pub async fn run_once(
        &self,
        options: &UpdateCheckOptions,
        cancel: &CancellationToken,
    ) -> Result<UpdateCheckSummary> {
        let subscriptions = self.load(options)?;
        let mut summary = UpdateCheckSummary::default();

        for subscription in &subscriptions {
            if cancel.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
            summary.checked += 1;

            match self
                .check_subscription(subscription, options.install_assets, cancel)
                .await
            {
                Ok(Checked::Unchanged) => {}
                Ok(Checked::Updated { failed }) => {
                    summary.updated += 1;
                    if failed {
                        summary.failed += 1;
                    }
                }
                Err(CheckError::Fetch(err)) if err.rate_limit().is_some() => {
                    summary.failed += 1;
                    summary.rate_limited = true;
                    if let Some(limit) = err.rate_limit() {
                        summary.has_token = limit.has_token;
                        summary.rate_limit_reset_at = limit.reset_at;
                    }
                    warn!(
                        subscription = %subscription.full_name(),
                        reset_at = ?summary.rate_limit_reset_at,
                        "rate limited, stopping this run"
                    );
                    break;
                }
                Err(err @ (CheckError::Store(_) | CheckError::Cancelled)) => return Err(err),
                Err(err) => {
                    summary.failed += 1;
                    warn!(subscription = %subscription.full_name(), error = %err, "update check failed");
                }
            }
        }

        info!(
            checked = summary.checked,
            updated = summary.updated,
            failed = summary.failed,
            rate_limited = summary.rate_limited,
            "update check finished"
        );
        Ok(summary)
    }

    async fn check_subscription(
        &self,
        subscription: &Subscription,
        install_assets: bool,
        cancel: &CancellationToken,
    ) -> Result<Checked> {
        let repository = subscription.repository_id()?;
        let release = self
            .source
            .latest_release(&repository, subscription.include_prerelease, cancel)
            .await?;

        let Some(release) = release else {
            debug!(repository = %repository, "no release published");
            self.store
                .upsert_subscription(&subscription.with_last_checked(Utc::now()))?;
            return Ok(Checked::Unchanged);
        };

        if subscription.has_seen(release.id, &release.tag_name) {
            debug!(repository = %repository, tag = %release.tag_name, "release already recorded");
            self.store
                .upsert_subscription(&subscription.with_last_checked(Utc::now()))?;
            return Ok(Checked::Unchanged);
        }

        let selected = ghget_select::select(
            &release,
            &subscription.asset_rules,
            self.architecture.as_deref(),
        );
        let mut event = UpdateEvent::new(subscription.id.as_str(), &release, selected.clone());
        let mut failed = false;
        let mut cancelled = false;

        if let Some(selected) = selected.as_ref().filter(|_| install_assets) {
            event = match self
                .pipeline
                .process(subscription, &release, selected, cancel)
                .await
            {
                Ok(result) => {
                    failed = result.state == UpdateState::Failed;
                    event.with_pipeline_result(&result, Utc::now())
                }
                // Cancellation included: the ETag is already cached, so the
                // release must be recorded now.
                Err(err) => {
                    cancelled = matches!(err, InstallError::Cancelled);
                    failed = true;
                    warn!(repository = %repository, error = %err, "install pipeline failed");
                    event.with_failure(format!("Install pipeline failed: {err}"), Utc::now())
                }
            };
        }

        self.store.add_event(&event)?;
        self.store.upsert_subscription(&subscription.with_last_seen(
            release.id,
            release.tag_name.as_str(),
            Utc::now(),
        ))?;
        info!(repository = %repository, tag = %release.tag_name, state = %event.state, "new release recorded");

        if cancelled {
            return Err(CheckError::Cancelled);
        }
        Ok(Checked::Updated { failed })
    }
}
