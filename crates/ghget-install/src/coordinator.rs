use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ghget_fetch::{Downloader, HttpClient};
use ghget_model::{
    InstallKind, InstallRequest, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS, PipelineResult, ReleaseInfo,
    ScriptContext, ScriptRequest, SelectedAsset, Subscription, UpdateState,
};
use ghget_platform::{AppPaths, sanitize_segment};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::runner::Runner;

/// Runs the install pipeline for one release.
pub trait Pipeline: Send + Sync {
    fn process(
        &self,
        subscription: &Subscription,
        release: &ReleaseInfo,
        selected: &SelectedAsset,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<PipelineResult>> + Send;
}

impl<T: Pipeline> Pipeline for &T {
    fn process(
        &self,
        subscription: &Subscription,
        release: &ReleaseInfo,
        selected: &SelectedAsset,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<PipelineResult>> + Send {
        (**self).process(subscription, release, selected, cancel)
    }
}

/// Download, then the optional pre-install script, then the installer.
///
/// Stages run strictly in order and each one gates the next. A failed
/// download is an error; a failed script or installer is a `Failed` result.
pub struct InstallCoordinator<C, R> {
    downloader: Downloader<C>,
    runner: R,
    paths: AppPaths,
}

impl<C: HttpClient, R: Runner> InstallCoordinator<C, R> {
    pub fn new(downloader: Downloader<C>, runner: R, paths: AppPaths) -> Self {
        Self {
            downloader,
            runner,
            paths,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `<downloads>/<subscription id>/<tag>/<asset name>`, each segment
    /// sanitized.
    pub fn download_path(&self, subscription: &Subscription, release: &ReleaseInfo, selected: &SelectedAsset) -> PathBuf {
        self.paths
            .downloads()
            .join(sanitize_segment(&subscription.id, "subscription"))
            .join(sanitize_segment(&release.tag_name, "release"))
            .join(sanitize_segment(&selected.asset.name, "file"))
    }

    /// The configured path (absolute as-is, relative under the scripts
    /// root), or the per-project default.
    pub fn script_path(&self, subscription: &Subscription) -> PathBuf {
        match subscription.pre_install.path.as_deref().map(str::trim) {
            Some(configured) if !configured.is_empty() => {
                let configured = Path::new(configured);
                if configured.is_absolute() {
                    configured.to_path_buf()
                } else {
                    self.paths.scripts().join(configured)
                }
            }
            _ => self
                .paths
                .project_script_path(&subscription.owner, &subscription.repo),
        }
    }
}

fn timeout(subscription: &Subscription) -> Duration {
    let secs = subscription
        .install
        .timeout_secs
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    Duration::from_secs(u64::from(secs))
}

impl<C: HttpClient, R: Runner> Pipeline for InstallCoordinator<C, R> {
    #[instrument(skip_all, fields(subscription = %subscription.full_name(), tag = %release.tag_name))]
    async fn process(
        &self,
        subscription: &Subscription,
        release: &ReleaseInfo,
        selected: &SelectedAsset,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let download_path = self.download_path(subscription, release, selected);
        self.downloader
            .download(&selected.asset.download_url, &download_path, cancel)
            .await?;

        let mut result = PipelineResult::new(UpdateState::Downloaded);
        result.downloaded_file_path = Some(download_path.clone());

        if subscription.pre_install.enabled {
            let script_path = self.script_path(subscription);
            let request = ScriptRequest {
                script_path: script_path.clone(),
                args: subscription.pre_install.args.clone(),
                require_admin: subscription.pre_install.require_admin,
                timeout: timeout(subscription),
                context: ScriptContext {
                    downloaded_file_path: download_path.clone(),
                    download_directory: download_path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default(),
                    release_tag: release.tag_name.clone(),
                    release_title: release.name.clone(),
                    release_url: release.html_url.clone(),
                    subscription_id: subscription.id.clone(),
                    subscription_name: subscription.display_title(),
                },
            };

            let script_result = self.runner.run_script(&request, cancel).await;
            result.script_path = Some(script_path);
            if !script_result.succeeded {
                warn!(message = ?script_result.message, "pre-install script failed");
                result.state = UpdateState::Failed;
                result.message = Some(
                    script_result
                        .message
                        .clone()
                        .unwrap_or_else(|| "Pre-install script failed.".to_string()),
                );
                result.script_result = Some(script_result);
                return Ok(result);
            }
            result.script_result = Some(script_result);
        }

        let kind = match subscription.install.kind {
            InstallKind::Auto => selected.install_kind,
            explicit => explicit,
        };
        if kind == InstallKind::None {
            result.message = Some("Installer is disabled for this subscription.".to_string());
            return Ok(result);
        }

        let request = InstallRequest {
            file_path: download_path,
            kind,
            args: if kind == InstallKind::Msi {
                subscription.install.msi_args.clone()
            } else {
                subscription.install.silent_args.clone()
            },
            require_admin: subscription.install.require_admin,
            timeout: timeout(subscription),
            allow_reboot: subscription.install.allow_reboot,
            expected_publisher: subscription.install.expected_publisher.clone(),
        };
        let install_result = self.runner.run_installer(&request, cancel).await;

        result.state = if install_result.succeeded {
            UpdateState::Installed
        } else {
            UpdateState::Failed
        };
        result.message = install_result.message.clone();
        result.install_result = Some(install_result);
        info!(state = %result.state, %kind, "pipeline finished");
        Ok(result)
    }
}
