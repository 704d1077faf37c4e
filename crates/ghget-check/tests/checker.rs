use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use ghget_check::{CheckError, UpdateCheckOptions, UpdateChecker};
use ghget_fetch::{FetchError, RateLimitError, ReleaseSource};
use ghget_install::{InstallError, Pipeline};
use ghget_model::{
    MAX_LOG_CHARS, PipelineResult, ProcessResult, ReleaseAsset, ReleaseInfo, RepositoryId,
    RepositorySearchResult, SelectedAsset, Subscription, UpdateState,
};
use ghget_store::{SledStore, Store};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Reply {
    Release(ReleaseInfo),
    Nothing,
    RateLimited(Option<DateTime<Utc>>),
    ServerError,
}

#[derive(Default)]
struct FakeSource {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    token: bool,
}

impl FakeSource {
    fn reply(&self, repo: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(repo.to_string(), reply);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ReleaseSource for FakeSource {
    async fn latest_release(
        &self,
        repository: &RepositoryId,
        _include_prerelease: bool,
        _cancel: &CancellationToken,
    ) -> ghget_fetch::Result<Option<ReleaseInfo>> {
        let key = repository.to_string();
        self.calls.lock().unwrap().push(key.clone());
        let reply = self.replies.lock().unwrap().get(&key).cloned();
        match reply.unwrap_or(Reply::Nothing) {
            Reply::Release(release) => Ok(Some(release)),
            Reply::Nothing => Ok(None),
            Reply::RateLimited(reset_at) => Err(FetchError::RateLimited(RateLimitError {
                message: "API rate limit exceeded for 1.2.3.4.".into(),
                has_token: self.token,
                reset_at,
            })),
            Reply::ServerError => Err(FetchError::Status {
                status: 500,
                url: format!("https://api.invalid/repos/{key}/releases/latest"),
            }),
        }
    }

    async fn recent_releases(
        &self,
        _repository: &RepositoryId,
        _count: u32,
        _cancel: &CancellationToken,
    ) -> ghget_fetch::Result<Vec<ReleaseInfo>> {
        Ok(Vec::new())
    }

    async fn search_repositories(
        &self,
        _keyword: &str,
        _count: u32,
        _cancel: &CancellationToken,
    ) -> ghget_fetch::Result<Vec<RepositorySearchResult>> {
        Ok(Vec::new())
    }

    fn has_token(&self) -> bool {
        self.token
    }
}

enum PipelineBehaviour {
    Install,
    FailWithOutput(String),
    DownloadError,
}

struct FakePipeline {
    behaviour: PipelineBehaviour,
    runs: AtomicUsize,
}

impl FakePipeline {
    fn new(behaviour: PipelineBehaviour) -> Self {
        Self {
            behaviour,
            runs: AtomicUsize::new(0),
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Pipeline for FakePipeline {
    async fn process(
        &self,
        _subscription: &Subscription,
        _release: &ReleaseInfo,
        selected: &SelectedAsset,
        _cancel: &CancellationToken,
    ) -> ghget_install::Result<PipelineResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        match &self.behaviour {
            PipelineBehaviour::Install => {
                let mut result = PipelineResult::new(UpdateState::Installed);
                result.downloaded_file_path = Some(format!("/downloads/{}", selected.asset.name).into());
                Ok(result)
            }
            PipelineBehaviour::FailWithOutput(output) => {
                let mut result = PipelineResult::new(UpdateState::Failed);
                result.message = Some("Installer exited with code 1603.".into());
                result.install_result = Some(ProcessResult {
                    succeeded: false,
                    exit_code: Some(1603),
                    stdout: Some(output.clone()),
                    stderr: Some("fatal".into()),
                    started_at: now,
                    ended_at: now,
                    message: Some("Installer exited with code 1603.".into()),
                });
                Ok(result)
            }
            PipelineBehaviour::DownloadError => Err(InstallError::Download(FetchError::Status {
                status: 404,
                url: selected.asset.download_url.clone(),
            })),
        }
    }
}

fn release(id: i64, tag: &str) -> ReleaseInfo {
    ReleaseInfo {
        id,
        tag_name: tag.to_string(),
        name: Some(format!("Release {tag}")),
        published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        prerelease: false,
        draft: false,
        html_url: format!("https://example.invalid/releases/{tag}"),
        body: Some("notes".into()),
        assets: vec![
            ReleaseAsset {
                name: "app-x64.msi".into(),
                size: 1024,
                download_url: "https://example.invalid/app-x64.msi".into(),
                content_type: None,
            },
            ReleaseAsset {
                name: "app-source.tar.gz".into(),
                size: 2048,
                download_url: "https://example.invalid/app-source.tar.gz".into(),
                content_type: None,
            },
        ],
    }
}

fn subscribe(store: &SledStore, repo: &str) -> Subscription {
    let subscription = Subscription::new(RepositoryId::parse(repo).unwrap());
    store.upsert_subscription(&subscription).unwrap();
    subscription
}

fn checker<'a>(
    store: &'a SledStore,
    source: &'a FakeSource,
    pipeline: &'a FakePipeline,
) -> UpdateChecker<&'a SledStore, &'a FakeSource, &'a FakePipeline> {
    UpdateChecker::new(store, source, pipeline).with_architecture("x64")
}

fn all() -> UpdateCheckOptions {
    UpdateCheckOptions::default()
}

fn installing() -> UpdateCheckOptions {
    UpdateCheckOptions {
        install_assets: true,
        ..UpdateCheckOptions::default()
    }
}

#[tokio::test]
async fn test_second_run_without_upstream_change_records_nothing() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let sub = subscribe(&store, "acme/widget");
    source.reply("acme/widget", Reply::Release(release(7, "v1.0.0")));
    let checker = checker(&store, &source, &pipeline);

    let first = checker.run_once(&all(), &CancellationToken::new()).await.unwrap();
    assert_eq!((first.checked, first.updated, first.failed), (1, 1, 0));

    let second = checker.run_once(&all(), &CancellationToken::new()).await.unwrap();
    assert_eq!((second.checked, second.updated, second.failed), (1, 0, 0));

    let events = store.events(Some(&sub.id), 10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].state, UpdateState::New);
    assert_eq!(events[0].selected_asset.as_ref().unwrap().asset.name, "app-x64.msi");

    let stored = store.subscription(&sub.id).unwrap().unwrap();
    assert_eq!(stored.last_seen_release_id, Some(7));
    assert_eq!(stored.last_seen_tag.as_deref(), Some("v1.0.0"));
    assert!(stored.last_checked_at.is_some());
    assert_eq!(pipeline.runs(), 0);
}

/// Suppression needs both the release id and the tag to match. A tag moved
/// onto a release with the same id is treated as new, and so is a new id
/// carrying an old tag.
#[tokio::test]
async fn test_idempotence_gate_requires_id_and_tag() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let sub = subscribe(&store, "acme/widget");
    let checker = checker(&store, &source, &pipeline);
    let cancel = CancellationToken::new();

    source.reply("acme/widget", Reply::Release(release(7, "v1.0.0")));
    checker.run_once(&all(), &cancel).await.unwrap();

    source.reply("acme/widget", Reply::Release(release(7, "v1.0.1")));
    let moved_tag = checker.run_once(&all(), &cancel).await.unwrap();
    assert_eq!(moved_tag.updated, 1);

    source.reply("acme/widget", Reply::Release(release(8, "v1.0.1")));
    let new_id = checker.run_once(&all(), &cancel).await.unwrap();
    assert_eq!(new_id.updated, 1);

    let events = store.events(Some(&sub.id), 10).unwrap();
    assert_eq!(events.len(), 3);
    let stored = store.subscription(&sub.id).unwrap().unwrap();
    assert_eq!(stored.last_seen_release_id, Some(8));
    assert_eq!(stored.last_seen_tag.as_deref(), Some("v1.0.1"));
}

#[tokio::test]
async fn test_rate_limit_stops_the_batch() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource {
        token: true,
        ..FakeSource::default()
    };
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let first = subscribe(&store, "acme/one");
    subscribe(&store, "acme/two");
    let third = subscribe(&store, "acme/three");

    let reset = Utc.timestamp_opt(1_717_000_000, 0).unwrap();
    source.reply("acme/one", Reply::Release(release(1, "v1")));
    source.reply("acme/two", Reply::RateLimited(Some(reset)));
    source.reply("acme/three", Reply::Release(release(3, "v3")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&all(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.checked, summary.updated, summary.failed), (2, 1, 1));
    assert!(summary.rate_limited);
    assert!(summary.has_token);
    assert_eq!(summary.rate_limit_reset_at, Some(reset));
    assert_eq!(source.calls(), vec!["acme/one", "acme/two"]);

    assert_eq!(store.events(Some(&first.id), 10).unwrap().len(), 1);
    assert!(store.events(Some(&third.id), 10).unwrap().is_empty());
    assert_eq!(store.subscription(&third.id).unwrap().unwrap().last_checked_at, None);
}

#[tokio::test]
async fn test_other_failures_continue_with_next_subscription() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let broken = subscribe(&store, "acme/broken");
    subscribe(&store, "acme/fine");
    source.reply("acme/broken", Reply::ServerError);
    source.reply("acme/fine", Reply::Release(release(2, "v2")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&all(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.checked, summary.updated, summary.failed), (2, 1, 1));
    assert!(!summary.rate_limited);
    assert!(!summary.is_success());
    assert_eq!(store.subscription(&broken.id).unwrap().unwrap().last_checked_at, None);
}

#[tokio::test]
async fn test_missing_release_only_stamps_check_time() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let sub = subscribe(&store, "acme/empty");

    let summary = checker(&store, &source, &pipeline)
        .run_once(&installing(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.checked, summary.updated, summary.failed), (1, 0, 0));
    let stored = store.subscription(&sub.id).unwrap().unwrap();
    assert!(stored.last_checked_at.is_some());
    assert_eq!(stored.last_seen_release_id, None);
    assert!(store.events(Some(&sub.id), 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_successful_install_is_recorded() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let sub = subscribe(&store, "acme/widget");
    source.reply("acme/widget", Reply::Release(release(5, "v5")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&installing(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.updated, summary.failed), (1, 0));
    assert_eq!(pipeline.runs(), 1);
    let event = &store.events(Some(&sub.id), 1).unwrap()[0];
    assert_eq!(event.state, UpdateState::Installed);
    assert!(event.processed_at.is_some());
    assert!(event.downloaded_file_path.as_deref().unwrap().ends_with("app-x64.msi"));
}

#[tokio::test]
async fn test_failed_install_counts_and_truncates_output() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::FailWithOutput("x".repeat(MAX_LOG_CHARS + 500)));
    let sub = subscribe(&store, "acme/widget");
    source.reply("acme/widget", Reply::Release(release(5, "v5")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&installing(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.updated, summary.failed), (1, 1));
    let event = &store.events(Some(&sub.id), 1).unwrap()[0];
    assert_eq!(event.state, UpdateState::Failed);
    assert_eq!(event.install_exit_code, Some(1603));
    assert_eq!(event.install_stdout.as_ref().unwrap().chars().count(), MAX_LOG_CHARS);
    assert_eq!(event.install_stderr.as_deref(), Some("fatal"));
    assert_eq!(event.processing_message.as_deref(), Some("Installer exited with code 1603."));

    let stored = store.subscription(&sub.id).unwrap().unwrap();
    assert_eq!(stored.last_seen_release_id, Some(5));
}

#[tokio::test]
async fn test_pipeline_error_becomes_failed_event() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::DownloadError);
    let sub = subscribe(&store, "acme/widget");
    source.reply("acme/widget", Reply::Release(release(5, "v5")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&installing(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.updated, summary.failed), (1, 1));
    let event = &store.events(Some(&sub.id), 1).unwrap()[0];
    assert_eq!(event.state, UpdateState::Failed);
    assert!(event
        .processing_message
        .as_deref()
        .unwrap()
        .starts_with("Install pipeline failed:"));
}

#[tokio::test]
async fn test_no_selected_asset_skips_pipeline() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    let mut sub = Subscription::new(RepositoryId::parse("acme/widget").unwrap());
    sub.asset_rules.include = vec!["does-not-match".into()];
    store.upsert_subscription(&sub).unwrap();
    source.reply("acme/widget", Reply::Release(release(5, "v5")));

    let summary = checker(&store, &source, &pipeline)
        .run_once(&installing(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.updated, summary.failed), (1, 0));
    assert_eq!(pipeline.runs(), 0);
    let event = &store.events(Some(&sub.id), 1).unwrap()[0];
    assert_eq!(event.state, UpdateState::New);
    assert!(event.selected_asset.is_none());
}

#[tokio::test]
async fn test_single_subscription_filter() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    subscribe(&store, "acme/one");
    let two = subscribe(&store, "acme/two");
    let checker = checker(&store, &source, &pipeline);

    let options = UpdateCheckOptions {
        subscription_id: Some(two.id.clone()),
        install_assets: false,
    };
    let summary = checker.run_once(&options, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(source.calls(), vec!["acme/two"]);

    let unknown = UpdateCheckOptions {
        subscription_id: Some("missing".into()),
        install_assets: false,
    };
    let summary = checker.run_once(&unknown, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.checked, 0);
}

#[tokio::test]
async fn test_cancelled_run() {
    let store = SledStore::temporary().unwrap();
    let source = FakeSource::default();
    let pipeline = FakePipeline::new(PipelineBehaviour::Install);
    subscribe(&store, "acme/one");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = checker(&store, &source, &pipeline)
        .run_once(&all(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckError::Cancelled));
    assert!(source.calls().is_empty());
}
