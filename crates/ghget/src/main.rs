mod cli;
mod config;
mod logging;
mod notifier;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ghget_check::{UpdateCheckOptions, UpdateCheckSummary, UpdateChecker, notify_pending};
use ghget_fetch::{ClientOptions, Downloader, GitHubClient, ReqwestClient};
use ghget_install::{InstallCoordinator, ProcessRunner};
use ghget_store::SledStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{App, Commands, RunOnce};
use crate::config::Config;
use crate::notifier::LogNotifier;

/// How many pending releases are announced per run.
const NOTIFY_LIMIT: usize = 5;

const EXIT_FATAL: u8 = 1;
const EXIT_SUBSCRIPTION_FAILED: u8 = 2;

fn main() -> ExitCode {
    let app = App::parse();
    match run(app) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

#[tokio::main]
async fn run(app: App) -> Result<ExitCode> {
    let config = Config::load(app.config.as_deref())?;
    let paths = config.paths()?;
    paths.ensure_dirs()?;
    let _guard = logging::init(&config.log_level, &paths.logs(), config.log_retention_days)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    match app.cmd {
        Commands::RunOnce(args) => run_once(&config, paths, args, &cancel).await,
    }
}

async fn run_once(
    config: &Config,
    paths: ghget_platform::AppPaths,
    args: RunOnce,
    cancel: &CancellationToken,
) -> Result<ExitCode> {
    let store = Arc::new(
        SledStore::open(paths.database())
            .with_context(|| format!("failed to open {}", paths.database().display()))?,
    );

    let http = ReqwestClient::with_timeout(Some(Duration::from_secs(config.request_timeout_secs)))
        .context("failed to build the HTTP client")?;
    let client = GitHubClient::new(
        http.clone(),
        Arc::clone(&store),
        ClientOptions {
            base_url: config.api_base_url.clone(),
            token: config.token().map(String::from),
            user_agent: config.user_agent.clone(),
        },
    );
    let coordinator = InstallCoordinator::new(
        Downloader::new(http, config.user_agent.as_str()),
        ProcessRunner::new(),
        paths,
    );
    let checker = UpdateChecker::new(Arc::clone(&store), client, coordinator);

    let options = UpdateCheckOptions {
        subscription_id: args.subscription,
        install_assets: args.install || config.install_assets,
    };
    let summary = checker.run_once(&options, cancel).await?;

    println!("{summary}");
    if !args.no_notify {
        let notified = notify_pending(&store, &LogNotifier, NOTIFY_LIMIT)?;
        println!("Notified {notified}");
    }
    if let Some(line) = rate_limit_line(&summary) {
        println!("{line}");
    }
    store.flush()?;

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_SUBSCRIPTION_FAILED)
    })
}

fn rate_limit_line(summary: &UpdateCheckSummary) -> Option<String> {
    if !summary.rate_limited {
        return None;
    }
    let reset = summary
        .rate_limit_reset_at
        .map(|at| format!(" until {}", at.format("%Y-%m-%d %H:%M:%S UTC")))
        .unwrap_or_default();
    let hint = if summary.has_token {
        ""
    } else {
        " Set GHGET_TOKEN to raise the limit."
    };
    Some(format!("Rate limited{reset}.{hint}"))
}
