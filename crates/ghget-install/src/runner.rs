use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use ghget_model::{InstallRequest, InstallResult, ProcessResult, ScriptRequest, ScriptResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{CommandSpec, installer_command, script_command};

/// Executes pre-install scripts and installers.
///
/// Every outcome, including launch failures, timeouts and cancellation, is
/// reported through the returned result rather than as an error.
pub trait Runner: Send + Sync {
    fn run_script(
        &self,
        request: &ScriptRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = ScriptResult> + Send;

    fn run_installer(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = InstallResult> + Send;
}

/// Runs real child processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    windows: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            windows: cfg!(windows),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::Output>),
    TimedOut,
    Cancelled,
}

/// Spawns `spec` and waits for it, bounded by `timeout` and `cancel`.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait on
/// timeout or cancellation kills it.
async fn execute(
    spec: CommandSpec,
    label: &str,
    capture: bool,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ProcessResult {
    let started_at = Utc::now();
    let mut command = spec.to_command();
    command.kill_on_drop(true).stdin(Stdio::null());
    if capture {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }

    debug!(program = %spec.program, args = ?spec.args, "spawning {label}");
    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %spec.program, error = %err, "{label} launch failed");
            return ProcessResult::failed(started_at, format!("{label} launch failed: {err}"));
        }
    };

    let outcome = tokio::select! {
        output = child.wait_with_output() => Outcome::Exited(output),
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    match outcome {
        Outcome::TimedOut => {
            warn!(program = %spec.program, timeout_secs = timeout.as_secs(), "{label} timed out");
            ProcessResult::failed(started_at, format!("{label} timed out."))
        }
        Outcome::Cancelled => ProcessResult::failed(started_at, format!("{label} was cancelled.")),
        Outcome::Exited(Err(err)) => {
            ProcessResult::failed(started_at, format!("{label} launch failed: {err}"))
        }
        Outcome::Exited(Ok(output)) => {
            let exit_code = output.status.code();
            let succeeded = output.status.success();
            info!(program = %spec.program, ?exit_code, "{label} finished");

            let failure = (!succeeded).then(|| match exit_code {
                Some(code) => format!("exited with code {code}."),
                None => "was terminated by a signal.".to_string(),
            });
            let message = match (capture, failure) {
                (false, None) => Some(format!(
                    "{label} executed in elevated mode. Output is unavailable."
                )),
                (false, Some(failure)) => Some(format!(
                    "{label} executed in elevated mode. Output is unavailable. {label} {failure}"
                )),
                (true, failure) => failure.map(|failure| format!("{label} {failure}")),
            };

            ProcessResult {
                succeeded,
                exit_code,
                stdout: capture.then(|| String::from_utf8_lossy(&output.stdout).into_owned()),
                stderr: capture.then(|| String::from_utf8_lossy(&output.stderr).into_owned()),
                started_at,
                ended_at: Utc::now(),
                message,
            }
        }
    }
}

impl Runner for ProcessRunner {
    async fn run_script(&self, request: &ScriptRequest, cancel: &CancellationToken) -> ScriptResult {
        let started_at = Utc::now();
        if request.script_path.as_os_str().is_empty() {
            return ProcessResult::failed(started_at, "Script path is empty.");
        }
        if !request.script_path.is_file() {
            return ProcessResult::failed(
                started_at,
                format!("Script not found: {}", request.script_path.display()),
            );
        }

        let mut spec = script_command(&request.script_path, request.args.as_deref(), self.windows);
        for (key, value) in request.context.env_bindings() {
            spec = spec.env(key, value);
        }
        if request.require_admin {
            spec = spec.elevated(self.windows);
        }

        execute(spec, "Script", !request.require_admin, request.timeout, cancel).await
    }

    async fn run_installer(&self, request: &InstallRequest, cancel: &CancellationToken) -> InstallResult {
        let Some(mut spec) = installer_command(request) else {
            return ProcessResult::failed(
                Utc::now(),
                format!("Unsupported install kind: {}.", request.kind),
            );
        };
        if let Some(publisher) = &request.expected_publisher {
            debug!(publisher, "publisher is recorded but not verified");
        }
        if request.require_admin {
            spec = spec.elevated(self.windows);
        }

        execute(spec, "Installer", !request.require_admin, request.timeout, cancel).await
    }
}
