//! Building the concrete process invocations for scripts and installers.

use std::ffi::OsStr;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ghget_model::{InstallKind, InstallRequest};

/// A program, its arguments and extra environment, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Wraps the command so that it runs with administrative rights.
    ///
    /// On Windows it is relaunched through `Start-Process -Verb RunAs`; the
    /// environment is re-applied inside the elevated process because it is
    /// not inherited. Elsewhere it goes through non-interactive `sudo`.
    pub fn elevated(self, windows: bool) -> Self {
        if windows {
            let inner = encode_powershell(&self.powershell_invocation());
            let outer = format!(
                "$p = Start-Process -FilePath 'powershell.exe' -ArgumentList '-NoProfile','-ExecutionPolicy','Bypass','-EncodedCommand','{inner}' -Verb RunAs -Wait -PassThru; exit $p.ExitCode"
            );
            CommandSpec::new("powershell.exe").args([
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                outer.as_str(),
            ])
        } else {
            let mut sudo = CommandSpec::new("sudo").arg("-n");
            if !self.env.is_empty() {
                let names: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
                sudo = sudo.arg(format!("--preserve-env={}", names.join(",")));
            }
            CommandSpec {
                args: sudo
                    .args
                    .into_iter()
                    .chain(std::iter::once(self.program))
                    .chain(self.args)
                    .collect(),
                env: self.env,
                program: sudo.program,
            }
        }
    }

    /// A PowerShell statement list that sets the environment and runs the
    /// command, propagating its exit code.
    fn powershell_invocation(&self) -> String {
        let mut script = String::from("$ErrorActionPreference='Stop';");
        for (key, value) in &self.env {
            script.push_str(&format!("$env:{key}='{}';", quote_single(value)));
        }
        script.push_str(&format!("& '{}'", quote_single(&self.program)));
        for arg in &self.args {
            script.push_str(&format!(" '{}'", quote_single(arg)));
        }
        script.push_str("; if ($null -ne $LASTEXITCODE) { exit $LASTEXITCODE } else { exit 0 }");
        script
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (OsStr::new(k), OsStr::new(v))));
        command
    }
}

fn quote_single(text: &str) -> String {
    text.replace('\'', "''")
}

/// `-EncodedCommand` payload: base64 of the UTF-16LE script text.
fn encode_powershell(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

/// Splits an argument string on whitespace. Double quotes group words and
/// are removed.
pub fn split_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Picks the interpreter from the script's extension.
pub fn script_command(script: &Path, args: Option<&str>, windows: bool) -> CommandSpec {
    let path = script.to_string_lossy().into_owned();
    let extra = args.map(split_args).unwrap_or_default();

    let base = match extension(script).as_str() {
        "ps1" => CommandSpec::new(if windows { "powershell.exe" } else { "pwsh" })
            .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"])
            .arg(path),
        "sh" => CommandSpec::new("sh").arg(path),
        "cmd" | "bat" => CommandSpec::new("cmd").args(["/C".to_string(), path]),
        _ => CommandSpec::new(path),
    };
    base.args(extra)
}

fn controls_restart(args: &[String]) -> bool {
    args.iter().any(|a| {
        let lower = a.to_lowercase();
        lower.contains("restart") || lower.starts_with("reboot=")
    })
}

/// `None` for kinds that have no installer invocation.
pub fn installer_command(request: &InstallRequest) -> Option<CommandSpec> {
    let file = request.file_path.to_string_lossy().into_owned();
    let configured = request
        .args
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    match request.kind {
        InstallKind::Msi => {
            let mut args = split_args(configured.unwrap_or("/i"));
            args.push(file);
            if !request.allow_reboot && !controls_restart(&args) {
                args.push("/norestart".to_string());
            }
            Some(CommandSpec::new("msiexec").args(args))
        }
        InstallKind::Exe => Some(CommandSpec::new(file).args(configured.map(split_args).unwrap_or_default())),
        InstallKind::Msix | InstallKind::Auto | InstallKind::None => None,
    }
}
