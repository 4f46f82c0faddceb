//! Shell resolution and execution of shell filters.
//!
//! [`run_shell`] spawns one process per call, feeds it the selection text on stdin and turns
//! its termination into an [`Outcome`]:
//!
//! - spawn or I/O failure: `Failure(<error description>)`
//! - exit status 0: `Value(<stdout without trailing whitespace>)`
//! - any other status: `Failure("Command exited with error <code>: <stderr>")`
//!
//! Which shell runs the command comes from [`resolve_shell`].

use crate::config::{Environment, Settings};
use crate::outcome::Outcome;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Settings prefix of the per-platform shell path.
pub const AUTOMATION_SHELL_SETTING: &str = "terminal.integrated.automationShell";

/// Stand-in for an empty stderr in failure messages.
pub const NO_ERROR_OUTPUT: &str = "<No error output>";

/// Operating system family, as far as shell configuration is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux and other Unix-likes configured the same way (Cygwin included).
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Anything else; shell resolution is disabled.
    Other,
}

impl Platform {
    /// The platform this process runs on.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" | "cygwin" | "android" | "freebsd" | "netbsd" | "openbsd" => Platform::Linux,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    /// Key suffix under [`AUTOMATION_SHELL_SETTING`].
    pub fn settings_suffix(self) -> Option<&'static str> {
        match self {
            Platform::Linux => Some("linux"),
            Platform::MacOs => Some("osx"),
            Platform::Windows => Some("windows"),
            Platform::Other => None,
        }
    }
}

/// Picks the shell for this run: the platform's configured automation shell, then `$SHELL`,
/// then `None` (the host default).
pub fn resolve_shell(
    platform: Platform,
    settings: &Settings,
    env: &dyn Environment,
) -> Option<String> {
    let suffix = platform.settings_suffix()?;
    let key = format!("{AUTOMATION_SHELL_SETTING}.{suffix}");

    let shell = settings
        .get_str(&key)
        .map(str::to_string)
        .or_else(|| env.var("SHELL"));
    tracing::debug!("resolved shell for {platform:?}: {shell:?}");
    shell
}

/// Program and arguments that run a command line through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    /// Shell executable.
    pub program: String,
    /// Arguments before the command line.
    pub args: Vec<String>,
    /// The command line itself.
    pub command: String,
    /// Pass `command` without quoting (`cmd.exe` does its own parsing).
    pub verbatim: bool,
}

impl ShellInvocation {
    /// Builds the invocation of `command` through `shell`, or the host default shell.
    pub fn new(command: &str, shell: Option<&str>) -> Self {
        if cfg!(windows) {
            let program = shell.map(str::to_string).unwrap_or_else(|| {
                std::env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".to_string())
            });
            if is_cmd(&program) {
                return Self {
                    program,
                    args: vec!["/d".into(), "/s".into(), "/c".into()],
                    command: format!("\"{command}\""),
                    verbatim: true,
                };
            }
            return Self {
                program,
                args: vec!["-c".into()],
                command: command.to_string(),
                verbatim: false,
            };
        }

        Self {
            program: shell.unwrap_or("/bin/sh").to_string(),
            args: vec!["-c".into()],
            command: command.to_string(),
            verbatim: false,
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        push_command_line(&mut command, self);
        command
    }
}

#[cfg(windows)]
fn push_command_line(command: &mut Command, invocation: &ShellInvocation) {
    if invocation.verbatim {
        command.raw_arg(&invocation.command);
    } else {
        command.arg(&invocation.command);
    }
}

#[cfg(not(windows))]
fn push_command_line(command: &mut Command, invocation: &ShellInvocation) {
    command.arg(&invocation.command);
}

fn is_cmd(program: &str) -> bool {
    std::path::Path::new(program)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.eq_ignore_ascii_case("cmd"))
}

/// Runs `command` with `input` on stdin and classifies how it terminated.
///
/// Never fails: every problem becomes [`Outcome::Failure`].
pub async fn run_shell(command: &str, input: &str, shell: Option<&str>) -> Outcome {
    let invocation = ShellInvocation::new(command, shell);
    let spawned = invocation
        .to_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!("failed to spawn {}: {err}", invocation.program);
            return Outcome::failure(err.to_string());
        }
    };
    tracing::debug!(pid = ?child.id(), "spawned {} -c {command:?}", invocation.program);

    let stdin = child.stdin.take();
    let write_input = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await
        // `stdin` is dropped here, closing the pipe.
    };
    let (written, output) = tokio::join!(write_input, child.wait_with_output());

    let output = match output {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!("failed to wait for {}: {err}", invocation.program);
            return Outcome::failure(err.to_string());
        }
    };
    match written {
        // The command exited without reading all of its input.
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!("command closed stdin early");
        }
        Err(err) => {
            tracing::warn!("failed to write stdin of {}: {err}", invocation.program);
            return Outcome::failure(err.to_string());
        }
        Ok(()) => {}
    }

    tracing::debug!(code = ?output.status.code(), "command exited");
    classify(&output)
}

fn classify(output: &Output) -> Outcome {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let details = match stderr.trim() {
        "" => NO_ERROR_OUTPUT,
        trimmed => trimmed,
    };

    match output.status.code() {
        Some(0) => Outcome::value(stdout.trim_end()),
        Some(code) => Outcome::failure(format!("Command exited with error {code}: {details}")),
        None => Outcome::failure(format!("Command terminated by signal: {details}")),
    }
}
