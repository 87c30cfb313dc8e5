//! [`ExecutionCapability`] that drives a host CLI process.
//!
//! The child starts with a cleared environment plus [`ALLOWED_ENV_VARS`],
//! so worker secrets (summarizer key, sink tokens) never reach the agent.
//! The provider credential is injected through the variable configured for
//! the provider in `[agent.credential_env]`.

use std::collections::HashMap;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::AgentStreamCodec;
use super::{ExecutionCapability, ExecutionContext};
use crate::config::AgentConfig;
use crate::{AppError, Result};

/// Environment variables inherited by the agent process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "RUST_LOG",
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Bytes of stderr kept for error reporting.
const STDERR_TAIL_BYTES: usize = 4096;

/// Host CLI agent.
#[derive(Debug, Clone)]
pub struct CliAgent {
    host_cli: String,
    host_cli_args: Vec<String>,
    resume_flag: String,
    credential_env: HashMap<String, String>,
}

impl CliAgent {
    /// Build an agent from the `[agent]` configuration section.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            host_cli: config.host_cli.clone(),
            host_cli_args: config.host_cli_args.clone(),
            resume_flag: config.resume_flag.clone(),
            credential_env: config.credential_env.clone(),
        }
    }

    /// Arguments passed after the configured base args.
    ///
    /// Options render as `--key value`; `true` becomes a bare `--key`,
    /// `false` and `null` are omitted. The request text comes last.
    #[must_use]
    pub fn command_args(&self, user_request: &str, ctx: &ExecutionContext) -> Vec<String> {
        let mut args = self.host_cli_args.clone();

        if let Some(ref id) = ctx.external_correlation_id {
            args.push(self.resume_flag.clone());
            args.push(id.clone());
        }

        for (key, value) in &ctx.options {
            let flag = format!("--{key}");
            match value {
                Value::Null | Value::Bool(false) => {}
                Value::Bool(true) => args.push(flag),
                Value::String(s) => {
                    args.push(flag);
                    args.push(s.clone());
                }
                other => {
                    args.push(flag);
                    args.push(other.to_string());
                }
            }
        }

        args.push(user_request.to_owned());
        args
    }

    fn credential_var(&self, provider: &str) -> Result<&str> {
        self.credential_env
            .get(provider)
            .map(String::as_str)
            .ok_or_else(|| {
                AppError::Execution(format!(
                    "no credential variable configured for provider '{provider}'"
                ))
            })
    }
}

impl ExecutionCapability for CliAgent {
    fn execute<'a>(
        &'a self,
        user_request: &'a str,
        ctx: &'a ExecutionContext,
        events: mpsc::Sender<Value>,
    ) -> BoxFuture<'a, Result<()>> {
        let span = info_span!(
            "cli_agent",
            session_id = %ctx.session_id,
            provider = %ctx.provider,
            host_cli = %self.host_cli
        );
        Box::pin(
            async move {
                let credential_var = self.credential_var(&ctx.provider)?;

                let mut cmd = Command::new(&self.host_cli);
                cmd.args(self.command_args(user_request, ctx));
                cmd.env_clear();
                for &key in ALLOWED_ENV_VARS {
                    if let Ok(val) = std::env::var(key) {
                        cmd.env(key, val);
                    }
                }
                cmd.env(credential_var, ctx.credentials.expose())
                    .current_dir(&ctx.workspace_path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);

                let mut child = cmd.spawn().map_err(|err| {
                    AppError::Execution(format!("failed to spawn {}: {err}", self.host_cli))
                })?;
                info!(pid = child.id().unwrap_or(0), "agent process spawned");

                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| AppError::Execution("failed to capture agent stdout".into()))?;
                let mut stderr = child
                    .stderr
                    .take()
                    .ok_or_else(|| AppError::Execution("failed to capture agent stderr".into()))?;

                let read_stderr = async move {
                    let mut buf = Vec::new();
                    if let Err(err) = stderr.read_to_end(&mut buf).await {
                        debug!(%err, "agent stderr read failed");
                    }
                    buf
                };

                let read_stdout = async {
                    let mut framed = FramedRead::new(stdout, AgentStreamCodec::new());
                    let mut forwarded = 0_u64;
                    while let Some(item) = framed.next().await {
                        match item {
                            Ok(line) if line.trim().is_empty() => {}
                            Ok(line) => match serde_json::from_str::<Value>(&line) {
                                Ok(payload) => {
                                    if events.send(payload).await.is_err() {
                                        debug!("event receiver closed; discarding agent output");
                                    } else {
                                        forwarded += 1;
                                    }
                                }
                                Err(err) => {
                                    debug!(%err, "skipping non-json agent output line");
                                }
                            },
                            Err(err) => {
                                warn!(%err, "agent stdout read failed");
                                break;
                            }
                        }
                    }
                    forwarded
                };

                let (stderr_bytes, forwarded) = tokio::join!(read_stderr, read_stdout);
                let status = child.wait().await.map_err(|err| {
                    AppError::Execution(format!("failed to wait for agent: {err}"))
                })?;

                if status.success() {
                    info!(forwarded, "agent process exited");
                    Ok(())
                } else {
                    Err(AppError::Execution(format!(
                        "agent exited with {status}: {}",
                        stderr_tail(&stderr_bytes)
                    )))
                }
            }
            .instrument(span),
        )
    }
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_owned()
}
