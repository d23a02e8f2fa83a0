//! Remote-copy collaborator
//!
//! Copies are done by external programs over ssh: `ssh user@host test -f <path>`
//! for the existence check, `scp` or `bbcp` for the copy. With a credential the
//! commands run under `sshpass -e` (credential passed in `SSHPASS`); without one
//! ssh and scp run in batch mode so a missing key fails instead of prompting.
//! Every command is bounded by a timeout.

use async_trait::async_trait;
use cryoqc_common::config::{TransferConfig, TransferMethod};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Transfer not configured: {0}")]
    NotConfigured(String),

    #[error("{program} failed to start: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote destination of copies
#[async_trait]
pub trait RemoteCopy: Send + Sync {
    /// Remote path a local file is copied to
    fn remote_path_for(&self, local: &Path) -> String;

    /// Whether a regular file exists at `remote_path`
    async fn exists(&self, remote_path: &str) -> Result<bool, TransferError>;

    /// Copy `local` into the destination directory
    async fn copy(&self, local: &Path) -> Result<(), TransferError>;

    /// Human-readable destination for logs and events
    fn destination(&self) -> String;
}

/// `user@host:directory`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    /// Empty means the remote home directory
    pub directory: String,
}

impl RemoteTarget {
    pub fn login(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn destination_dir(&self) -> &str {
        if self.directory.is_empty() {
            "."
        } else {
            &self.directory
        }
    }

    /// Remote path of `file_name` inside the destination directory
    pub fn remote_path(&self, file_name: &str) -> String {
        if self.directory.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.directory.trim_end_matches('/'), file_name)
        }
    }

    pub fn scp_target(&self) -> String {
        format!("{}:{}", self.login(), self.destination_dir())
    }
}

/// A fully built external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            env: Vec::new(),
        }
    }
}

/// ssh/scp/bbcp based [`RemoteCopy`]
pub struct SshRemoteCopy {
    target: RemoteTarget,
    method: TransferMethod,
    credential: Option<String>,
    timeout: Duration,
}

impl SshRemoteCopy {
    pub fn new(target: RemoteTarget, method: TransferMethod, timeout: Duration) -> Self {
        Self {
            target,
            method,
            credential: None,
            timeout,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self, TransferError> {
        let host = config
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransferError::NotConfigured("transfer.host".to_string()))?;
        let user = config
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TransferError::NotConfigured("transfer.user".to_string()))?;

        let target = RemoteTarget {
            user,
            host,
            directory: config.directory.clone(),
        };
        Ok(Self::new(target, config.method, config.command_timeout()).with_credential(config.credential()))
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// `ssh user@host test -f <path>`
    pub fn exists_command(&self, remote_path: &str) -> CommandLine {
        let mut args = self.ssh_options();
        args.extend([
            self.target.login(),
            "test".to_string(),
            "-f".to_string(),
            shell_quote(remote_path),
        ]);
        self.wrap(CommandLine::new("ssh", args))
    }

    /// `ssh user@host test`, used to check login before the first poll
    pub fn probe_command(&self) -> CommandLine {
        let mut args = self.ssh_options();
        args.extend([self.target.login(), "test".to_string()]);
        self.wrap(CommandLine::new("ssh", args))
    }

    pub fn copy_command(&self, local: &Path) -> CommandLine {
        let local = local.display().to_string();
        let command = match self.method {
            TransferMethod::Scp => {
                let mut args = self.ssh_options();
                args.extend([local, self.target.scp_target()]);
                CommandLine::new("scp", args)
            }
            TransferMethod::Bbcp => CommandLine::new(
                "bbcp",
                vec![
                    "-w".to_string(),
                    "8m".to_string(),
                    "-s".to_string(),
                    "16".to_string(),
                    local,
                    self.target.scp_target(),
                ],
            ),
        };
        self.wrap(command)
    }

    /// Check that the destination accepts our login
    pub async fn probe(&self) -> Result<(), TransferError> {
        let status = self.execute(&self.probe_command()).await?;
        match status.code {
            // `test` without arguments exits 1; reaching it proves the login
            Some(0) | Some(1) => Ok(()),
            _ => Err(status.into_error("ssh")),
        }
    }

    fn ssh_options(&self) -> Vec<String> {
        if self.credential.is_some() {
            Vec::new()
        } else {
            vec!["-o".to_string(), "BatchMode=yes".to_string()]
        }
    }

    fn wrap(&self, command: CommandLine) -> CommandLine {
        match &self.credential {
            Some(secret) => {
                let mut args = vec!["-e".to_string(), command.program];
                args.extend(command.args);
                CommandLine {
                    program: "sshpass".to_string(),
                    args,
                    env: vec![("SSHPASS".to_string(), secret.clone())],
                }
            }
            None => command,
        }
    }

    async fn execute(&self, command: &CommandLine) -> Result<CommandStatus, TransferError> {
        debug!(program = %command.program, args = ?command.args, "Running remote command");

        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransferError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TransferError::TimedOut {
                program: command.program.clone(),
                timeout: self.timeout,
            })??;

        Ok(CommandStatus {
            code: output.status.code(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

struct CommandStatus {
    code: Option<i32>,
    status: String,
    stderr: String,
}

impl CommandStatus {
    fn into_error(self, program: &str) -> TransferError {
        TransferError::Failed {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr,
        }
    }
}

#[async_trait]
impl RemoteCopy for SshRemoteCopy {
    fn remote_path_for(&self, local: &Path) -> String {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.target.remote_path(&name)
    }

    async fn exists(&self, remote_path: &str) -> Result<bool, TransferError> {
        let status = self.execute(&self.exists_command(remote_path)).await?;
        match status.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            // 255 and friends: ssh itself failed
            _ => Err(status.into_error("ssh")),
        }
    }

    async fn copy(&self, local: &Path) -> Result<(), TransferError> {
        let command = self.copy_command(local);
        let status = self.execute(&command).await?;
        match status.code {
            Some(0) => Ok(()),
            _ => {
                let program = match self.method {
                    TransferMethod::Scp => "scp",
                    TransferMethod::Bbcp => "bbcp",
                };
                Err(status.into_error(program))
            }
        }
    }

    fn destination(&self) -> String {
        self.target.scp_target()
    }
}

/// Quote `word` for the remote login shell that ssh hands its arguments to
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}
