use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::domain::TargetDescriptor;
use crate::error::{ConnectError, ProbeError};
use crate::ports::Session;

use super::parser;

const CPU_COMMAND: &str = "head -n1 /proc/stat; sleep 1; head -n1 /proc/stat";
const MEM_COMMAND: &str = "cat /proc/meminfo";
const DISK_COMMAND: &str = "df -P -k";

/// sshpass exits with 5 when the password is refused
const SSHPASS_BAD_PASSWORD: i32 = 5;

#[derive(Debug)]
enum SshFailure {
    Spawn(std::io::Error),
    Timeout,
    Auth,
    Exit { code: Option<i32>, stderr: String },
}

/// Linux host reached through the system `ssh` client with `sshpass`
pub struct SshSession {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
}

impl SshSession {
    /// Log in once with a no-op command to prove the credential works
    pub async fn connect(
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let session = Self {
            host: target.host.clone(),
            port: target.port,
            user: target.user.clone(),
            password: target.password.clone(),
            timeout,
        };

        match session.run("true").await {
            Ok(_) => Ok(session),
            Err(SshFailure::Auth) => Err(ConnectError::Auth {
                host: session.host.clone(),
            }),
            Err(SshFailure::Timeout) => Err(ConnectError::Timeout {
                host: session.host.clone(),
            }),
            Err(SshFailure::Spawn(e)) => Err(ConnectError::Transport {
                host: session.host.clone(),
                detail: format!("cannot start sshpass: {}", e),
            }),
            Err(SshFailure::Exit { code, stderr }) => Err(ConnectError::Transport {
                host: session.host.clone(),
                detail: format!("ssh exited with {:?}: {}", code, stderr),
            }),
        }
    }

    fn command(&self, remote: &str) -> Command {
        let mut command = Command::new("sshpass");
        command
            .arg("-e")
            .arg("ssh")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .args(["-o", "PubkeyAuthentication=no"])
            .args(["-o", "PreferredAuthentications=password,keyboard-interactive"])
            .args(["-o", "NumberOfPasswordPrompts=1"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)))
            .arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", self.user, self.host))
            .arg(remote)
            .env("SSHPASS", &self.password)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, remote: &str) -> Result<String, SshFailure> {
        debug!(host = %self.host, command = remote, "Running remote command");

        let output = match timeout(self.timeout, self.command(remote).output()).await {
            Err(_) => return Err(SshFailure::Timeout),
            Ok(Err(e)) => return Err(SshFailure::Spawn(e)),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        match output.status.code() {
            Some(SSHPASS_BAD_PASSWORD) => Err(SshFailure::Auth),
            code => Err(SshFailure::Exit {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn query(&self, remote: &str) -> Result<String, ProbeError> {
        self.run(remote).await.map_err(|failure| {
            error!(host = %self.host, command = remote, ?failure, "Failed to run command");
            match failure {
                SshFailure::Timeout => ProbeError::Timeout,
                other => ProbeError::Command(format!("{:?}", other)),
            }
        })
    }
}

#[async_trait]
impl Session for SshSession {
    async fn cpu_utilization(&self) -> Result<f64, ProbeError> {
        let output = self.query(CPU_COMMAND).await?;
        Ok(parser::cpu_usage_percent(&output)?)
    }

    async fn mem_utilization(&self) -> Result<f64, ProbeError> {
        let output = self.query(MEM_COMMAND).await?;
        Ok(parser::mem_usage_percent(&output)?)
    }

    async fn disk_utilization(&self) -> Result<Option<BTreeMap<String, f64>>, ProbeError> {
        let output = self.query(DISK_COMMAND).await?;
        Ok(Some(parser::parse_df(&output)?))
    }
}
