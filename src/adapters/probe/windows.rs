//! Windows hosts over WinRM.
//!
//! Speaks just enough WS-Management to open a `cmd` shell, run one
//! PowerShell command in it, collect stdout and delete the shell again.
//! The service must accept Basic auth over HTTP:
//!
//! ```text
//! winrm quickconfig
//! winrm set winrm/config/service/Auth '@{Basic="true"}'
//! winrm set winrm/config/service '@{AllowUnencrypted="true"}'
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::TargetDescriptor;
use crate::error::{ConnectError, ProbeError};
use crate::ports::{NicCounters, Session};

const SHELL_RESOURCE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
const STATE_DONE: &str = "CommandState/Done";
const MAX_RECEIVE_ROUNDS: usize = 64;
const HTTPS_PORT: u16 = 5986;

const CPU_SCRIPT: &str =
    "Get-WmiObject win32_processor | Select-Object -Property DeviceID,LoadPercentage | ConvertTo-Json";
const MEM_SCRIPT: &str =
    "Get-WmiObject win32_OperatingSystem | Select-Object -Property FreePhysicalMemory,TotalVisibleMemorySize | ConvertTo-Json";
const DISK_SCRIPT: &str =
    "Get-WmiObject -Class Win32_logicaldisk -Filter DriveType=3 | Select-Object -Property DeviceID,FreeSpace,Size | ConvertTo-Json";
const NIC_SCRIPT: &str =
    "Get-NetAdapterStatistics | Select-Object -Property Name,ReceivedBytes,SentBytes | ConvertTo-Json";

static SHELL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?ShellId>([^<]+)<").expect("static regex"));
static COMMAND_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?CommandId>([^<]+)<").expect("static regex"));
static STREAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:\w+:)?Stream\b[^>]*Name="(\w+)"[^>]*>([^<]*)<"#).expect("static regex")
});
static EXIT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?ExitCode>(-?\d+)<").expect("static regex"));
static FAULT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?(?:Text|Message)[^>]*>([^<]+)<").expect("static regex")
});

#[derive(Debug)]
enum WinRmFailure {
    Http(reqwest::Error),
    Auth,
    Fault { status: u16, detail: String },
    Protocol(String),
}

impl WinRmFailure {
    fn into_connect_error(self, host: &str) -> ConnectError {
        let host = host.to_string();
        match self {
            Self::Auth => ConnectError::Auth { host },
            Self::Http(e) if e.is_timeout() => ConnectError::Timeout { host },
            Self::Http(e) if e.is_connect() => ConnectError::Unreachable {
                host,
                detail: e.to_string(),
            },
            other => ConnectError::Transport {
                host,
                detail: format!("{:?}", other),
            },
        }
    }

    fn into_probe_error(self) -> ProbeError {
        match self {
            Self::Http(e) if e.is_timeout() => ProbeError::Timeout,
            other => ProbeError::Command(format!("{:?}", other)),
        }
    }
}

/// Windows host reached over WinRM with Basic auth
pub struct WinRmSession {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    user: String,
    password: String,
}

impl WinRmSession {
    /// Open and close one shell to prove the credential works
    pub async fn connect(
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        // Listeners on 5986 usually carry a self-signed certificate.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(target.port == HTTPS_PORT)
            .build()
            .map_err(|e| ConnectError::Transport {
                host: target.host.clone(),
                detail: e.to_string(),
            })?;

        let session = Self {
            client,
            endpoint: endpoint(target),
            host: target.host.clone(),
            user: target.user.clone(),
            password: target.password.clone(),
        };

        let shell = session
            .open_shell()
            .await
            .map_err(|failure| failure.into_connect_error(&session.host))?;
        session.close_shell(&shell).await;

        Ok(session)
    }

    fn envelope(&self, action: &str, shell_id: Option<&str>, options: &str, body: &str) -> String {
        let selector = shell_id
            .map(|id| {
                format!(
                    r#"<w:SelectorSet><w:Selector Name="ShellId">{}</w:Selector></w:SelectorSet>"#,
                    id
                )
            })
            .unwrap_or_default();

        format!(
            concat!(
                r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" "#,
                r#"xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" "#,
                r#"xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd" "#,
                r#"xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">"#,
                "<s:Header>",
                "<a:To>{endpoint}</a:To>",
                r#"<a:ReplyTo><a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>"#,
                r#"<w:ResourceURI s:mustUnderstand="true">{resource}</w:ResourceURI>"#,
                r#"<a:Action s:mustUnderstand="true">{action}</a:Action>"#,
                r#"<w:MaxEnvelopeSize s:mustUnderstand="true">153600</w:MaxEnvelopeSize>"#,
                "<a:MessageID>uuid:{message_id}</a:MessageID>",
                "<w:OperationTimeout>PT60S</w:OperationTimeout>",
                "{selector}{options}",
                "</s:Header>",
                "<s:Body>{body}</s:Body>",
                "</s:Envelope>"
            ),
            endpoint = self.endpoint,
            resource = SHELL_RESOURCE,
            action = action,
            message_id = Uuid::new_v4(),
            selector = selector,
            options = options,
            body = body,
        )
    }

    async fn post(&self, envelope: String) -> Result<String, WinRmFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, "application/soap+xml;charset=UTF-8")
            .body(envelope)
            .send()
            .await
            .map_err(WinRmFailure::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(WinRmFailure::Auth);
        }

        let text = response.text().await.map_err(WinRmFailure::Http)?;
        if !status.is_success() {
            let detail = FAULT_TEXT
                .captures(&text)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(WinRmFailure::Fault {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(text)
    }

    async fn open_shell(&self) -> Result<String, WinRmFailure> {
        let options = concat!(
            "<w:OptionSet>",
            r#"<w:Option Name="WINRS_NOPROFILE">TRUE</w:Option>"#,
            r#"<w:Option Name="WINRS_CODEPAGE">65001</w:Option>"#,
            "</w:OptionSet>"
        );
        let body = concat!(
            "<rsp:Shell>",
            "<rsp:InputStreams>stdin</rsp:InputStreams>",
            "<rsp:OutputStreams>stdout stderr</rsp:OutputStreams>",
            "</rsp:Shell>"
        );

        let response = self.post(self.envelope(ACTION_CREATE, None, options, body)).await?;
        SHELL_ID
            .captures(&response)
            .map(|c| c[1].trim().to_string())
            .ok_or_else(|| WinRmFailure::Protocol("no ShellId in create response".to_string()))
    }

    async fn close_shell(&self, shell_id: &str) {
        let envelope = self.envelope(ACTION_DELETE, Some(shell_id), "", "");
        if let Err(failure) = self.post(envelope).await {
            warn!(host = %self.host, shell_id, ?failure, "Failed to delete remote shell");
        }
    }

    async fn run_in_shell(&self, shell_id: &str, script: &str) -> Result<String, WinRmFailure> {
        let options = concat!(
            "<w:OptionSet>",
            r#"<w:Option Name="WINRS_CONSOLEMODE_STDIN">TRUE</w:Option>"#,
            r#"<w:Option Name="WINRS_SKIP_CMD_SHELL">FALSE</w:Option>"#,
            "</w:OptionSet>"
        );
        let body = format!(
            "<rsp:CommandLine><rsp:Command>powershell</rsp:Command><rsp:Arguments>-NoProfile -NonInteractive -EncodedCommand {}</rsp:Arguments></rsp:CommandLine>",
            encode_powershell(script)
        );

        let response = self
            .post(self.envelope(ACTION_COMMAND, Some(shell_id), options, &body))
            .await?;
        let command_id = COMMAND_ID
            .captures(&response)
            .map(|c| c[1].trim().to_string())
            .ok_or_else(|| WinRmFailure::Protocol("no CommandId in command response".to_string()))?;

        let receive = format!(
            r#"<rsp:Receive><rsp:DesiredStream CommandId="{}">stdout stderr</rsp:DesiredStream></rsp:Receive>"#,
            command_id
        );

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for _ in 0..MAX_RECEIVE_ROUNDS {
            let response = self
                .post(self.envelope(ACTION_RECEIVE, Some(shell_id), "", &receive))
                .await?;

            for capture in STREAM.captures_iter(&response) {
                let decoded = STANDARD
                    .decode(capture[2].trim())
                    .map_err(|e| WinRmFailure::Protocol(format!("bad stream encoding: {}", e)))?;
                match &capture[1] {
                    "stdout" => stdout.extend(decoded),
                    _ => stderr.extend(decoded),
                }
            }

            if response.contains(STATE_DONE) {
                let exit_code = EXIT_CODE
                    .captures(&response)
                    .and_then(|c| c[1].parse::<i32>().ok())
                    .unwrap_or(0);
                if exit_code != 0 {
                    return Err(WinRmFailure::Protocol(format!(
                        "exit code {}: {}",
                        exit_code,
                        String::from_utf8_lossy(&stderr).trim()
                    )));
                }
                return Ok(String::from_utf8_lossy(&stdout).trim().to_string());
            }
        }

        Err(WinRmFailure::Protocol("command did not finish".to_string()))
    }

    async fn run_powershell(&self, script: &str) -> Result<String, ProbeError> {
        debug!(host = %self.host, script, "Running PowerShell command");

        let result = match self.open_shell().await {
            Ok(shell_id) => {
                let result = self.run_in_shell(&shell_id, script).await;
                self.close_shell(&shell_id).await;
                result
            }
            Err(failure) => Err(failure),
        };

        result.map_err(|failure| {
            error!(host = %self.host, script, ?failure, "Failed to run PowerShell command");
            failure.into_probe_error()
        })
    }

    async fn rows<T: DeserializeOwned>(&self, script: &str) -> Result<Vec<T>, ProbeError> {
        let output = self.run_powershell(script).await?;
        parse_rows(&output)
    }
}

/// WS-Management URL; port 5986 is the HTTPS listener
fn endpoint(target: &TargetDescriptor) -> String {
    let scheme = if target.port == HTTPS_PORT { "https" } else { "http" };
    format!("{}://{}/wsman", scheme, target.address())
}

/// `-EncodedCommand` takes base64 of the UTF-16LE script
fn encode_powershell(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

/// `ConvertTo-Json` emits a bare object for a single row
fn parse_rows<T: DeserializeOwned>(output: &str) -> Result<Vec<T>, ProbeError> {
    let value: serde_json::Value =
        serde_json::from_str(output).map_err(|e| ProbeError::Parse(format!("{}: {}", e, output)))?;

    let rows = match value {
        serde_json::Value::Array(rows) => rows,
        object @ serde_json::Value::Object(_) => vec![object],
        other => return Err(ProbeError::Parse(format!("expected JSON rows, got {}", other))),
    };

    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| ProbeError::Parse(e.to_string())))
        .collect()
}

#[derive(Debug, Deserialize)]
struct CpuRow {
    #[serde(rename = "LoadPercentage")]
    load: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MemRow {
    #[serde(rename = "FreePhysicalMemory")]
    free: f64,
    #[serde(rename = "TotalVisibleMemorySize")]
    total: f64,
}

#[derive(Debug, Deserialize)]
struct DiskRow {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "FreeSpace")]
    free: Option<f64>,
    #[serde(rename = "Size")]
    size: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NicRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ReceivedBytes")]
    received: f64,
    #[serde(rename = "SentBytes")]
    sent: f64,
}

fn average_load(rows: &[CpuRow]) -> Result<f64, ProbeError> {
    let loads: Vec<f64> = rows.iter().filter_map(|row| row.load).collect();
    if loads.is_empty() {
        return Err(ProbeError::Parse("no processor reported a load".to_string()));
    }
    Ok(loads.iter().sum::<f64>() / loads.len() as f64)
}

#[async_trait]
impl Session for WinRmSession {
    async fn cpu_utilization(&self) -> Result<f64, ProbeError> {
        let rows: Vec<CpuRow> = self.rows(CPU_SCRIPT).await?;
        average_load(&rows)
    }

    async fn mem_utilization(&self) -> Result<f64, ProbeError> {
        let rows: Vec<MemRow> = self.rows(MEM_SCRIPT).await?;
        let mem = rows
            .first()
            .ok_or_else(|| ProbeError::Parse("empty memory report".to_string()))?;
        if mem.total <= 0.0 {
            return Err(ProbeError::Parse("TotalVisibleMemorySize is zero".to_string()));
        }
        Ok((1.0 - mem.free / mem.total) * 100.0)
    }

    async fn disk_utilization(&self) -> Result<Option<BTreeMap<String, f64>>, ProbeError> {
        let rows: Vec<DiskRow> = self.rows(DISK_SCRIPT).await?;
        let disks = rows
            .into_iter()
            .filter_map(|row| match (row.free, row.size) {
                (Some(free), Some(size)) if size > 0.0 => Some((
                    row.device_id.trim_end_matches(':').to_string(),
                    (size - free) * 100.0 / size,
                )),
                _ => None,
            })
            .collect();
        Ok(Some(disks))
    }

    async fn nic_utilization(&self) -> Result<Option<BTreeMap<String, NicCounters>>, ProbeError> {
        let rows: Vec<NicRow> = self.rows(NIC_SCRIPT).await?;
        let nics = rows
            .into_iter()
            .map(|row| {
                (
                    row.name,
                    NicCounters {
                        received_bytes: row.received,
                        sent_bytes: row.sent,
                    },
                )
            })
            .collect();
        Ok(Some(nics))
    }
}
