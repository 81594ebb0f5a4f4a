use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser};

use crate::error::ConfigError;

/// Flags of the polling process
#[derive(Parser, Debug, Clone)]
#[command(
    name = "osprobe",
    version,
    about = "Poll a server fleet and export health metrics to Prometheus"
)]
pub struct PollerArgs {
    /// Pushgateway job name
    #[arg(short, long, default_value = "osprobe", env = "OSPROBE_JOB")]
    pub job: String,

    /// Pushgateway base URL, e.g. http://pushgateway:9091
    #[arg(short = 'u', long, env = "OSPROBE_PUSH_URL")]
    pub push_url: Option<String>,

    /// Server descriptor file
    #[arg(short, long, default_value = "servers.json", env = "OSPROBE_TARGETS")]
    pub targets: PathBuf,

    /// Seconds between poll rounds
    #[arg(short, long, default_value_t = 60, env = "OSPROBE_INTERVAL")]
    pub interval: u64,

    /// Address to serve /metrics on, e.g. 0.0.0.0:9100
    #[arg(short, long, env = "OSPROBE_LISTEN")]
    pub listen: Option<String>,

    /// Upper bound on targets probed at once (0 = unbounded)
    #[arg(long, default_value_t = 0, env = "OSPROBE_MAX_CONCURRENCY")]
    pub max_concurrency: usize,

    /// Seconds allowed for each remote call
    #[arg(long, default_value_t = 10, env = "OSPROBE_PROBE_TIMEOUT")]
    pub probe_timeout: u64,

    #[arg(long, default_value = "info", env = "OSPROBE_LOG_LEVEL")]
    pub log_level: String,
}

/// Validated configuration of the polling process
#[derive(Debug, Clone)]
pub struct Config {
    pub job: String,
    pub push_url: Option<String>,
    pub targets: PathBuf,
    pub interval: Duration,
    pub listen: Option<String>,
    pub max_concurrency: usize,
    pub probe_timeout: Duration,
    pub log_level: String,
}

impl PollerArgs {
    pub fn validate(self) -> Result<Config, ConfigError> {
        let push_url = non_empty(self.push_url);
        let listen = non_empty(self.listen);

        if self.job.trim().is_empty() {
            return Err(ConfigError::Invalid("job name must not be empty".to_string()));
        }
        if self.targets.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("targets file must not be empty".to_string()));
        }
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be greater than zero".to_string()));
        }
        if self.probe_timeout == 0 {
            return Err(ConfigError::Invalid("probe timeout must be greater than zero".to_string()));
        }
        if push_url.is_none() && listen.is_none() {
            return Err(ConfigError::Invalid(
                "either a push URL or a listen address is required".to_string(),
            ));
        }

        Ok(Config {
            job: self.job,
            push_url,
            targets: self.targets,
            interval: Duration::from_secs(self.interval),
            listen,
            max_concurrency: self.max_concurrency,
            probe_timeout: Duration::from_secs(self.probe_timeout),
            log_level: self.log_level,
        })
    }
}

/// Flags of the discovery tool
#[derive(Parser, Debug, Clone)]
#[command(
    name = "osprobe-scan",
    version,
    about = "Fingerprint hosts and match them against a credential list"
)]
pub struct ScanArgs {
    /// JSON array of hosts to scan
    #[arg(short = 's', long = "server", default_value = "hosts.json", env = "OSPROBE_SCAN_SERVER")]
    pub hosts: PathBuf,

    /// Credential database, {"linux": ["user:secret", ...], ...}
    #[arg(
        short = 'p',
        long = "password",
        default_value = "credentials.json",
        env = "OSPROBE_SCAN_PASSWORD"
    )]
    pub credentials: PathBuf,

    /// Where to write the server descriptor file
    #[arg(short, long, default_value = "servers.json", env = "OSPROBE_SCAN_OUTPUT")]
    pub output: PathBuf,

    /// Seconds allowed for each port check
    #[arg(long, default_value_t = 3, env = "OSPROBE_SCAN_TIMEOUT")]
    pub timeout: u64,

    /// Seconds allowed for each login attempt
    #[arg(long, default_value_t = 10, env = "OSPROBE_SCAN_PROBE_TIMEOUT")]
    pub probe_timeout: u64,

    #[arg(long, default_value = "info", env = "OSPROBE_SCAN_LOG_LEVEL")]
    pub log_level: String,
}

impl ScanArgs {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.hosts.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("host list file must not be empty".to_string()));
        }
        if self.credentials.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("credential file must not be empty".to_string()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output file must not be empty".to_string()));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("timeout must be greater than zero".to_string()));
        }
        if self.probe_timeout == 0 {
            return Err(ConfigError::Invalid("probe timeout must be greater than zero".to_string()));
        }
        Ok(self)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

/// Flags of the one-shot checker
#[derive(Parser, Debug, Clone)]
#[command(
    name = "osprobe-check",
    version,
    about = "Probe every server in a descriptor file once and print the readings"
)]
pub struct CheckArgs {
    /// Server descriptor file
    #[arg(default_value = "servers.json")]
    pub targets: PathBuf,

    /// Seconds allowed for each remote call
    #[arg(long, default_value_t = 10, env = "OSPROBE_PROBE_TIMEOUT")]
    pub probe_timeout: u64,

    #[arg(long, default_value = "warn", env = "OSPROBE_LOG_LEVEL")]
    pub log_level: String,
}

impl CheckArgs {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.targets.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("targets file must not be empty".to_string()));
        }
        if self.probe_timeout == 0 {
            return Err(ConfigError::Invalid("probe timeout must be greater than zero".to_string()));
        }
        Ok(self)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

/// Print usage for `P` and exit with status 1
pub fn usage_exit<P: CommandFactory>(error: &ConfigError) -> ! {
    eprintln!("error: {}\n", error);
    let _ = P::command().print_help();
    std::process::exit(1);
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
