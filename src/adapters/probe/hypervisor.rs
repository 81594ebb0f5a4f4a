//! ESXi hosts over the vSphere SOAP API.
//!
//! Talks to the host directly, not to vCenter. Host summary data is fetched
//! again on every query.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::{debug, error, warn};

use crate::domain::TargetDescriptor;
use crate::error::{ConnectError, ProbeError};
use crate::ports::Session;

const SOAP_ACTION: &str = "urn:vim25/6.0";

static SESSION_MANAGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sessionManager[^>]*>([^<]+)<").expect("static regex"));
static PROPERTY_COLLECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<propertyCollector[^>]*>([^<]+)<").expect("static regex"));
const RETRIEVE_SERVICE_CONTENT: &str = concat!(
    "<urn:RetrieveServiceContent>",
    r#"<urn:_this type="ServiceInstance">ServiceInstance</urn:_this>"#,
    "</urn:RetrieveServiceContent>"
);

static FAULT_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<faultstring>([^<]*)<").expect("static regex"));

#[derive(Debug)]
enum SoapFailure {
    Http(reqwest::Error),
    Fault(String),
    Protocol(String),
}

/// Hardware and quick-stats summary of a host system
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HostSummary {
    pub cpu_mhz: f64,
    pub num_cpu_cores: f64,
    pub memory_size_bytes: f64,
    pub overall_cpu_usage_mhz: f64,
    pub overall_memory_usage_mib: f64,
}

impl HostSummary {
    pub fn parse(xml: &str) -> Result<Self, ProbeError> {
        Ok(Self {
            cpu_mhz: number_field(xml, "cpuMhz")?,
            num_cpu_cores: number_field(xml, "numCpuCores")?,
            memory_size_bytes: number_field(xml, "memorySize")?,
            overall_cpu_usage_mhz: number_field(xml, "overallCpuUsage").unwrap_or(0.0),
            overall_memory_usage_mib: number_field(xml, "overallMemoryUsage").unwrap_or(0.0),
        })
    }

    pub fn cpu_percent(&self) -> Result<f64, ProbeError> {
        let capacity = self.cpu_mhz * self.num_cpu_cores;
        if capacity <= 0.0 {
            return Err(ProbeError::Parse("host reports no cpu capacity".to_string()));
        }
        Ok(self.overall_cpu_usage_mhz / capacity * 100.0)
    }

    pub fn mem_percent(&self) -> Result<f64, ProbeError> {
        if self.memory_size_bytes <= 0.0 {
            return Err(ProbeError::Parse("host reports no memory".to_string()));
        }
        Ok(self.overall_memory_usage_mib * 1024.0 * 1024.0 / self.memory_size_bytes * 100.0)
    }
}

fn number_field(xml: &str, name: &str) -> Result<f64, ProbeError> {
    let open = format!("<{}>", name);
    let start = xml
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| ProbeError::Parse(format!("missing {}", name)))?;
    let end = xml[start..]
        .find('<')
        .map(|i| start + i)
        .ok_or_else(|| ProbeError::Parse(format!("unterminated {}", name)))?;

    xml[start..end]
        .trim()
        .parse()
        .map_err(|e| ProbeError::Parse(format!("{}: {}", name, e)))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:urn="urn:vim25">"#,
            "<soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"
        ),
        body
    )
}

fn login_body(session_manager: &str, user: &str, password: &str) -> String {
    format!(
        concat!(
            "<urn:Login>",
            r#"<urn:_this type="SessionManager">{}</urn:_this>"#,
            "<urn:userName>{}</urn:userName>",
            "<urn:password>{}</urn:password>",
            "</urn:Login>"
        ),
        session_manager,
        escape_xml(user),
        escape_xml(password)
    )
}

fn logout_body(session_manager: &str) -> String {
    format!(
        r#"<urn:Logout><urn:_this type="SessionManager">{}</urn:_this></urn:Logout>"#,
        session_manager
    )
}

fn is_login_rejected(fault: &str) -> bool {
    fault.contains("incorrect user name or password") || fault.contains("InvalidLogin")
}

/// Logged-in vSphere API session on an ESXi host
pub struct VsphereSession {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    session_manager: String,
    property_collector: String,
}

impl VsphereSession {
    pub async fn connect(
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let host = target.host.clone();

        // Session cookies live in this client only.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ConnectError::Transport {
                host: host.clone(),
                detail: e.to_string(),
            })?;

        let mut session = Self {
            client,
            endpoint: format!("https://{}/sdk", target.address()),
            host,
            session_manager: String::new(),
            property_collector: String::new(),
        };

        let content = session
            .call(RETRIEVE_SERVICE_CONTENT)
            .await
            .map_err(|failure| session.connect_error(failure))?;

        session.session_manager = SESSION_MANAGER
            .captures(&content)
            .map(|c| c[1].to_string())
            .ok_or_else(|| ConnectError::Transport {
                host: session.host.clone(),
                detail: "service content has no session manager".to_string(),
            })?;
        session.property_collector = PROPERTY_COLLECTOR
            .captures(&content)
            .map(|c| c[1].to_string())
            .ok_or_else(|| ConnectError::Transport {
                host: session.host.clone(),
                detail: "service content has no property collector".to_string(),
            })?;

        let login = login_body(&session.session_manager, &target.user, &target.password);
        match session.call(&login).await {
            Ok(_) => Ok(session),
            Err(SoapFailure::Fault(fault)) if is_login_rejected(&fault) => Err(ConnectError::Auth {
                host: session.host.clone(),
            }),
            Err(failure) => Err(session.connect_error(failure)),
        }
    }

    fn connect_error(&self, failure: SoapFailure) -> ConnectError {
        let host = self.host.clone();
        match failure {
            SoapFailure::Http(e) if e.is_timeout() => ConnectError::Timeout { host },
            SoapFailure::Http(e) if e.is_connect() => ConnectError::Unreachable {
                host,
                detail: e.to_string(),
            },
            other => ConnectError::Transport {
                host,
                detail: format!("{:?}", other),
            },
        }
    }

    async fn call(&self, body: &str) -> Result<String, SoapFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=utf-8"))
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope(body))
            .send()
            .await
            .map_err(SoapFailure::Http)?;

        let status = response.status();
        let text = response.text().await.map_err(SoapFailure::Http)?;

        if let Some(fault) = FAULT_STRING.captures(&text) {
            return Err(SoapFailure::Fault(fault[1].to_string()));
        }
        if !status.is_success() {
            return Err(SoapFailure::Protocol(format!("HTTP {}", status)));
        }
        Ok(text)
    }

    async fn host_summary(&self) -> Result<HostSummary, ProbeError> {
        let body = format!(
            concat!(
                "<urn:RetrievePropertiesEx>",
                r#"<urn:_this type="PropertyCollector">{}</urn:_this>"#,
                "<urn:specSet>",
                "<urn:propSet><urn:type>HostSystem</urn:type>",
                "<urn:pathSet>summary.hardware</urn:pathSet>",
                "<urn:pathSet>summary.quickStats</urn:pathSet>",
                "</urn:propSet>",
                r#"<urn:objectSet><urn:obj type="HostSystem">ha-host</urn:obj></urn:objectSet>"#,
                "</urn:specSet>",
                "<urn:options/>",
                "</urn:RetrievePropertiesEx>"
            ),
            self.property_collector
        );

        debug!(host = %self.host, "Retrieving host summary");
        let response = self.call(&body).await.map_err(|failure| {
            error!(host = %self.host, ?failure, "Failed to grab host summary information");
            match failure {
                SoapFailure::Http(e) if e.is_timeout() => ProbeError::Timeout,
                other => ProbeError::Command(format!("{:?}", other)),
            }
        })?;

        HostSummary::parse(&response)
    }
}

#[async_trait]
impl Session for VsphereSession {
    async fn cpu_utilization(&self) -> Result<f64, ProbeError> {
        self.host_summary().await?.cpu_percent()
    }

    async fn mem_utilization(&self) -> Result<f64, ProbeError> {
        self.host_summary().await?.mem_percent()
    }

    /// Ends the API session on the host
    async fn close(&self) {
        match self.call(&logout_body(&self.session_manager)).await {
            Ok(_) => debug!(host = %self.host, "Logged out"),
            Err(failure) => warn!(host = %self.host, ?failure, "Failed to log out"),
        }
    }
}
