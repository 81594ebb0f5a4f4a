use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use tracing::{debug, info};

use crate::adapters::exposition::{encode_text, gauge_families, text_content_type};
use crate::domain::{MetricDefinition, MetricKind, MetricSample};
use crate::error::TransportError;
use crate::ports::MetricSink;

/// Pushgateway job group addressed as `<base>/metrics/job/<job>`
pub struct PushgatewayClient {
    client: Client,
    job_url: Url,
    definitions: Vec<MetricDefinition>,
}

impl PushgatewayClient {
    pub fn new(base_url: &str, job: &str) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            job_url: job_url(base_url, job)?,
            definitions: MetricKind::ALL.iter().copied().map(MetricDefinition::from).collect(),
        })
    }

    pub fn job_url(&self) -> &Url {
        &self.job_url
    }

    async fn check(response: Response) -> Result<(), TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn job_url(base_url: &str, job: &str) -> Result<Url, TransportError> {
    if job.is_empty() {
        return Err(TransportError::Url(format!("{} (empty job name)", base_url)));
    }

    let mut url = Url::parse(base_url)
        .map_err(|e| TransportError::Url(format!("{}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::Url(base_url.to_string()))?
        .pop_if_empty()
        .extend(["metrics", "job", job]);
    Ok(url)
}

#[async_trait]
impl MetricSink for PushgatewayClient {
    async fn push(&self, samples: &[MetricSample]) -> Result<(), TransportError> {
        let body = encode_text(&gauge_families(&self.definitions, samples)?)?;
        debug!(url = %self.job_url, samples = samples.len(), "Pushing metrics");

        let response = self
            .client
            .put(self.job_url.clone())
            .header(CONTENT_TYPE, text_content_type())
            .body(body)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn delete(&self) -> Result<(), TransportError> {
        info!(url = %self.job_url, "Deleting job from push gateway");
        let response = self.client.delete(self.job_url.clone()).send().await?;
        Self::check(response).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::domain::OsKind;

    #[test]
    fn test_job_url() {
        let url = job_url("http://gateway:9091", "osprobe").unwrap();
        assert_eq!(url.as_str(), "http://gateway:9091/metrics/job/osprobe");

        let url = job_url("http://gateway:9091/prefix/", "fleet a").unwrap();
        assert_eq!(url.as_str(), "http://gateway:9091/prefix/metrics/job/fleet%20a");
    }

    #[test]
    fn test_job_url_rejects_bad_input() {
        assert!(job_url("not a url", "osprobe").is_err());
        assert!(job_url("http://gateway:9091", "").is_err());
    }

    #[tokio::test]
    async fn test_push_puts_text_batch_to_job_group() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/metrics/job/osprobe")
            .match_header("content-type", Matcher::Regex("^text/plain".to_string()))
            .match_body(Matcher::Regex(
                r#"cpu_utilization\{host="10.0.0.1",type="linux"\} 12"#.to_string(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let client = PushgatewayClient::new(&server.url(), "osprobe").unwrap();
        let samples = vec![
            MetricSample::new(MetricKind::Online, "10.0.0.1", OsKind::Linux, 1.0),
            MetricSample::new(MetricKind::CpuUtilization, "10.0.0.1", OsKind::Linux, 12.0),
        ];
        client.push(&samples).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_empty_batch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/metrics/job/osprobe")
            .match_body(Matcher::Exact(String::new()))
            .with_status(202)
            .create_async()
            .await;

        let client = PushgatewayClient::new(&server.url(), "osprobe").unwrap();
        client.push(&[]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_removes_job_group() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/metrics/job/fleet")
            .with_status(202)
            .create_async()
            .await;

        let client = PushgatewayClient::new(&server.url(), "fleet").unwrap();
        client.delete().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/metrics/job/osprobe")
            .with_status(500)
            .with_body("storage full")
            .create_async()
            .await;

        let client = PushgatewayClient::new(&server.url(), "osprobe").unwrap();
        let samples = vec![MetricSample::new(MetricKind::Online, "h", OsKind::Windows, 0.0)];

        match client.push(&samples).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "storage full");
            }
            other => panic!("expected a status error, got {:?}", other),
        }
    }
}
