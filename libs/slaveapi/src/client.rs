//! reqwest-backed control API client.

use std::time::Duration;

use async_trait::async_trait;
use buildfarm_retry::RetryPolicy;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SlaveApiError;
use crate::types::{ActionResponse, SlaveInfo, SlaveList, SlaveSummary};
use crate::ControlApi;

/// Control API client.
#[derive(Debug, Clone)]
pub struct SlaveApiClient {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl SlaveApiClient {
    /// Create a new client for the server at `base_url`.
    ///
    /// Paths are appended to `base_url`, so a prefix such as
    /// `https://host/slaveapi/` is preserved.
    pub fn new(base_url: &str, retry: RetryPolicy) -> Result<Self, SlaveApiError> {
        let base_url = Url::parse(base_url).map_err(|e| SlaveApiError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(SlaveApiError::Url(format!(
                "{base_url} cannot be used as a base url"
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("buildfarm-slaveapi/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(SlaveApiError::Transport)?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    /// The server this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base urls are rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn shutdown_endpoint(&self, name: &str, waittime: Duration) -> Url {
        let mut url = self.endpoint(&["slaves", name, "actions", "shutdown_buildslave"]);
        url.query_pairs_mut()
            .append_pair("waittime", &waittime.as_secs().to_string());
        url
    }

    async fn execute(&self, method: &Method, url: &Url) -> Result<reqwest::Response, SlaveApiError> {
        debug!(method = %method, url = %url, "Calling slave API");

        let response = self
            .client
            .request(method.clone(), url.clone())
            .send()
            .await
            .map_err(SlaveApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, body = %body, "Slave API returned an error");
            return Err(SlaveApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        op_name: &str,
        method: Method,
        url: Url,
    ) -> Result<T, SlaveApiError> {
        let (method, url) = (&method, &url);
        self.retry
            .retry(op_name, move || async move {
                let response = self.execute(method, url).await?;
                let body = response.bytes().await.map_err(SlaveApiError::Transport)?;
                serde_json::from_slice(&body).map_err(|e| SlaveApiError::Decode(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl ControlApi for SlaveApiClient {
    async fn production_slaves(&self) -> Result<Vec<SlaveSummary>, SlaveApiError> {
        let mut url = self.endpoint(&["slaves"]);
        url.query_pairs_mut()
            .append_pair("environment", "prod")
            .append_pair("enabled", "1");

        let list: SlaveList = self.call_json("list_slaves", Method::GET, url).await?;
        Ok(list.slaves)
    }

    async fn slave_info(&self, name: &str) -> Result<SlaveInfo, SlaveApiError> {
        let url = self.endpoint(&["slaves", name]);
        self.call_json("get_slave", Method::GET, url).await
    }

    async fn request_graceful_shutdown(
        &self,
        name: &str,
        waittime: Duration,
    ) -> Result<ActionResponse, SlaveApiError> {
        let url = self.shutdown_endpoint(name, waittime);
        self.call_json("shutdown_buildslave", Method::POST, url).await
    }

    async fn shutdown_status(
        &self,
        name: &str,
        waittime: Duration,
        request_id: i64,
    ) -> Result<ActionResponse, SlaveApiError> {
        let mut url = self.shutdown_endpoint(name, waittime);
        url.query_pairs_mut()
            .append_pair("requestid", &request_id.to_string());
        self.call_json("shutdown_status", Method::GET, url).await
    }

    async fn request_reboot(&self, name: &str) -> Result<(), SlaveApiError> {
        let url = self.endpoint(&["slaves", name, "actions", "reboot"]);
        let (method, url) = (&Method::POST, &url);
        self.retry
            .retry("reboot", move || async move {
                self.execute(method, url).await.map(|_| ())
            })
            .await
    }
}
