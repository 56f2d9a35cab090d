/// HTTP transport for the remote sync endpoint
///
/// JSON over HTTP against the push, pull and delete-one routes. Every request
/// is bounded by the configured timeout.

use async_trait::async_trait;
use notesync_core::InstanceId;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::protocol::{
    DeleteRequest, DeleteResponse, PullResponse, PushRequest, PushResponse, RemoteEndpoint,
    DELETE_PATH, PULL_PATH, PUSH_PATH,
};
use crate::{Result, SyncError};

pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::Config("server URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else {
            SyncError::Network(error.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.timeout)
            } else {
                SyncError::InvalidResponse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl RemoteEndpoint for HttpTransport {
    async fn push(&self, request: PushRequest) -> Result<PushResponse> {
        let response = self
            .client
            .post(self.url(PUSH_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    async fn pull(&self, instance_id: &InstanceId) -> Result<PullResponse> {
        let response = self
            .client
            .get(self.url(PULL_PATH))
            .query(&[("instanceId", instance_id.as_str())])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    async fn delete_one(&self, request: DeleteRequest) -> Result<DeleteResponse> {
        let response = self
            .client
            .post(self.url(DELETE_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let transport = HttpTransport::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:3000");
        assert_eq!(transport.url(PUSH_PATH), "http://localhost:3000/api/syncnotes");
        assert_eq!(transport.describe(), "http:http://localhost:3000");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            HttpTransport::new("", Duration::from_secs(1)),
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = transport
            .pull(&InstanceId::parse("inst").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
