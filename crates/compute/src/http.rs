//! REST client for a remote Forecast Compute Service.
//!
//! Endpoints:
//!
//! ```text
//! POST /forecasts            -> {"handle": "<id>"}
//! GET  /forecasts/{handle}   -> ComputeReport
//! ```

use std::time::Duration;

use async_trait::async_trait;
use foresight_core::job::ForecastRequest;
use serde::Deserialize;

use crate::service::{ComputeError, ComputeReport, ExternalHandle, ForecastCompute};

/// Upper bound on one request to the compute service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one compute service instance.
pub struct HttpComputeService {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /forecasts`.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    handle: String,
}

impl HttpComputeService {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:9000`.
    /// * `timeout` - Bound on each request; a service that does not answer
    ///   in time is reported as unavailable.
    pub fn new(api_url: String, timeout: Duration) -> Result<Self, ComputeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    // ---- private helpers ----

    /// Map transport failures that mean "nobody answered" to
    /// [`ComputeError::ServiceUnavailable`].
    fn classify(err: reqwest::Error) -> ComputeError {
        if err.is_connect() || err.is_timeout() {
            ComputeError::ServiceUnavailable(err.to_string())
        } else {
            ComputeError::Request(err)
        }
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComputeError> {
        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ComputeError::ServiceUnavailable(format!(
                "{} returned 503",
                response.url()
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComputeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComputeError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(Self::classify)
    }
}

#[async_trait]
impl ForecastCompute for HttpComputeService {
    async fn submit(&self, request: &ForecastRequest) -> Result<ExternalHandle, ComputeError> {
        let response = self
            .client
            .post(format!("{}/forecasts", self.api_url))
            .json(request)
            .send()
            .await
            .map_err(Self::classify)?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        tracing::info!(handle = %body.handle, "Forecast submitted to compute service");
        Ok(ExternalHandle(body.handle))
    }

    async fn poll(&self, handle: &ExternalHandle) -> Result<ComputeReport, ComputeError> {
        let response = self
            .client
            .get(format!("{}/forecasts/{}", self.api_url, handle))
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::UnknownHandle(handle.to_string()));
        }
        Self::parse_response(response).await
    }
}
