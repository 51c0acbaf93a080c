use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::error::BatchError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retrieves the bytes behind a remote locator.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, BatchError>;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> Result<Vec<u8>, BatchError> + Send + Sync,
{
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, BatchError> {
        self(locator)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self, BatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dated-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BatchError::FetchHttp(err.to_string()))?,
        );
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BatchError::FetchHttp(err.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, BatchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .status()
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
        Err(BatchError::FetchStatus { status, message })
    }

    /// Timeouts can surface on `send` or while reading the body.
    fn request_error(&self, err: reqwest::Error) -> BatchError {
        if err.is_timeout() {
            BatchError::Timeout(self.timeout)
        } else {
            BatchError::FetchHttp(err.to_string())
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, BatchError> {
        debug!(url = locator, "http.request");
        let response = self
            .client
            .get(locator)
            .send()
            .map_err(|err| self.request_error(err))?;
        let response = Self::handle_status(response)?;
        let bytes = response.bytes().map_err(|err| self.request_error(err))?;
        debug!(url = locator, bytes = bytes.len(), "http.response");
        Ok(bytes.to_vec())
    }
}
