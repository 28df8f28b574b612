//! HTTP transport seam for the telemetry source.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::time::Duration;

/// Transport abstraction so the telemetry source can be driven by a mock.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// A poll tick waits at most this long per upstream request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.0.execute(req).await
    }
}
