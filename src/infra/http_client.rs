use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("emuseum_recon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpGetResult> {
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        debug!("GET {} -> {}", url, status);

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ReconError::Auth(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(ReconError::Transport(format!("HTTP {status} from {url}")));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();
        Ok(HttpGetResult {
            status: status.as_u16(),
            bytes,
            content_type,
        })
    }
}
