use crate::error::Result;
use async_trait::async_trait;

/// Outbound HTTP used by the API adapters.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// GET `url` with `query` appended. Non-success statuses are errors, so a
    /// returned result always carries a body worth decoding.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}
