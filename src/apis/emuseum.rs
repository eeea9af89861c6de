use crate::app::ports::HttpClientPort;
use crate::config::ApiConfig;
use crate::constants::{DETAIL_PATH, SEARCH_PATH};
use crate::error::{ReconError, Result};
use crate::parser::{AutoDecoder, ResponseDecoder};
use crate::types::{CandidateRecord, RelicApi};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Client for the National Museum of Korea e-museum open API.
pub struct EmuseumApi {
    http: Arc<dyn HttpClientPort>,
    decoder: Box<dyn ResponseDecoder>,
    base_url: String,
    service_key: String,
    num_of_rows: u32,
}

impl EmuseumApi {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &ApiConfig) -> Self {
        Self {
            http,
            decoder: Box::new(AutoDecoder),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            num_of_rows: config.num_of_rows,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ResponseDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<CandidateRecord>> {
        let url = self.endpoint(path);
        let resp = self.http.get(&url, query).await?;
        debug!(
            "{} answered HTTP {} with {} bytes as {}",
            path,
            resp.status,
            resp.bytes.len(),
            resp.content_type
        );
        let decoded = self.decoder.decode(&resp.bytes)?;
        decoded.into_candidates()
    }
}

#[async_trait]
impl RelicApi for EmuseumApi {
    fn api_name(&self) -> &'static str {
        "emuseum"
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<CandidateRecord>> {
        let rows = self.num_of_rows.to_string();
        let params = [
            ("serviceKey", self.service_key.as_str()),
            ("name", query),
            ("numOfRows", rows.as_str()),
            ("pageNo", "1"),
            ("returnType", "json"),
        ];
        let candidates = self.fetch(SEARCH_PATH, &params).await?;
        info!("Search '{}' returned {} candidates", query, candidates.len());
        Ok(candidates)
    }

    #[instrument(skip(self))]
    async fn detail(&self, id: &str) -> Result<CandidateRecord> {
        let params = [
            ("serviceKey", self.service_key.as_str()),
            ("id", id),
            ("returnType", "json"),
        ];
        self.fetch(DETAIL_PATH, &params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReconError::IncompleteRecord(format!("detail for {id} returned no record")))
    }
}
