use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A locally known artifact awaiting enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Museum accession identifier; may be empty.
    pub inventory_number: String,
    pub title: String,
}

impl CatalogEntry {
    pub fn new(inventory_number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            inventory_number: inventory_number.into(),
            title: title.into(),
        }
    }

    /// Text sent to the search call: the title, or the inventory number when
    /// the entry has no title.
    pub fn search_query(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() {
            self.inventory_number.trim()
        } else {
            title
        }
    }
}

/// Resolution class of an image as stated by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageVariant {
    Original,
    ThumbnailMedium,
    ThumbnailSmall,
    Unspecified,
}

impl ImageVariant {
    /// Lower is preferred.
    pub fn rank(self) -> u8 {
        match self {
            ImageVariant::Original => 0,
            ImageVariant::ThumbnailMedium => 1,
            ImageVariant::ThumbnailSmall => 2,
            ImageVariant::Unspecified => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub variant: ImageVariant,
}

impl ImageRef {
    pub fn new(url: impl Into<String>, variant: ImageVariant) -> Self {
        Self {
            url: url.into(),
            variant,
        }
    }

    /// Builds a reference for a URL whose variant the service did not state.
    ///
    /// Filename conventions are the only hint available in that case, and this
    /// is the only place in the crate that inspects URL text for it.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let lower = url.to_lowercase();
        let file = lower.rsplit('/').next().unwrap_or("");
        let is_thumb = lower.contains("thumbnail") || lower.contains("/thumb") || file.starts_with("thum");
        let variant = if is_thumb {
            if file.contains("_s.") || lower.contains("small") || lower.contains("thums") {
                ImageVariant::ThumbnailSmall
            } else {
                ImageVariant::ThumbnailMedium
            }
        } else if lower.contains("/original/") || lower.contains("/ori/") {
            ImageVariant::Original
        } else {
            ImageVariant::Unspecified
        };
        Self { url, variant }
    }
}

/// A search or detail record from the remote service, not yet confirmed as the
/// right match for a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub name: String,
    pub name_en: String,
    pub collection_number: String,
    pub era: String,
    pub material: String,
    pub size: String,
    pub description: String,
    pub copyright_label: String,
    pub images: Vec<ImageRef>,
}

/// One output row: a catalog entry merged with its matched remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    /// Catalog title, kept for logging and patching; not part of the written row.
    #[serde(skip)]
    pub title_local: String,
    pub title_ko: String,
    pub title_en: String,
    pub period: String,
    pub material: String,
    pub dimensions: String,
    pub short_desc: String,
    pub image_url: String,
    pub license: String,
    /// Always the local catalog's inventory number.
    pub item_no: String,
}

/// Search and detail calls against a remote collection service.
#[async_trait::async_trait]
pub trait RelicApi: Send + Sync {
    /// Identifier used in logs.
    fn api_name(&self) -> &'static str;

    /// Search by free text. An empty result is `Ok(vec![])`; errors are
    /// reserved for transport, auth and decoding failures.
    async fn search(&self, query: &str) -> Result<Vec<CandidateRecord>>;

    /// Fetch the full record for a remote identifier.
    async fn detail(&self, id: &str) -> Result<CandidateRecord>;
}
