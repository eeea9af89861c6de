//! Constants shared across the API adapter, the pipeline and the CLI.

// e-museum open API
pub const DEFAULT_BASE_URL: &str = "https://www.emuseum.go.kr/openapi";
pub const SEARCH_PATH: &str = "relic/list";
pub const DETAIL_PATH: &str = "relic/detail";
pub const SERVICE_KEY_ENV: &str = "MUSEUM_API_KEY";

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_NUM_OF_ROWS: u32 = 10;

// Run limits
pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_WORKERS: usize = 1;

// Normalization
pub const DEFAULT_DESCRIPTION_CAP: usize = 180;
pub const ELLIPSIS: char = '…';
pub const DEFAULT_LICENSE: &str = "공공누리 제1유형";

// Output
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_OUTPUT_STEM: &str = "nmk_highlights";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_PATH: &str = "recon.toml";

/// Hosts of stock images the front end used before real artifact images existed.
pub const PLACEHOLDER_IMAGE_HOSTS: &[&str] = &["unsplash.com"];

// Catalog CSV header names
pub const CATALOG_INVENTORY_HEADERS: &[&str] = &["유물번호", "inventory_number", "inventoryNumber"];
pub const CATALOG_TITLE_HEADERS: &[&str] = &["유물명", "title"];

/// Service result codes that mean the key itself is unusable.
pub const AUTH_RESULT_CODES: &[&str] = &["20", "30", "31", "32"];
/// Service result code for "no data"; treated as an empty result.
pub const NO_DATA_RESULT_CODE: &str = "03";

/// Returns true for result codes the service uses to signal success.
pub fn is_success_code(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code.chars().all(|c| c == '0')
}
