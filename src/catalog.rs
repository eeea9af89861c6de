//! Loading the local catalog that drives a run.

use crate::constants::{CATALOG_INVENTORY_HEADERS, CATALOG_TITLE_HEADERS};
use crate::error::{ReconError, Result};
use crate::types::CatalogEntry;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Loads catalog entries from `path`, choosing the format by extension
/// (`.json` for the front-end data file, anything else as CSV).
pub fn load_catalog(path: &Path, max_entries: usize) -> Result<Vec<CatalogEntry>> {
    let bytes = fs::read(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let entries = if is_json {
        parse_json_catalog(&bytes)?
    } else {
        parse_csv_catalog(&bytes)?
    };
    let entries = finalize(entries, max_entries);
    info!("Loaded {} catalog entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Keeps the first line of a multi-line inventory cell, trimmed.
fn clean_inventory(raw: &str) -> String {
    raw.lines().next().unwrap_or("").trim().to_string()
}

fn clean_title(raw: &str) -> String {
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        title
    }
}

fn is_header_value(value: &str, headers: &[&str]) -> bool {
    headers.iter().any(|h| h.eq_ignore_ascii_case(value.trim()))
}

/// Parses a CSV export whose header row may be preceded by preamble lines.
pub fn parse_csv_catalog(bytes: &[u8]) -> Result<Vec<CatalogEntry>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut columns: Option<(usize, usize)> = None;
    let mut entries = Vec::new();

    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let Some((inv_col, title_col)) = columns else {
            let inv = row.iter().position(|c| is_header_value(c, CATALOG_INVENTORY_HEADERS));
            let title = row.iter().position(|c| is_header_value(c, CATALOG_TITLE_HEADERS));
            if let (Some(inv), Some(title)) = (inv, title) {
                debug!("Catalog header found on row {}", line + 1);
                columns = Some((inv, title));
            }
            continue;
        };

        let inventory = clean_inventory(row.get(inv_col).unwrap_or(""));
        let title = clean_title(row.get(title_col).unwrap_or(""));

        if inventory.eq_ignore_ascii_case("nan") || is_header_value(&inventory, CATALOG_INVENTORY_HEADERS) {
            continue;
        }
        if inventory.is_empty() && title.is_empty() {
            continue;
        }
        entries.push(CatalogEntry::new(inventory, title));
    }

    if columns.is_none() {
        return Err(ReconError::Parse(format!(
            "catalog has no header row with {} and {}",
            CATALOG_INVENTORY_HEADERS[0], CATALOG_TITLE_HEADERS[0]
        )));
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct JsonCatalogItem {
    #[serde(default, rename = "inventoryNumber")]
    inventory_number: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Parses the front-end data file: an array of objects carrying `title` and
/// `inventoryNumber`. Other fields are ignored.
pub fn parse_json_catalog(bytes: &[u8]) -> Result<Vec<CatalogEntry>> {
    let items: Vec<JsonCatalogItem> = serde_json::from_slice(bytes)?;
    Ok(items
        .into_iter()
        .map(|item| {
            CatalogEntry::new(
                clean_inventory(item.inventory_number.as_deref().unwrap_or("")),
                clean_title(item.title.as_deref().unwrap_or("")),
            )
        })
        .filter(|e| !(e.inventory_number.is_empty() && e.title.is_empty()))
        .collect())
}

/// Drops duplicate entries, keeping the first, and caps the list.
fn finalize(entries: Vec<CatalogEntry>, max_entries: usize) -> Vec<CatalogEntry> {
    let mut seen = HashSet::new();
    let mut out: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|e| seen.insert((e.inventory_number.clone(), e.title.clone())))
        .collect();
    if out.len() > max_entries {
        warn!("Catalog has {} entries; keeping the first {}", out.len(), max_entries);
        out.truncate(max_entries);
    }
    out
}
