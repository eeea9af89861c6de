//! Applies enriched records onto the front end's static `artworks.json`.

use crate::constants::PLACEHOLDER_IMAGE_HOSTS;
use crate::error::{ReconError, Result};
use crate::pipeline::processing::matcher::squash_whitespace;
use crate::types::EnrichedRecord;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Patches every object in `artworks` whose `inventoryNumber` matches a
/// record's `item_no` (whitespace ignored). Only non-empty record values are
/// written; all other keys and their order are left alone.
///
/// Returns the number of objects changed.
pub fn patch_artworks(artworks: &mut Value, records: &[EnrichedRecord]) -> Result<usize> {
    let items = artworks
        .as_array_mut()
        .ok_or_else(|| ReconError::Parse("artworks file is not a JSON array".into()))?;

    let by_item_no: HashMap<String, &EnrichedRecord> = records
        .iter()
        .map(|r| (squash_whitespace(&r.item_no), r))
        .filter(|(key, _)| !key.is_empty())
        .collect();

    let mut patched = 0;
    for item in items.iter_mut() {
        let Some(obj) = item.as_object_mut() else {
            continue;
        };
        let key = obj
            .get("inventoryNumber")
            .and_then(Value::as_str)
            .map(squash_whitespace)
            .unwrap_or_default();
        let Some(record) = by_item_no.get(&key) else {
            continue;
        };

        let updates = [
            ("imageUrl", &record.image_url),
            ("period", &record.period),
            ("material", &record.material),
            ("dimensions", &record.dimensions),
            ("titleEn", &record.title_en),
        ];
        let mut changed = false;
        for (field, value) in updates {
            if value.trim().is_empty() {
                continue;
            }
            let new_value = Value::String(value.clone());
            if obj.get(field) != Some(&new_value) {
                obj.insert(field.to_string(), new_value);
                changed = true;
            }
        }
        if changed {
            debug!("Patched artwork {}", key);
            patched += 1;
        }
    }
    Ok(patched)
}

/// Reads `target`, patches it with `records` and writes it back in place.
pub fn patch_file(target: &Path, records: &[EnrichedRecord]) -> Result<usize> {
    let bytes = fs::read(target)?;
    let mut artworks: Value = serde_json::from_slice(&bytes)?;
    let patched = patch_artworks(&mut artworks, records)?;

    let mut out = serde_json::to_string_pretty(&artworks)?;
    out.push('\n');
    fs::write(target, out)?;
    info!("Patched {} artworks in {}", patched, target.display());
    Ok(patched)
}

/// What is wrong with an artwork's `imageUrl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageIssue {
    Missing,
    Empty,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFinding {
    pub id: String,
    pub title: String,
    pub issue: ImageIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageAudit {
    pub total: usize,
    pub findings: Vec<ImageFinding>,
}

impl ImageAudit {
    pub fn count(&self, issue: ImageIssue) -> usize {
        self.findings.iter().filter(|f| f.issue == issue).count()
    }
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Lists artworks whose `imageUrl` is absent, blank or still a stock
/// placeholder.
pub fn audit_image_urls(artworks: &Value) -> Result<ImageAudit> {
    let items = artworks
        .as_array()
        .ok_or_else(|| ReconError::Parse("artworks file is not a JSON array".into()))?;

    let mut audit = ImageAudit {
        total: items.len(),
        ..Default::default()
    };
    for (i, item) in items.iter().enumerate() {
        let issue = match item.get("imageUrl") {
            None | Some(Value::Null) => ImageIssue::Missing,
            Some(Value::String(url)) if url.trim().is_empty() => ImageIssue::Empty,
            Some(Value::String(url)) if PLACEHOLDER_IMAGE_HOSTS.iter().any(|h| url.contains(h)) => {
                ImageIssue::Placeholder
            }
            Some(_) => continue,
        };
        let id = match item.get("id") {
            Some(id) => text_of(Some(id)),
            None => format!("#{i}"),
        };
        let title = text_of(item.get("title"));
        warn!("Artwork {} ({}): imageUrl {:?}", id, title, issue);
        audit.findings.push(ImageFinding { id, title, issue });
    }
    Ok(audit)
}

pub fn audit_file(target: &Path) -> Result<ImageAudit> {
    let bytes = fs::read(target)?;
    let artworks: Value = serde_json::from_slice(&bytes)?;
    audit_image_urls(&artworks)
}
