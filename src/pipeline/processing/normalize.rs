use crate::constants::{DEFAULT_DESCRIPTION_CAP, DEFAULT_LICENSE, ELLIPSIS};
use crate::types::{CandidateRecord, CatalogEntry, EnrichedRecord};

/// Knobs for [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Maximum length of `short_desc` in characters, ellipsis included.
    pub description_cap: usize,
    pub license_fallback: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            description_cap: DEFAULT_DESCRIPTION_CAP,
            license_fallback: DEFAULT_LICENSE.to_string(),
        }
    }
}

/// Collapses runs of whitespace (newlines included) to single spaces, then cuts
/// to at most `cap` characters. A cut string ends with `…` and never splits a
/// character.
pub fn truncate_description(text: &str, cap: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cap == 0 {
        return String::new();
    }
    if collapsed.chars().count() <= cap {
        return collapsed;
    }
    let kept: String = collapsed.chars().take(cap - 1).collect();
    let mut out = kept.trim_end().to_string();
    out.push(ELLIPSIS);
    out
}

fn trimmed(s: &str) -> String {
    s.trim().to_string()
}

/// Merges a catalog entry with the remote record chosen for it.
///
/// Every output field has a source or an empty default. `item_no` always
/// comes from the catalog, never from the remote collection number.
pub fn normalize(
    entry: &CatalogEntry,
    candidate: &CandidateRecord,
    image_url: &str,
    opts: &NormalizeOptions,
) -> EnrichedRecord {
    let title_ko = match candidate.name.trim() {
        "" => trimmed(&entry.title),
        name => name.to_string(),
    };
    let license = match candidate.copyright_label.trim() {
        "" => opts.license_fallback.clone(),
        label => label.to_string(),
    };

    EnrichedRecord {
        id: trimmed(&candidate.id),
        title_local: trimmed(&entry.title),
        title_ko,
        title_en: trimmed(&candidate.name_en),
        period: trimmed(&candidate.era),
        material: trimmed(&candidate.material),
        dimensions: trimmed(&candidate.size),
        short_desc: truncate_description(&candidate.description, opts.description_cap),
        image_url: image_url.trim().to_string(),
        license,
        item_no: trimmed(&entry.inventory_number),
    }
}
