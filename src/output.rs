//! Writing enriched records and the run report to disk.

use crate::error::Result;
use crate::pipeline::PipelineResult;
use crate::types::EnrichedRecord;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            csv: dir.join(format!("{stem}.csv")),
            json: dir.join(format!("{stem}.json")),
            report: dir.join(format!("{stem}_report.json")),
        }
    }
}

/// Column order of the CSV output; matches the serialized field order of
/// [`EnrichedRecord`].
pub const CSV_COLUMNS: [&str; 10] = [
    "id",
    "title_ko",
    "title_en",
    "period",
    "material",
    "dimensions",
    "short_desc",
    "image_url",
    "license",
    "item_no",
];

/// The header row is written even when `records` is empty.
pub fn write_csv(path: &Path, records: &[EnrichedRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    wtr.write_record(CSV_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty JSON, UTF-8, non-ASCII text written as-is.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Writes the CSV, the JSON records and the run report under `dir`.
pub fn write_run_outputs(dir: &Path, stem: &str, result: &PipelineResult) -> Result<OutputPaths> {
    fs::create_dir_all(dir)?;
    let paths = OutputPaths::new(dir, stem);

    write_csv(&paths.csv, &result.records)?;
    write_json(&paths.json, &result.records)?;
    write_json(&paths.report, result)?;

    info!(
        "Wrote {} records to {} and {}",
        result.records.len(),
        paths.csv.display(),
        paths.json.display()
    );
    Ok(paths)
}

/// Reads records previously written by [`write_json`].
pub fn read_records(path: &Path) -> Result<Vec<EnrichedRecord>> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
