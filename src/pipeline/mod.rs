//! Reconciliation pipeline driver.
//!
//! Each catalog entry moves through
//! `Pending -> Searched -> {Matched | Unmatched} -> {Enriched | Failed} -> Done`
//! exactly once. Failures on one entry are logged and counted, never
//! propagated, with one exception: an authentication failure on the very
//! first API call of a run aborts the run.

pub mod processing;

use crate::error::{ReconError, Result};
use crate::pipeline::processing::{match_candidate, normalize, select_image, MatchOutcome, MatchRule, NormalizeOptions};
use crate::types::{CatalogEntry, EnrichedRecord, RelicApi};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Lifecycle of one catalog entry within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Searched,
    Matched,
    Unmatched,
    Enriched,
    Failed,
    Done,
}

impl EntryState {
    pub fn can_transition_to(self, next: EntryState) -> bool {
        use EntryState::*;
        matches!(
            (self, next),
            (Pending, Searched)
                | (Pending, Failed)
                | (Searched, Matched)
                | (Searched, Unmatched)
                | (Unmatched, Done)
                | (Matched, Enriched)
                | (Matched, Failed)
                | (Enriched, Done)
                | (Failed, Done)
        )
    }
}

/// Tracks the current state of one entry and logs each transition.
struct EntryTracker {
    index: usize,
    state: EntryState,
}

impl EntryTracker {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: EntryState::Pending,
        }
    }

    fn advance(&mut self, next: EntryState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "entry {}: unexpected transition {:?} -> {:?}",
                self.index, self.state, next
            );
        }
        debug!("entry {}: {:?} -> {:?}", self.index, self.state, next);
        self.state = next;
    }
}

/// Call that failed for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Search,
    Detail,
    /// The entry's worker task died before reporting.
    Worker,
}

/// Terminal result for one entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Enriched { record: EnrichedRecord, rule: MatchRule },
    Unmatched,
    Failed { stage: FailureStage, error: ReconError },
}

impl EntryOutcome {
    fn label(&self) -> &'static str {
        match self {
            EntryOutcome::Enriched { .. } => "enriched",
            EntryOutcome::Unmatched => "unmatched",
            EntryOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-entry line of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub index: usize,
    pub inventory_number: String,
    pub title: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<MatchRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub enriched: usize,
    pub unmatched: usize,
    pub failed: usize,
    /// Entries skipped because the run was cancelled.
    pub not_attempted: usize,
}

/// Result of a complete pipeline run.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub api_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub summary: RunSummary,
    /// Enriched rows in catalog order.
    #[serde(skip)]
    pub records: Vec<EnrichedRecord>,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Pause after every entry regardless of outcome.
    pub delay: Duration,
    /// Entries in flight at once; 1 means strictly sequential.
    pub workers: usize,
    pub normalize: NormalizeOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(crate::constants::DEFAULT_DELAY_MS),
            workers: crate::constants::DEFAULT_WORKERS,
            normalize: NormalizeOptions::default(),
        }
    }
}

/// Shared flag checked between entries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    api: Arc<dyn RelicApi>,
    options: PipelineOptions,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(api: Arc<dyn RelicApi>, options: PipelineOptions) -> Self {
        Self {
            api,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Carries one entry through search, match, detail and normalization.
    #[instrument(skip(api, entry, opts), fields(inventory = %entry.inventory_number, title = %entry.title))]
    pub async fn process_entry(
        api: &dyn RelicApi,
        index: usize,
        entry: &CatalogEntry,
        opts: &NormalizeOptions,
    ) -> EntryOutcome {
        let mut tracker = EntryTracker::new(index);

        let query = entry.search_query();
        let candidates = match api.search(query).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracker.advance(EntryState::Failed);
                tracker.advance(EntryState::Done);
                return EntryOutcome::Failed {
                    stage: FailureStage::Search,
                    error,
                };
            }
        };
        tracker.advance(EntryState::Searched);
        debug!("search '{}' returned {} candidates", query, candidates.len());

        let (matched, rule) = match match_candidate(entry, &candidates) {
            MatchOutcome::Matched { candidate, rule } => (candidate, rule),
            MatchOutcome::NoMatch => {
                tracker.advance(EntryState::Unmatched);
                tracker.advance(EntryState::Done);
                return EntryOutcome::Unmatched;
            }
        };
        tracker.advance(EntryState::Matched);
        info!(
            "matched by {} -> id={} name={} collection={}",
            rule.as_str(),
            matched.id,
            matched.name,
            matched.collection_number
        );

        let detail = if matched.id.trim().is_empty() {
            Err(ReconError::IncompleteRecord(
                "matched candidate has no remote id".into(),
            ))
        } else {
            api.detail(matched.id.trim()).await
        };

        let detail = match detail {
            Ok(detail) => detail,
            Err(error) => {
                tracker.advance(EntryState::Failed);
                tracker.advance(EntryState::Done);
                let error = match error {
                    kept @ (ReconError::IncompleteRecord(_) | ReconError::Auth(_)) => kept,
                    other => ReconError::IncompleteRecord(format!(
                        "detail for {} failed: {}",
                        matched.id, other
                    )),
                };
                return EntryOutcome::Failed {
                    stage: FailureStage::Detail,
                    error,
                };
            }
        };

        // The search hit can carry fields the detail record leaves blank.
        let merged = merge_detail(matched, detail);
        let image_url = select_image(&merged.images);
        let record = normalize(entry, &merged, image_url, opts);
        tracker.advance(EntryState::Enriched);
        tracker.advance(EntryState::Done);

        EntryOutcome::Enriched { record, rule }
    }

    /// Runs every entry and returns the ordered result.
    ///
    /// Returns `Err` only when the first API call of the run is rejected for
    /// authentication.
    #[instrument(skip(self, entries), fields(api = %self.api.api_name(), entries = entries.len()))]
    pub async fn run(&self, entries: &[CatalogEntry]) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("🚀 Starting reconciliation run {} for {} entries", run_id, entries.len());

        let mut slots: Vec<Option<EntryOutcome>> = Vec::with_capacity(entries.len());
        slots.resize_with(entries.len(), || None);

        if let Some(first) = entries.first() {
            if !self.cancel.is_cancelled() {
                let outcome = self.timed_entry(0, first).await;
                if let EntryOutcome::Failed {
                    stage: FailureStage::Search,
                    error: ReconError::Auth(reason),
                } = &outcome
                {
                    error!("Service key rejected on first call: {}", reason);
                    return Err(ReconError::Auth(reason.clone()));
                }
                slots[0] = Some(outcome);
                if entries.len() > 1 {
                    tokio::time::sleep(self.options.delay).await;
                }
            }
        }

        if entries.len() > 1 {
            if self.options.workers <= 1 {
                self.run_sequential(entries, &mut slots).await;
            } else {
                self.run_concurrent(entries, &mut slots).await;
            }
        }

        let result = self.assemble(run_id, started_at, entries, slots);
        info!(
            "✅ Run {} finished: total={} enriched={} unmatched={} failed={} not_attempted={}",
            run_id,
            result.summary.total,
            result.summary.enriched,
            result.summary.unmatched,
            result.summary.failed,
            result.summary.not_attempted
        );
        Ok(result)
    }

    async fn timed_entry(&self, index: usize, entry: &CatalogEntry) -> EntryOutcome {
        let started = Instant::now();
        let outcome = Self::process_entry(&*self.api, index, entry, &self.options.normalize).await;
        record_outcome(&outcome, started.elapsed());
        log_outcome(index, entry, &outcome);
        outcome
    }

    async fn run_sequential(&self, entries: &[CatalogEntry], slots: &mut [Option<EntryOutcome>]) {
        for (index, entry) in entries.iter().enumerate().skip(1) {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled before entry {}; stopping", index);
                break;
            }
            slots[index] = Some(self.timed_entry(index, entry).await);
            if index + 1 < entries.len() {
                tokio::time::sleep(self.options.delay).await;
            }
        }
    }

    async fn run_concurrent(&self, entries: &[CatalogEntry], slots: &mut [Option<EntryOutcome>]) {
        let permits = Arc::new(Semaphore::new(self.options.workers));
        let mut tasks = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();

        for (index, entry) in entries.iter().enumerate().skip(1) {
            let permits = permits.clone();
            let api = self.api.clone();
            let cancel = self.cancel.clone();
            let entry = entry.clone();
            let opts = self.options.normalize.clone();
            let delay = self.options.delay;

            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, None);
                };
                if cancel.is_cancelled() {
                    return (index, None);
                }
                let started = Instant::now();
                let outcome = Self::process_entry(&*api, index, &entry, &opts).await;
                record_outcome(&outcome, started.elapsed());
                log_outcome(index, &entry, &outcome);
                tokio::time::sleep(delay).await;
                (index, Some(outcome))
            });
            task_index.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = outcome,
                Err(e) => {
                    error!("Entry worker failed: {}", e);
                    let Some(&index) = task_index.get(&e.id()) else {
                        continue;
                    };
                    let outcome = EntryOutcome::Failed {
                        stage: FailureStage::Worker,
                        error: ReconError::Worker(e.to_string()),
                    };
                    record_outcome(&outcome, Duration::ZERO);
                    log_outcome(index, &entries[index], &outcome);
                    slots[index] = Some(outcome);
                }
            }
        }
    }

    fn assemble(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        entries: &[CatalogEntry],
        slots: Vec<Option<EntryOutcome>>,
    ) -> PipelineResult {
        let mut summary = RunSummary {
            total: entries.len(),
            ..Default::default()
        };
        let mut records = Vec::new();
        let mut reports = Vec::with_capacity(entries.len());

        for (index, (entry, slot)) in entries.iter().zip(slots).enumerate() {
            let mut report = EntryReport {
                index,
                inventory_number: entry.inventory_number.clone(),
                title: entry.title.clone(),
                status: "not_attempted",
                rule: None,
                stage: None,
                error_kind: None,
                reason: None,
            };
            match slot {
                Some(EntryOutcome::Enriched { record, rule }) => {
                    summary.enriched += 1;
                    report.status = "enriched";
                    report.rule = Some(rule);
                    records.push(record);
                }
                Some(EntryOutcome::Unmatched) => {
                    summary.unmatched += 1;
                    report.status = "unmatched";
                }
                Some(EntryOutcome::Failed { stage, error }) => {
                    summary.failed += 1;
                    report.status = "failed";
                    report.stage = Some(stage);
                    report.error_kind = Some(error.kind());
                    report.reason = Some(error.to_string());
                }
                None => summary.not_attempted += 1,
            }
            reports.push(report);
        }

        PipelineResult {
            run_id,
            api_name: self.api.api_name().to_string(),
            started_at,
            finished_at: Utc::now(),
            cancelled: self.cancel.is_cancelled(),
            summary,
            records,
            entries: reports,
        }
    }
}

/// Detail values win; blanks fall back to what the search hit carried.
fn merge_detail(
    hit: &crate::types::CandidateRecord,
    detail: crate::types::CandidateRecord,
) -> crate::types::CandidateRecord {
    fn pick(primary: String, fallback: &str) -> String {
        if primary.trim().is_empty() {
            fallback.to_string()
        } else {
            primary
        }
    }

    let images = if detail.images.is_empty() {
        hit.images.clone()
    } else {
        detail.images
    };

    crate::types::CandidateRecord {
        id: pick(detail.id, &hit.id),
        name: pick(detail.name, &hit.name),
        name_en: pick(detail.name_en, &hit.name_en),
        collection_number: pick(detail.collection_number, &hit.collection_number),
        era: pick(detail.era, &hit.era),
        material: pick(detail.material, &hit.material),
        size: pick(detail.size, &hit.size),
        description: pick(detail.description, &hit.description),
        copyright_label: pick(detail.copyright_label, &hit.copyright_label),
        images,
    }
}

fn record_outcome(outcome: &EntryOutcome, elapsed: Duration) {
    counter!("recon_entries_total", "outcome" => outcome.label()).increment(1);
    histogram!("recon_entry_duration_seconds").record(elapsed.as_secs_f64());
}

fn log_outcome(index: usize, entry: &CatalogEntry, outcome: &EntryOutcome) {
    match outcome {
        EntryOutcome::Enriched { record, rule } => info!(
            "[{}] {} ({}) enriched via {} image={}",
            index,
            entry.title,
            entry.inventory_number,
            rule.as_str(),
            if record.image_url.is_empty() { "none" } else { "yes" }
        ),
        EntryOutcome::Unmatched => warn!(
            "[{}] {} ({}) dropped: no search results",
            index, entry.title, entry.inventory_number
        ),
        EntryOutcome::Failed { stage, error } => warn!(
            "[{}] {} ({}) dropped: {:?} failed ({}): {}",
            index,
            entry.title,
            entry.inventory_number,
            stage,
            error.kind(),
            error
        ),
    }
}
