use anyhow::Result;
use async_trait::async_trait;
use emuseum_recon::error::{ReconError, Result as ReconResult};
use emuseum_recon::pipeline::{CancelFlag, Pipeline, PipelineOptions};
use emuseum_recon::types::{CandidateRecord, CatalogEntry, ImageRef, ImageVariant, RelicApi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory stand-in for the museum service.
#[derive(Default)]
struct FakeApi {
    search_results: HashMap<String, Vec<CandidateRecord>>,
    search_errors: HashMap<String, fn() -> ReconError>,
    detail_errors: HashMap<String, fn() -> ReconError>,
    /// Per-query latency, used to make later entries finish first.
    latency: HashMap<String, Duration>,
    /// Search query that trips the cancel flag while it is in flight.
    cancel_during: Option<(String, CancelFlag)>,
    panic_on: Option<String>,
    calls: AtomicUsize,
    searched: Mutex<Vec<String>>,
}

impl FakeApi {
    fn with_search(mut self, query: &str, candidates: Vec<CandidateRecord>) -> Self {
        self.search_results.insert(query.to_string(), candidates);
        self
    }

    fn failing_search(mut self, query: &str, err: fn() -> ReconError) -> Self {
        self.search_errors.insert(query.to_string(), err);
        self
    }

    fn failing_detail(mut self, id: &str, err: fn() -> ReconError) -> Self {
        self.detail_errors.insert(id.to_string(), err);
        self
    }

    fn cancelling(mut self, query: &str, cancel: CancelFlag) -> Self {
        self.cancel_during = Some((query.to_string(), cancel));
        self
    }

    fn panicking(mut self, query: &str) -> Self {
        self.panic_on = Some(query.to_string());
        self
    }

    fn slow(mut self, query: &str, millis: u64) -> Self {
        self.latency.insert(query.to_string(), Duration::from_millis(millis));
        self
    }
}

#[async_trait]
impl RelicApi for FakeApi {
    fn api_name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str) -> ReconResult<Vec<CandidateRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.searched.lock().unwrap().push(query.to_string());
        if let Some((trigger, cancel)) = &self.cancel_during {
            if trigger == query {
                cancel.cancel();
            }
        }
        if self.panic_on.as_deref() == Some(query) {
            panic!("search backend crashed on {query}");
        }
        if let Some(latency) = self.latency.get(query) {
            tokio::time::sleep(*latency).await;
        }
        if let Some(err) = self.search_errors.get(query) {
            return Err(err());
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }

    async fn detail(&self, id: &str) -> ReconResult<CandidateRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.detail_errors.get(id) {
            return Err(err());
        }
        let found = self
            .search_results
            .values()
            .flatten()
            .find(|c| c.id == id)
            .cloned();
        found.ok_or_else(|| ReconError::IncompleteRecord(format!("unknown id {id}")))
    }
}

fn candidate(id: &str, name: &str, collection: &str) -> CandidateRecord {
    CandidateRecord {
        id: id.into(),
        name: name.into(),
        collection_number: collection.into(),
        description: format!("{name} 설명"),
        images: vec![
            ImageRef::new(format!("https://img/{id}_s.jpg"), ImageVariant::ThumbnailSmall),
            ImageRef::new(format!("https://img/{id}_o.jpg"), ImageVariant::Original),
        ],
        ..Default::default()
    }
}

fn options(workers: usize) -> PipelineOptions {
    PipelineOptions {
        delay: Duration::from_millis(1),
        workers,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_inventory_match_ignores_spacing() -> Result<()> {
    let api = FakeApi::default().with_search("빗살무늬토기", vec![candidate("PS1", "토기", "암사 123")]);
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline.run(&[CatalogEntry::new("암사123", "빗살무늬토기")]).await?;

    assert_eq!(result.summary.enriched, 1);
    assert_eq!(result.records[0].id, "PS1");
    assert_eq!(result.records[0].item_no, "암사123");
    assert_eq!(result.records[0].image_url, "https://img/PS1_o.jpg");
    assert_eq!(
        serde_json::to_value(&result.entries[0])?["rule"],
        serde_json::json!("inventory_number")
    );
    Ok(())
}

#[tokio::test]
async fn test_unrelated_results_fall_back_to_first() -> Result<()> {
    let api = FakeApi::default().with_search(
        "방울",
        vec![
            candidate("A", "청동 거울", "본관1"),
            candidate("B", "청동 검", "본관2"),
            candidate("C", "청동 창", "본관3"),
        ],
    );
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline.run(&[CatalogEntry::new("", "방울")]).await?;

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].id, "A");
    assert_eq!(result.records[0].title_ko, "청동 거울");
    Ok(())
}

#[tokio::test]
async fn test_detail_failure_drops_entry_and_continues() -> Result<()> {
    let api = FakeApi::default()
        .with_search("금관", vec![candidate("G1", "금관", "황북9310")])
        .with_search("방울", vec![candidate("B1", "방울", "본관7")])
        .failing_detail("G1", || ReconError::Transport("HTTP 500".into()));
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline
        .run(&[CatalogEntry::new("황북9310", "금관"), CatalogEntry::new("본관7", "방울")])
        .await?;

    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.summary.enriched, 1);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].item_no, "본관7");
    assert_eq!(result.entries[0].status, "failed");
    assert_eq!(result.entries[0].error_kind, Some("incomplete_record"));
    Ok(())
}

#[tokio::test]
async fn test_no_candidates_is_unmatched() -> Result<()> {
    let api = FakeApi::default().with_search("금관", vec![candidate("G1", "금관", "황북9310")]);
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline
        .run(&[CatalogEntry::new("황북9310", "금관"), CatalogEntry::new("본관0", "없는 유물")])
        .await?;

    assert_eq!(result.summary.unmatched, 1);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.entries[1].status, "unmatched");
    Ok(())
}

#[tokio::test]
async fn test_matched_candidate_without_id_is_incomplete() -> Result<()> {
    let api = FakeApi::default().with_search("금관", vec![candidate("", "금관", "황북9310")]);
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline.run(&[CatalogEntry::new("황북9310", "금관")]).await?;

    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.entries[0].error_kind, Some("incomplete_record"));
    assert!(result.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_auth_on_first_call_aborts_run() {
    let api = Arc::new(
        FakeApi::default().failing_search("금관", || ReconError::Auth("SERVICE_KEY_IS_NOT_REGISTERED_ERROR".into())),
    );
    let pipeline = Pipeline::new(api.clone(), options(1));

    let err = pipeline
        .run(&[CatalogEntry::new("황북9310", "금관"), CatalogEntry::new("본관7", "방울")])
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_later_auth_is_per_entry_failure() -> Result<()> {
    let api = FakeApi::default()
        .with_search("금관", vec![candidate("G1", "금관", "황북9310")])
        .failing_search("방울", || ReconError::Auth("LIMITED".into()));
    let pipeline = Pipeline::new(Arc::new(api), options(1));

    let result = pipeline
        .run(&[CatalogEntry::new("황북9310", "금관"), CatalogEntry::new("본관7", "방울")])
        .await?;

    assert_eq!(result.summary.enriched, 1);
    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.entries[1].error_kind, Some("auth"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_run_keeps_catalog_order() -> Result<()> {
    let titles = ["하나", "둘", "셋", "넷", "다섯"];
    let mut api = FakeApi::default();
    for (i, title) in titles.iter().enumerate() {
        api = api
            .with_search(title, vec![candidate(&format!("ID{i}"), title, &format!("본관{i}"))])
            // Earlier entries answer slower, so completion order is reversed.
            .slow(title, 60 - (i as u64) * 10);
    }
    let pipeline = Pipeline::new(Arc::new(api), options(4));

    let entries: Vec<CatalogEntry> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| CatalogEntry::new(format!("본관{i}"), *t))
        .collect();
    let result = pipeline.run(&entries).await?;

    let item_nos: Vec<&str> = result.records.iter().map(|r| r.item_no.as_str()).collect();
    assert_eq!(item_nos, ["본관0", "본관1", "본관2", "본관3", "본관4"]);
    let indices: Vec<usize> = result.entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, [0, 1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_run_reports_not_attempted() -> Result<()> {
    let api = FakeApi::default().with_search("금관", vec![candidate("G1", "금관", "황북9310")]);
    let cancel = CancelFlag::new();
    let pipeline = Pipeline::new(Arc::new(api), options(1)).with_cancel_flag(cancel.clone());
    cancel.cancel();

    let result = pipeline
        .run(&[CatalogEntry::new("황북9310", "금관"), CatalogEntry::new("본관7", "방울")])
        .await?;

    assert!(result.cancelled);
    assert_eq!(result.summary.not_attempted, 2);
    assert_eq!(result.summary.total, 2);
    assert!(result.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_search_uses_inventory_when_title_missing() -> Result<()> {
    let api = Arc::new(FakeApi::default().with_search("본관6255", vec![candidate("E1", "귀걸이", "본관6255")]));
    let pipeline = Pipeline::new(api.clone(), options(1));

    let result = pipeline.run(&[CatalogEntry::new("본관6255", "")]).await?;

    assert_eq!(api.searched.lock().unwrap().as_slice(), ["본관6255"]);
    assert_eq!(result.records[0].title_ko, "귀걸이");
    Ok(())
}

fn three_entries() -> (FakeApi, Vec<CatalogEntry>) {
    let api = FakeApi::default()
        .with_search("금관", vec![candidate("G1", "금관", "황북9310")])
        .with_search("방울", vec![candidate("B1", "방울", "본관7")])
        .with_search("거울", vec![candidate("M1", "거울", "본관8")]);
    let entries = vec![
        CatalogEntry::new("황북9310", "금관"),
        CatalogEntry::new("본관7", "방울"),
        CatalogEntry::new("본관8", "거울"),
    ];
    (api, entries)
}

async fn run_cancelled_mid_entry(workers: usize) -> Result<()> {
    let cancel = CancelFlag::new();
    let (api, entries) = three_entries();
    let api = api.cancelling("금관", cancel.clone());
    let pipeline = Pipeline::new(Arc::new(api), options(workers)).with_cancel_flag(cancel);

    let result = pipeline.run(&entries).await?;

    assert!(result.cancelled);
    assert_eq!(result.summary.enriched, 1);
    assert_eq!(result.summary.not_attempted, 2);
    assert_eq!(result.records[0].item_no, "황북9310");
    let statuses: Vec<&str> = result.entries.iter().map(|e| e.status).collect();
    assert_eq!(statuses, ["enriched", "not_attempted", "not_attempted"]);
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_entry_keeps_finished_work_sequential() -> Result<()> {
    run_cancelled_mid_entry(1).await
}

#[tokio::test]
async fn test_cancel_during_entry_keeps_finished_work_with_workers() -> Result<()> {
    run_cancelled_mid_entry(3).await
}

#[tokio::test]
async fn test_delay_follows_every_entry_but_the_last() -> Result<()> {
    let (api, entries) = three_entries();
    let delay = Duration::from_millis(50);
    let pipeline = Pipeline::new(
        Arc::new(api),
        PipelineOptions {
            delay,
            workers: 1,
            ..Default::default()
        },
    );

    let started = Instant::now();
    let result = pipeline.run(&entries).await?;

    assert_eq!(result.summary.enriched, 3);
    assert!(started.elapsed() >= delay * (entries.len() as u32 - 1));
    Ok(())
}

#[tokio::test]
async fn test_crashed_worker_counts_as_failed() -> Result<()> {
    let (api, entries) = three_entries();
    let api = api.panicking("방울");
    let pipeline = Pipeline::new(Arc::new(api), options(2));

    let result = pipeline.run(&entries).await?;

    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.summary.enriched, 2);
    assert_eq!(result.summary.not_attempted, 0);
    assert_eq!(result.entries[1].status, "failed");
    assert_eq!(result.entries[1].error_kind, Some("worker"));
    assert_eq!(result.records.len(), 2);
    Ok(())
}
