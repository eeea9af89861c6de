use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use emuseum_recon::apis::EmuseumApi;
use emuseum_recon::catalog::load_catalog;
use emuseum_recon::config::Config;
use emuseum_recon::constants::DEFAULT_CONFIG_PATH;
use emuseum_recon::infra::http_client::ReqwestHttp;
use emuseum_recon::logging;
use emuseum_recon::output::{read_records, write_run_outputs, OutputPaths};
use emuseum_recon::patch::{audit_file, patch_file, ImageIssue};
use emuseum_recon::pipeline::processing::NormalizeOptions;
use emuseum_recon::pipeline::{Pipeline, PipelineOptions};
use emuseum_recon::types::RelicApi;

#[derive(Parser)]
#[command(name = "emuseum_recon")]
#[command(about = "Enrich a museum catalog with records from the e-museum open API")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a catalog (CSV or artworks JSON) against the API and write outputs
    Run {
        /// Catalog file to read
        catalog: PathBuf,
        /// Override output directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Override output file stem
        #[arg(long)]
        stem: Option<String>,
        /// Override the number of entries processed at once
        #[arg(long)]
        workers: Option<usize>,
        /// Override the pause after each entry, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Override the maximum number of catalog entries
        #[arg(long)]
        max_entries: Option<usize>,
    },
    /// Run a single search and print the candidates
    Search {
        query: String,
    },
    /// Apply enriched records onto a front-end artworks.json file
    Patch {
        /// Records JSON written by `run`
        #[arg(long)]
        records: Option<PathBuf>,
        /// Front-end data file to update in place
        target: PathBuf,
    },
    /// Report artworks whose imageUrl is missing, empty or a stock placeholder
    Check {
        /// Front-end data file to inspect
        target: PathBuf,
    },
}

fn build_api(config: &Config) -> Result<Arc<dyn RelicApi>> {
    let http = ReqwestHttp::new(Duration::from_secs(config.api.timeout_seconds))?;
    Ok(Arc::new(EmuseumApi::new(Arc::new(http), &config.api)))
}

async fn run(config: Config, catalog: PathBuf) -> Result<()> {
    config.validate()?;
    let entries = load_catalog(&catalog, config.run.max_entries)
        .with_context(|| format!("failed to load catalog {}", catalog.display()))?;
    if entries.is_empty() {
        warn!("Catalog {} has no entries", catalog.display());
    }

    let options = PipelineOptions {
        delay: Duration::from_millis(config.run.delay_ms),
        workers: config.run.workers,
        normalize: NormalizeOptions {
            description_cap: config.run.description_cap,
            license_fallback: config.run.license_fallback.clone(),
        },
    };
    let pipeline = Pipeline::new(build_api(&config)?, options);

    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current entry and stopping");
            cancel.cancel();
        }
    });

    let result = pipeline.run(&entries).await.context("reconciliation aborted")?;
    let paths: OutputPaths = write_run_outputs(&config.output.dir, &config.output.stem, &result)?;

    let s = &result.summary;
    println!("\n📊 Reconciliation results ({}):", result.run_id);
    println!("   Total entries: {}", s.total);
    println!("   Enriched: {}", s.enriched);
    println!("   Unmatched: {}", s.unmatched);
    println!("   Failed: {}", s.failed);
    if s.not_attempted > 0 {
        println!("   Not attempted (cancelled): {}", s.not_attempted);
    }
    println!("   CSV: {}", paths.csv.display());
    println!("   JSON: {}", paths.json.display());
    println!("   Report: {}", paths.report.display());

    let failures: Vec<_> = result.entries.iter().filter(|e| e.status == "failed").collect();
    if !failures.is_empty() {
        println!("\n⚠️  Failed entries:");
        for f in failures {
            println!(
                "   - {} ({}): {}",
                f.title,
                f.inventory_number,
                f.reason.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

async fn search(config: Config, query: &str) -> Result<()> {
    config.validate()?;
    let api = build_api(&config)?;
    let candidates = api.search(query).await?;
    println!("🔎 {} candidates for '{}'", candidates.len(), query);
    for c in candidates {
        println!("   {} | {} | {} | {}", c.id, c.name, c.collection_number, c.era);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let _guard = logging::init_logging(&config.output.log_dir);

    let outcome = match cli.command {
        Commands::Run {
            catalog,
            out_dir,
            stem,
            workers,
            delay_ms,
            max_entries,
        } => {
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }
            if let Some(stem) = stem {
                config.output.stem = stem;
            }
            if let Some(workers) = workers {
                config.run.workers = workers;
            }
            if let Some(delay_ms) = delay_ms {
                config.run.delay_ms = delay_ms;
            }
            if let Some(max_entries) = max_entries {
                config.run.max_entries = max_entries;
            }
            run(config, catalog).await
        }
        Commands::Search { query } => search(config, &query).await,
        Commands::Patch { records, target } => {
            let records_path = records
                .unwrap_or_else(|| OutputPaths::new(&config.output.dir, &config.output.stem).json);
            let records = read_records(&records_path)
                .with_context(|| format!("failed to read records {}", records_path.display()))?;
            let patched = patch_file(&target, &records)
                .with_context(|| format!("failed to patch {}", target.display()))?;
            println!("✅ Patched {} of {} records into {}", patched, records.len(), target.display());
            Ok(())
        }
        Commands::Check { target } => {
            let audit = audit_file(&target)
                .with_context(|| format!("failed to check {}", target.display()))?;
            println!("\n🖼️  Image URL check for {}:", target.display());
            for f in &audit.findings {
                println!("   - {} ({}): {:?}", f.id, f.title, f.issue);
            }
            println!("   Total artworks: {}", audit.total);
            println!("   Missing: {}", audit.count(ImageIssue::Missing));
            println!("   Empty: {}", audit.count(ImageIssue::Empty));
            println!("   Placeholder: {}", audit.count(ImageIssue::Placeholder));
            if audit.findings.is_empty() {
                println!("✅ Every artwork has an image URL");
            }
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    } else {
        info!("Done");
    }
    outcome
}
