// ABOUTME: CLI entry point for landrec-loader
// ABOUTME: Parses commands and routes to sync, verify, orphans, and status handlers

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use landrec_loader::config::{
    ConfigFile, LoaderConfig, PartySource, DEFAULT_CHUNK_WIDTH, DEFAULT_MAX_RETRIES,
    DEFAULT_PAGE_SIZE,
};
use landrec_loader::db::connect_with_retry;
use landrec_loader::orphans;
use landrec_loader::sync::{verify_county, JobStats, LoaderState, SyncJob, SyncRunner};

#[derive(Parser)]
#[command(name = "landrec-loader")]
#[command(about = "Chunked, idempotent loader for county land-record index data", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the checkpoint state file
    #[arg(long = "state-path", global = true)]
    state_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// PostgreSQL connection string
    #[arg(long)]
    source: Option<String>,
    /// County scope for this run
    #[arg(long)]
    county: Option<i32>,
    /// Path to a TOML defaults file (CLI flags win)
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Retry attempts per chunk on transient failure (default: 3)
    #[arg(long)]
    max_retries: Option<u32>,
}

impl SourceArgs {
    /// Resolve the run configuration. Every knob follows the same
    /// precedence: explicit CLI flag, then config file, then built-in
    /// default. The sizing flags live on the sync subcommands, so they
    /// arrive here as arguments.
    fn resolve(
        &self,
        chunk_width: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<LoaderConfig> {
        let file = match &self.config_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let source_url = self
            .source
            .clone()
            .or(file.source)
            .context("No source database given; pass --source or set it in the config file")?;
        let county_id = self
            .county
            .or(file.county)
            .context("No county given; pass --county or set it in the config file")?;

        let mut config = LoaderConfig::new(source_url, county_id);
        config.chunk_width = chunk_width
            .or(file.chunk_width)
            .unwrap_or(DEFAULT_CHUNK_WIDTH);
        config.page_size = page_size.or(file.page_size).unwrap_or(DEFAULT_PAGE_SIZE);
        config.max_retries = self
            .max_retries
            .or(file.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize canonical tables from staging data
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Check post-sync invariants: no duplicate parties, no completeness gaps
    Verify {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Find object-store keys no Document row links to
    Orphans {
        #[command(flatten)]
        source: SourceArgs,
        /// Object-store listing, one key per line
        #[arg(long)]
        manifest: PathBuf,
        /// Key prefix scoping this county's objects (e.g. "Washington/")
        #[arg(long)]
        prefix: String,
        /// Write orphaned keys to this file for a separate delete pass
        #[arg(long = "delete-manifest")]
        delete_manifest: Option<PathBuf>,
    },
    /// Show persisted job checkpoints
    Status,
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Canonical Document rows from the distinct external-key domain
    Documents {
        #[command(flatten)]
        source: SourceArgs,
        /// Distinct keys per page (default: 2000)
        #[arg(long)]
        page_size: Option<i64>,
        /// Ignore any previous checkpoint and start from the beginning
        #[arg(long)]
        no_resume: bool,
    },
    /// Party rows for one or more staging variants
    Parties {
        #[command(flatten)]
        source: SourceArgs,
        /// Variants to run, in order (default: all four)
        #[arg(long, value_delimiter = ',')]
        variant: Vec<PartySource>,
        /// documentIDs per chunk (default: 5000)
        #[arg(long)]
        chunk_width: Option<i64>,
        /// Ignore any previous checkpoint and start from the beginning
        #[arg(long)]
        no_resume: bool,
    },
    /// Documents first, then all four party variants
    All {
        #[command(flatten)]
        source: SourceArgs,
        /// Distinct keys per page for the document job (default: 2000)
        #[arg(long)]
        page_size: Option<i64>,
        /// documentIDs per chunk for the party jobs (default: 5000)
        #[arg(long)]
        chunk_width: Option<i64>,
        /// Ignore any previous checkpoint and start from the beginning
        #[arg(long)]
        no_resume: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG has highest precedence, then --log, then "info"
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let state_path = cli
        .state_path
        .clone()
        .unwrap_or_else(LoaderState::default_path);

    match cli.command {
        Commands::Sync { target } => run_sync(target, state_path).await,
        Commands::Verify { source } => run_verify(source).await,
        Commands::Orphans {
            source,
            manifest,
            prefix,
            delete_manifest,
        } => run_orphans(source, manifest, prefix, delete_manifest).await,
        Commands::Status => run_status(&state_path).await,
    }
}

/// What one `sync` invocation runs: an explicit job list, or the full
/// documents-then-parties sequence the runner owns.
enum SyncWork {
    Jobs(Vec<SyncJob>),
    Everything,
}

async fn run_sync(target: SyncTarget, state_path: PathBuf) -> Result<()> {
    let (config, work, resume) = match target {
        SyncTarget::Documents {
            source,
            page_size,
            no_resume,
        } => {
            let config = source.resolve(None, page_size)?;
            (config, SyncWork::Jobs(vec![SyncJob::Documents]), !no_resume)
        }
        SyncTarget::Parties {
            source,
            variant,
            chunk_width,
            no_resume,
        } => {
            let config = source.resolve(chunk_width, None)?;
            let variants = if variant.is_empty() {
                PartySource::ALL.to_vec()
            } else {
                variant
            };
            let jobs = variants.into_iter().map(SyncJob::Parties).collect();
            (config, SyncWork::Jobs(jobs), !no_resume)
        }
        SyncTarget::All {
            source,
            page_size,
            chunk_width,
            no_resume,
        } => {
            let config = source.resolve(chunk_width, page_size)?;
            (config, SyncWork::Everything, !no_resume)
        }
    };

    config.validate()?;
    let client = connect_with_retry(&config.source_url, config.max_retries).await?;
    let runner = SyncRunner::new(&client, &config, state_path, resume);

    let all_stats: Vec<JobStats> = match work {
        SyncWork::Everything => runner.run_all().await?,
        SyncWork::Jobs(jobs) => {
            let mut all_stats = Vec::new();
            for job in jobs {
                all_stats.push(runner.run(job).await?);
            }
            all_stats
        }
    };

    println!("\nSync summary (county {}):", config.county_id);
    let mut total = 0u64;
    for stats in &all_stats {
        println!(
            "  {}: {} rows inserted over {} chunks in {}ms",
            stats.label, stats.rows_inserted, stats.chunks_completed, stats.duration_ms
        );
        total += stats.rows_inserted;
    }
    println!("  total: {} rows inserted", total);
    Ok(())
}

async fn run_verify(source: SourceArgs) -> Result<()> {
    let config = source.resolve(None, None)?;
    config.validate()?;
    let client = connect_with_retry(&config.source_url, config.max_retries).await?;

    let report = verify_county(&client, config.county_id).await?;
    println!("Verification for county {}:", report.county_id);
    println!("  documents: {}", report.documents);
    println!("  parties:   {}", report.parties);
    println!("  duplicate party tuples: {}", report.duplicate_tuples);
    for (label, count) in &report.gaps {
        println!("  unsynchronized names ({}): {}", label, count);
    }

    if !report.is_clean() {
        bail!("verification found invariant violations");
    }
    println!("All invariants hold.");
    Ok(())
}

async fn run_orphans(
    source: SourceArgs,
    manifest: PathBuf,
    prefix: String,
    delete_manifest: Option<PathBuf>,
) -> Result<()> {
    let config = source.resolve(None, None)?;
    config.validate()?;

    let contents = std::fs::read_to_string(&manifest)
        .with_context(|| format!("Failed to read manifest {:?}", manifest))?;
    let object_keys = orphans::parse_manifest(&contents);

    let client = connect_with_retry(&config.source_url, config.max_retries).await?;
    let linked = orphans::document_keys(&client, config.county_id).await?;

    let report = orphans::find_orphaned_keys(&object_keys, &prefix, &linked);
    println!(
        "{} keys under prefix {:?}, {} linked, {} orphaned",
        report.listed,
        prefix,
        report.linked,
        report.orphaned.len()
    );
    for key in &report.orphaned {
        println!("  {}", key);
    }

    if let Some(path) = delete_manifest {
        let mut out = report.orphaned.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        std::fs::write(&path, out)
            .with_context(|| format!("Failed to write delete manifest {:?}", path))?;
        println!("Wrote {} keys to {:?}", report.orphaned.len(), path);
    }
    Ok(())
}

async fn run_status(state_path: &Path) -> Result<()> {
    if !state_path.exists() {
        println!("No loader state found at {:?}.", state_path);
        return Ok(());
    }

    let state = LoaderState::load(state_path).await?;
    println!("Loader state (source: {})", state.source_url);
    println!("  updated: {}", state.updated_at.to_rfc3339());

    if state.jobs.is_empty() {
        println!("  no job checkpoints recorded.");
        return Ok(());
    }

    let mut keys: Vec<&String> = state.jobs.keys().collect();
    keys.sort();
    for key in keys {
        let job = &state.jobs[key];
        println!(
            "  {}: next {}, {} rows inserted, updated {}",
            key,
            job.next,
            job.rows_inserted,
            job.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn args(config_path: Option<PathBuf>, max_retries: Option<u32>) -> SourceArgs {
        SourceArgs {
            source: Some("postgres://localhost/land".to_string()),
            county: Some(7),
            config_path,
            max_retries,
        }
    }

    #[test]
    fn test_config_file_sizing_survives_without_cli_flags() {
        let (_dir, path) = write_config(
            r#"
            chunk_width = 1000
            page_size = 250
            "#,
        );

        let config = args(Some(path), None).resolve(None, None).unwrap();
        assert_eq!(config.chunk_width, 1_000);
        assert_eq!(config.page_size, 250);
    }

    #[test]
    fn test_cli_sizing_flags_beat_config_file() {
        let (_dir, path) = write_config(
            r#"
            chunk_width = 1000
            page_size = 250
            "#,
        );

        let config = args(Some(path), None)
            .resolve(Some(400), Some(50))
            .unwrap();
        assert_eq!(config.chunk_width, 400);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_cli_max_retries_beats_config_file() {
        let (_dir, path) = write_config("max_retries = 9\n");

        let from_file = args(Some(path.clone()), None).resolve(None, None).unwrap();
        assert_eq!(from_file.max_retries, 9);

        let from_flag = args(Some(path), Some(1)).resolve(None, None).unwrap();
        assert_eq!(from_flag.max_retries, 1);
    }

    #[test]
    fn test_defaults_apply_without_file_or_flags() {
        let config = args(None, None).resolve(None, None).unwrap();
        assert_eq!(config.chunk_width, DEFAULT_CHUNK_WIDTH);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }
}
