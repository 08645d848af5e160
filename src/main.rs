use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod accounting;
mod config;
mod errors;
mod sqlite_persistence;
mod warehouse;

use accounting::{FilterOptions, JobSelector, StatusWriter};
use config::{AppConfig, CliConfig, FileConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the warehouse database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file; its values override the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Resource to select jobs for.
    #[clap(long)]
    pub resource_id: Option<i64>,

    /// Select one job by its raw local identifier and exit.
    #[clap(long, conflicts_with_all = ["start", "end"])]
    pub local_job_id: Option<String>,

    /// Start of the end-time window (unix seconds). Without a window, all
    /// unprocessed jobs are selected.
    #[clap(long)]
    pub start: Option<i64>,

    /// End of the end-time window (unix seconds).
    #[clap(long, requires = "start")]
    pub end: Option<i64>,

    /// Reprocess everything in the window regardless of recorded status.
    #[clap(long)]
    pub process_all: bool,

    /// Reprocess jobs whose previous run failed.
    #[clap(long)]
    pub process_bad: bool,

    /// Reprocess jobs summarized by an older pipeline version.
    #[clap(long)]
    pub process_old: bool,

    /// Process jobs that were never attempted.
    #[clap(long)]
    pub process_notdone: bool,

    /// Reprocess jobs already summarized by the current pipeline version.
    #[clap(long)]
    pub process_current: bool,

    /// Reprocess jobs previously skipped as too big.
    #[clap(long)]
    pub process_big: bool,

    /// Reprocess jobs whose recorded version equals this exact value.
    #[clap(long, default_value_t = 0)]
    pub process_error: i64,

    /// Total number of workers sharing the job set.
    #[clap(long)]
    pub num_workers: Option<u32>,

    /// This worker's shard index, in [0, num_workers).
    #[clap(long)]
    pub worker_index: Option<u32>,

    /// Record each listed job as successfully processed.
    #[clap(long)]
    pub mark_done: bool,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!("accounting-worker {}", env!("GIT_HASH"));

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        resource_id: cli_args.resource_id,
        num_workers: cli_args.num_workers,
        worker_index: cli_args.worker_index,
        filter: FilterOptions {
            process_all: cli_args.process_all,
            process_bad: cli_args.process_bad,
            process_old: cli_args.process_old,
            process_notdone: cli_args.process_notdone,
            process_current: cli_args.process_current,
            process_big: cli_args.process_big,
            process_error: cli_args.process_error,
        },
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    // Fails fast on a missing or foreign database before any worker query.
    warehouse::open_warehouse(&config.warehouse)
        .context("Warehouse is not usable")?;

    let mut selector = JobSelector::new(config.warehouse.clone(), config.resource_id, config.shard);
    let mut writer = cli_args
        .mark_done
        .then(|| StatusWriter::new(config.warehouse.clone()));

    let mut total = 0usize;
    let mut handle = |job: accounting::Job| -> Result<()> {
        let started = Instant::now();
        info!(
            "job {} (local {}): {} hosts, {} archives",
            job.job_pk(),
            job.local_job_id(),
            job.nodes().len(),
            job.archive_count()
        );
        if let Some(writer) = writer.as_mut() {
            writer.mark_as_done(job.job_pk(), true, started.elapsed().as_secs_f64(), None)?;
        }
        total += 1;
        Ok(())
    };

    if let Some(local_job_id) = &cli_args.local_job_id {
        selector.for_each_by_local_id(local_job_id, &mut handle)?;
    } else if let (Some(start), Some(end)) = (cli_args.start, cli_args.end) {
        selector.for_each_by_time_range(start, end, &config.filter, &mut handle)?;
    } else {
        selector.for_each_unprocessed(cli_args.start, None, &mut handle)?;
    }

    info!("Done, {} jobs selected", total);
    Ok(())
}
