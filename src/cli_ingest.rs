//! Replays an archive listing through the archive registrar.
//!
//! Each input line describes one discovered archive file:
//!
//! ```text
//! <hostname> <filename> <start_ts> <end_ts> [local_job_id]
//! ```
//!
//! Lines with a local job id register job-level archives, the rest register
//! node-level archives. Registrations are committed in batches.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod accounting;
mod errors;
mod sqlite_persistence;
mod warehouse;

use accounting::ArchiveCache;
use warehouse::WarehouseSettings;

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
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// Path to the archive listing file.
    #[clap(value_parser = parse_path)]
    pub listing: PathBuf,

    /// Resource the archives were discovered on.
    #[clap(long, default_value_t = 0)]
    pub resource_id: i64,

    /// Registrations per commit.
    #[clap(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: u64,
}

struct ListingEntry {
    hostname: String,
    filename: String,
    start: f64,
    end: f64,
    job_id: Option<i64>,
}

fn parse_line(line: &str) -> Result<ListingEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 || fields.len() > 5 {
        bail!("expected 4 or 5 fields, found {}", fields.len());
    }
    Ok(ListingEntry {
        hostname: fields[0].to_string(),
        filename: fields[1].to_string(),
        start: fields[2].parse().context("invalid start timestamp")?,
        end: fields[3].parse().context("invalid end timestamp")?,
        job_id: match fields.get(4) {
            Some(raw) => Some(raw.parse().context("invalid local job id")?),
            None => None,
        },
    })
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

    let settings = WarehouseSettings::new(cli_args.db_path);
    warehouse::open_warehouse(&settings).context("Warehouse is not usable")?;

    let mut cache = ArchiveCache::new(settings)?;
    info!("Hostname cache loaded with {} hosts", cache.known_hosts());

    let file = File::open(&cli_args.listing)
        .with_context(|| format!("Failed to open listing {:?}", cli_args.listing))?;

    let mut registered = 0usize;
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = parse_line(&line)
            .with_context(|| format!("Bad listing entry on line {}", line_number + 1))?;
        cache.insert(
            cli_args.resource_id,
            &entry.hostname,
            &entry.filename,
            entry.start,
            entry.end,
            entry.job_id,
        )?;
        registered += 1;
        if registered % cli_args.batch_size as usize == 0 {
            cache.post_insert()?;
        }
    }
    cache.post_insert()?;

    info!("Registered {} archive files", registered);
    Ok(())
}
