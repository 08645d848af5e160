mod file_config;

pub use file_config::{FileConfig, ProcessConfig};

use crate::accounting::{FilterOptions, ShardSpec};
use crate::warehouse::WarehouseSettings;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub resource_id: Option<i64>,
    pub num_workers: Option<u32>,
    pub worker_index: Option<u32>,
    pub filter: FilterOptions,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub warehouse: WarehouseSettings,
    pub resource_id: i64,
    pub shard: Option<ShardSpec>,
    pub filter: FilterOptions,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present. Partial shard
    /// configuration is rejected here, before any query runs.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let resource_id = match file.resource_id.or(cli.resource_id) {
            Some(id) => id,
            None => bail!("resource_id must be specified via --resource-id or in config file"),
        };

        let num_workers = file.num_workers.or(cli.num_workers);
        let worker_index = file.worker_index.or(cli.worker_index);
        let shard = ShardSpec::from_options(num_workers, worker_index)?;

        let process = file.process.unwrap_or_default();
        let filter = FilterOptions {
            process_all: process.all.unwrap_or(cli.filter.process_all),
            process_bad: process.bad.unwrap_or(cli.filter.process_bad),
            process_old: process.old.unwrap_or(cli.filter.process_old),
            process_notdone: process.notdone.unwrap_or(cli.filter.process_notdone),
            process_current: process.current.unwrap_or(cli.filter.process_current),
            process_big: process.big.unwrap_or(cli.filter.process_big),
            process_error: process.error.unwrap_or(cli.filter.process_error),
        };

        Ok(Self {
            warehouse: WarehouseSettings::new(db_path),
            resource_id,
            shard,
            filter,
        })
    }
}
