use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dupetree_core::config::{Config, Limit, OutMode};
use dupetree_core::size::str2size;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dupetree",
    version,
    about = "Find duplicate files and directory trees by content fingerprint"
)]
pub struct Cli {
    /// Files and/or directories to compare.
    #[arg(value_name = "file/dir", required_unless_present = "hash_worker")]
    pub paths: Vec<PathBuf>,

    /// Read blocksize for hashing; accepts units K, M, G as in 100M, 218K
    /// or plain bytes as in 1024.
    #[arg(short, long, default_value = "256K")]
    pub blocksize: String,

    /// Hash at most LIMIT bytes per file (units as in --blocksize), or
    /// "auto" to grow the limit adaptively until duplicate groups settle.
    #[arg(short, long, value_name = "LIMIT|auto")]
    pub limit: Option<String>,

    /// Number of worker processes.
    #[arg(short = 'p', long, default_value_t = 1)]
    pub nprocs: usize,

    /// Number of worker threads (per process when -p > 1).
    #[arg(short = 't', long, default_value_t = 1)]
    pub nthreads: usize,

    /// Output mode: 1 = list of per-hash records, 2 = keyed by hash,
    /// 3 = flat lists keyed by type.
    #[arg(short, long, default_value_t = 3)]
    pub outmode: u8,

    /// Initial prefix size for --limit auto.
    #[arg(long, default_value = "8K", value_name = "SIZE")]
    pub auto_limit_min: String,

    /// Growth factor for --limit auto.
    #[arg(long, default_value_t = 2, value_name = "FAC")]
    pub auto_limit_increase_fac: u64,

    /// Consecutive settled rounds before --limit auto stops.
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub auto_limit_converged: usize,

    /// Do not write process-pool results back into the in-memory tree
    /// (forces re-reads during dir hashing; mainly for benchmarking).
    #[arg(long)]
    pub no_share_leafs: bool,

    /// Debug traces on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: run as a hashing worker on stdin/stdout.
    #[arg(long, hide = true)]
    pub hash_worker: bool,
}

impl Cli {
    pub fn to_config(&self) -> Result<Config> {
        let limit = match &self.limit {
            None => Limit::Whole,
            Some(s) => Limit::parse(s).with_context(|| format!("--limit {s}"))?,
        };
        let cfg = Config {
            blocksize: str2size(&self.blocksize).context("--blocksize")? as usize,
            nprocs: self.nprocs,
            nthreads: self.nthreads,
            share_leafs: !self.no_share_leafs,
            limit,
            auto_limit_min: str2size(&self.auto_limit_min).context("--auto-limit-min")?,
            auto_limit_increase_fac: self.auto_limit_increase_fac,
            auto_limit_converged: self.auto_limit_converged,
            outmode: OutMode::from_int(self.outmode)?,
            verbose: self.verbose,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
