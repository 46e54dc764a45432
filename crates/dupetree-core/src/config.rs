//! Run configuration.
//!
//! A [`Config`] value is built once per run and threaded explicitly through
//! the tree builder, engine and grouper. The core crate reads no environment
//! variables; all knobs come from the caller.

use crate::errors::{DupetreeError, DupetreeResult};
use crate::size::str2size;

/// How much of each file to hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Hash whole files.
    Whole,
    /// Hash at most this many content bytes per file.
    Bytes(u64),
    /// Adaptive prefix hashing: grow the limit geometrically until the
    /// partition of equal-fingerprint leaves stabilizes.
    Auto,
}

impl Limit {
    /// Parse a CLI-style limit value: `auto`, or a size string like `128K`.
    pub fn parse(s: &str) -> DupetreeResult<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Limit::Auto);
        }
        Ok(Limit::Bytes(str2size(s)?))
    }
}

/// Output shape selector, see the `group` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutMode {
    /// List of per-fingerprint records, fingerprints dropped.
    Records,
    /// Map keyed by fingerprint.
    ByFingerprint,
    /// Flat map keyed by group type.
    ByType,
}

impl OutMode {
    pub fn from_int(n: u8) -> DupetreeResult<Self> {
        match n {
            1 => Ok(OutMode::Records),
            2 => Ok(OutMode::ByFingerprint),
            3 => Ok(OutMode::ByType),
            _ => Err(DupetreeError::invalid_config(format!(
                "outmode must be 1, 2 or 3, got {n}"
            ))),
        }
    }

    pub fn as_int(&self) -> u8 {
        match self {
            OutMode::Records => 1,
            OutMode::ByFingerprint => 2,
            OutMode::ByType => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Read block size for hashing, auto-adjusted when a limit forces a
    /// smaller effective block.
    pub blocksize: usize,
    /// Process-pool size.
    pub nprocs: usize,
    /// Thread-pool size (per process when `nprocs > 1`).
    pub nthreads: usize,
    /// With process pools, write leaf fingerprints back into the in-memory
    /// tree before node hashing. Without this, node hashing re-reads files.
    pub share_leafs: bool,
    pub limit: Limit,
    /// Initial prefix size for [`Limit::Auto`].
    pub auto_limit_min: u64,
    /// Geometric growth factor for [`Limit::Auto`].
    pub auto_limit_increase_fac: u64,
    /// Consecutive unchanged rounds before [`Limit::Auto`] converges.
    pub auto_limit_converged: usize,
    pub outmode: OutMode,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocksize: 256 * 1024,
            nprocs: 1,
            nthreads: 1,
            share_leafs: true,
            limit: Limit::Whole,
            auto_limit_min: 8 * 1024,
            auto_limit_increase_fac: 2,
            auto_limit_converged: 3,
            outmode: OutMode::ByType,
            verbose: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> DupetreeResult<()> {
        if self.blocksize == 0 {
            return Err(DupetreeError::invalid_config("blocksize must be > 0"));
        }
        if self.nprocs == 0 {
            return Err(DupetreeError::invalid_config("nprocs must be >= 1"));
        }
        if self.nthreads == 0 {
            return Err(DupetreeError::invalid_config("nthreads must be >= 1"));
        }
        if self.limit == Limit::Bytes(0) {
            return Err(DupetreeError::invalid_config("limit must be > 0"));
        }
        if self.limit == Limit::Auto {
            if self.auto_limit_min == 0 {
                return Err(DupetreeError::invalid_config(
                    "auto_limit_min must be > 0",
                ));
            }
            if self.auto_limit_increase_fac < 2 {
                return Err(DupetreeError::invalid_config(
                    "auto_limit_increase_fac must be > 1",
                ));
            }
            if self.auto_limit_converged < 2 {
                return Err(DupetreeError::invalid_config(
                    "auto_limit_converged must be > 1",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_limit_rejected() {
        let cfg = Config {
            limit: Limit::Bytes(0),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_pool_sizes_rejected() {
        for (nprocs, nthreads) in [(0, 1), (1, 0)] {
            let cfg = Config {
                nprocs,
                nthreads,
                ..Config::default()
            };
            assert!(cfg.validate().is_err());
        }
    }

    #[test]
    fn auto_limit_knobs_checked() {
        let cfg = Config {
            limit: Limit::Auto,
            auto_limit_converged: 1,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            limit: Limit::Auto,
            auto_limit_increase_fac: 1,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn limit_parse() {
        assert_eq!(Limit::parse("auto").unwrap(), Limit::Auto);
        assert_eq!(Limit::parse("128K").unwrap(), Limit::Bytes(128 * 1024));
        assert!(Limit::parse("bogus").is_err());
    }

    #[test]
    fn outmode_round_trip() {
        for n in 1..=3u8 {
            assert_eq!(OutMode::from_int(n).unwrap().as_int(), n);
        }
        assert!(OutMode::from_int(4).is_err());
    }
}
