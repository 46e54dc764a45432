//! Worker pool flavors for parallel leaf hashing.
//!
//! One uniform `map` surface with four variants:
//!
//! - sequential iteration (baseline, no concurrency overhead)
//! - a rayon thread pool of `nthreads`
//! - `nprocs` worker processes
//! - `nprocs` processes, each running a local `nthreads` thread pool
//!
//! Process flavors chop the job list into `nprocs` chunks and hand each
//! chunk to one child process (see the `worker` module); results are
//! concatenated in chunk order. The set of fingerprints produced is
//! identical across all flavors.

use std::path::PathBuf;

use crate::config::Config;
use crate::errors::DupetreeResult;
use crate::fingerprint::{Fingerprint, HashSpec};
use crate::worker::{self, HashJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Sequential,
    Threads(usize),
    Processes(usize),
    ProcsThreads { nprocs: usize, nthreads: usize },
}

impl Pool {
    /// Pick the pool flavor from `(nprocs, nthreads)`.
    pub fn from_config(cfg: &Config) -> Self {
        match (cfg.nprocs, cfg.nthreads) {
            (1, 1) => Pool::Sequential,
            (1, t) => Pool::Threads(t),
            (p, 1) => Pool::Processes(p),
            (p, t) => Pool::ProcsThreads {
                nprocs: p,
                nthreads: t,
            },
        }
    }

    /// Whether workers run in separate address spaces. Decides if the
    /// engine must write fingerprints back into the tree afterwards.
    pub fn uses_processes(&self) -> bool {
        matches!(self, Pool::Processes(_) | Pool::ProcsThreads { .. })
    }

    /// Hash all jobs, returning `(path, fingerprint)` pairs.
    pub fn map(
        &self,
        spec: &HashSpec,
        jobs: Vec<HashJob>,
    ) -> DupetreeResult<Vec<(PathBuf, Fingerprint)>> {
        match *self {
            Pool::Sequential => worker::hash_jobs(spec, &jobs, 1),
            Pool::Threads(nthreads) => worker::hash_jobs(spec, &jobs, nthreads),
            Pool::Processes(nprocs) => worker::run_in_subprocesses(spec, chop(jobs, nprocs), 1),
            Pool::ProcsThreads { nprocs, nthreads } => {
                worker::run_in_subprocesses(spec, chop(jobs, nprocs), nthreads)
            }
        }
    }
}

/// Chop `seq` into `nchunks` chunks whose concatenation equals `seq` and
/// whose lengths differ by at most one.
pub fn chop<T>(seq: Vec<T>, nchunks: usize) -> Vec<Vec<T>> {
    debug_assert!(nchunks >= 1);
    let base = seq.len() / nchunks;
    let extra = seq.len() % nchunks;
    let mut out = Vec::with_capacity(nchunks);
    let mut items = seq.into_iter();
    for i in 0..nchunks {
        let take = base + usize::from(i < extra);
        out.push(items.by_ref().take(take).collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn cfg(nprocs: usize, nthreads: usize) -> Config {
        Config {
            nprocs,
            nthreads,
            ..Config::default()
        }
    }

    #[test]
    fn flavor_selection_table() {
        assert_eq!(Pool::from_config(&cfg(1, 1)), Pool::Sequential);
        assert_eq!(Pool::from_config(&cfg(1, 4)), Pool::Threads(4));
        assert_eq!(Pool::from_config(&cfg(4, 1)), Pool::Processes(4));
        assert_eq!(
            Pool::from_config(&cfg(2, 3)),
            Pool::ProcsThreads {
                nprocs: 2,
                nthreads: 3
            }
        );
    }

    #[test]
    fn chop_examples() {
        assert_eq!(
            chop((0..7).collect(), 3),
            vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]
        );
        assert_eq!(
            chop(Vec::<u8>::new(), 2),
            vec![Vec::<u8>::new(), Vec::<u8>::new()]
        );
        assert_eq!(chop(vec![1], 3), vec![vec![1], vec![], vec![]]);
    }

    proptest! {
        #[test]
        fn chop_contract(seq in prop::collection::vec(any::<u16>(), 0..200), nchunks in 1usize..8) {
            let chunks = chop(seq.clone(), nchunks);
            prop_assert_eq!(chunks.len(), nchunks);
            let concat: Vec<u16> = chunks.iter().flatten().copied().collect();
            prop_assert_eq!(concat, seq);
            let min = chunks.iter().map(Vec::len).min().unwrap();
            let max = chunks.iter().map(Vec::len).max().unwrap();
            prop_assert!(max - min <= 1);
        }
    }
}
