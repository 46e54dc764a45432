//! Leaf-hash workers: the in-process routine and the subprocess protocol.
//!
//! Process pools cannot ship closures, so the unit of work is a
//! serializable [`HashJob`] and the worker is a fixed routine in the
//! executable itself: the parent re-invokes the current binary with a
//! hidden flag, writes one JSON [`WorkerRequest`] to its stdin, and reads
//! one JSON [`WorkerResponse`] from its stdout. Worker stderr is inherited
//! so debug traces surface in the parent's stream.
//!
//! A worker failure (nonzero exit, malformed response) aborts the run; no
//! per-worker retry.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{DupetreeError, DupetreeResult};
use crate::fingerprint::{fingerprint_or_missing, Fingerprint, HashSpec};

/// Hidden CLI flag that turns the binary into a hashing worker.
pub const WORKER_FLAG: &str = "--hash-worker";

/// One leaf to hash. The filesize travels with the job because it is part
/// of the fingerprint input and was cached at tree build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashJob {
    pub path: PathBuf,
    pub filesize: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub spec: HashSpec,
    pub nthreads: usize,
    pub jobs: Vec<HashJob>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub fprs: Vec<(PathBuf, Fingerprint)>,
}

/// Hash jobs in-process, with a local rayon pool when `nthreads > 1`.
pub fn hash_jobs(
    spec: &HashSpec,
    jobs: &[HashJob],
    nthreads: usize,
) -> DupetreeResult<Vec<(PathBuf, Fingerprint)>> {
    let hash_one = |job: &HashJob| -> DupetreeResult<(PathBuf, Fingerprint)> {
        let fpr = fingerprint_or_missing(spec, &job.path, job.filesize)?;
        Ok((job.path.clone(), fpr))
    };
    if nthreads > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nthreads)
            .build()
            .map_err(|e| DupetreeError::worker(format!("thread pool: {e}")))?;
        pool.install(|| jobs.par_iter().map(hash_one).collect())
    } else {
        jobs.iter().map(hash_one).collect()
    }
}

/// Dispatch pre-chopped job chunks to one subprocess each and concatenate
/// the results in chunk order.
pub fn run_in_subprocesses(
    spec: &HashSpec,
    chunks: Vec<Vec<HashJob>>,
    nthreads: usize,
) -> DupetreeResult<Vec<(PathBuf, Fingerprint)>> {
    let exe = std::env::current_exe()
        .map_err(|e| DupetreeError::worker(format!("cannot locate own executable: {e}")))?;
    let mut children = Vec::new();
    for jobs in chunks {
        if jobs.is_empty() {
            continue;
        }
        debug!(njobs = jobs.len(), "spawn hash worker");
        let mut child = Command::new(&exe)
            .arg(WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| DupetreeError::worker(format!("spawn {}: {e}", exe.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DupetreeError::worker("worker stdin not captured"))?;
        let request = WorkerRequest {
            spec: *spec,
            nthreads,
            jobs,
        };
        serde_json::to_writer(stdin, &request)
            .map_err(|e| DupetreeError::serialization(format!("worker request: {e}")))?;
        children.push(child);
    }
    let mut out = Vec::new();
    for child in children {
        let output = child
            .wait_with_output()
            .map_err(|e| DupetreeError::worker(format!("wait: {e}")))?;
        if !output.status.success() {
            return Err(DupetreeError::worker(format!(
                "worker exited with {}",
                output.status
            )));
        }
        let response: WorkerResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| DupetreeError::worker(format!("malformed worker response: {e}")))?;
        out.extend(response.fprs);
    }
    Ok(out)
}

/// Worker-side entry point: one request in, one response out. The binary
/// calls this when invoked with [`WORKER_FLAG`].
pub fn serve<R: Read, W: Write>(input: R, output: W) -> DupetreeResult<()> {
    let request: WorkerRequest = serde_json::from_reader(input)
        .map_err(|e| DupetreeError::serialization(format!("worker request: {e}")))?;
    let fprs = hash_jobs(&request.spec, &request.jobs, request.nthreads)?;
    serde_json::to_writer(output, &WorkerResponse { fprs })
        .map_err(|e| DupetreeError::serialization(format!("worker response: {e}")))?;
    Ok(())
}
