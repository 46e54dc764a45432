//! Two-phase Merkle fingerprint engine.
//!
//! Phase A hashes all leafs through a worker pool; leafs are mutually
//! independent, so any pool flavor yields the same fingerprints. Phase B
//! derives node fingerprints single-threaded by recursive merge with
//! memoization, which is cheap and must respect topological order anyway.
//!
//! With a process pool, worker processes hash their own copies of the
//! leafs and the in-memory tree stays un-memoized. `share_leafs` writes
//! the computed fingerprints back before phase B; without it, node hashing
//! re-reads every file.
//!
//! The adaptive-limit loop (`limit = auto`) re-runs phase A with growing
//! prefix limits, forcing recomputation only for leafs that still share
//! their fingerprint with another leaf, until the equal-set stops changing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{Config, Limit};
use crate::errors::{DupetreeError, DupetreeResult};
use crate::fingerprint::{
    fingerprint_or_missing, hashsum, Fingerprint, HashSpec, EMPTY_DIR_FPR, MISSING_DIR_FPR,
};
use crate::pool::Pool;
use crate::size::size2str;
use crate::tree::{ChildRef, FileDirTree};
use crate::worker::HashJob;

/// Merge child fingerprints into a directory fingerprint.
///
/// A single child is hashed again rather than passed through, so a dir
/// holding one file never equals that file. Sorting makes the result
/// insensitive to traversal order.
pub fn merge_fprs(child_fprs: &[Fingerprint]) -> Fingerprint {
    match child_fprs.len() {
        0 => EMPTY_DIR_FPR.clone(),
        1 => hashsum(child_fprs[0].as_bytes()),
        _ => {
            let mut sorted: Vec<&str> = child_fprs.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            hashsum(sorted.concat().as_bytes())
        }
    }
}

pub struct MerkleEngine<'a> {
    tree: &'a mut FileDirTree,
    cfg: &'a Config,
    pub leaf_fprs: BTreeMap<PathBuf, Fingerprint>,
    pub node_fprs: BTreeMap<PathBuf, Fingerprint>,
}

impl<'a> MerkleEngine<'a> {
    pub fn new(tree: &'a mut FileDirTree, cfg: &'a Config) -> Self {
        Self {
            tree,
            cfg,
            leaf_fprs: BTreeMap::new(),
            node_fprs: BTreeMap::new(),
        }
    }

    /// Compute `leaf_fprs` and `node_fprs` for the whole tree.
    pub fn calc_fprs(&mut self) -> DupetreeResult<()> {
        match self.cfg.limit {
            Limit::Whole => {
                let spec = HashSpec::whole(self.cfg.blocksize);
                self.calc_leaf_fprs(&spec)?;
                self.calc_node_fprs(&spec)
            }
            Limit::Bytes(limit) => {
                let spec = HashSpec::limited(self.cfg.blocksize, limit);
                self.calc_leaf_fprs(&spec)?;
                self.calc_node_fprs(&spec)
            }
            Limit::Auto => self.calc_fprs_auto(),
        }
    }

    /// Phase A: hash all leafs through the pool. Memoized leafs are taken
    /// as-is and not re-read.
    fn calc_leaf_fprs(&mut self, spec: &HashSpec) -> DupetreeResult<()> {
        let pool = Pool::from_config(self.cfg);
        let mut fprs = BTreeMap::new();
        let mut jobs = Vec::new();
        for leaf in self.tree.leafs.values() {
            match &leaf.fpr {
                Some(fpr) => {
                    fprs.insert(leaf.path.clone(), fpr.clone());
                }
                None => jobs.push(HashJob {
                    path: leaf.path.clone(),
                    filesize: leaf.filesize,
                }),
            }
        }
        let computed = pool.map(spec, jobs)?;
        // In-process pools share the tree, so memoizing is free. For
        // process pools the workers hashed private copies; write back only
        // when configured, otherwise phase B re-reads files.
        let write_back = !pool.uses_processes() || self.cfg.share_leafs;
        for (path, fpr) in computed {
            if write_back {
                if let Some(leaf) = self.tree.leafs.get_mut(&path) {
                    leaf.fpr = Some(fpr.clone());
                }
            }
            debug!(path = %path.display(), fpr = %fpr, "leaf fpr");
            fprs.insert(path, fpr);
        }
        self.leaf_fprs = fprs;
        Ok(())
    }

    /// Phase B: evaluate every node, memoizing into `node_fprs`.
    fn calc_node_fprs(&mut self, spec: &HashSpec) -> DupetreeResult<()> {
        self.node_fprs.clear();
        let paths: Vec<PathBuf> = self.tree.nodes.keys().cloned().collect();
        for path in paths {
            self.node_fpr(&path, spec)?;
        }
        Ok(())
    }

    fn node_fpr(&mut self, path: &Path, spec: &HashSpec) -> DupetreeResult<Fingerprint> {
        if let Some(fpr) = self.node_fprs.get(path) {
            return Ok(fpr.clone());
        }
        let children = self
            .tree
            .nodes
            .get(path)
            .map(|n| n.children.clone())
            .ok_or_else(|| {
                DupetreeError::invariant(format!("child node not in tree: {}", path.display()))
            })?;
        let fpr = if !path.is_dir() {
            debug!(path = %path.display(), "dir missing at hash time");
            MISSING_DIR_FPR.clone()
        } else {
            let mut child_fprs = Vec::with_capacity(children.len());
            for child in children {
                match child {
                    ChildRef::File(p) => child_fprs.push(self.leaf_fpr(&p, spec)?),
                    ChildRef::Dir(p) => child_fprs.push(self.node_fpr(&p, spec)?),
                }
            }
            merge_fprs(&child_fprs)
        };
        debug!(path = %path.display(), fpr = %fpr, "node fpr");
        self.node_fprs.insert(path.to_path_buf(), fpr.clone());
        Ok(fpr)
    }

    /// Memoized leaf fingerprint; re-reads the file when the memo is gone
    /// (process pool without `share_leafs`).
    fn leaf_fpr(&mut self, path: &Path, spec: &HashSpec) -> DupetreeResult<Fingerprint> {
        let leaf = self.tree.leafs.get(path).ok_or_else(|| {
            DupetreeError::invariant(format!("child leaf not in tree: {}", path.display()))
        })?;
        if let Some(fpr) = &leaf.fpr {
            return Ok(fpr.clone());
        }
        let fpr = fingerprint_or_missing(spec, &leaf.path, leaf.filesize)?;
        if let Some(leaf) = self.tree.leafs.get_mut(path) {
            leaf.fpr = Some(fpr.clone());
        }
        Ok(fpr)
    }

    /// Paths of leafs whose fingerprint is shared with at least one other
    /// leaf ("same-set").
    fn same_leafs_merged(&self) -> BTreeSet<PathBuf> {
        let mut by_fpr: BTreeMap<&str, Vec<&PathBuf>> = BTreeMap::new();
        for (path, fpr) in &self.leaf_fprs {
            by_fpr.entry(fpr.as_str()).or_default().push(path);
        }
        by_fpr
            .into_values()
            .filter(|paths| paths.len() > 1)
            .flatten()
            .cloned()
            .collect()
    }

    /// Adaptive prefix hashing: grow the limit geometrically, re-hash only
    /// leafs still in the same-set, stop when the same-set size is
    /// unchanged for `auto_limit_converged` consecutive rounds or the
    /// limit outgrows the largest file.
    ///
    /// Prefix fingerprints can only split equal-groups, never merge them.
    /// A same-set whose members are all read to EOF therefore cannot
    /// change again; the convergence break requires that, so a group that
    /// merely shares a long prefix keeps being read until it splits or is
    /// proven equal. Leafs that left the same-set early keep their
    /// smaller-limit fingerprint; the filesize prefix rules out false
    /// equality with longer files.
    fn calc_fprs_auto(&mut self) -> DupetreeResult<()> {
        let Some(max_limit) = self.tree.max_filesize() else {
            // no leafs at all; nodes may still exist (empty dir roots)
            let spec = HashSpec::whole(self.cfg.blocksize);
            self.leaf_fprs.clear();
            return self.calc_node_fprs(&spec);
        };
        let mut limit = self.cfg.auto_limit_min;
        let mut spec = HashSpec::limited(self.cfg.blocksize, limit);
        self.calc_leaf_fprs(&spec)?;
        let mut slm = self.same_leafs_merged();
        debug!(limit = %size2str(limit, 1), same = slm.len(), "auto_limit round");
        let mut prev_len = slm.len();
        let mut same_cnt = 1usize;
        loop {
            limit = limit.saturating_mul(self.cfg.auto_limit_increase_fac);
            if limit > max_limit {
                debug!(
                    limit = %size2str(limit, 1),
                    max_file_size = %size2str(max_limit, 1),
                    "auto_limit: limit > max file size, stop"
                );
                break;
            }
            for path in &slm {
                if let Some(leaf) = self.tree.leafs.get_mut(path) {
                    leaf.fpr = None;
                }
            }
            spec = HashSpec::limited(self.cfg.blocksize, limit);
            self.calc_leaf_fprs(&spec)?;
            slm = self.same_leafs_merged();
            debug!(limit = %size2str(limit, 1), same = slm.len(), "auto_limit round");
            if slm.len() == prev_len {
                same_cnt += 1;
                if same_cnt >= self.cfg.auto_limit_converged && self.fully_read(&slm, limit) {
                    debug!("auto_limit: converged");
                    break;
                }
            } else {
                prev_len = slm.len();
                same_cnt = 1;
            }
        }
        self.calc_node_fprs(&spec)
    }

    /// True when every same-set member has been hashed to EOF under
    /// `limit`, i.e. its group membership can no longer change.
    fn fully_read(&self, slm: &BTreeSet<PathBuf>, limit: u64) -> bool {
        slm.iter()
            .all(|path| self.tree.leafs.get(path).map_or(true, |l| l.filesize <= limit))
    }
}
