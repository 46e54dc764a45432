//! Run driver: roots -> tree -> engine -> grouped result.
//!
//! One [`FileDirTree`] and one [`MerkleEngine`] per run, both discarded at
//! the end. Nothing is persisted.

use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::engine::MerkleEngine;
use crate::errors::DupetreeResult;
use crate::group;
use crate::tree::FileDirTree;

/// Find duplicate files and directory subtrees under `roots`.
pub fn scan(roots: &[PathBuf], cfg: &Config) -> DupetreeResult<Value> {
    cfg.validate()?;
    let mut tree = FileDirTree::from_roots(roots)?;
    debug!(
        nleafs = tree.leafs.len(),
        nnodes = tree.nodes.len(),
        "tree built"
    );
    let mut engine = MerkleEngine::new(&mut tree, cfg);
    engine.calc_fprs()?;
    group::assemble_result(&engine.leaf_fprs, &engine.node_fprs, cfg.outmode)
}
