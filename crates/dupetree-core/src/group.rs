//! Duplicate grouping and output shaping.
//!
//! Inverts the path->fingerprint maps, drops everything that is not a
//! duplicate (singleton groups, missing-sentinel groups, degenerate
//! single-chain dir groups) and renders one of three JSON shapes:
//!
//! - mode 1: list of per-fingerprint records, fingerprints dropped
//! - mode 2: map keyed by fingerprint
//! - mode 3: flat map keyed by group type
//!
//! Group types are `file`/`dir`, or `file:empty`/`dir:empty` when the
//! group fingerprint equals the respective empty sentinel. Path lists are
//! sorted; every emitted group has at least two paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::OutMode;
use crate::errors::{DupetreeError, DupetreeResult};
use crate::fingerprint::{
    Fingerprint, EMPTY_DIR_FPR, EMPTY_FILE_FPR, MISSING_DIR_FPR, MISSING_FILE_FPR,
};

/// Invert a path->fpr map into fpr->sorted paths.
pub fn invert_fprs(fprs: &BTreeMap<PathBuf, Fingerprint>) -> BTreeMap<Fingerprint, Vec<String>> {
    let mut inv: BTreeMap<Fingerprint, Vec<String>> = BTreeMap::new();
    for (path, fpr) in fprs {
        inv.entry(fpr.clone())
            .or_default()
            .push(path.to_string_lossy().into_owned());
    }
    for paths in inv.values_mut() {
        paths.sort();
    }
    inv
}

/// `//foo/bar/baz` -> 3
fn component_count(path: &str) -> usize {
    path.split('/').filter(|c| !c.is_empty()).count()
}

/// A single-chain group: nested dirs whose depths step by exactly one.
/// These arise when a directory holds exactly one subdirectory (or one
/// file) recursively; the whole chain inherits the bottom fingerprint and
/// reporting it as a duplicate would be noise.
fn is_single_chain(paths: &[String]) -> bool {
    if paths.len() < 2 {
        return false;
    }
    let mut by_depth: Vec<(usize, &str)> = paths
        .iter()
        .map(|p| (component_count(p), p.as_str()))
        .collect();
    by_depth.sort_unstable();
    by_depth.windows(2).all(|w| {
        w[1].0 == w[0].0 + 1 && Path::new(w[1].1).starts_with(w[0].1)
    })
}

/// Assemble the duplicate groups in the shape selected by `outmode`.
pub fn assemble_result(
    leaf_fprs: &BTreeMap<PathBuf, Fingerprint>,
    node_fprs: &BTreeMap<PathBuf, Fingerprint>,
    outmode: OutMode,
) -> DupetreeResult<Value> {
    // fpr -> type -> sorted paths
    let mut result: BTreeMap<Fingerprint, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    let stores = [
        ("dir", invert_fprs(node_fprs), &*EMPTY_DIR_FPR, &*MISSING_DIR_FPR),
        ("file", invert_fprs(leaf_fprs), &*EMPTY_FILE_FPR, &*MISSING_FILE_FPR),
    ];
    for (kind, inv, empty_fpr, missing_fpr) in stores {
        for (fpr, paths) in inv {
            if fpr == *missing_fpr {
                continue;
            }
            if paths.len() < 2 {
                continue;
            }
            if kind == "dir" && is_single_chain(&paths) {
                continue;
            }
            let typ = if fpr == *empty_fpr {
                format!("{kind}:empty")
            } else {
                kind.to_string()
            };
            result
                .entry(fpr)
                .or_default()
                .entry(typ)
                .or_default()
                .extend(paths);
        }
    }

    let value = match outmode {
        OutMode::Records => {
            let records: Vec<BTreeMap<String, Vec<Vec<String>>>> = result
                .into_values()
                .map(|by_typ| {
                    by_typ
                        .into_iter()
                        .map(|(typ, paths)| (typ, vec![paths]))
                        .collect()
                })
                .collect();
            serde_json::to_value(records)
        }
        OutMode::ByFingerprint => serde_json::to_value(result),
        OutMode::ByType => {
            let mut by_typ: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
            for groups in result.into_values() {
                for (typ, paths) in groups {
                    by_typ.entry(typ).or_default().push(paths);
                }
            }
            serde_json::to_value(by_typ)
        }
    };
    value.map_err(|e| DupetreeError::serialization(format!("result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::hashsum;

    fn fprs(pairs: &[(&str, &str)]) -> BTreeMap<PathBuf, Fingerprint> {
        pairs
            .iter()
            .map(|(p, f)| (PathBuf::from(p), f.to_string()))
            .collect()
    }

    #[test]
    fn invert_groups_and_sorts() {
        let inv = invert_fprs(&fprs(&[("/b", "X"), ("/a", "X"), ("/c", "Y")]));
        assert_eq!(inv["X"], vec!["/a", "/b"]);
        assert_eq!(inv["Y"], vec!["/c"]);
    }

    #[test]
    fn single_chain_detected() {
        let chain = vec![
            "/foo".to_string(),
            "/foo/bar".to_string(),
            "/foo/bar/baz".to_string(),
        ];
        assert!(is_single_chain(&chain));
    }

    #[test]
    fn unrelated_dirs_are_not_a_chain() {
        // same depth step but not nested
        let not_nested = vec!["/p".to_string(), "/q/r".to_string()];
        assert!(!is_single_chain(&not_nested));
        // nested but skipping a level
        let gap = vec!["/foo".to_string(), "/foo/bar/baz".to_string()];
        assert!(!is_single_chain(&gap));
        // plain duplicates at equal depth
        let flat = vec!["/a/x".to_string(), "/a/y".to_string()];
        assert!(!is_single_chain(&flat));
    }

    #[test]
    fn singletons_and_missing_are_dropped() {
        let leaf_fprs = fprs(&[
            ("/a/x", "AA"),
            ("/b/x", "AA"),
            ("/c", "BB"),
            ("/gone", MISSING_FILE_FPR.as_str()),
            ("/gone2", MISSING_FILE_FPR.as_str()),
        ]);
        let node_fprs = fprs(&[]);
        let out = assemble_result(&leaf_fprs, &node_fprs, OutMode::ByType).unwrap();
        let obj = out.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(
            obj["file"],
            serde_json::json!([["/a/x", "/b/x"]])
        );
    }

    #[test]
    fn empty_groups_get_empty_type() {
        let leaf_fprs = fprs(&[
            ("/e1", EMPTY_FILE_FPR.as_str()),
            ("/e2", EMPTY_FILE_FPR.as_str()),
        ]);
        let node_fprs = fprs(&[
            ("/d1", EMPTY_DIR_FPR.as_str()),
            ("/d2", EMPTY_DIR_FPR.as_str()),
        ]);
        let out = assemble_result(&leaf_fprs, &node_fprs, OutMode::ByType).unwrap();
        let obj = out.as_object().unwrap();
        assert!(obj.contains_key("file:empty"));
        assert!(obj.contains_key("dir:empty"));
        assert!(!obj.contains_key("file"));
    }

    #[test]
    fn chain_suppressed_in_output() {
        // /foo/bar/baz holds one file; the whole dir chain shares one fpr
        let bottom = hashsum(b"file-fpr");
        let node_fprs = fprs(&[
            ("/foo", bottom.as_str()),
            ("/foo/bar", bottom.as_str()),
            ("/foo/bar/baz", bottom.as_str()),
        ]);
        let out = assemble_result(&fprs(&[]), &node_fprs, OutMode::ByType).unwrap();
        assert!(out.as_object().unwrap().is_empty());
    }

    #[test]
    fn output_modes_carry_same_groups() {
        let leaf_fprs = fprs(&[("/a/x", "AA"), ("/b/x", "AA"), ("/c/y", "CC"), ("/d/y", "CC")]);
        let node_fprs = fprs(&[("/a", "DD"), ("/b", "DD")]);

        let m1 = assemble_result(&leaf_fprs, &node_fprs, OutMode::Records).unwrap();
        let m2 = assemble_result(&leaf_fprs, &node_fprs, OutMode::ByFingerprint).unwrap();
        let m3 = assemble_result(&leaf_fprs, &node_fprs, OutMode::ByType).unwrap();

        // mode 2 keyed by fingerprint, path lists flat
        assert_eq!(m2["AA"]["file"], serde_json::json!(["/a/x", "/b/x"]));
        assert_eq!(m2["DD"]["dir"], serde_json::json!(["/a", "/b"]));

        // mode 1: one record per fingerprint
        assert_eq!(m1.as_array().unwrap().len(), 3);

        // mode 3 folds groups by type; groups from modes 1 and 2 reappear
        assert_eq!(m3["file"].as_array().unwrap().len(), 2);
        assert_eq!(m3["dir"], serde_json::json!([["/a", "/b"]]));

        let mut m1_file_groups: Vec<Value> = m1
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|rec| rec.get("file"))
            .flat_map(|g| g.as_array().unwrap().clone())
            .collect();
        m1_file_groups.sort_by_key(|v| v.to_string());
        assert_eq!(serde_json::to_value(m1_file_groups).unwrap(), m3["file"]);
    }

    #[test]
    fn groups_are_disjoint_in_flat_modes() {
        let leaf_fprs = fprs(&[("/a", "AA"), ("/b", "AA"), ("/c", "CC"), ("/d", "CC")]);
        let out = assemble_result(&leaf_fprs, &fprs(&[]), OutMode::ByType).unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for group in out["file"].as_array().unwrap() {
            for p in group.as_array().unwrap() {
                assert!(seen.insert(p.as_str().unwrap().to_string()));
            }
        }
        assert_eq!(seen.len(), 4);
    }
}
