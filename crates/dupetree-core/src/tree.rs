//! File (leaf) + dir (node) part of the Merkle tree. No hash calculation
//! here.
//!
//! A [`FileDirTree`] may hold multiple independent sub-graphs (several roots
//! merged via [`FileDirTree::update`]), so there is no single top element.
//! The engine iterates all nodes explicitly instead of recursing from a
//! root.
//!
//! Symbolic links are never followed; a link met during traversal is
//! skipped with a debug trace. Anything that is neither file, dir nor link
//! (named pipe, socket) fails the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{DupetreeError, DupetreeResult};
use crate::fingerprint::Fingerprint;

/// A regular file.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub path: PathBuf,
    /// Cached at tree build; hashed as part of the fingerprint.
    pub filesize: u64,
    /// Memoized fingerprint. `None` forces recomputation.
    pub fpr: Option<Fingerprint>,
}

impl Leaf {
    pub fn new(path: PathBuf) -> DupetreeResult<Self> {
        let meta = fs::metadata(&path).map_err(|e| DupetreeError::io(&path, e))?;
        Ok(Self {
            path,
            filesize: meta.len(),
            fpr: None,
        })
    }
}

/// Reference to a child element, keyed by path into the owning tree's maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    File(PathBuf),
    Dir(PathBuf),
}

/// A directory. Child order reflects traversal order; it is irrelevant to
/// the fingerprint and retained for debugging only.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: PathBuf,
    pub children: Vec<ChildRef>,
}

impl Node {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FileDirTree {
    pub nodes: BTreeMap<PathBuf, Node>,
    pub leafs: BTreeMap<PathBuf, Leaf>,
}

impl FileDirTree {
    /// Build one merged tree from a mix of file and directory roots.
    ///
    /// Directory roots are walked recursively; file roots are grouped by
    /// their parent dir into synthetic nodes so loose files coexist with
    /// dir-rooted subtrees. Symlink roots are skipped.
    pub fn from_roots(roots: &[PathBuf]) -> DupetreeResult<Self> {
        let mut tree = FileDirTree::default();
        let mut file_roots = Vec::new();
        for root in roots {
            let root = normalize_root(root);
            let meta =
                fs::symlink_metadata(&root).map_err(|e| DupetreeError::io(&root, e))?;
            let ft = meta.file_type();
            if ft.is_symlink() {
                debug!(path = %root.display(), "skip link");
            } else if ft.is_dir() {
                tree.update(Self::from_dir(&root)?);
            } else if ft.is_file() {
                file_roots.push(root);
            } else {
                return Err(DupetreeError::unknown_path_type(root));
            }
        }
        if !file_roots.is_empty() {
            tree.update(Self::from_files(&file_roots)?);
        }
        Ok(tree)
    }

    /// Recursive top-down walk of a single directory root.
    pub fn from_dir(root: &Path) -> DupetreeResult<Self> {
        let mut tree = FileDirTree::default();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // unreadable dir content: same as a walk that never
                    // descends into it
                    debug!(error = %e, "skip unreadable walk entry");
                    continue;
                }
            };
            let path = entry.path().to_path_buf();
            let ft = entry.file_type();
            if ft.is_symlink() {
                debug!(path = %path.display(), "skip link");
            } else if ft.is_dir() {
                tree.insert_node(path);
            } else if ft.is_file() {
                debug!(path = %path.display(), "build_tree");
                tree.insert_leaf(Leaf::new(path)?);
            } else {
                return Err(DupetreeError::unknown_path_type(path));
            }
        }
        Ok(tree)
    }

    /// Group loose files by parent dir into synthetic nodes.
    pub fn from_files(files: &[PathBuf]) -> DupetreeResult<Self> {
        let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for file in files {
            let dir = match file.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            by_dir.entry(dir).or_default().push(file.clone());
        }
        let mut tree = FileDirTree::default();
        for (dir, files) in by_dir {
            tree.insert_node(dir);
            for file in files {
                debug!(path = %file.display(), "build_tree");
                tree.insert_leaf(Leaf::new(file)?);
            }
        }
        Ok(tree)
    }

    /// Merge another tree into this one. Paths already present are
    /// overwritten: the same absolute path seen twice is the same entity.
    pub fn update(&mut self, other: FileDirTree) {
        self.nodes.extend(other.nodes);
        self.leafs.extend(other.leafs);
    }

    pub fn max_filesize(&self) -> Option<u64> {
        self.leafs.values().map(|l| l.filesize).max()
    }

    fn insert_node(&mut self, path: PathBuf) {
        self.nodes.insert(path.clone(), Node::new(path.clone()));
        if let Some(parent) = path.parent() {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.push(ChildRef::Dir(path));
            }
        }
    }

    fn insert_leaf(&mut self, leaf: Leaf) {
        let path = leaf.path.clone();
        if let Some(parent) = path.parent() {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.push(ChildRef::File(path.clone()));
            }
        }
        self.leafs.insert(path, leaf);
    }
}

/// Strip a trailing separator so `parent()` yields the parent dir.
fn normalize_root(path: &Path) -> PathBuf {
    path.components().as_path().to_path_buf()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn touch(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn walk_builds_nodes_and_leafs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        touch(&root.join("a/b/file1"), b"1");
        touch(&root.join("a/file2"), b"2");
        touch(&root.join("file3"), b"3");
        fs::create_dir_all(root.join("empty")).unwrap();

        let tree = FileDirTree::from_dir(&root).unwrap();
        assert_eq!(tree.leafs.len(), 3);
        // data, data/a, data/a/b, data/empty
        assert_eq!(tree.nodes.len(), 4);

        let top = &tree.nodes[&root];
        // file3 plus the two subdirs
        assert_eq!(top.children.len(), 3);
        assert!(top.children.contains(&ChildRef::Dir(root.join("a"))));
        assert!(top.children.contains(&ChildRef::Dir(root.join("empty"))));
        assert!(top.children.contains(&ChildRef::File(root.join("file3"))));

        assert!(tree.nodes[&root.join("empty")].children.is_empty());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        touch(&root.join("f"), b"x");
        let with_slash = PathBuf::from(format!("{}/", root.display()));
        let tree = FileDirTree::from_roots(&[with_slash]).unwrap();
        assert!(tree.nodes.contains_key(&root));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        touch(&root.join("real"), b"x");
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let tree = FileDirTree::from_dir(&root).unwrap();
        assert_eq!(tree.leafs.len(), 1);
        assert!(tree.leafs.contains_key(&root.join("real")));
    }

    #[test]
    fn file_roots_grouped_by_dirname() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        touch(&root.join("x"), b"x");
        touch(&root.join("sub/y"), b"y");

        let roots = vec![root.join("x"), root.join("sub/y")];
        let tree = FileDirTree::from_roots(&roots).unwrap();
        assert_eq!(tree.leafs.len(), 2);
        assert_eq!(tree.nodes.len(), 2);
        assert!(tree.nodes[&root]
            .children
            .contains(&ChildRef::File(root.join("x"))));
        assert!(tree.nodes[&root.join("sub")]
            .children
            .contains(&ChildRef::File(root.join("sub/y"))));
        // with both dirs present, the synthetic child link appears too
        assert!(tree.nodes[&root]
            .children
            .contains(&ChildRef::Dir(root.join("sub"))));
    }

    #[test]
    fn update_merges_disjoint_trees() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        touch(&a.join("f"), b"1");
        touch(&b.join("g"), b"2");

        let mut tree = FileDirTree::from_dir(&a).unwrap();
        tree.update(FileDirTree::from_dir(&b).unwrap());
        assert_eq!(tree.leafs.len(), 2);
        assert_eq!(tree.nodes.len(), 2);
    }

    #[test]
    fn leaf_caches_filesize() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("f");
        touch(&p, b"hello");
        let leaf = Leaf::new(p).unwrap();
        assert_eq!(leaf.filesize, 5);
        assert!(leaf.fpr.is_none());
    }
}
