//! SHA-1 content fingerprints.
//!
//! A fingerprint is the lowercase hex digest of SHA-1 over the file's size
//! (as an ASCII decimal string) followed by its content. Including the size
//! keeps two files with a shared prefix but different total sizes distinct
//! under prefix hashing, and keeps an empty file distinct from an empty dir:
//!
//! - empty file: filesize 0, zero content bytes => `SHA1("0")`
//! - empty dir: no children => `SHA1("")`
//!
//! `hash_file_limit` stops after `limit` content bytes. Its blocksize must
//! divide the limit evenly (see [`adjust_blocksize`]) so a read never
//! crosses the limit mid-block.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::errors::{DupetreeError, DupetreeResult};

/// A 40-char lowercase SHA-1 hex digest. Equality is string equality.
pub type Fingerprint = String;

/// SHA-1 hex digest of a byte string.
pub fn hashsum(data: &[u8]) -> Fingerprint {
    hex::encode(Sha1::digest(data))
}

/// Fingerprint of a directory without children.
pub static EMPTY_DIR_FPR: LazyLock<Fingerprint> = LazyLock::new(|| hashsum(b""));

/// Fingerprint of an empty file: its size "0" is hashed, then no content.
pub static EMPTY_FILE_FPR: LazyLock<Fingerprint> = LazyLock::new(|| hashsum(b"0"));

/// Sentinel for a file recorded at tree build but unreadable at hash time.
/// Filtered out by the grouper, never part of any emitted group.
pub static MISSING_FILE_FPR: LazyLock<Fingerprint> =
    LazyLock::new(|| hashsum(b"__missing_file__"));

/// Sentinel for a directory that vanished between tree build and hashing.
pub static MISSING_DIR_FPR: LazyLock<Fingerprint> =
    LazyLock::new(|| hashsum(b"__missing_dir__"));

/// Largest `bs <= blocksize` with `bs <= limit` and `limit % bs == 0`.
/// Identity when no limit is set. Slow; call once per round, not per file.
pub fn adjust_blocksize(blocksize: usize, limit: Option<u64>) -> usize {
    match limit {
        None => blocksize,
        Some(limit) => {
            debug_assert!(limit > 0, "limit must be > 0");
            let mut bs = (blocksize as u64).min(limit);
            while limit % bs != 0 {
                bs -= 1;
            }
            bs as usize
        }
    }
}

/// Hash a file's content, using the filesize as additional input.
///
/// With `use_filesize` off the result matches `sha1sum <file>`.
pub fn hash_file(
    path: &Path,
    filesize: u64,
    blocksize: usize,
    use_filesize: bool,
) -> io::Result<Fingerprint> {
    let mut hasher = Sha1::new();
    if use_filesize {
        hasher.update(filesize.to_string().as_bytes());
    }
    let mut fd = File::open(path)?;
    let mut buf = vec![0u8; blocksize];
    loop {
        let n = read_block(&mut fd, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Same as [`hash_file`], but stop once `limit` content bytes are consumed.
///
/// Precondition: `limit % min(blocksize, limit) == 0`, ensured by
/// [`adjust_blocksize`].
pub fn hash_file_limit(
    path: &Path,
    filesize: u64,
    blocksize: usize,
    limit: u64,
    use_filesize: bool,
) -> io::Result<Fingerprint> {
    debug_assert!(blocksize > 0, "blocksize={blocksize}");
    debug_assert!(limit > 0, "limit={limit}");
    debug_assert!(limit % (blocksize as u64).min(limit) == 0);
    let mut hasher = Sha1::new();
    if use_filesize {
        hasher.update(filesize.to_string().as_bytes());
    }
    let mut fd = File::open(path)?;
    let mut buf = vec![0u8; blocksize];
    let mut consumed: u64 = 0;
    loop {
        let n = read_block(&mut fd, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        consumed += n as u64;
        if consumed >= limit {
            break;
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fill `buf` from `fd`, tolerating short reads. Returns bytes read;
/// 0 only at end of file.
fn read_block(fd: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match fd.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// The hash parameters currently installed for leaf fingerprinting.
///
/// The engine swaps this value between adaptive-limit rounds; worker
/// processes receive it over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSpec {
    pub blocksize: usize,
    pub limit: Option<u64>,
    pub use_filesize: bool,
}

impl HashSpec {
    /// Hash whole files.
    pub fn whole(blocksize: usize) -> Self {
        Self {
            blocksize,
            limit: None,
            use_filesize: true,
        }
    }

    /// Hash at most `limit` content bytes, with the blocksize pre-adjusted
    /// so reads never run past the limit.
    pub fn limited(blocksize: usize, limit: u64) -> Self {
        Self {
            blocksize: adjust_blocksize(blocksize, Some(limit)),
            limit: Some(limit),
            use_filesize: true,
        }
    }

    pub fn hash_leaf(&self, path: &Path, filesize: u64) -> io::Result<Fingerprint> {
        match self.limit {
            None => hash_file(path, filesize, self.blocksize, self.use_filesize),
            Some(limit) => {
                hash_file_limit(path, filesize, self.blocksize, limit, self.use_filesize)
            }
        }
    }
}

/// Hash a leaf, substituting [`MISSING_FILE_FPR`] when the path vanished or
/// became unreadable since tree build. Other I/O errors fail the run.
pub fn fingerprint_or_missing(
    spec: &HashSpec,
    path: &Path,
    filesize: u64,
) -> DupetreeResult<Fingerprint> {
    match spec.hash_leaf(path, filesize) {
        Ok(fpr) => Ok(fpr),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            debug!(path = %path.display(), "file missing at hash time");
            Ok(MISSING_FILE_FPR.clone())
        }
        Err(e) => Err(DupetreeError::io(path, e)),
    }
}
