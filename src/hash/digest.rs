//! Hash function implementations
//!
//! `binhash` and `sampled` read a bounded number of bytes regardless of file
//! size. `sha256` reads the whole file.

use crate::models::HashKind;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Leading bytes included in a binhash
pub const BINHASH_BYTES: u64 = 1024 * 1024;

/// Size of each window read by the sampled hash
pub const SAMPLE_WINDOW: u64 = 64 * 1024;

const READ_BUFFER: usize = 1024 * 1024;

/// Compute a hash of the given kind as lowercase hex
pub fn compute(path: &Path, kind: HashKind) -> io::Result<String> {
    match kind {
        HashKind::Binhash => binhash(path),
        HashKind::Sampled => sampled(path),
        HashKind::Sha256 => sha256(path),
    }
}

fn open_regular(path: &Path) -> io::Result<(File, u64)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    Ok((file, meta.len()))
}

/// Size, modification time and leading bytes.
///
/// Touching a file changes this hash even when content is unchanged.
fn binhash(path: &Path) -> io::Result<String> {
    let (file, len) = open_regular(path)?;
    let mtime = file
        .metadata()?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());
    hasher.update(mtime.as_secs().to_le_bytes());
    hasher.update(mtime.subsec_nanos().to_le_bytes());
    io::copy(&mut file.take(BINHASH_BYTES), &mut hasher)?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Size plus head, middle and tail windows
fn sampled(path: &Path) -> io::Result<String> {
    let (mut file, len) = open_regular(path)?;

    let mut hasher = Sha256::new();
    hasher.update(len.to_le_bytes());

    if len <= 3 * SAMPLE_WINDOW {
        io::copy(&mut file, &mut hasher)?;
    } else {
        let offsets = [0, len / 2 - SAMPLE_WINDOW / 2, len - SAMPLE_WINDOW];
        for offset in offsets {
            file.seek(SeekFrom::Start(offset))?;
            io::copy(&mut file.by_ref().take(SAMPLE_WINDOW), &mut hasher)?;
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn sha256(path: &Path) -> io::Result<String> {
    let (file, _) = open_regular(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);

    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;

    Ok(format!("{:x}", hasher.finalize()))
}
