//! Content hashes and file fingerprints.
//!
//! Content hashes cover every byte. Fingerprints only cover cheap observable
//! state and are what the write tracker compares against on the next build.

use std::hash::{Hash, Hasher};
use std::io::{self, Read};
use std::time::SystemTime;

use rustc_hash::FxHasher;

const CHUNK: usize = 8 * 1024;

/// Hash a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    hash_reader(bytes).unwrap_or_default()
}

/// Hash everything a reader yields.
///
/// Input is fed to the hasher in fixed-size chunks regardless of how the
/// reader splits its reads, so the result depends only on the bytes.
pub fn hash_reader(mut reader: impl Read) -> io::Result<u64> {
    let mut hasher = FxHasher::default();
    let mut buf = vec![0u8; CHUNK];
    let mut total: u64 = 0;

    loop {
        let filled = fill(&mut reader, &mut buf)?;
        if filled == 0 {
            break;
        }
        hasher.write(&buf[..filled]);
        total += filled as u64;
        if filled < CHUNK {
            break;
        }
    }

    total.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Fingerprint of a file's observable state.
///
/// Empty files still produce a non-zero fingerprint distinct from "missing".
pub fn fingerprint(len: u64, modified: Option<SystemTime>) -> u64 {
    let mut hasher = FxHasher::default();
    len.hash(&mut hasher);
    if let Some(time) = modified
        && let Ok(since) = time.duration_since(SystemTime::UNIX_EPOCH)
    {
        since.as_nanos().hash(&mut hasher);
    }
    // reserve 0 for "does not exist"
    hasher.finish().max(1)
}

fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
