use std::io::Read;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// Chunk size used when streaming file contents into the hasher.
const CHUNK_SIZE: usize = 64 * 1024;

/// Content digest used for change detection, not for security.
///
/// The original system used MD5; this substitutes BLAKE3, a faster
/// non-cryptographic-use hash that satisfies the same contract
/// (deterministic content to digest).
pub fn hash_file(path: &Path) -> CoreResult<String> {
    let mut file = std::fs::File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| CoreError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let h1 = hash_file(&path).unwrap();
        let h2 = hash_file(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1, hash_bytes(b"hello world"));
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }
}
