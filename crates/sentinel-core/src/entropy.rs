use std::path::Path;

/// Bytes read from the head of a file for entropy estimation — matches the
/// original's 4 KiB sample, which is plenty to tell encrypted/compressed
/// content apart from plaintext without hashing the whole file.
const SAMPLE_SIZE: usize = 4096;

/// `log2(256)`, the maximum possible Shannon entropy of a byte stream.
/// Dividing by this constant is the correct 0..1 normalization; the
/// original source divides by a bare `8.0` in one place and by
/// `log2(256)` in another — those are numerically identical (`log2(256) ==
/// 8.0`), but only the latter is conceptually the right unit. We always
/// divide by `log2(256)`.
const MAX_ENTROPY_BITS: f64 = 8.0;

/// Shannon entropy of `data`, normalized to `0.0..=1.0`.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count == 0 {
            continue;
        }
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    (entropy / MAX_ENTROPY_BITS).clamp(0.0, 1.0)
}

/// Read the first [`SAMPLE_SIZE`] bytes of `path` and return its normalized
/// Shannon entropy. Missing/unreadable files score 0.0 rather than erroring
/// — entropy is a hint for the feature extractor, not a hard dependency.
pub fn file_entropy(path: &Path) -> f64 {
    match std::fs::File::open(path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut buf = vec![0u8; SAMPLE_SIZE];
            match f.read(&mut buf) {
                Ok(n) => shannon_entropy(&buf[..n]),
                Err(_) => 0.0,
            }
        }
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn constant_byte_stream_is_zero_entropy() {
        let data = vec![0x41u8; 4096];
        assert_eq!(shannon_entropy(&data), 0.0);
    }

    #[test]
    fn uniform_byte_stream_is_near_one() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let e = shannon_entropy(&data);
        assert!(e > 0.99, "expected near-maximal entropy, got {e}");
    }

    #[test]
    fn missing_file_is_zero() {
        assert_eq!(file_entropy(Path::new("/nonexistent/path/x")), 0.0);
    }
}
