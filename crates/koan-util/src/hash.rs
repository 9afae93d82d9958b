//! The 64-bit mix hash.
//!
//! A multiply-accumulate chain over a fixed odd prime, consuming the
//! input in 32/16/8-byte blocks with a byte-assembled tail. Identifier
//! and string nodes compute this once at construction and carry the
//! result, so environment lookups never rehash.

const M: u64 = 2_891_462_833_508_853_929;

#[inline]
fn mix(h: u64, x: u64) -> u64 {
    h.wrapping_mul(M).wrapping_add(x.wrapping_mul(M))
}

#[inline]
fn word(bytes: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(w)
}

/// Hash `buf` with the given seed.
///
/// # Examples
///
/// ```
/// use koan_util::memhash;
///
/// let h1 = memhash(b"print", 0);
/// let h2 = memhash(b"print", 0);
/// let h3 = memhash(b"prinz", 0);
/// assert_eq!(h1, h2);
/// assert_ne!(h1, h3);
/// ```
pub fn memhash(buf: &[u8], seed: u64) -> u64 {
    let len = buf.len();
    let mut h = seed.wrapping_mul(M).wrapping_add((len as u64).wrapping_mul(M));
    let mut at = buf;

    while at.len() >= 32 {
        h = mix(h, word(&at[0..]));
        h = mix(h, word(&at[8..]));
        h = mix(h, word(&at[16..]));
        h = mix(h, word(&at[24..]));
        at = &at[32..];
    }
    if at.len() >= 16 {
        h = mix(h, word(&at[0..]));
        h = mix(h, word(&at[8..]));
        at = &at[16..];
    }
    if at.len() >= 8 {
        h = mix(h, word(&at[0..]));
        at = &at[8..];
    }
    if !at.is_empty() {
        let mut x: u64 = 0;
        for (i, &b) in at.iter().enumerate() {
            x |= (b as u64) << (8 * i);
        }
        h = mix(h, x);
    }

    (h >> 32).wrapping_sub(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(memhash(b"", 0), memhash(b"", 0));
        assert_eq!(memhash(b"abc", 1), memhash(b"abc", 1));
    }

    #[test]
    fn test_seed_matters() {
        assert_ne!(memhash(b"abc", 0), memhash(b"abc", 1));
    }

    #[test]
    fn test_length_matters() {
        // Same prefix, different length, must not collide trivially.
        assert_ne!(memhash(b"aaaa", 0), memhash(b"aaaaa", 0));
    }

    #[test]
    fn test_block_boundaries() {
        // Exercise the 32/16/8/tail paths.
        for n in [0usize, 1, 7, 8, 9, 15, 16, 17, 31, 32, 33, 64, 100] {
            let buf: Vec<u8> = (0..n as u8).collect();
            let h = memhash(&buf, 0);
            assert_eq!(h, memhash(&buf, 0), "len {}", n);
        }
    }

    #[test]
    fn test_spread() {
        // Hashes of sequential small keys should not cluster in the
        // top six bits (the trie's first window).
        use std::collections::HashSet;
        let tops: HashSet<u64> = (0..64u32)
            .map(|i| memhash(format!("name{}", i).as_bytes(), 0) >> 58)
            .collect();
        assert!(tops.len() > 16);
    }
}
