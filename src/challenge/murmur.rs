//! MurmurHash3, x64 128-bit variant.
//!
//! The challenge scheme renders the two 64-bit halves as 32 lowercase hex
//! characters, `h1` first.

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

pub fn murmur3_x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    let mut h1 = seed as u64;
    let mut h2 = seed as u64;

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let (lo, hi) = block.split_at(8);
        let k1 = u64::from_le_bytes(lo.try_into().unwrap_or([0; 8]));
        let k2 = u64::from_le_bytes(hi.try_into().unwrap_or([0; 8]));

        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(27).wrapping_add(h2).wrapping_mul(5).wrapping_add(0x52dc_e729);

        h2 ^= mix_k2(k2);
        h2 = h2.rotate_left(31).wrapping_add(h1).wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if tail.len() > 8 {
        let k2 = tail[8..]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc ^ ((*byte as u64) << (i * 8)));
        h2 ^= mix_k2(k2);
    }
    if !tail.is_empty() {
        let k1 = tail[..tail.len().min(8)]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc ^ ((*byte as u64) << (i * 8)));
        h1 ^= mix_k1(k1);
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// 32-char hex digest used for every hashed field of the challenge payload.
pub fn x64hash128(data: &str, seed: u32) -> String {
    let (h1, h2) = murmur3_x64_128(data.as_bytes(), seed);
    format!("{:016x}{:016x}", h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_with_zero_seed_is_zero() {
        assert_eq!(x64hash128("", 0), "00000000000000000000000000000000");
    }

    #[test]
    fn matches_reference_vectors() {
        assert_eq!(x64hash128("foo", 0), "e271865701f545617eaf87e42bba7d87");
        assert_eq!(x64hash128("hello", 0), "cbd8a7b341bd9b025b1e906a48ae1d19");
        assert_eq!(
            x64hash128("The quick brown fox jumps over the lazy dog", 38),
            "f5e9dd05841abc0ea5cb1b58f7105fd2"
        );
    }

    #[test]
    fn matches_observed_webgl_extension_hash() {
        let extensions = crate::challenge::fingerprint::WEBGL_EXTENSIONS.join(";");
        assert_eq!(x64hash128(&extensions, 0), "58a5a04a5bef1a78fa88d5c5098bd237");
    }

    #[test]
    fn seed_changes_digest() {
        assert_ne!(x64hash128("fingerprint", 31), x64hash128("fingerprint", 38));
    }
}
