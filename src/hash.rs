//! Hash backends.
//!
//! The filter core treats the byte-level hash function as an external
//! collaborator: it only consumes a `Hasher` that maps an item to a
//! 32/64/128-bit code. This module supplies the five stable algorithm
//! identifiers and a ready-to-use implementation of each, plus the
//! `Funnel` trait that turns an arbitrary item into the bytes the hasher
//! consumes.

use std::fmt;
use std::hash::{Hash, Hasher as StdHasher};

use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;
use twox_hash::XxHash64;

use crate::sync::Arc;

/// Stable algorithm identifiers, persisted in the serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Algorithm {
    Murmur3_32 = 0,
    Murmur3_128 = 1,
    Sha256 = 2,
    SipHash24 = 3,
    XxHash64 = 4,
}

impl Algorithm {
    /// Width in bits of the code this algorithm produces.
    pub(crate) fn hash_len(self) -> u32 {
        match self {
            Algorithm::Murmur3_32 => 32,
            Algorithm::Murmur3_128 => 128,
            Algorithm::Sha256 => 256,
            Algorithm::SipHash24 => 64,
            Algorithm::XxHash64 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Murmur3_32 => "Murmur3_32",
            Algorithm::Murmur3_128 => "Murmur3_128",
            Algorithm::Sha256 => "sha256",
            Algorithm::SipHash24 => "sipHash24",
            Algorithm::XxHash64 => "xxHash64",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for Algorithm {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Algorithm::Murmur3_32),
            1 => Ok(Algorithm::Murmur3_128),
            2 => Ok(Algorithm::Sha256),
            3 => Ok(Algorithm::SipHash24),
            4 => Ok(Algorithm::XxHash64),
            other => Err(other),
        }
    }
}

/// Deterministic, salted mapping from item bytes to a fixed-width code.
///
/// `seed` distinguishes the base hash (`seed == 0`) from the zero-tag rehash
/// attempts `generate` makes with `seed == 1, 2, 3, ...`.
pub trait ItemHasher: Send + Sync {
    /// Which stable identifier this backend implements.
    fn algorithm(&self) -> Algorithm;

    /// 32- or 64-bit code, used when `algorithm().hash_len() <= 64`.
    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64;

    /// 128-bit code as two disjoint 64-bit words, used when
    /// `algorithm().hash_len() >= 128`. The default panics; only backends
    /// advertising a `hash_len() >= 128` need to implement it.
    fn hash128(&self, seed: u64, bytes: &[u8]) -> (u64, u64) {
        let _ = (seed, bytes);
        unreachable!("{} does not produce a 128-bit code", self.algorithm())
    }

    /// The backend's salt state as two longs. Backends that only carry one
    /// salt report it in the first slot and `0` in the second.
    fn salts(&self) -> (u64, u64);
}

/// MurmurHash3 finalizer constant, also used directly by
/// `index_tag::alt_index`.
pub(crate) const MURMUR3_FINALIZER_K: u64 = 0xc4ceb9fe1a85ec53;

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// MurmurHash3_x86_32, seeded. A from-scratch implementation since the
/// constants involved are a handful of lines and the crate already needs the
/// finalizer constant for `alt_index`.
fn murmur3_32(seed: u32, bytes: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let chunks = bytes.chunks_exact(4);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().unwrap());
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k1 = 0u32;
    for (i, &byte) in tail.iter().enumerate().rev() {
        k1 ^= (byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= bytes.len() as u32;
    fmix32(h1)
}

/// MurmurHash3_x64_128, seeded. Produces two 64-bit words.
fn murmur3_128(seed: u64, bytes: &[u8]) -> (u64, u64) {
    const C1: u64 = 0x87c3_7b91_1142_53d5;
    const C2: u64 = 0x4cf5_ad43_2745_937f;

    let mut h1 = seed;
    let mut h2 = seed;

    let chunks = bytes.chunks_exact(16);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k1 = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(chunk[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52de_e703);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let mut k1 = 0u64;
    let mut k2 = 0u64;
    if tail.len() > 8 {
        for (i, &byte) in tail[8..].iter().enumerate().rev() {
            k2 ^= (byte as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        for (i, &byte) in tail[..tail.len().min(8)].iter().enumerate().rev() {
            k1 ^= (byte as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= bytes.len() as u64;
    h2 ^= bytes.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

/// `Murmur3_32` backend. `hash64` folds the seed salt in as the murmur seed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Murmur3_32Hasher {
    salt: u32,
}

impl Murmur3_32Hasher {
    pub fn new(salt: u32) -> Self {
        Self { salt }
    }
}

impl ItemHasher for Murmur3_32Hasher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Murmur3_32
    }

    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64 {
        murmur3_32(self.salt ^ seed as u32, bytes) as u64
    }

    fn salts(&self) -> (u64, u64) {
        (self.salt as u64, 0)
    }
}

/// `Murmur3_128` backend, the crate's default (wide enough for any table
/// size without constraining `numBuckets`).
#[derive(Debug, Clone, Copy)]
pub struct Murmur3_128Hasher {
    salt: u64,
}

impl Default for Murmur3_128Hasher {
    fn default() -> Self {
        Self { salt: 0 }
    }
}

impl Murmur3_128Hasher {
    pub fn new(salt: u64) -> Self {
        Self { salt }
    }
}

impl ItemHasher for Murmur3_128Hasher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Murmur3_128
    }

    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64 {
        self.hash128(seed, bytes).0
    }

    fn hash128(&self, seed: u64, bytes: &[u8]) -> (u64, u64) {
        murmur3_128(self.salt.wrapping_add(seed), bytes)
    }

    fn salts(&self) -> (u64, u64) {
        (self.salt, 0)
    }
}

/// SipHash-2-4 backend, keyed by two salt longs.
#[derive(Debug, Clone, Copy)]
pub struct SipHash24Hasher {
    k0: u64,
    k1: u64,
}

impl Default for SipHash24Hasher {
    fn default() -> Self {
        Self { k0: 0, k1: 0 }
    }
}

impl SipHash24Hasher {
    pub fn new(k0: u64, k1: u64) -> Self {
        Self { k0, k1 }
    }
}

impl ItemHasher for SipHash24Hasher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SipHash24
    }

    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64 {
        let mut hasher = SipHasher24::new_with_keys(self.k0 ^ seed, self.k1);
        hasher.write(bytes);
        hasher.finish()
    }

    fn salts(&self) -> (u64, u64) {
        (self.k0, self.k1)
    }
}

/// SHA-256 backend. Produces a 256-bit digest; only the first 16 bytes are
/// consumed (as two disjoint 64-bit words).
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher {
    salt: u64,
}

impl Sha256Hasher {
    pub fn new(salt: u64) -> Self {
        Self { salt }
    }
}

impl ItemHasher for Sha256Hasher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Sha256
    }

    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64 {
        self.hash128(seed, bytes).0
    }

    fn hash128(&self, seed: u64, bytes: &[u8]) -> (u64, u64) {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.wrapping_add(seed).to_le_bytes());
        hasher.update(bytes);
        let digest = hasher.finalize();
        let h1 = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let h2 = u64::from_le_bytes(digest[8..16].try_into().unwrap());
        (h1, h2)
    }

    fn salts(&self) -> (u64, u64) {
        (self.salt, 0)
    }
}

/// xxHash64 backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct XxHash64Hasher {
    salt: u64,
}

impl XxHash64Hasher {
    pub fn new(salt: u64) -> Self {
        Self { salt }
    }
}

impl ItemHasher for XxHash64Hasher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::XxHash64
    }

    fn hash64(&self, seed: u64, bytes: &[u8]) -> u64 {
        let mut hasher = XxHash64::with_seed(self.salt.wrapping_add(seed));
        hasher.write(bytes);
        hasher.finish()
    }

    fn salts(&self) -> (u64, u64) {
        (self.salt, 0)
    }
}

/// Rebuilds a hasher backend from its persisted `(algorithm, salts)` pair.
pub(crate) fn hasher_from_salts(algorithm: Algorithm, salts: (u64, u64)) -> Arc<dyn ItemHasher> {
    let (s0, s1) = salts;
    match algorithm {
        Algorithm::Murmur3_32 => Arc::new(Murmur3_32Hasher::new(s0 as u32)),
        Algorithm::Murmur3_128 => Arc::new(Murmur3_128Hasher::new(s0)),
        Algorithm::Sha256 => Arc::new(Sha256Hasher::new(s0)),
        Algorithm::SipHash24 => Arc::new(SipHash24Hasher::new(s0, s1)),
        Algorithm::XxHash64 => Arc::new(XxHash64Hasher::new(s0)),
    }
}

/// Turns an item into the bytes fed to an [`ItemHasher`]. Item
/// serialization is treated as an external collaborator; the blanket impl
/// below bridges anything implementing [`Hash`] so callers rarely need to
/// write one by hand.
pub trait Funnel<T: ?Sized> {
    fn funnel(&self, item: &T, sink: &mut Vec<u8>);

    /// Persisted as the serialized form's item funnel identity. A custom
    /// funnel is not itself reconstructable from this string; it only lets
    /// a deserializer detect "this isn't the default funnel" rather than
    /// silently mismatching byte encodings.
    fn identity(&self) -> &'static str {
        "custom"
    }
}

/// Collects the bytes a `Hash` impl writes, the way `std::hash::Hash` would
/// feed them to a real `Hasher`.
#[derive(Default)]
struct ByteCollector {
    bytes: Vec<u8>,
}

impl StdHasher for ByteCollector {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        0
    }
}

/// Default funnel for any `Hash` type.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashFunnel;

impl<T: Hash + ?Sized> Funnel<T> for HashFunnel {
    fn funnel(&self, item: &T, sink: &mut Vec<u8>) {
        let mut collector = ByteCollector::default();
        item.hash(&mut collector);
        sink.extend_from_slice(&collector.bytes);
    }

    fn identity(&self) -> &'static str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur3_32_is_deterministic() {
        let h = Murmur3_32Hasher::new(0);
        assert_eq!(h.hash64(0, b"hello"), h.hash64(0, b"hello"));
        assert_ne!(h.hash64(0, b"hello"), h.hash64(1, b"hello"));
    }

    #[test]
    fn murmur3_128_words_are_distinct_streams() {
        let h = Murmur3_128Hasher::new(7);
        let (w1, w2) = h.hash128(0, b"the quick brown fox");
        assert_ne!(w1, w2);
        let (w1_again, _) = h.hash128(0, b"the quick brown fox");
        assert_eq!(w1, w1_again);
    }

    #[test]
    fn siphash_changes_with_seed() {
        let h = SipHash24Hasher::new(1, 2);
        assert_ne!(h.hash64(0, b"x"), h.hash64(5, b"x"));
    }

    #[test]
    fn sha256_hash_len_is_at_least_128() {
        assert_eq!(Algorithm::Sha256.hash_len(), 256);
    }

    #[test]
    fn hash_funnel_roundtrips_bytes_for_same_value() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        HashFunnel.funnel(&42u64, &mut a);
        HashFunnel.funnel(&42u64, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn algorithm_try_from_round_trips() {
        for id in 0u8..5 {
            let algo = Algorithm::try_from(id).unwrap();
            assert_eq!(algo as u8, id);
        }
        assert!(Algorithm::try_from(5).is_err());
    }
}
