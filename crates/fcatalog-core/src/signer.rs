//! The catalog1 signature algorithm.
//!
//! [`sign`] approximates the Jaccard similarity of two bodies' 4-byte
//! sliding-window sets by MinHash: draw a fixed family of `num_perms`
//! pseudo-random permutations of the 32-bit domain, and take the minimum
//! permuted window value per permutation. [`strong_hash`] is an unrelated,
//! exact content hash used as the record's primary key.
//!
//! The permutation family's seed is fixed and baked into this module. It is
//! part of the on-disk signature format — any two processes sharing a
//! catalog must derive byte-identical permutations — so it is never threaded
//! through configuration or test fixtures, unlike the time/randomness this
//! crate's Session otherwise leaves unseeded.

use std::collections::HashSet;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Seed for the deterministic permutation-family generator.
///
/// Fixed forever: changing this would silently reinterpret every signature
/// already committed to disk.
const PERMUTATION_SEED: u64 = 0x6361_7461_6c6f_6731;

/// One linear permutation of the 32-bit domain: `x -> (a * x + b) mod 2^32`.
///
/// `a` is forced odd, which (mod 2^32, a power of two) makes the map a
/// bijection on `u32` via wrapping arithmetic.
#[derive(Debug, Clone, Copy)]
struct Permutation {
    a: u32,
    b: u32,
}

impl Permutation {
    fn apply(self, x: u32) -> u32 {
        self.a.wrapping_mul(x).wrapping_add(self.b)
    }
}

/// Build the deterministic family of `num_perms` permutations.
fn permutation_family(num_perms: u32) -> Vec<Permutation> {
    let mut rng = ChaCha8Rng::seed_from_u64(PERMUTATION_SEED);
    (0..num_perms)
        .map(|_| {
            let a = rng.next_u32() | 1;
            let b = rng.next_u32();
            Permutation { a, b }
        })
        .collect()
}

/// Collect the deduplicated set of 4-byte little-endian windows of `body`.
///
/// Bodies shorter than 4 bytes are right-padded with zeros to exactly 4
/// bytes and treated as the single resulting window — the documented
/// degenerate policy for short bodies.
fn windows(body: &[u8]) -> HashSet<u32> {
    if body.len() < 4 {
        let mut padded = [0u8; 4];
        padded[..body.len()].copy_from_slice(body);
        let mut set = HashSet::with_capacity(1);
        set.insert(u32::from_le_bytes(padded));
        return set;
    }

    let mut set = HashSet::with_capacity(body.len() - 3);
    for window in body.windows(4) {
        #[allow(clippy::expect_used)]
        let bytes: [u8; 4] = window.try_into().expect("invariant: windows(4) yields 4-byte slices");
        set.insert(u32::from_le_bytes(bytes));
    }
    set
}

/// Compute the catalog1 MinHash signature of `body` for a family of
/// `num_perms` permutations.
///
/// `len(sign(body, num_perms)) == num_perms` always holds, and the result is
/// a pure, deterministic function of `(body, num_perms)` — the same pair
/// yields byte-identical output in any process, forever.
#[must_use]
pub fn sign(body: &[u8], num_perms: u32) -> Vec<u32> {
    let perms = permutation_family(num_perms);
    let windows = windows(body);

    perms
        .iter()
        .map(|perm| {
            windows
                .iter()
                .map(|&w| perm.apply(w))
                .min()
                .unwrap_or(0)
        })
        .collect()
}

/// Compute the strong (cryptographic) content hash of `body`.
///
/// Independent of [`sign`]; used as the record's primary key.
#[must_use]
pub fn strong_hash(body: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_length_matches_num_perms() {
        for num_perms in [1u32, 4, 16, 64] {
            assert_eq!(sign(b"some function bytes", num_perms).len(), num_perms as usize);
        }
    }

    #[test]
    fn signature_is_deterministic_within_process() {
        let body = b"deterministic body content for hashing";
        assert_eq!(sign(body, 16), sign(body, 16));
    }

    /// Pins `sign`'s output against a checked-in vector.
    ///
    /// `PERMUTATION_SEED` and the permutation-family derivation are part of
    /// the on-disk signature format: any process that ever shares a catalog
    /// file with another must derive byte-identical signatures, now and
    /// across future refactors of this module. This test is the guard
    /// against an accidental change to `permutation_family` or `windows`
    /// silently breaking that compatibility — a within-process determinism
    /// check alone (above) would not catch a changed-but-still-self-consistent
    /// derivation.
    #[test]
    fn signature_matches_checked_in_vector() {
        assert_eq!(sign(b"", 4), vec![3_029_774_130, 2_459_231_434, 3_136_121_035, 1_389_558_881]);
        assert_eq!(sign(b"abc", 4), vec![2_876_744_387, 4_288_336_091, 2_096_374_024, 3_080_208_334]);
        assert_eq!(
            sign(b"hello world", 8),
            vec![
                950_361_170,
                141_615_734,
                565_448_555,
                284_871_389,
                561_024_447,
                215_611_242,
                465_077_837,
                1_112_006_768,
            ]
        );
    }

    #[test]
    fn empty_body_signs_without_panicking() {
        let sig = sign(b"", 16);
        assert_eq!(sig.len(), 16);
    }

    #[test]
    fn short_body_signs_without_panicking() {
        for len in 0..4 {
            let body = vec![0xABu8; len];
            assert_eq!(sign(&body, 8).len(), 8);
        }
    }

    #[test]
    fn identical_bodies_agree_on_every_coordinate() {
        let body = b"identical bodies must agree on every single coordinate here";
        assert_eq!(sign(body, 16), sign(body, 16));
    }

    #[test]
    fn near_identical_bodies_agree_on_more_than_six_of_sixteen_coordinates() {
        let a = sign(b"hello world he2llo world", 16);
        let b = sign(b"hello world he1llo world", 16);
        let agreement = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
        assert!(agreement > 6, "expected agreement > 6, got {agreement}");
    }

    #[test]
    fn strong_hash_is_independent_of_signature() {
        let body = b"some body";
        let h1 = strong_hash(body);
        let h2 = strong_hash(body);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
    }

    #[test]
    fn strong_hash_differs_for_different_bodies() {
        assert_ne!(strong_hash(b"body one"), strong_hash(b"body two"));
    }

    #[test]
    fn permutation_family_is_stable_across_calls() {
        assert_eq!(permutation_family(16).len(), permutation_family(16).len());
        let a = permutation_family(4);
        let b = permutation_family(4);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.a, y.a);
            assert_eq!(x.b, y.b);
        }
    }

    #[test]
    fn permutation_a_coefficients_are_always_odd() {
        for perm in permutation_family(32) {
            assert_eq!(perm.a % 2, 1);
        }
    }
}
