//! # Content Hashing
//!
//! Every record in the store is found through a 64-bit content key:
//! - **Word**: hash of the external word name
//! - **Pair** / **Candidate**: the canonical `(a, b)` packed into one key
//! - **Section**: the disjunct hash salted with the owning word
//!
//! Keys that land on one of the index sentinels are remapped to `0`.

use crate::{EMPTY_KEY, TOMBSTONE_KEY};

const WORD_HASH_SEED: u64 = 0x1234_5678_DEAD_BEEF;
const WORD_HASH_MULT: u64 = 0xBF58_476D_1CE4_E5B9;

const FNV_OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// Golden-ratio multiplier used to spread word ids over the key space
const SECTION_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Which side of a word its neighbour sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Neighbour precedes the word
    Left = 0,
    /// Neighbour follows the word
    Right = 1,
}

impl Direction {
    /// Direction of `neighbour` as seen from `position`
    #[inline]
    pub fn between(position: u32, neighbour: u32) -> Self {
        if neighbour > position {
            Direction::Right
        } else {
            Direction::Left
        }
    }
}

/// Remap a computed key off the index sentinels
#[inline]
pub fn safe_key(key: u64) -> u64 {
    if key == EMPTY_KEY || key == TOMBSTONE_KEY {
        0
    } else {
        key
    }
}

/// Hash an external word name into its pool key
pub fn word_hash(name: &str) -> u64 {
    let mut h = WORD_HASH_SEED;
    for byte in name.bytes() {
        h ^= byte as u64;
        h = h.wrapping_mul(WORD_HASH_MULT);
        h ^= h >> 31;
    }
    safe_key(h)
}

/// Order two word indices so the smaller comes first
#[inline]
pub fn canonical(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Key of an unordered word pair
#[inline]
pub fn pair_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = canonical(a, b);
    safe_key(((lo as u64) << 32) | hi as u64)
}

/// Encode one connector: neighbour word id in the high bits, direction in bit 0
#[inline]
pub fn connector(word: u32, dir: Direction) -> u64 {
    ((word as u64) << 1) | dir as u64
}

/// Hash a connector multiset.
///
/// The slice is sorted in place (direction first, then word) before the
/// FNV-1a fold, so any permutation of the same connectors yields the
/// same hash.
pub fn disjunct_hash(connectors: &mut [u64]) -> u64 {
    connectors.sort_unstable_by_key(|c| (c & 1, c >> 1));
    let mut h = FNV_OFFSET;
    for &c in connectors.iter() {
        h ^= c;
        h = h.wrapping_mul(FNV_PRIME);
    }
    safe_key(h)
}

/// Key of a (word, disjunct) section
#[inline]
pub fn section_key(word: u32, disjunct: u64) -> u64 {
    safe_key(disjunct ^ (word as u64).wrapping_mul(SECTION_SALT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_CONNECTORS;

    #[test]
    fn test_word_hash_deterministic() {
        assert_eq!(word_hash("the"), word_hash("the"));
        assert_ne!(word_hash("the"), word_hash("was"));
        assert_ne!(word_hash("ab"), word_hash("ba"));
    }

    #[test]
    fn test_pair_key_is_symmetric() {
        assert_eq!(pair_key(3, 7), pair_key(7, 3));
        assert_eq!(pair_key(3, 7), (3u64 << 32) | 7);
        assert_ne!(pair_key(3, 7), pair_key(3, 8));
    }

    #[test]
    fn test_sentinels_remapped() {
        assert_eq!(safe_key(EMPTY_KEY), 0);
        assert_eq!(safe_key(TOMBSTONE_KEY), 0);
        assert_eq!(safe_key(42), 42);
        assert_eq!(pair_key(u32::MAX, u32::MAX), 0);
    }

    #[test]
    fn test_disjunct_order_independent() {
        let mut a = [
            connector(100, Direction::Left),
            connector(101, Direction::Left),
            connector(103, Direction::Right),
            connector(104, Direction::Right),
        ];
        let mut b = [a[3], a[1], a[0], a[2]];
        assert_eq!(disjunct_hash(&mut a), disjunct_hash(&mut b));
    }

    #[test]
    fn test_disjunct_shuffles_agree() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(11);
        let mut base: Vec<u64> = (0..MAX_CONNECTORS as u32)
            .map(|w| connector(w * 3, if w % 2 == 0 { Direction::Left } else { Direction::Right }))
            .collect();
        let expected = disjunct_hash(&mut base.clone());
        for _ in 0..20 {
            base.shuffle(&mut rng);
            assert_eq!(disjunct_hash(&mut base.clone()), expected);
        }
    }

    #[test]
    fn test_direction_changes_disjunct() {
        let mut left = [connector(20, Direction::Left)];
        let mut right = [connector(20, Direction::Right)];
        assert_ne!(disjunct_hash(&mut left), disjunct_hash(&mut right));
    }

    #[test]
    fn test_section_key_salted_by_word() {
        assert_ne!(section_key(1, 0x222), section_key(2, 0x222));
        assert_eq!(section_key(1, 0x222), section_key(1, 0x222));
    }

    #[test]
    fn test_direction_between() {
        assert_eq!(Direction::between(2, 0), Direction::Left);
        assert_eq!(Direction::between(0, 2), Direction::Right);
    }
}
