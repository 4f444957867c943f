//! Sparse bitset, a small-then-big number set, and a memoizing map.
//!
//! These back the per-node scratch state analyses need to keep cheap:
//! visit ids, SCC numbering, and worklist membership are all "is this
//! small non-negative integer in a set" questions dominated by sets that
//! stay tiny, so the small-then-big split avoids allocating a bitset for
//! every single node touched by an analysis.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::Hash;

const WORD_BITS: usize = 64;

/// A growable bitset over `u64`, indexed directly by value (not by a
/// separately-interned id). Words grow lazily as larger values are set.
#[derive(Debug, Clone, Default)]
pub struct SparseBitSet {
    words: Vec<u64>,
}

impl SparseBitSet {
    pub fn new() -> Self {
        SparseBitSet::default()
    }

    pub fn set(&mut self, n: u64) -> bool {
        let (word, bit) = (n as usize / WORD_BITS, n as usize % WORD_BITS);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        was_set
    }

    pub fn get(&self, n: u64) -> bool {
        let (word, bit) = (n as usize / WORD_BITS, n as usize % WORD_BITS);
        self.words.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    pub fn union_with(&mut self, other: &SparseBitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, ow) in self.words.iter_mut().zip(&other.words) {
            *w |= ow;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..WORD_BITS).filter_map(move |bit| {
                (w & (1u64 << bit) != 0).then(|| (wi * WORD_BITS + bit) as u64)
            })
        })
    }
}

/// Inline capacity for [`SmallNumberSet`] before it lifts to a [`SparseBitSet`].
const SMALL_CAP: usize = 4;

/// A set of `u64`s optimised for the common case of holding only a handful
/// of small values: it stays inline until a value would make a linear scan
/// pay for itself, then lifts permanently to a [`SparseBitSet`]. Elements
/// are never removed, matching the write-only worklist/visited-set usage
/// this backs.
#[derive(Debug, Clone)]
pub enum SmallNumberSet {
    Small(SmallVec<[u64; SMALL_CAP]>),
    Big(SparseBitSet),
}

impl Default for SmallNumberSet {
    fn default() -> Self {
        SmallNumberSet::Small(SmallVec::new())
    }
}

impl SmallNumberSet {
    pub fn new() -> Self {
        SmallNumberSet::default()
    }

    /// Inserts `n`, returning whether it was newly inserted.
    pub fn add(&mut self, n: u64) -> bool {
        match self {
            SmallNumberSet::Small(v) => {
                if v.contains(&n) {
                    return false;
                }
                if v.len() == SMALL_CAP {
                    let mut big = SparseBitSet::new();
                    for &x in v.iter() {
                        big.set(x);
                    }
                    big.set(n);
                    *self = SmallNumberSet::Big(big);
                } else {
                    v.push(n);
                }
                true
            }
            SmallNumberSet::Big(b) => !b.set(n),
        }
    }

    pub fn has(&self, n: u64) -> bool {
        match self {
            SmallNumberSet::Small(v) => v.contains(&n),
            SmallNumberSet::Big(b) => b.get(n),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SmallNumberSet::Small(v) => v.is_empty(),
            SmallNumberSet::Big(b) => b.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SmallNumberSet::Small(v) => v.len(),
            SmallNumberSet::Big(b) => b.len(),
        }
    }
}

/// A `HashMap` wrapper whose `get_or_create` memoizes an expensive-to-build
/// value per key, used for the pointer analysis's lazily-created
/// [`crate`]-external memory objects (one per allocation, created only
/// the first time a load/store needs one).
#[derive(Debug, Clone, Default)]
pub struct CachingMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K: Eq + Hash, V> CachingMap<K, V> {
    pub fn new() -> Self {
        CachingMap {
            inner: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    pub fn get_or_create(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V
    where
        K: Clone,
    {
        self.inner.entry(key).or_insert_with(make)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_bitset_tracks_membership() {
        let mut s = SparseBitSet::new();
        assert!(!s.set(130));
        assert!(s.get(130));
        assert!(!s.get(5));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn small_number_set_lifts_to_big() {
        let mut s = SmallNumberSet::new();
        for i in 0..SMALL_CAP as u64 {
            assert!(s.add(i));
        }
        assert!(matches!(s, SmallNumberSet::Small(_)));
        assert!(s.add(SMALL_CAP as u64));
        assert!(matches!(s, SmallNumberSet::Big(_)));
        for i in 0..=SMALL_CAP as u64 {
            assert!(s.has(i));
        }
        assert_eq!(s.len(), SMALL_CAP + 1);
    }

    #[test]
    fn caching_map_memoizes() {
        let mut calls = 0;
        let mut map: CachingMap<u32, u32> = CachingMap::new();
        *map.get_or_create(1, || {
            calls += 1;
            10
        }) += 0;
        map.get_or_create(1, || {
            calls += 1;
            10
        });
        assert_eq!(calls, 1);
    }
}
