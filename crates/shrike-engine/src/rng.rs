//! The run RNG.
//!
//! One seeded instance per run; every sampling decision the engine makes
//! goes through it, so the seed fully determines the generated trace.

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIMPLE_SYMBOL_HEAD: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SIMPLE_SYMBOL_TAIL: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Deterministic seeded random source.
pub struct SeededRng {
    rng: StdRng,
    seed: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        SeededRng {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Uniform draw from the inclusive range `[lo, hi]`.
    pub fn pick_u32(&mut self, lo: u32, hi: u32) -> u32 {
        self.rng.gen_range(lo..=hi)
    }

    pub fn pick_usize(&mut self, lo: usize, hi: usize) -> usize {
        self.rng.gen_range(lo..=hi)
    }

    pub fn pick_i64(&mut self, lo: i64, hi: i64) -> i64 {
        self.rng.gen_range(lo..=hi)
    }

    pub fn flip_coin(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    pub fn flip_with(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p)
    }

    /// Uniform index into a collection of `len` elements.
    pub fn pick_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        self.rng.gen_range(0..len)
    }

    pub fn pick_from_slice<'a, T>(&mut self, slice: &'a [T]) -> &'a T {
        &slice[self.pick_index(slice.len())]
    }

    pub fn pick_from_set<'a, T: Hash + Eq>(&mut self, set: &'a IndexSet<T>) -> &'a T {
        set.get_index(self.pick_index(set.len()))
            .expect("pick_from_set on empty set")
    }

    /// Pick a key of the map, ignoring values.
    pub fn pick_from_map<'a, K: Hash + Eq, V>(&mut self, map: &'a IndexMap<K, V>) -> &'a K {
        map.get_index(self.pick_index(map.len()))
            .map(|(k, _)| k)
            .expect("pick_from_map on empty map")
    }

    /// Weighted index draw; weights must not all be zero.
    pub fn pick_weighted(&mut self, weights: &[u32]) -> usize {
        let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
        debug_assert!(total > 0);
        let mut draw = self.rng.gen_range(0..total);
        for (i, &w) in weights.iter().enumerate() {
            let w = u64::from(w);
            if draw < w {
                return i;
            }
            draw -= w;
        }
        weights.len() - 1
    }

    /// `[a-zA-Z][a-zA-Z0-9_]*` of exactly `len` characters (empty for 0).
    pub fn pick_simple_symbol(&mut self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        for i in 0..len {
            let alphabet = if i == 0 {
                SIMPLE_SYMBOL_HEAD
            } else {
                SIMPLE_SYMBOL_TAIL
            };
            out.push(*self.pick_from_slice(alphabet) as char);
        }
        out
    }

    /// A piped symbol of `len` printable characters, exercising SMT-LIB
    /// quoting. `|` and `\` are excluded, everything else printable goes.
    pub fn pick_piped_symbol(&mut self, len: usize) -> String {
        let mut out = String::with_capacity(len + 2);
        out.push('|');
        for _ in 0..len {
            loop {
                let c = self.pick_u32(0x20, 0x7e) as u8 as char;
                if c != '|' && c != '\\' {
                    out.push(c);
                    break;
                }
            }
        }
        out.push('|');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SeededRng::new(0xdeadbeef);
        let mut b = SeededRng::new(0xdeadbeef);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SeededRng::new(1);
        let mut b = SeededRng::new(2);
        let sa: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let sb: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_ne!(sa, sb);
    }

    #[test]
    fn pick_respects_bounds() {
        let mut rng = SeededRng::new(7);
        for _ in 0..1000 {
            let v = rng.pick_u32(3, 9);
            assert!((3..=9).contains(&v));
        }
        assert_eq!(rng.pick_u32(5, 5), 5);
    }

    #[test]
    fn weighted_pick_skips_zero_weights() {
        let mut rng = SeededRng::new(11);
        for _ in 0..500 {
            let i = rng.pick_weighted(&[0, 3, 0, 5]);
            assert!(i == 1 || i == 3);
        }
    }

    #[test]
    fn simple_symbols_are_well_formed() {
        let mut rng = SeededRng::new(3);
        for len in [1usize, 5, 32] {
            let s = rng.pick_simple_symbol(len);
            assert_eq!(s.len(), len);
            assert!(s.chars().next().unwrap().is_ascii_alphabetic());
            assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
        assert!(rng.pick_simple_symbol(0).is_empty());
    }

    #[test]
    fn piped_symbols_exclude_pipe_and_backslash() {
        let mut rng = SeededRng::new(5);
        let s = rng.pick_piped_symbol(64);
        assert!(s.starts_with('|') && s.ends_with('|'));
        let inner = &s[1..s.len() - 1];
        assert_eq!(inner.len(), 64);
        assert!(!inner.contains('|') && !inner.contains('\\'));
    }

    #[test]
    fn set_and_map_picks_are_order_stable() {
        let set: IndexSet<u32> = [10, 20, 30].into_iter().collect();
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..50 {
            assert_eq!(a.pick_from_set(&set), b.pick_from_set(&set));
        }
    }
}
