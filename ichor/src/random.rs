//! Seeded random source.
//!
//! Every choice the generator makes flows through [`RandomSource`], so a whole
//! run is a pure function of one `u64` seed. The trait is deliberately small
//! (`uniform` and `float`) and object safe; the richer helpers live on
//! [`RandomExt`], which is implemented for every source including
//! `dyn RandomSource`.
//!
//! # Example
//!
//! ```rust
//! use ichor::random::{pick, Pick, RandomExt, RandomSource, SeededRandom};
//!
//! let mut a = SeededRandom::from_seed(42);
//! let mut b = SeededRandom::from_seed(42);
//! assert_eq!(a.uniform(1000), b.uniform(1000));
//!
//! let empty: [u8; 0] = [];
//! assert_eq!(*a.index(&empty, &7), 7);
//!
//! let table = Pick::Any(vec![Pick::Value("a"), Pick::values(["b", "c"])]);
//! assert!(pick(&mut a, &table).is_some());
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// The primitive random operations every source must provide.
pub trait RandomSource {
    /// Uniform integer in `[0, n)`. Returns 0 when `n == 0`.
    fn uniform(&mut self, n: u32) -> u32;

    /// Uniform float in `[0, 1)`.
    fn float(&mut self) -> f64;
}

/// A value, a generator of values, or a nested table of either.
///
/// Attribute tables in the DOM modules use the nesting: a table entry may
/// itself be another table, picked from recursively.
#[derive(Debug, Clone)]
pub enum Pick<T> {
    /// A fixed value.
    Value(T),
    /// A nullary generator invoked on every pick.
    Gen(fn(&mut dyn RandomSource) -> T),
    /// Pick one entry uniformly, then pick from it.
    Any(Vec<Pick<T>>),
}

impl<T> Pick<T> {
    /// Build a table of fixed values.
    pub fn values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Pick::Any(values.into_iter().map(Pick::Value).collect())
    }
}

/// Helpers available on every [`RandomSource`].
pub trait RandomExt: RandomSource {
    /// Uniform `usize` in `[0, n)`; 0 when `n == 0`.
    fn below_usize(&mut self, n: usize) -> usize {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        self.uniform(n) as usize
    }

    /// True with probability `1/n`. `one_in(0)` and `one_in(1)` are always true.
    fn one_in(&mut self, n: u32) -> bool {
        self.uniform(n) == 0
    }

    /// True with probability `p` (clamped to `[0, 1]`).
    fn chance(&mut self, p: f64) -> bool {
        self.float() < p.clamp(0.0, 1.0)
    }

    /// Fair coin flip.
    fn coin(&mut self) -> bool {
        self.uniform(2) == 1
    }

    /// Uniform integer in the inclusive range `[lo, hi]`. Returns `lo` if `hi < lo`.
    fn range(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        lo + self.uniform(hi - lo + 1)
    }

    /// Weighted choice using a running sum over `(weight, value)` pairs.
    ///
    /// Returns `None` only for an empty list. When the running sum does not
    /// reach the target (all weights zero), the first entry is returned.
    fn choice<'a, T>(&mut self, pairs: &'a [(u32, T)]) -> Option<&'a T> {
        let first = pairs.first()?;
        let total: u64 = pairs.iter().map(|(w, _)| u64::from(*w)).sum();
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        if total == 0 {
            return Some(&first.1);
        }
        let mut target = self.uniform(total);
        for (weight, value) in pairs {
            if target < *weight {
                return Some(value);
            }
            target -= weight;
        }
        Some(&first.1)
    }

    /// A random element of `seq`, or `empty` when `seq` is empty.
    fn index<'a, T>(&mut self, seq: &'a [T], empty: &'a T) -> &'a T {
        self.element(seq).unwrap_or(empty)
    }

    /// A random element of `seq`, or `None` when it is empty.
    fn element<'a, T>(&mut self, seq: &'a [T]) -> Option<&'a T> {
        if seq.is_empty() {
            return None;
        }
        seq.get(self.below_usize(seq.len()))
    }

    /// Fisher-Yates shuffle in place.
    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below_usize(i + 1);
            items.swap(i, j);
        }
    }

    /// A random subset of `items`, preserving order. Each item is kept with
    /// probability one half.
    fn subset<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        items.iter().filter(|_| self.coin()).cloned().collect()
    }
}

impl<R: RandomSource + ?Sized> RandomExt for R {}

/// A ChaCha8 stream seeded from a single `u64`.
///
/// ChaCha8 output is specified independently of platform and word size, so a
/// seed reproduces the same stream everywhere.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededRandom {
    /// Create a source from a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this source was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// An independent stream derived from this source's seed.
    ///
    /// Derived streams let secondary consumers (oracle sampling) draw numbers
    /// without shifting the generator's own sequence.
    pub fn derive(&self, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        Self { seed: self.seed, rng }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    fn float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// One draw observed by [`Recording`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    Uniform { n: u32, value: u32 },
    /// Bit pattern of the returned float.
    Float(u64),
}

/// Shared handle to the draws a [`Recording`] has observed.
pub type Trace = Rc<RefCell<Vec<Draw>>>;

/// A source that forwards to `inner` and records every draw.
///
/// Two runs made the same choices exactly when their traces are equal,
/// even if the rendered output happens to coincide.
#[derive(Debug)]
pub struct Recording<R> {
    inner: R,
    trace: Trace,
}

impl<R: RandomSource> Recording<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            trace: Trace::default(),
        }
    }

    /// A handle that stays valid after the recorder is moved or boxed.
    pub fn trace(&self) -> Trace {
        Rc::clone(&self.trace)
    }
}

impl<R: RandomSource> RandomSource for Recording<R> {
    fn uniform(&mut self, n: u32) -> u32 {
        let value = self.inner.uniform(n);
        self.trace.borrow_mut().push(Draw::Uniform { n, value });
        value
    }

    fn float(&mut self) -> f64 {
        let value = self.inner.float();
        self.trace.borrow_mut().push(Draw::Float(value.to_bits()));
        value
    }
}

/// Resolve a [`Pick`], recursing through nested tables.
///
/// Returns `None` if an empty table is reached.
pub fn pick<T: Clone>(rng: &mut dyn RandomSource, table: &Pick<T>) -> Option<T> {
    match table {
        Pick::Value(v) => Some(v.clone()),
        Pick::Gen(f) => Some(f(rng)),
        Pick::Any(entries) => {
            let entry = rng.element(entries)?;
            pick(rng, entry)
        }
    }
}

/// Derive a seed from the wall clock, for runs started without one.
pub fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() ^ u64::from(d.subsec_nanos()).rotate_left(32))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always answers the largest permitted value.
    struct Maximal;

    impl RandomSource for Maximal {
        fn uniform(&mut self, n: u32) -> u32 {
            n.saturating_sub(1)
        }

        fn float(&mut self) -> f64 {
            0.999
        }
    }

    #[test]
    fn test_uniform_zero_is_zero() {
        let mut rng = SeededRandom::from_seed(1);
        for _ in 0..100 {
            assert_eq!(rng.uniform(0), 0);
        }
    }

    #[test]
    fn test_uniform_in_range() {
        let mut rng = SeededRandom::from_seed(7);
        for _ in 0..1000 {
            assert!(rng.uniform(13) < 13);
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SeededRandom::from_seed(42);
        let mut b = SeededRandom::from_seed(42);
        let xs: Vec<u32> = (0..64).map(|_| a.uniform(1 << 20)).collect();
        let ys: Vec<u32> = (0..64).map(|_| b.uniform(1 << 20)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_derived_stream_differs() {
        let base = SeededRandom::from_seed(42);
        let mut a = base.clone();
        let mut b = base.derive(1);
        let xs: Vec<u32> = (0..32).map(|_| a.uniform(u32::MAX)).collect();
        let ys: Vec<u32> = (0..32).map(|_| b.uniform(u32::MAX)).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_index_empty_returns_sentinel() {
        let mut rng = SeededRandom::from_seed(3);
        let empty: Vec<&str> = Vec::new();
        assert_eq!(*rng.index(&empty, &"none"), "none");
        assert!(rng.element(&empty).is_none());
    }

    #[test]
    fn test_choice_respects_weights() {
        let mut rng = SeededRandom::from_seed(9);
        let pairs = [(0, "never"), (5, "often"), (0, "also never")];
        for _ in 0..200 {
            assert_eq!(rng.choice(&pairs), Some(&"often"));
        }
    }

    #[test]
    fn test_choice_all_zero_falls_back_to_first() {
        let mut rng = SeededRandom::from_seed(9);
        let pairs = [(0, 'a'), (0, 'b')];
        assert_eq!(rng.choice(&pairs), Some(&'a'));
        let none: [(u32, char); 0] = [];
        assert_eq!(rng.choice(&none), None);
    }

    #[test]
    fn test_choice_maximal_picks_last() {
        let mut rng = Maximal;
        let pairs = [(1, 'a'), (2, 'b'), (3, 'c')];
        assert_eq!(rng.choice(&pairs), Some(&'c'));
    }

    #[test]
    fn test_pick_nested_tables() {
        fn forty_two(_: &mut dyn RandomSource) -> u32 {
            42
        }
        let table = Pick::Any(vec![
            Pick::Value(1),
            Pick::Any(vec![Pick::Value(2), Pick::Gen(forty_two)]),
        ]);
        let mut rng = SeededRandom::from_seed(11);
        for _ in 0..100 {
            let v = pick(&mut rng, &table).unwrap();
            assert!(v == 1 || v == 2 || v == 42);
        }
        let mut max = Maximal;
        assert_eq!(pick(&mut max, &table), Some(42));
        assert_eq!(pick(&mut rng, &Pick::<u32>::Any(Vec::new())), None);
    }

    #[test]
    fn test_recording_forwards_and_records() {
        let mut rec = Recording::new(SeededRandom::from_seed(4));
        let trace = rec.trace();
        let mut plain = SeededRandom::from_seed(4);
        assert_eq!(rec.uniform(10), plain.uniform(10));
        assert_eq!(rec.float(), plain.float());
        let draws = trace.borrow();
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[0], Draw::Uniform { n: 10, .. }));
        assert!(matches!(draws[1], Draw::Float(_)));
    }

    #[test]
    fn test_range_inclusive() {
        let mut rng = SeededRandom::from_seed(5);
        for _ in 0..500 {
            let v = rng.range(3, 6);
            assert!((3..=6).contains(&v));
        }
        assert_eq!(rng.range(9, 2), 9);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = SeededRandom::from_seed(77);
        let mut items: Vec<u32> = (0..20).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}
