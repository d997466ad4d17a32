//! Input generators.
//!
//! A provider fills any index range of the canonical input, and the values
//! depend only on the indices, never on how the input was partitioned.

use std::ops::Range;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Fills an index range of the input sequence.
pub trait DataProvider: Send + Sync {
    /// Writes the values for `range` into `out`, with `out.len() == range.len()`.
    fn fill(&self, range: Range<usize>, out: &mut [i32]);
}

/// Every element is `value`.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub i32);

impl DataProvider for Constant {
    fn fill(&self, _range: Range<usize>, out: &mut [i32]) {
        out.fill(self.0);
    }
}

/// Seeded pseudo random values in `[0, bound)`.
///
/// Backed by a ChaCha stream where element `i` is the `i`-th 32 bit word, so
/// any range can be produced by seeking straight to it.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    seed: u64,
    bound: u32,
}

impl Uniform {
    pub fn new(seed: u64, bound: u32) -> Self {
        Self {
            seed,
            bound: bound.max(1),
        }
    }

    /// Uses the largest bound for which the sum of `elems` values still
    /// fits in an `i32`.
    pub fn for_elems(seed: u64, elems: usize) -> Self {
        let bound = i32::MAX as usize / elems.max(1);
        Self::new(seed, bound as u32)
    }
}

impl DataProvider for Uniform {
    fn fill(&self, range: Range<usize>, out: &mut [i32]) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_word_pos(range.start as u128);

        for x in out.iter_mut() {
            *x = (rng.next_u32() % self.bound) as i32;
        }
    }
}

/// Values computed from their index by a closure.
pub struct FromFn<F>(F);

/// Creates a provider where element `i` is `f(i)`.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: Fn(usize) -> i32 + Send + Sync,
{
    FromFn(f)
}

impl<F> DataProvider for FromFn<F>
where
    F: Fn(usize) -> i32 + Send + Sync,
{
    fn fill(&self, range: Range<usize>, out: &mut [i32]) {
        for (x, i) in out.iter_mut().zip(range) {
            *x = (self.0)(i);
        }
    }
}

/// A fixed input held in memory. Ranges past its end are filled with zeros.
impl DataProvider for Vec<i32> {
    fn fill(&self, range: Range<usize>, out: &mut [i32]) {
        for (x, i) in out.iter_mut().zip(range) {
            *x = self.get(i).copied().unwrap_or_default();
        }
    }
}

/// Serializable choice of input generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSpec {
    Constant { value: i32 },
    Random { seed: u64 },
}

impl InputSpec {
    /// Builds the provider for an input of `elems` elements.
    pub fn build(self, elems: usize) -> Box<dyn DataProvider> {
        match self {
            Self::Constant { value } => Box::new(Constant(value)),
            Self::Random { seed } => Box::new(Uniform::for_elems(seed, elems)),
        }
    }
}

impl Default for InputSpec {
    fn default() -> Self {
        Self::Constant { value: 1 }
    }
}

/// Generates the whole `[0, elems)` input with `provider`.
pub fn materialize(provider: &dyn DataProvider, elems: usize) -> Vec<i32> {
    let mut out = vec![0; elems];
    provider.fill(0..elems, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_ignores_partitioning() {
        let provider = Uniform::new(7, 1000);
        let whole = materialize(&provider, 50);

        let mut left = vec![0; 17];
        let mut right = vec![0; 33];
        provider.fill(0..17, &mut left);
        provider.fill(17..50, &mut right);

        left.extend(right);
        assert_eq!(left, whole);
        assert!(whole.iter().all(|x| (0..1000).contains(x)));
    }

    #[test]
    fn uniform_depends_on_seed() {
        let a = materialize(&Uniform::new(1, u32::MAX), 16);
        let b = materialize(&Uniform::new(2, u32::MAX), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn bound_keeps_total_in_range() {
        let provider = Uniform::for_elems(3, 1 << 20);
        let total: i64 = materialize(&provider, 1 << 20)
            .iter()
            .map(|&x| i64::from(x))
            .sum();
        assert!(total <= i64::from(i32::MAX));
    }

    #[test]
    fn closure_and_vec_providers() {
        let squares = from_fn(|i| (i * i) as i32);
        assert_eq!(materialize(&squares, 4), [0, 1, 4, 9]);

        let fixed = vec![5, 6, 7];
        let mut out = [0; 3];
        fixed.fill(1..4, &mut out);
        assert_eq!(out, [6, 7, 0]);
    }

    #[test]
    fn input_from_json() {
        let spec: InputSpec = serde_json::from_str(r#"{"random":{"seed":42}}"#).unwrap();
        assert_eq!(spec, InputSpec::Random { seed: 42 });
        assert_eq!(materialize(&*InputSpec::default().build(3), 3), [1, 1, 1]);
    }
}
