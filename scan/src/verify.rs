//! Sequential baselines to check parallel results against.

use std::fmt;

use crate::{
    error::{Result, ScanErr},
    partition::WorkerPartition,
};

/// The first position where a parallel result left the sequential baseline.
///
/// `None` on either side means that side ended before `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: Option<i64>,
    pub got: Option<i64>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map_or_else(|| "<missing>".to_string(), |v| v.to_string());
        write!(
            f,
            "error at position {}, true prefix sum: {}, computed prefix sum: {}",
            self.index,
            show(self.expected),
            show(self.got)
        )
    }
}

/// Outcome of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub mismatch: Option<Mismatch>,
}

impl Verification {
    fn from_mismatch(mismatch: Option<Mismatch>) -> Self {
        Self {
            valid: mismatch.is_none(),
            mismatch,
        }
    }

    pub fn first_mismatch_index(&self) -> Option<usize> {
        self.mismatch.map(|m| m.index)
    }

    /// Turns a failed verification into `ScanErr::Mismatch`.
    pub fn into_result(self) -> Result<()> {
        match self.mismatch {
            Some(mismatch) => Err(ScanErr::Mismatch(mismatch)),
            None => Ok(()),
        }
    }
}

/// Sequential inclusive prefix sum of `input`.
pub fn sequential_scan(input: &[i32]) -> Vec<i64> {
    input
        .iter()
        .scan(0i64, |acc, &x| {
            *acc += i64::from(x);
            Some(*acc)
        })
        .collect()
}

/// Compares `output` with the sequential scan of `input`.
pub fn verify_scan(input: &[i32], output: &[i64]) -> Verification {
    let expected = sequential_scan(input);
    Verification::from_mismatch(first_difference(&expected, output, 0))
}

/// Compares one worker's corrected scan with the matching slice of the
/// sequential scan of the whole `input`.
pub fn verify_partition(
    input: &[i32],
    partition: &WorkerPartition,
    output: &[i64],
) -> Verification {
    let prefix = &input[..partition.end.min(input.len())];
    let expected = sequential_scan(prefix);
    let expected = expected.get(partition.start..).unwrap_or_default();

    Verification::from_mismatch(first_difference(expected, output, partition.start))
}

/// Compares `sum` with the sequential sum of `input`.
///
/// A wrong sum is reported at the last index, where the total would sit in
/// the prefix sum.
pub fn verify_sum(input: &[i32], sum: i64) -> Verification {
    let expected = input.iter().map(|&x| i64::from(x)).sum::<i64>();

    let mismatch = (expected != sum).then(|| Mismatch {
        index: input.len().saturating_sub(1),
        expected: Some(expected),
        got: Some(sum),
    });

    Verification::from_mismatch(mismatch)
}

fn first_difference(expected: &[i64], got: &[i64], offset: usize) -> Option<Mismatch> {
    let len = expected.len().max(got.len());

    (0..len)
        .map(|i| (i, expected.get(i).copied(), got.get(i).copied()))
        .find(|(_, e, g)| e != g)
        .map(|(i, expected, got)| Mismatch {
            index: offset + i,
            expected,
            got,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreeing_scan_is_valid() {
        let input = [1, 2, 3];
        let v = verify_scan(&input, &[1, 3, 6]);
        assert!(v.valid);
        assert_eq!(v.first_mismatch_index(), None);
        assert!(v.into_result().is_ok());
    }

    #[test]
    fn reports_first_bad_index() {
        let input = [1, 2, 3, 4];
        let v = verify_scan(&input, &[1, 3, 7, 11]);
        assert!(!v.valid);
        assert_eq!(
            v.mismatch,
            Some(Mismatch {
                index: 2,
                expected: Some(6),
                got: Some(7)
            })
        );

        let err = v.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn short_output_is_a_mismatch() {
        let v = verify_scan(&[1, 1, 1], &[1, 2]);
        assert_eq!(v.first_mismatch_index(), Some(2));
        assert_eq!(v.mismatch.unwrap().got, None);
    }

    #[test]
    fn partition_slice() {
        let input = [1, 2, 3, 4, 5];
        let part = WorkerPartition {
            rank: 1,
            start: 2,
            end: 4,
            count: 2,
        };

        assert!(verify_partition(&input, &part, &[6, 10]).valid);
        assert_eq!(
            verify_partition(&input, &part, &[6, 9]).first_mismatch_index(),
            Some(3)
        );
    }

    #[test]
    fn sum() {
        assert!(verify_sum(&[], 0).valid);
        assert!(verify_sum(&[4, 5], 9).valid);
        assert!(!verify_sum(&[4, 5], 10).valid);
    }
}
