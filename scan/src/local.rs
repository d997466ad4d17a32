//! Per-worker kernels. Each one only ever touches the slice it is handed.

use crate::error::{Result, ScanErr};

/// Inclusive running sum in place.
///
/// # Returns
/// The last value of the scan, i.e. the slice total, or 0 for an empty slice.
pub fn local_scan(buf: &mut [i64]) -> i64 {
    let mut acc = 0;
    for x in buf.iter_mut() {
        acc += *x;
        *x = acc;
    }

    acc
}

/// Adds `carry` to every element of `buf`.
pub fn apply_carry(buf: &mut [i64], carry: i64) {
    if carry != 0 {
        buf.iter_mut().for_each(|x| *x += carry);
    }
}

/// Widens `input` into `buf`, which must have the same length.
pub fn load(input: &[i32], buf: &mut [i64]) {
    debug_assert_eq!(input.len(), buf.len());

    buf.iter_mut()
        .zip(input)
        .for_each(|(dst, src)| *dst = i64::from(*src));
}

/// Sum of `input` in a 64 bit accumulator.
pub fn local_sum(input: &[i32]) -> i64 {
    input.iter().map(|&x| i64::from(x)).sum()
}

/// Allocates a zeroed buffer of `len` elements for `rank` without aborting
/// the process when memory runs out.
pub fn try_alloc<T: Default + Clone>(rank: usize, len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|source| ScanErr::Alloc {
            rank,
            elems: len,
            source,
        })?;

    buf.resize(len, T::default());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_in_place() {
        let mut buf = [1, 2, 3, 4];
        assert_eq!(local_scan(&mut buf), 10);
        assert_eq!(buf, [1, 3, 6, 10]);
    }

    #[test]
    fn empty_scan_total_is_zero() {
        let mut buf: [i64; 0] = [];
        assert_eq!(local_scan(&mut buf), 0);
    }

    #[test]
    fn carry_is_added_everywhere() {
        let mut buf = [1, 3, 6];
        apply_carry(&mut buf, 10);
        assert_eq!(buf, [11, 13, 16]);
    }

    #[test]
    fn sum_does_not_overflow_i32() {
        let input = [i32::MAX, i32::MAX, 2];
        assert_eq!(local_sum(&input), 2 * i64::from(i32::MAX) + 2);
    }

    #[test]
    fn impossible_allocation_is_reported() {
        let err = try_alloc::<i64>(3, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, ScanErr::Alloc { rank: 3, .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
