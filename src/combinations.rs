use crate::error::{AnalysisError, AnalysisResult};

/// Lazy lexicographic enumeration of every `k`-subset of `0..n`.
///
/// Subsets are yielded as ascending index vectors, so mapping them back onto
/// an ordered symbol list preserves the list's relative order. The order is
/// `[0,1,2], [0,1,3], ..., [n-3,n-2,n-1]` and is stable across runs.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> AnalysisResult<Self> {
        if k == 0 || k > n {
            return Err(AnalysisError::InvalidSize {
                set_size: k,
                asset_count: n,
            });
        }
        Ok(Self {
            n,
            indices: (0..k).collect(),
            done: false,
        })
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        // Advance: find the rightmost index that can still move right.
        let k = self.indices.len();
        match (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }

        Some(current)
    }
}

/// `C(n, k)`, or `None` if it does not fit in a `u128`.
pub fn count_combinations(n: usize, k: usize) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // acc * (n - i) is always divisible by (i + 1) at this point.
        acc = acc.checked_mul((n - i) as u128)? / (i as u128 + 1);
    }
    Some(acc)
}

/// Validates `set_size` against `asset_count` and the enumeration ceiling,
/// returning the number of subsets to evaluate.
pub fn checked_combination_count(asset_count: usize, set_size: usize, ceiling: u64) -> AnalysisResult<u64> {
    if set_size == 0 || set_size > asset_count {
        return Err(AnalysisError::InvalidSize {
            set_size,
            asset_count,
        });
    }
    let count = count_combinations(asset_count, set_size);
    match count {
        Some(c) if c <= ceiling as u128 => Ok(c as u64),
        _ => Err(AnalysisError::CombinationLimitExceeded {
            asset_count,
            set_size,
            count,
            ceiling,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lexicographic_order() {
        let all: Vec<Vec<usize>> = Combinations::new(4, 2).unwrap().collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
            ]
        );
    }

    #[test]
    fn test_counts_and_uniqueness() {
        for n in 1..=9 {
            for k in 1..=n {
                let all: Vec<Vec<usize>> = Combinations::new(n, k).unwrap().collect();
                assert_eq!(all.len() as u128, count_combinations(n, k).unwrap(), "C({}, {})", n, k);
                assert!(all.iter().all(|s| s.len() == k));
                assert!(all.iter().all(|s| s.windows(2).all(|w| w[0] < w[1])));
                let unique: HashSet<&Vec<usize>> = all.iter().collect();
                assert_eq!(unique.len(), all.len());
            }
        }
    }

    #[test]
    fn test_full_set_yields_single_subset() {
        let all: Vec<Vec<usize>> = Combinations::new(5, 5).unwrap().collect();
        assert_eq!(all, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[test]
    fn test_restartable() {
        let a: Vec<_> = Combinations::new(6, 3).unwrap().collect();
        let b: Vec<_> = Combinations::new(6, 3).unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            Combinations::new(3, 0),
            Err(AnalysisError::InvalidSize { set_size: 0, asset_count: 3 })
        ));
        assert!(matches!(
            Combinations::new(3, 4),
            Err(AnalysisError::InvalidSize { set_size: 4, asset_count: 3 })
        ));
    }

    #[test]
    fn test_count_combinations_known_values() {
        assert_eq!(count_combinations(5, 2), Some(10));
        assert_eq!(count_combinations(30, 10), Some(30_045_015));
        assert_eq!(count_combinations(52, 5), Some(2_598_960));
        assert_eq!(count_combinations(3, 4), Some(0));
        assert_eq!(count_combinations(10_000, 5_000), None);
    }

    #[test]
    fn test_ceiling_is_enforced() {
        assert_eq!(checked_combination_count(10, 3, 120).unwrap(), 120);
        let err = checked_combination_count(10, 3, 119).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::CombinationLimitExceeded { count: Some(120), ceiling: 119, .. }
        ));
        let err = checked_combination_count(10_000, 5_000, u64::MAX).unwrap_err();
        assert!(matches!(err, AnalysisError::CombinationLimitExceeded { count: None, .. }));
    }
}
