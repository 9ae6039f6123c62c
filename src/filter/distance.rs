//! Edit distance and pairwise distance matrices.

use std::panic::{catch_unwind, AssertUnwindSafe};

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::error::FilterError;

/// Levenshtein distance between two strings, counted in Unicode scalar values.
///
/// Insertion, deletion, and substitution each cost 1.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    levenshtein_chars(&a, &b)
}

/// Levenshtein distance over pre-split characters.
pub fn levenshtein_chars(a: &[char], b: &[char]) -> usize {
    // Common prefix and suffix never contribute to the distance.
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Keep the shorter string on the inner loop.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = prev[j] + usize::from(lc != sc);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// Symmetric pairwise distance matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    inner: Array2<usize>,
}

impl DistanceMatrix {
    /// Builds the matrix from upper-triangle distances listed in
    /// `(0,1), (0,2), .., (1,2), ..` order.
    fn from_upper_triangle(n: usize, distances: &[usize]) -> Self {
        let mut inner = Array2::zeros((n, n));
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                inner[[i, j]] = distances[k];
                inner[[j, i]] = distances[k];
                k += 1;
            }
        }
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> usize {
        self.inner[[i, j]]
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, usize> {
        self.inner.row(i)
    }
}

/// Every unordered index pair `(i, j)` with `i < j`, in row-major order.
pub fn index_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Fixed-size worker pool for pairwise distance computation.
pub struct DistancePool {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl std::fmt::Debug for DistancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistancePool")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl DistancePool {
    /// Half the logical CPUs, at least one.
    pub fn default_workers() -> usize {
        (num_cpus::get() / 2).max(1)
    }

    pub fn new(num_threads: usize) -> Result<Self, FilterError> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("codelm-distance-{idx}"))
            .build()?;
        Ok(Self { pool, num_threads })
    }

    pub fn with_default_size() -> Result<Self, FilterError> {
        Self::new(Self::default_workers())
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Computes the Levenshtein distance matrix of `texts`.
    pub fn levenshtein_matrix(
        &self,
        task_id: &str,
        texts: &[&str],
    ) -> Result<DistanceMatrix, FilterError> {
        let chars: Vec<Vec<char>> = texts.iter().map(|t| t.chars().collect()).collect();
        self.matrix_with(task_id, &chars, |a, b| levenshtein_chars(a, b))
    }

    /// Computes a distance matrix with an arbitrary pair function.
    ///
    /// Pairs are independent, so they are spread over the pool without shared
    /// state. A panic in any worker fails the whole matrix instead of leaving
    /// holes in it.
    pub fn matrix_with<T, F>(
        &self,
        task_id: &str,
        items: &[T],
        distance: F,
    ) -> Result<DistanceMatrix, FilterError>
    where
        T: Sync,
        F: Fn(&T, &T) -> usize + Sync,
    {
        let n = items.len();
        let pairs = index_pairs(n);

        let computed = catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                pairs
                    .par_iter()
                    .map(|&(i, j)| distance(&items[i], &items[j]))
                    .collect::<Vec<usize>>()
            })
        }));

        let distances = computed.map_err(|payload| FilterError::DistanceWorker {
            task_id: task_id.to_string(),
            message: panic_message(payload.as_ref()),
        })?;

        Ok(DistanceMatrix::from_upper_triangle(n, &distances))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basic() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abcd"), 4);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_levenshtein_counts_characters_not_bytes() {
        assert_eq!(levenshtein("héllo", "hello"), 1);
        assert_eq!(levenshtein("日本", "日本語"), 1);
    }

    #[test]
    fn test_levenshtein_symmetric() {
        let a = "def f(x): return x * 2";
        let b = "def g(y): return y + 2";
        assert_eq!(levenshtein(a, b), levenshtein(b, a));
    }

    #[test]
    fn test_index_pairs() {
        assert!(index_pairs(0).is_empty());
        assert!(index_pairs(1).is_empty());
        assert_eq!(index_pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_matrix_is_symmetric_with_zero_diagonal() {
        let pool = DistancePool::new(2).unwrap();
        let m = pool
            .levenshtein_matrix("t", &["abc", "abd", "xyz", ""])
            .unwrap();

        assert_eq!(m.len(), 4);
        for i in 0..4 {
            assert_eq!(m.get(i, i), 0);
            for j in 0..4 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert_eq!(m.get(0, 1), 1);
        assert_eq!(m.get(0, 2), 3);
        assert_eq!(m.get(3, 2), 3);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let pool = DistancePool::new(2).unwrap();
        let items = vec![1usize, 2, 3];
        let err = pool
            .matrix_with("task-7", &items, |a, b| {
                if *a == 2 && *b == 3 {
                    panic!("bad pair");
                }
                a.abs_diff(*b)
            })
            .unwrap_err();

        match err {
            FilterError::DistanceWorker { task_id, message } => {
                assert_eq!(task_id, "task-7");
                assert!(message.contains("bad pair"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_workers_at_least_one() {
        assert!(DistancePool::default_workers() >= 1);
    }
}
