//! Agreement-based selection of sampled generations.
//!
//! Generations that sit close to many of their peers (by edit distance,
//! relative to their own length) are treated as the consensus answer for a
//! task. Each task group is cut down to a fixed number of the
//! highest-agreement samples.

use std::sync::Arc;

use tracing::{debug, info};

use super::distance::{DistanceMatrix, DistancePool};
use crate::error::FilterError;
use crate::records::{GenerationSample, TaskGroup};

/// Default number of samples kept per task.
pub const DEFAULT_KEEP: usize = 200;

/// Default fraction of a generation's length under which a peer counts as agreeing.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.1;

/// Result of filtering one task group.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub task_id: String,
    pub total_before: usize,
    /// Survivors in selection order (ascending agreement score).
    pub kept: Vec<GenerationSample>,
    /// Agreement score per input sample, `None` when the group was passed through.
    pub scores: Option<Vec<usize>>,
}

impl FilterOutcome {
    pub fn was_filtered(&self) -> bool {
        self.scores.is_some()
    }

    pub fn removed(&self) -> usize {
        self.total_before - self.kept.len()
    }
}

/// Agreement score of every sample.
///
/// Sample `i` scores the number of samples `j` (itself included) with
/// `distance(i, j) < max(1, len_i) * threshold_ratio`, where `len_i` is the
/// character length of generation `i`.
pub fn agreement_scores(
    matrix: &DistanceMatrix,
    lengths: &[usize],
    threshold_ratio: f64,
) -> Vec<usize> {
    (0..matrix.len())
        .map(|i| {
            let threshold = lengths[i].max(1) as f64 * threshold_ratio;
            matrix
                .row(i)
                .iter()
                .filter(|&&d| (d as f64) < threshold)
                .count()
        })
        .collect()
}

/// Indices of the `keep` highest scores.
///
/// Indices are stably sorted by ascending score and the last `keep` are
/// returned in that order, so among equal scores the higher index wins the
/// last slot.
pub fn select_top(scores: &[usize], keep: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by_key(|&i| scores[i]);
    let start = order.len().saturating_sub(keep);
    order.split_off(start)
}

/// Reduces task groups to their highest-agreement samples.
#[derive(Debug, Clone)]
pub struct DiversityFilter {
    keep: usize,
    threshold_ratio: f64,
    pool: Arc<DistancePool>,
}

impl DiversityFilter {
    /// Creates a filter backed by a pool of half the available CPUs.
    pub fn new(keep: usize, threshold_ratio: f64) -> Result<Self, FilterError> {
        DiversityFilterBuilder::new()
            .keep(keep)
            .threshold_ratio(threshold_ratio)
            .build()
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn threshold_ratio(&self) -> f64 {
        self.threshold_ratio
    }

    pub fn workers(&self) -> usize {
        self.pool.num_threads()
    }

    /// Filters one task group.
    ///
    /// Groups no larger than `keep` are returned unchanged without computing
    /// any distances.
    pub fn filter_group(&self, group: TaskGroup) -> Result<FilterOutcome, FilterError> {
        let total_before = group.len();
        if total_before <= self.keep {
            debug!(
                task_id = %group.task_id,
                samples = total_before,
                keep = self.keep,
                "Group within budget, passing through"
            );
            return Ok(FilterOutcome {
                task_id: group.task_id,
                total_before,
                kept: group.samples,
                scores: None,
            });
        }

        let texts: Vec<&str> = group
            .samples
            .iter()
            .map(|s| s.generation.as_str())
            .collect();
        let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();

        let matrix = self.pool.levenshtein_matrix(&group.task_id, &texts)?;
        let scores = agreement_scores(&matrix, &lengths, self.threshold_ratio);
        let selected = select_top(&scores, self.keep);

        let mut slots: Vec<Option<GenerationSample>> =
            group.samples.into_iter().map(Some).collect();
        let kept: Vec<GenerationSample> = selected
            .iter()
            .filter_map(|&i| slots[i].take())
            .collect();

        debug!(
            task_id = %group.task_id,
            before = total_before,
            after = kept.len(),
            "Filtered task group"
        );

        Ok(FilterOutcome {
            task_id: group.task_id,
            total_before,
            kept,
            scores: Some(scores),
        })
    }

    /// Filters groups one after another, in the order given.
    ///
    /// The first failing group aborts the pass.
    pub fn filter_all(&self, groups: Vec<TaskGroup>) -> Result<Vec<FilterOutcome>, FilterError> {
        let total = groups.len();
        let mut outcomes = Vec::with_capacity(total);

        for (idx, group) in groups.into_iter().enumerate() {
            let outcome = self.filter_group(group)?;
            if outcome.was_filtered() {
                info!(
                    task_id = %outcome.task_id,
                    index = idx + 1,
                    total = total,
                    before = outcome.total_before,
                    kept = outcome.kept.len(),
                    "Filtered task"
                );
            }
            outcomes.push(outcome);
        }

        let kept: usize = outcomes.iter().map(|o| o.kept.len()).sum();
        info!(tasks = total, kept = kept, "Filtering complete");
        Ok(outcomes)
    }
}

/// Builder for a [`DiversityFilter`].
#[derive(Debug, Clone)]
pub struct DiversityFilterBuilder {
    keep: usize,
    threshold_ratio: f64,
    workers: Option<usize>,
    pool: Option<Arc<DistancePool>>,
}

impl Default for DiversityFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiversityFilterBuilder {
    pub fn new() -> Self {
        Self {
            keep: DEFAULT_KEEP,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            workers: None,
            pool: None,
        }
    }

    pub fn keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn threshold_ratio(mut self, ratio: f64) -> Self {
        self.threshold_ratio = ratio;
        self
    }

    /// Sets the distance pool size. Defaults to half the available CPUs.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Reuses an existing pool instead of building one.
    pub fn pool(mut self, pool: Arc<DistancePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<DiversityFilter, FilterError> {
        if self.keep == 0 {
            return Err(FilterError::InvalidKeep(self.keep));
        }
        if !self.threshold_ratio.is_finite() || self.threshold_ratio <= 0.0 {
            return Err(FilterError::InvalidThresholdRatio(self.threshold_ratio));
        }

        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(DistancePool::new(
                self.workers.unwrap_or_else(DistancePool::default_workers),
            )?),
        };

        Ok(DiversityFilter {
            keep: self.keep,
            threshold_ratio: self.threshold_ratio,
            pool,
        })
    }
}
