//! Agreement-based filtering of sampled generations.
//!
//! Many generations are sampled per task; this module reduces each task's
//! samples to a fixed-size subset of the ones that agree most with their
//! peers, a cheap stand-in for self-consistency voting when no evaluator is
//! available.
//!
//! # Usage
//!
//! ```rust,ignore
//! use codelm_forge::filter::DiversityFilterBuilder;
//! use codelm_forge::records::group_by_task;
//!
//! let filter = DiversityFilterBuilder::new().keep(200).threshold_ratio(0.1).build()?;
//! for outcome in filter.filter_all(group_by_task(samples))? {
//!     println!("{}: kept {} of {}", outcome.task_id, outcome.kept.len(), outcome.total_before);
//! }
//! ```

pub mod distance;
pub mod diversity;

pub use distance::{index_pairs, levenshtein, DistanceMatrix, DistancePool};
pub use diversity::{
    agreement_scores, select_top, DiversityFilter, DiversityFilterBuilder, FilterOutcome,
    DEFAULT_KEEP, DEFAULT_THRESHOLD_RATIO,
};
