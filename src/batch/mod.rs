//! The batch engine: folds many small per-entity geometries into a handful
//! of merged geometries, synchronously or on a background worker.

mod engine;
mod group;
mod merge;
mod task;

pub use engine::{BatchEngine, PreMergeFn, PostMergeFn, PreTaskFn};
pub use group::{BatchDesc, BatchGroup};
pub use merge::{create_merged_geometry, split_source_entities};
pub use task::{BatchTask, MergeResult, TaskGroupOutput};
