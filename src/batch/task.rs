//! The background unit of work for multi-frame batch groups.
//!
//! A `BatchTask` owns a snapshot of the [`BatchDesc`]s it must merge and a
//! shared handle to the engine's staging geometry array. It never touches
//! application-side `BatchData` — by the time a task is enqueued, every
//! entity it will read has already been deep-copied into staging by the
//! update thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::error;

use crate::ecs::EntityId;
use crate::geometry::Geometry;
use crate::recycle_list::SlotId;
use crate::thread_pool::{Task, TaskState};

use super::group::BatchDesc;
use super::merge;

/// One merged entity's worth of output: the geometry and the ordered
/// partition of source entity ids folded into it, reported to `PostMerge`.
pub struct MergeResult {
    pub source_entity_ids: Vec<EntityId>,
    pub geometry: Geometry,
}

/// One rebuilt group's full output.
pub struct TaskGroupOutput {
    pub group_uid: u64,
    pub group_id: SlotId,
    pub merges: Vec<MergeResult>,
}

pub struct BatchTask {
    state: TaskState,
    descs: Vec<BatchDesc>,
    staging: Arc<Mutex<HashMap<EntityId, Geometry>>>,
    output: Mutex<Vec<TaskGroupOutput>>,
}

impl BatchTask {
    pub fn new(descs: Vec<BatchDesc>, staging: Arc<Mutex<HashMap<EntityId, Geometry>>>) -> Self {
        Self {
            state: TaskState::new(),
            descs,
            staging,
            output: Mutex::new(Vec::new()),
        }
    }

    /// Drains this task's output. Meant to be called exactly once, after
    /// `is_finished()`, by the engine reclaiming the previous frame's task.
    pub fn take_output(&self) -> Vec<TaskGroupOutput> {
        let mut guard = self.output.lock().expect("batch task output poisoned");
        std::mem::take(&mut *guard)
    }
}

impl Task for BatchTask {
    fn process(&self) {
        self.state.mark_started();

        let staging = self.staging.lock().expect("batch staging poisoned");
        let mut results = Vec::with_capacity(self.descs.len());

        for desc in &self.descs {
            let sources: Vec<(EntityId, &Geometry)> = desc
                .list_ents_curr
                .iter()
                .filter_map(|id| staging.get(id).map(|geometry| (*id, geometry)))
                .collect();

            let vertex0_block_size = desc.buffer_layout.vertex_block_size(0);
            let index_block_size = desc.buffer_layout.index_block_size();

            let sublists = match merge::split_source_entities(&sources, vertex0_block_size, index_block_size) {
                Ok(sublists) => sublists,
                Err(err) => {
                    error!(
                        "batch group {} (uid {}) failed to split on worker: {err}",
                        desc.group_id, desc.group_uid
                    );
                    continue;
                }
            };

            let mut merges = Vec::with_capacity(sublists.len());
            for sublist in sublists {
                let sublist_sources: Vec<&Geometry> = sublist.iter().filter_map(|id| staging.get(id)).collect();
                let mut geometry = Geometry::new(
                    desc.buffer_layout.vertex_stream_count(),
                    desc.buffer_layout.is_indexed(),
                    false,
                );
                merge::create_merged_geometry(&desc.buffer_layout, &sublist_sources, &mut geometry);
                merges.push(MergeResult {
                    source_entity_ids: sublist,
                    geometry,
                });
            }

            results.push(TaskGroupOutput {
                group_uid: desc.group_uid,
                group_id: desc.group_id,
                merges,
            });
        }
        drop(staging);

        *self.output.lock().expect("batch task output poisoned") = results;
        self.state.mark_finished();
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }

    fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    fn wait(&self) {
        self.state.wait();
    }
}
