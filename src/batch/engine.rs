//! Public entry point for the batch engine: registration, removal, and the
//! per-frame `update` that drives both the single-frame and multi-frame
//! merge paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::buffer_layout::BufferLayout;
use crate::diff::sorted_set_difference;
use crate::ecs::{ComponentStore, EntityAllocator, EntityId};
use crate::error::DrawResult;
use crate::geometry::Geometry;
use crate::recycle_list::{RecycleIndexList, SlotId};
use crate::render_data::{Batch, BatchData, DrawStageSet, RenderData, Transparency, UpdatePriority};
use crate::sort_key::SortKey;
use crate::thread_pool::{Task, ThreadPool};
use crate::uniform::UniformList;

use super::group::{BatchDesc, BatchGroup};
use super::merge;
use super::task::BatchTask;

pub type PreMergeFn = Box<dyn Fn(SlotId, Vec<EntityId>) -> Vec<EntityId> + Send + Sync>;
pub type PostMergeFn = Box<dyn Fn(SlotId, &[EntityId], &[Vec<EntityId>]) + Send + Sync>;
pub type PreTaskFn = Box<dyn Fn() + Send + Sync>;

pub struct BatchEngine {
    groups: RecycleIndexList<BatchGroup>,
    next_uid: u64,
    staging: Arc<Mutex<HashMap<EntityId, Geometry>>>,
    in_flight: Option<Arc<BatchTask>>,
    pre_merge: Option<PreMergeFn>,
    post_merge: Option<PostMergeFn>,
    pre_task: Option<PreTaskFn>,
}

impl Default for BatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchEngine {
    pub fn new() -> Self {
        Self {
            groups: RecycleIndexList::with_sentinel(BatchGroup::sentinel()),
            next_uid: 1,
            staging: Arc::new(Mutex::new(HashMap::new())),
            in_flight: None,
            pre_merge: None,
            post_merge: None,
            pre_task: None,
        }
    }

    pub fn set_pre_merge(&mut self, callback: PreMergeFn) {
        self.pre_merge = Some(callback);
    }

    pub fn set_post_merge(&mut self, callback: PostMergeFn) {
        self.post_merge = Some(callback);
    }

    pub fn set_pre_task(&mut self, callback: PreTaskFn) {
        self.pre_task = Some(callback);
    }

    /// Validates that the batch's `BufferLayout` agrees on block vertex
    /// capacity across streams, then allocates a new group with a fresh uid.
    pub fn register_batch(&mut self, batch: Batch) -> DrawResult<SlotId> {
        batch.buffer_layout.validate_uniform_block_vertex_capacity()?;
        let uid = self.next_uid;
        self.next_uid += 1;
        Ok(self.groups.add(BatchGroup::new(uid, batch)))
    }

    /// Destroys every merged entity owned by `id` and releases the group.
    pub fn remove_batch(
        &mut self,
        id: SlotId,
        entity_allocator: &mut dyn EntityAllocator,
        render_data: &mut dyn ComponentStore<RenderData>,
    ) {
        if let Some(group) = self.groups.remove(id) {
            for merged_entity in group.merged_ents {
                render_data.remove(merged_entity);
                entity_allocator.remove_entity(merged_entity);
            }
        }
    }

    pub fn get_batch_entities(&self, id: SlotId) -> &[EntityId] {
        self.groups.get(id).map(|group| group.merged_ents.as_slice()).unwrap_or(&[])
    }

    /// Blocks the caller until the in-flight multi-frame task finishes, if
    /// one is outstanding. The only blocking point in normal operation —
    /// used by deterministic tests and shutdown, never by the per-frame
    /// path itself.
    pub fn wait_on_multi_frame_batch(&self) {
        if let Some(task) = &self.in_flight {
            task.wait();
        }
    }

    /// Runs one frame of the batch engine: rebuilds `list_ents_curr` for
    /// every group from the current `BatchData` population, reclaims the
    /// previous multi-frame task's output, processes single-frame groups
    /// synchronously, and enqueues a new multi-frame task if any multi-frame
    /// group needs rebuilding and the worker is free.
    pub fn update(
        &mut self,
        entity_allocator: &mut dyn EntityAllocator,
        batch_data: &mut dyn ComponentStore<BatchData>,
        render_data: &mut dyn ComponentStore<RenderData>,
        pool: &ThreadPool,
    ) -> DrawResult<()> {
        for (id, group) in self.groups.iter_mut() {
            if id == 0 {
                continue;
            }
            group.list_ents_curr.clear();
            group.list_ents_upd.clear();
            group.rebuild = false;
        }

        for entity_id in batch_data.entity_ids_ascending() {
            let group_id = match batch_data.get(entity_id) {
                Some(bd) => bd.group_id(),
                None => continue,
            };
            if group_id == 0 {
                continue;
            }
            let rebuild_flagged = batch_data.get(entity_id).map(|bd| bd.rebuild()).unwrap_or(false);
            if let Some(group) = self.groups.get_mut(group_id) {
                group.list_ents_curr.push(entity_id);
                if rebuild_flagged {
                    group.rebuild = true;
                    group.list_ents_upd.push(entity_id);
                }
            }
        }

        self.reclaim_finished_task(entity_allocator, render_data);

        let mut single_frame_ids = Vec::new();
        let mut multi_frame_ids = Vec::new();
        for (id, group) in self.groups.iter() {
            if id == 0 {
                continue;
            }
            match group.batch.update_priority {
                UpdatePriority::SingleFrame => single_frame_ids.push(id),
                UpdatePriority::MultiFrame => multi_frame_ids.push(id),
            }
        }

        for id in single_frame_ids {
            self.update_single_frame_group(id, entity_allocator, batch_data, render_data)?;
        }

        self.enqueue_multi_frame_task(&multi_frame_ids, batch_data, pool);

        Ok(())
    }

    fn group_needs_rebuild(&self, id: SlotId) -> bool {
        let group = &self.groups[id];
        if group.rebuild {
            return true;
        }
        !sorted_set_difference(&group.list_ents_prev, &group.list_ents_curr).is_empty()
    }

    fn update_single_frame_group(
        &mut self,
        id: SlotId,
        entity_allocator: &mut dyn EntityAllocator,
        batch_data: &mut dyn ComponentStore<BatchData>,
        render_data: &mut dyn ComponentStore<RenderData>,
    ) -> DrawResult<()> {
        if !self.group_needs_rebuild(id) {
            return Ok(());
        }

        let (buffer_layout, transparency, sort_key_template, uniforms, draw_stages) = {
            let group = &self.groups[id];
            (
                group.batch.buffer_layout.clone(),
                group.batch.transparency,
                group.batch.sort_key_template,
                group.batch.uniforms.clone(),
                group.batch.draw_stages.clone(),
            )
        };

        let source_ids = self.groups[id].list_ents_curr.clone();
        let ordered_ids = match &self.pre_merge {
            Some(callback) => callback(id, source_ids),
            None => source_ids,
        };

        let geometry_refs: Vec<(EntityId, &Geometry)> = ordered_ids
            .iter()
            .filter_map(|&entity_id| batch_data.get(entity_id).map(|bd| (entity_id, bd.geometry())))
            .collect();

        let vertex0_block_size = buffer_layout.vertex_block_size(0);
        let index_block_size = buffer_layout.index_block_size();
        let sublists = merge::split_source_entities(&geometry_refs, vertex0_block_size, index_block_size)?;

        self.resize_merged_entities(
            id,
            sublists.len(),
            entity_allocator,
            render_data,
            &buffer_layout,
            sort_key_template,
            &uniforms,
            &draw_stages,
            transparency,
        );

        let merged_ent_ids = self.groups[id].merged_ents.clone();
        let mut partition = Vec::with_capacity(sublists.len());
        for (merged_entity, sublist) in merged_ent_ids.iter().zip(sublists.into_iter()) {
            let sublist_sources: Vec<&Geometry> =
                sublist.iter().filter_map(|entity_id| batch_data.get(*entity_id).map(|bd| bd.geometry())).collect();
            if let Some(rd) = render_data.get_mut(*merged_entity) {
                merge::create_merged_geometry(&buffer_layout, &sublist_sources, rd.geometry_mut());
            }
            partition.push(sublist);
        }

        if let Some(callback) = &self.post_merge {
            callback(id, &merged_ent_ids, &partition);
        }

        for &entity_id in &ordered_ids {
            if let Some(bd) = batch_data.get_mut(entity_id) {
                bd.set_rebuild(false);
                bd.geometry_mut().clear_updates();
            }
        }

        let group = &mut self.groups[id];
        group.list_ents_prev = group.list_ents_curr.clone();
        group.rebuild = false;

        Ok(())
    }

    fn enqueue_multi_frame_task(
        &mut self,
        multi_frame_ids: &[SlotId],
        batch_data: &mut dyn ComponentStore<BatchData>,
        pool: &ThreadPool,
    ) {
        if self.in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let rebuilding_ids: Vec<SlotId> = multi_frame_ids.iter().copied().filter(|&id| self.group_needs_rebuild(id)).collect();
        if rebuilding_ids.is_empty() {
            return;
        }

        {
            let mut staging = self.staging.lock().expect("batch staging poisoned");
            for &id in multi_frame_ids {
                let group = &self.groups[id];
                for removed_id in sorted_set_difference(&group.list_ents_prev, &group.list_ents_curr) {
                    staging.remove(&removed_id);
                }
            }
            for &id in &rebuilding_ids {
                let upd = self.groups[id].list_ents_upd.clone();
                for entity_id in upd {
                    if let Some(bd) = batch_data.get_mut(entity_id) {
                        staging.insert(entity_id, bd.geometry().clone());
                        bd.set_rebuild(false);
                        bd.geometry_mut().clear_updates();
                    }
                }
            }
        }

        let descs: Vec<BatchDesc> = rebuilding_ids
            .iter()
            .map(|&id| {
                let group = &self.groups[id];
                BatchDesc {
                    group_uid: group.uid,
                    group_id: id,
                    buffer_layout: group.batch.buffer_layout.clone(),
                    list_ents_curr: group.list_ents_curr.clone(),
                }
            })
            .collect();

        if let Some(callback) = &self.pre_task {
            callback();
        }

        let task = Arc::new(BatchTask::new(descs, self.staging.clone()));
        pool.push_back(task.clone());
        self.in_flight = Some(task);
    }

    fn reclaim_finished_task(
        &mut self,
        entity_allocator: &mut dyn EntityAllocator,
        render_data: &mut dyn ComponentStore<RenderData>,
    ) {
        let finished = match &self.in_flight {
            Some(task) => task.is_finished(),
            None => false,
        };
        if !finished {
            return;
        }
        let task = self.in_flight.take().expect("checked above");
        let outputs = task.take_output();

        for group_output in outputs {
            let matches_live_group = self
                .groups
                .get(group_output.group_id)
                .is_some_and(|group| group.uid == group_output.group_uid);
            if !matches_live_group {
                // The group was removed (and possibly its slot reused by a
                // fresh registration) while the task was in flight.
                continue;
            }

            let (buffer_layout, sort_key_template, uniforms, draw_stages, transparency) = {
                let group = &self.groups[group_output.group_id];
                (
                    group.batch.buffer_layout.clone(),
                    group.batch.sort_key_template,
                    group.batch.uniforms.clone(),
                    group.batch.draw_stages.clone(),
                    group.batch.transparency,
                )
            };

            self.resize_merged_entities(
                group_output.group_id,
                group_output.merges.len(),
                entity_allocator,
                render_data,
                &buffer_layout,
                sort_key_template,
                &uniforms,
                &draw_stages,
                transparency,
            );

            let merged_ent_ids = self.groups[group_output.group_id].merged_ents.clone();
            let mut partition = Vec::with_capacity(merged_ent_ids.len());
            for (merged_entity, merge_result) in merged_ent_ids.iter().zip(group_output.merges.into_iter()) {
                if let Some(rd) = render_data.get_mut(*merged_entity) {
                    *rd.geometry_mut() = merge_result.geometry;
                    rd.geometry_mut().mark_all_updated();
                }
                partition.push(merge_result.source_entity_ids);
            }

            if let Some(callback) = &self.post_merge {
                callback(group_output.group_id, &merged_ent_ids, &partition);
            }

            let group = &mut self.groups[group_output.group_id];
            group.list_ents_prev = group.list_ents_curr.clone();
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resize_merged_entities(
        &mut self,
        id: SlotId,
        target_len: usize,
        entity_allocator: &mut dyn EntityAllocator,
        render_data: &mut dyn ComponentStore<RenderData>,
        buffer_layout: &Arc<BufferLayout>,
        sort_key_template: SortKey,
        uniforms: &UniformList,
        draw_stages: &DrawStageSet,
        transparency: Transparency,
    ) {
        let group = &mut self.groups[id];
        while group.merged_ents.len() > target_len {
            if let Some(entity) = group.merged_ents.pop() {
                render_data.remove(entity);
                entity_allocator.remove_entity(entity);
            }
        }
        while group.merged_ents.len() < target_len {
            let entity = entity_allocator.create_entity();
            let rd = RenderData::new(
                sort_key_template,
                buffer_layout.clone(),
                uniforms.clone(),
                draw_stages.clone(),
                transparency,
                false,
            );
            render_data.insert(entity, rd);
            group.merged_ents.push(entity);
        }
    }
}
