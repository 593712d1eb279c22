//! The draw-stage dependency graph: dual-list registration of stages plus a
//! topologically sorted render order recomputed on every `sync`.

use std::collections::{HashMap, VecDeque};

use crate::recycle_list::SlotId;

use super::draw_stage::SharedDrawStage;
use super::resource_list::DualResourceList;

pub struct DrawStageGraph {
    stages: DualResourceList<SharedDrawStage>,
    edges_async: Vec<(SlotId, SlotId)>,
    edges_sync: Vec<(SlotId, SlotId)>,
    topo_order: Vec<SlotId>,
}

impl DrawStageGraph {
    pub fn new(sentinel: SharedDrawStage) -> Self {
        Self {
            stages: DualResourceList::new(sentinel),
            edges_async: Vec::new(),
            edges_sync: Vec::new(),
            topo_order: Vec::new(),
        }
    }

    pub fn register_draw_stage(&mut self, stage: SharedDrawStage) -> SlotId {
        self.stages.register(stage)
    }

    pub fn remove_draw_stage(&mut self, id: SlotId) {
        self.stages.remove(id);
        self.edges_async.retain(|&(from, to)| from != id && to != id);
    }

    /// `from` must render before `to`.
    pub fn add_dependency(&mut self, from: SlotId, to: SlotId) {
        if !self.edges_async.contains(&(from, to)) {
            self.edges_async.push((from, to));
        }
    }

    pub fn remove_dependency(&mut self, from: SlotId, to: SlotId) {
        self.edges_async.retain(|&edge| edge != (from, to));
    }

    pub fn sync(&mut self, on_remove: impl FnMut(&SharedDrawStage), on_add: impl FnMut(&SharedDrawStage)) {
        self.stages.sync(on_remove, on_add);
        self.edges_sync = self.edges_async.clone();
        let occupied = self.stages.occupied_ids();
        self.topo_order = topological_sort(&occupied, &self.edges_sync);
    }

    pub fn topo_order(&self) -> &[SlotId] {
        &self.topo_order
    }

    pub fn stage(&self, id: SlotId) -> &SharedDrawStage {
        self.stages.get_sync(id)
    }

    /// Resets every currently registered stage's private state, then
    /// clears the graph itself. Intended for GPU-context loss.
    pub fn reset(&mut self) {
        for id in self.stages.occupied_ids() {
            if id != 0 {
                self.stages.get_sync(id).reset();
            }
        }
        self.stages.reset();
        self.edges_async.clear();
        self.edges_sync.clear();
        self.topo_order.clear();
    }
}

/// Kahn's algorithm over the occupied (non-sentinel) stage ids. Ties are
/// broken by ascending id for determinism. A cycle simply leaves the
/// participating ids out of the result — best effort, no error surfaced.
fn topological_sort(occupied_ids: &[SlotId], edges: &[(SlotId, SlotId)]) -> Vec<SlotId> {
    let ids: Vec<SlotId> = occupied_ids.iter().copied().filter(|&id| id != 0).collect();
    let mut in_degree: HashMap<SlotId, u32> = ids.iter().map(|&id| (id, 0)).collect();
    let mut adjacency: HashMap<SlotId, Vec<SlotId>> = HashMap::new();

    for &(from, to) in edges {
        if from == 0 || to == 0 || !in_degree.contains_key(&from) || !in_degree.contains_key(&to) {
            continue;
        }
        adjacency.entry(from).or_default().push(to);
        *in_degree.get_mut(&to).expect("checked above") += 1;
    }

    let mut ready: Vec<SlotId> = ids.iter().copied().filter(|id| in_degree[id] == 0).collect();
    ready.sort_unstable();
    let mut queue: VecDeque<SlotId> = ready.into();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        let Some(neighbors) = adjacency.get(&id) else { continue };
        let mut newly_ready = Vec::new();
        for &next in neighbors {
            let degree = in_degree.get_mut(&next).expect("neighbor tracked above");
            *degree -= 1;
            if *degree == 0 {
                newly_ready.push(next);
            }
        }
        newly_ready.sort_unstable();
        for next in newly_ready {
            queue.push_back(next);
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::draw_stage::{DrawParams, DrawStage, RenderStats};
    use std::sync::Arc;

    struct NoopStage;
    impl DrawStage for NoopStage {
        fn render(&self, _params: &DrawParams) -> RenderStats {
            RenderStats::default()
        }
        fn reset(&self) {}
        fn stats(&self) -> RenderStats {
            RenderStats::default()
        }
    }

    fn sentinel() -> SharedDrawStage {
        Arc::new(NoopStage)
    }

    #[test]
    fn topo_order_respects_dependency() {
        let mut graph = DrawStageGraph::new(sentinel());
        let a = graph.register_draw_stage(sentinel());
        let b = graph.register_draw_stage(sentinel());
        graph.add_dependency(a, b);
        graph.sync(|_| {}, |_| {});

        let order = graph.topo_order();
        let pos_a = order.iter().position(|&id| id == a).unwrap();
        let pos_b = order.iter().position(|&id| id == b).unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn removed_stage_drops_its_edges() {
        let mut graph = DrawStageGraph::new(sentinel());
        let a = graph.register_draw_stage(sentinel());
        let b = graph.register_draw_stage(sentinel());
        graph.add_dependency(a, b);
        graph.remove_draw_stage(a);
        graph.sync(|_| {}, |_| {});

        assert_eq!(graph.topo_order(), &[b]);
    }
}
