//! Step graph model.
//!
//! Steps live in an insertion-ordered arena keyed by id. Nesting is expressed by
//! `parentId` plus an optional lane index on the child, so the graph keeps a
//! scope index (`Scope -> ordered step ids`) that is rebuilt after every
//! mutation. Ordering inside a scope is defined solely by ascending
//! `listIndex`, which the graph keeps dense (`0..n-1`).

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use railyard_types::{ControlConfig, Step, WorkflowDefinition};

use crate::error::GraphError;

/// Lane discriminator for branch and parallel containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneType {
    Branch,
    Parallel,
}

/// One lane of a branch or parallel container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Branch(usize),
    Parallel(usize),
}

impl Lane {
    pub fn new(lane_type: LaneType, index: usize) -> Self {
        match lane_type {
            LaneType::Branch => Lane::Branch(index),
            LaneType::Parallel => Lane::Parallel(index),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Lane::Branch(index) | Lane::Parallel(index) => *index,
        }
    }
}

/// Ordered sibling group a step belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Top-level sequential rail.
    Rail,
    /// Body of a loop or foreach container.
    Body { container: String },
    /// One lane of a branch or parallel container.
    Lane { container: String, lane: Lane },
}

impl Scope {
    pub fn body(container: impl Into<String>) -> Self {
        Scope::Body {
            container: container.into(),
        }
    }

    pub fn lane(container: impl Into<String>, lane: Lane) -> Self {
        Scope::Lane {
            container: container.into(),
            lane,
        }
    }

    /// Container owning the scope; `None` for the rail.
    pub fn container(&self) -> Option<&str> {
        match self {
            Scope::Rail => None,
            Scope::Body { container } | Scope::Lane { container, .. } => Some(container),
        }
    }
}

/// Indexed, validated view over a workflow's steps.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    steps: IndexMap<String, Step>,
    scopes: HashMap<Scope, Vec<String>>,
    scope_of: HashMap<String, Scope>,
}

impl StepGraph {
    /// Builds a graph from a definition's flat step list.
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, GraphError> {
        Self::from_steps(definition.steps.clone())
    }

    /// Validates the steps and normalizes every scope's `listIndex` to `0..n-1`.
    pub fn from_steps(steps: Vec<Step>) -> Result<Self, GraphError> {
        let mut arena = IndexMap::with_capacity(steps.len());
        for step in steps {
            if arena.contains_key(&step.id) {
                return Err(GraphError::DuplicateStep(step.id));
            }
            arena.insert(step.id.clone(), step);
        }

        let mut graph = StepGraph {
            steps: arena,
            ..Default::default()
        };
        graph.check_structure()?;
        graph.rebuild_index()?;
        graph.renumber_all();
        Ok(graph)
    }

    /// Re-checks every structural invariant of the current graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.check_structure()?;
        let mut copy = self.clone();
        copy.rebuild_index()
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.get(step_id)
    }

    /// All steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    /// Scope the step currently belongs to.
    pub fn scope_of(&self, step_id: &str) -> Option<&Scope> {
        self.scope_of.get(step_id)
    }

    /// Steps of a scope in execution order.
    pub fn scope_steps(&self, scope: &Scope) -> Vec<&Step> {
        self.scopes
            .get(scope)
            .map(|ids| ids.iter().filter_map(|id| self.steps.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ordered top-level steps.
    pub fn top_level_steps(&self) -> Vec<&Step> {
        self.scope_steps(&Scope::Rail)
    }

    /// Ordered body steps of a loop or foreach container.
    pub fn children_of(&self, container_id: &str) -> Vec<&Step> {
        self.scope_steps(&Scope::body(container_id))
    }

    /// Ordered steps of one branch or parallel lane.
    pub fn lane_children_of(&self, container_id: &str, lane_index: usize, lane_type: LaneType) -> Vec<&Step> {
        self.scope_steps(&Scope::lane(container_id, Lane::new(lane_type, lane_index)))
    }

    /// True when the container owns at least one child in any scope.
    pub fn has_children(&self, container_id: &str) -> bool {
        self.steps
            .values()
            .any(|step| step.parent_id.as_deref() == Some(container_id))
    }

    /// Every step that can causally precede `step_id`: earlier siblings in its
    /// scope, every enclosing ancestor, and recursively the predecessors of each
    /// ancestor. Subtrees of earlier siblings are not included.
    pub fn predecessors_of(&self, step_id: &str) -> Result<IndexSet<String>, GraphError> {
        let mut current = self
            .steps
            .get(step_id)
            .ok_or_else(|| GraphError::UnknownStep(step_id.to_string()))?;
        let mut predecessors = IndexSet::new();

        loop {
            let scope = self.scope_of.get(&current.id).cloned().unwrap_or(Scope::Rail);
            for sibling in self.scope_steps(&scope) {
                if sibling.list_index < current.list_index {
                    predecessors.insert(sibling.id.clone());
                }
            }
            let Some(parent) = current.parent_id.as_deref().and_then(|parent_id| self.steps.get(parent_id)) else {
                break;
            };
            predecessors.insert(parent.id.clone());
            current = parent;
        }

        Ok(predecessors)
    }

    pub fn is_predecessor(&self, candidate: &str, step_id: &str) -> bool {
        self.predecessors_of(step_id)
            .map(|predecessors| predecessors.contains(candidate))
            .unwrap_or(false)
    }

    /// Inserts a new step into `scope` at `position`.
    pub fn insert(&mut self, mut step: Step, scope: Scope, position: usize) -> Result<(), GraphError> {
        if self.steps.contains_key(&step.id) {
            return Err(GraphError::DuplicateStep(step.id));
        }
        self.check_scope_target(&step.id, &scope)?;
        let len = self.scopes.get(&scope).map_or(0, Vec::len);
        if position > len {
            return Err(GraphError::InvalidPosition { position, len });
        }

        assign_scope(&mut step, &scope);
        let step_id = step.id.clone();
        self.steps.insert(step_id.clone(), step);
        self.place(&step_id, &scope, position);
        self.rebuild_index()
    }

    /// Moves a step to `position` in `scope`, reparenting it when the scope differs.
    pub fn move_step(&mut self, step_id: &str, scope: Scope, position: usize) -> Result<(), GraphError> {
        let current_scope = self
            .scope_of
            .get(step_id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownStep(step_id.to_string()))?;
        self.check_scope_target(step_id, &scope)?;
        if let Some(container) = scope.container()
            && (container == step_id || self.is_ancestor(step_id, container))
        {
            return Err(GraphError::Cycle(step_id.to_string()));
        }

        let mut remaining = self.scopes.get(&scope).cloned().unwrap_or_default();
        remaining.retain(|id| id != step_id);
        if position > remaining.len() {
            return Err(GraphError::InvalidPosition {
                position,
                len: remaining.len(),
            });
        }

        self.detach(step_id, &current_scope);
        if let Some(step) = self.steps.get_mut(step_id) {
            assign_scope(step, &scope);
        }
        self.place(step_id, &scope, position);
        self.rebuild_index()
    }

    /// Moves a step to `position` within its current scope.
    pub fn reorder(&mut self, step_id: &str, position: usize) -> Result<(), GraphError> {
        let scope = self
            .scope_of
            .get(step_id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownStep(step_id.to_string()))?;
        self.move_step(step_id, scope, position)
    }

    /// Removes a leaf step or an empty container.
    pub fn remove(&mut self, step_id: &str) -> Result<Step, GraphError> {
        let scope = self
            .scope_of
            .get(step_id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownStep(step_id.to_string()))?;
        if self.has_children(step_id) {
            return Err(GraphError::ContainerNotEmpty(step_id.to_string()));
        }

        self.detach(step_id, &scope);
        let removed = self
            .steps
            .shift_remove(step_id)
            .ok_or_else(|| GraphError::UnknownStep(step_id.to_string()))?;
        self.rebuild_index()?;
        Ok(removed)
    }

    /// Consumes the graph, returning the normalized steps in insertion order.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps.into_values().collect()
    }

    fn is_ancestor(&self, ancestor_id: &str, step_id: &str) -> bool {
        let mut current = self.steps.get(step_id).and_then(|step| step.parent_id.as_deref());
        let mut hops = 0usize;
        while let Some(parent_id) = current {
            if parent_id == ancestor_id {
                return true;
            }
            hops += 1;
            if hops > self.steps.len() {
                return false;
            }
            current = self.steps.get(parent_id).and_then(|step| step.parent_id.as_deref());
        }
        false
    }

    fn check_scope_target(&self, step_id: &str, scope: &Scope) -> Result<(), GraphError> {
        let (container_id, lane) = match scope {
            Scope::Rail => return Ok(()),
            Scope::Body { container } => (container, None),
            Scope::Lane { container, lane } => (container, Some(*lane)),
        };
        let container = self.steps.get(container_id).ok_or_else(|| GraphError::DanglingParent {
            step_id: step_id.to_string(),
            parent_id: container_id.clone(),
        })?;
        let mut probe = Step::new(step_id, container.kind.clone());
        probe.parent_id = Some(container_id.clone());
        if let Some(lane) = lane {
            match lane {
                Lane::Branch(index) => probe.branch_condition_index = Some(index),
                Lane::Parallel(index) => probe.parallel_lane_index = Some(index),
            }
        }
        check_parent(&probe, container)
    }

    fn check_structure(&self) -> Result<(), GraphError> {
        for step in self.steps.values() {
            match step.parent_id.as_deref() {
                Some(parent_id) => {
                    let parent = self.steps.get(parent_id).ok_or_else(|| GraphError::DanglingParent {
                        step_id: step.id.clone(),
                        parent_id: parent_id.to_string(),
                    })?;
                    check_parent(step, parent)?;
                }
                None => {
                    if step.branch_condition_index.is_some() || step.parallel_lane_index.is_some() {
                        return Err(GraphError::UnexpectedLane(step.id.clone()));
                    }
                }
            }
        }

        for step in self.steps.values() {
            if self.is_ancestor(&step.id, &step.id) {
                return Err(GraphError::Cycle(step.id.clone()));
            }
        }
        Ok(())
    }

    /// Regroups steps by scope and sorts each scope by `listIndex`, rejecting ties.
    fn rebuild_index(&mut self) -> Result<(), GraphError> {
        let mut scopes: HashMap<Scope, Vec<String>> = HashMap::new();
        let mut scope_of = HashMap::with_capacity(self.steps.len());
        for step in self.steps.values() {
            let scope = derive_scope(step);
            scopes.entry(scope.clone()).or_default().push(step.id.clone());
            scope_of.insert(step.id.clone(), scope);
        }

        for ids in scopes.values_mut() {
            ids.sort_by_key(|id| self.steps.get(id).map_or(u32::MAX, |step| step.list_index));
            for pair in ids.windows(2) {
                let (first, second) = (&self.steps[&pair[0]], &self.steps[&pair[1]]);
                if first.list_index == second.list_index {
                    return Err(GraphError::DuplicateListIndex {
                        first: first.id.clone(),
                        second: second.id.clone(),
                        list_index: first.list_index,
                    });
                }
            }
        }

        self.scopes = scopes;
        self.scope_of = scope_of;
        Ok(())
    }

    fn renumber_all(&mut self) {
        for ids in self.scopes.values() {
            for (position, id) in ids.iter().enumerate() {
                if let Some(step) = self.steps.get_mut(id) {
                    step.list_index = position as u32;
                }
            }
        }
    }

    /// Removes `step_id` from `scope` and renumbers the remaining siblings.
    fn detach(&mut self, step_id: &str, scope: &Scope) {
        let Some(ids) = self.scopes.get_mut(scope) else {
            return;
        };
        ids.retain(|id| id != step_id);
        for (position, id) in ids.iter().enumerate() {
            if let Some(step) = self.steps.get_mut(id) {
                step.list_index = position as u32;
            }
        }
    }

    /// Inserts `step_id` into `scope` at `position` and renumbers the scope.
    fn place(&mut self, step_id: &str, scope: &Scope, position: usize) {
        let ids = self.scopes.entry(scope.clone()).or_default();
        ids.retain(|id| id != step_id);
        ids.insert(position.min(ids.len()), step_id.to_string());
        for (index, id) in ids.iter().enumerate() {
            if let Some(step) = self.steps.get_mut(id) {
                step.list_index = index as u32;
            }
        }
    }
}

fn derive_scope(step: &Step) -> Scope {
    let Some(parent_id) = step.parent_id.clone() else {
        return Scope::Rail;
    };
    if let Some(index) = step.branch_condition_index {
        return Scope::lane(parent_id, Lane::Branch(index));
    }
    if let Some(index) = step.parallel_lane_index {
        return Scope::lane(parent_id, Lane::Parallel(index));
    }
    Scope::body(parent_id)
}

fn assign_scope(step: &mut Step, scope: &Scope) {
    step.parent_id = scope.container().map(str::to_string);
    step.branch_condition_index = None;
    step.parallel_lane_index = None;
    if let Scope::Lane { lane, .. } = scope {
        match lane {
            Lane::Branch(index) => step.branch_condition_index = Some(*index),
            Lane::Parallel(index) => step.parallel_lane_index = Some(*index),
        }
    }
}

fn check_parent(step: &Step, parent: &Step) -> Result<(), GraphError> {
    if step.branch_condition_index.is_some() && step.parallel_lane_index.is_some() {
        return Err(GraphError::LaneConflict(step.id.clone()));
    }

    let invalid_parent = |control: &str| GraphError::InvalidParent {
        step_id: step.id.clone(),
        parent_id: parent.id.clone(),
        control: control.to_string(),
    };
    let Some(control) = parent.control() else {
        return Err(invalid_parent(parent.step_type().as_str()));
    };

    let (lane, lane_count) = match control {
        ControlConfig::Loop(_) | ControlConfig::Foreach(_) => {
            if step.branch_condition_index.is_some() || step.parallel_lane_index.is_some() {
                return Err(GraphError::UnexpectedLane(step.id.clone()));
            }
            return Ok(());
        }
        ControlConfig::Branch(branch) => {
            if step.parallel_lane_index.is_some() {
                return Err(GraphError::UnexpectedLane(step.id.clone()));
            }
            (step.branch_condition_index, branch.lane_count())
        }
        ControlConfig::Parallel(parallel) => {
            if step.branch_condition_index.is_some() {
                return Err(GraphError::UnexpectedLane(step.id.clone()));
            }
            (step.parallel_lane_index, parallel.lanes.len())
        }
        ControlConfig::Wait(_) | ControlConfig::Suspend(_) => return Err(invalid_parent(control.control_type())),
    };

    let lane = lane.ok_or_else(|| GraphError::MissingLane {
        step_id: step.id.clone(),
        parent_id: parent.id.clone(),
        control: control.control_type().to_string(),
    })?;
    if lane >= lane_count {
        return Err(GraphError::LaneOutOfRange {
            step_id: step.id.clone(),
            parent_id: parent.id.clone(),
            lane,
            lane_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_types::{
        BranchCondition, BranchConfig, CustomCodeConfig, LoopConfig, ParallelConfig, ParallelLane, StepKind, WaitConfig,
    };

    fn code(id: &str, list_index: u32) -> Step {
        let mut step = Step::new(id, StepKind::CustomCode(CustomCodeConfig::default()));
        step.list_index = list_index;
        step
    }

    fn nested(mut step: Step, parent: &str) -> Step {
        step.parent_id = Some(parent.to_string());
        step
    }

    fn looping(id: &str, list_index: u32) -> Step {
        let mut step = Step::new(
            id,
            StepKind::Control(ControlConfig::Loop(LoopConfig {
                condition: "iteration < 3".into(),
                ..Default::default()
            })),
        );
        step.list_index = list_index;
        step
    }

    fn branch(id: &str, list_index: u32) -> Step {
        let mut step = Step::new(
            id,
            StepKind::Control(ControlConfig::Branch(BranchConfig {
                conditions: vec![BranchCondition {
                    expression: "x > 10".into(),
                    label: None,
                }],
                has_else: true,
            })),
        );
        step.list_index = list_index;
        step
    }

    fn ids(steps: Vec<&Step>) -> Vec<String> {
        steps.into_iter().map(|step| step.id.clone()).collect()
    }

    fn indices(graph: &StepGraph, scope: &Scope) -> Vec<u32> {
        graph.scope_steps(scope).into_iter().map(|step| step.list_index).collect()
    }

    #[test]
    fn normalizes_sparse_list_indices() {
        let graph = StepGraph::from_steps(vec![code("c", 40), code("a", 5), code("b", 12)]).expect("graph");
        assert_eq!(ids(graph.top_level_steps()), vec!["a", "b", "c"]);
        assert_eq!(indices(&graph, &Scope::Rail), vec![0, 1, 2]);
    }

    #[test]
    fn rejects_ties_duplicates_and_bad_parents() {
        let tie = StepGraph::from_steps(vec![code("a", 1), code("b", 1)]).unwrap_err();
        assert!(matches!(tie, GraphError::DuplicateListIndex { list_index: 1, .. }));

        let duplicate = StepGraph::from_steps(vec![code("a", 0), code("a", 1)]).unwrap_err();
        assert_eq!(duplicate, GraphError::DuplicateStep("a".into()));

        let dangling = StepGraph::from_steps(vec![nested(code("a", 0), "ghost")]).unwrap_err();
        assert!(matches!(dangling, GraphError::DanglingParent { .. }));

        let leaf_parent = StepGraph::from_steps(vec![code("a", 0), nested(code("b", 0), "a")]).unwrap_err();
        assert!(matches!(leaf_parent, GraphError::InvalidParent { .. }));

        let wait = Step::new("pause", StepKind::Control(ControlConfig::Wait(WaitConfig::default())));
        let wait_parent = StepGraph::from_steps(vec![wait, nested(code("b", 0), "pause")]).unwrap_err();
        assert!(matches!(wait_parent, GraphError::InvalidParent { .. }));
    }

    #[test]
    fn validates_lane_indices() {
        let mut missing = nested(code("a", 0), "gate");
        missing.branch_condition_index = None;
        let error = StepGraph::from_steps(vec![branch("gate", 0), missing]).unwrap_err();
        assert!(matches!(error, GraphError::MissingLane { .. }));

        let mut out_of_range = nested(code("a", 0), "gate");
        out_of_range.branch_condition_index = Some(2);
        let error = StepGraph::from_steps(vec![branch("gate", 0), out_of_range]).unwrap_err();
        assert!(matches!(error, GraphError::LaneOutOfRange { lane: 2, lane_count: 2, .. }));

        let mut in_loop = nested(code("a", 0), "repeat");
        in_loop.parallel_lane_index = Some(0);
        let error = StepGraph::from_steps(vec![looping("repeat", 0), in_loop]).unwrap_err();
        assert_eq!(error, GraphError::UnexpectedLane("a".into()));

        let mut conflict = nested(code("a", 0), "gate");
        conflict.branch_condition_index = Some(0);
        conflict.parallel_lane_index = Some(0);
        let error = StepGraph::from_steps(vec![branch("gate", 0), conflict]).unwrap_err();
        assert_eq!(error, GraphError::LaneConflict("a".into()));
    }

    #[test]
    fn detects_parent_cycles() {
        let outer = nested(looping("outer", 0), "inner");
        let inner = nested(looping("inner", 0), "outer");
        let error = StepGraph::from_steps(vec![outer, inner]).unwrap_err();
        assert!(matches!(error, GraphError::Cycle(_)));
    }

    #[test]
    fn predecessors_exclude_sibling_subtrees() {
        let mut lane_zero = nested(code("yes", 0), "gate");
        lane_zero.branch_condition_index = Some(0);
        let mut lane_one = nested(code("no", 0), "gate");
        lane_one.branch_condition_index = Some(1);
        let graph = StepGraph::from_steps(vec![
            code("a", 0),
            looping("repeat", 1),
            nested(code("body_one", 0), "repeat"),
            nested(code("body_two", 1), "repeat"),
            branch("gate", 2),
            lane_zero,
            lane_one,
            code("z", 3),
        ])
        .expect("graph");

        let body_two = graph.predecessors_of("body_two").expect("known step");
        assert!(body_two.contains("body_one"));
        assert!(body_two.contains("repeat"));
        assert!(body_two.contains("a"));
        assert!(!body_two.contains("gate"));

        let z = graph.predecessors_of("z").expect("known step");
        assert!(z.contains("a") && z.contains("repeat") && z.contains("gate"));
        assert!(!z.contains("body_one"));
        assert!(!z.contains("yes"));

        let no = graph.predecessors_of("no").expect("known step");
        assert!(!no.contains("yes"));
        assert!(no.contains("gate"));
        assert!(graph.is_predecessor("a", "no"));
    }

    #[test]
    fn mutations_keep_indices_dense() {
        let mut graph = StepGraph::from_steps(vec![code("a", 0), code("b", 1), code("c", 2), looping("repeat", 3)])
            .expect("graph");

        graph.insert(code("x", 99), Scope::Rail, 1).expect("insert");
        assert_eq!(ids(graph.top_level_steps()), vec!["a", "x", "b", "c", "repeat"]);
        assert_eq!(indices(&graph, &Scope::Rail), vec![0, 1, 2, 3, 4]);

        graph.reorder("a", 4).expect("reorder");
        assert_eq!(ids(graph.top_level_steps()), vec!["x", "b", "c", "repeat", "a"]);

        graph.move_step("b", Scope::body("repeat"), 0).expect("move into body");
        assert_eq!(ids(graph.children_of("repeat")), vec!["b"]);
        assert_eq!(graph.step("b").and_then(|step| step.parent_id.clone()), Some("repeat".into()));
        assert_eq!(indices(&graph, &Scope::Rail), vec![0, 1, 2, 3]);

        graph.remove("c").expect("remove leaf");
        assert_eq!(ids(graph.top_level_steps()), vec!["x", "repeat", "a"]);
        assert_eq!(indices(&graph, &Scope::Rail), vec![0, 1, 2]);
        graph.validate().expect("still valid");
    }

    #[test]
    fn rejects_removing_non_empty_containers_and_self_nesting() {
        let mut graph = StepGraph::from_steps(vec![
            looping("outer", 0),
            nested(looping("inner", 0), "outer"),
            nested(code("leaf", 0), "inner"),
        ])
        .expect("graph");

        assert_eq!(graph.remove("inner").unwrap_err(), GraphError::ContainerNotEmpty("inner".into()));
        assert_eq!(
            graph.move_step("outer", Scope::body("inner"), 0).unwrap_err(),
            GraphError::Cycle("outer".into())
        );
        assert!(matches!(
            graph.insert(code("late", 0), Scope::body("outer"), 5).unwrap_err(),
            GraphError::InvalidPosition { position: 5, len: 1 }
        ));
    }

    #[test]
    fn lane_children_are_ordered_per_lane() {
        let mut parallel = Step::new(
            "fan",
            StepKind::Control(ControlConfig::Parallel(ParallelConfig {
                lanes: vec![ParallelLane::default(), ParallelLane::default()],
                wait_for_all: true,
            })),
        );
        parallel.list_index = 0;
        let mut graph = StepGraph::from_steps(vec![parallel]).expect("graph");
        graph
            .insert(code("left_b", 0), Scope::lane("fan", Lane::Parallel(0)), 0)
            .expect("insert");
        graph
            .insert(code("left_a", 0), Scope::lane("fan", Lane::Parallel(0)), 0)
            .expect("insert");
        graph
            .insert(code("right", 0), Scope::lane("fan", Lane::Parallel(1)), 0)
            .expect("insert");

        assert_eq!(ids(graph.lane_children_of("fan", 0, LaneType::Parallel)), vec!["left_a", "left_b"]);
        assert_eq!(ids(graph.lane_children_of("fan", 1, LaneType::Parallel)), vec!["right"]);
        assert!(graph.children_of("fan").is_empty());
        assert!(
            graph
                .insert(code("bad", 0), Scope::lane("fan", Lane::Parallel(2)), 0)
                .is_err()
        );
    }
}
