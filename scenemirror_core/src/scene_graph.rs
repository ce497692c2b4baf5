//! The Scene Graph - registry and lifecycle of every tracked entity.
//!
//! The graph mirrors what distributed AR clients report: objects hang off the
//! root, frames hang off objects (through a coordinate-correction node when
//! the object's tracking source needs one), nodes hang off frames.
//!
//! # Recompute contract
//!
//! Mutations only record an epoch. Queries call [`SceneGraph::recompute`],
//! which walks down from the root (and from every detached node) and
//! refreshes world matrices, descending only into subtrees that saw a
//! mutation since they were last validated. With no pending mutation the
//! call returns immediately.
//!
//! # Observers
//!
//! Every successful mutation notifies the registered observers in
//! registration order, synchronously, before the mutating call returns.
//! Observers hold no reference to the graph while it is mutably borrowed,
//! so they cannot re-enter it.

use crate::address::{
    correction_id, is_correction, is_reserved, DefaultKeyScheme, EntityId, EntityPath, KeyScheme, CAMERA_ID,
    GROUND_PLANE_ID, ROOT_ID,
};
use crate::config::GraphConfig;
use crate::coords::{self, CorrectionVariant};
use crate::entity::{EntityNode, TrackedPose};
use crate::error::GraphError;
use crate::snapshot::Snapshot;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace, warn};

/// Returned by [`SceneGraph::distance_between`] when either entity is unknown.
pub const DISTANCE_UNRESOLVED: f64 = -1.0;

/// Callback invoked after every successful mutation.
pub type MutationObserver = Box<dyn FnMut() + Send>;

/// Handle returned by [`SceneGraph::on_mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Statistics about the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub reachable_entities: usize,
    pub detached_entities: usize,
    pub deactivated_entities: usize,
    pub epoch: u64,
}

/// The scene graph.
pub struct SceneGraph {
    /// Every live entity, including the root
    entities: HashMap<EntityId, EntityNode>,

    /// Parentless entities other than the root (extra refresh entry points)
    detached: HashSet<EntityId>,

    observers: Vec<(ObserverId, MutationObserver)>,
    next_observer_id: u64,

    /// Mutation counter, bumped on every transform-affecting change
    epoch: u64,

    /// Epoch of the last completed recompute
    validated_epoch: u64,

    keys: Box<dyn KeyScheme>,
    config: GraphConfig,
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("entities", &self.entities.len())
            .field("detached", &self.detached.len())
            .field("observers", &self.observers.len())
            .field("epoch", &self.epoch)
            .field("validated_epoch", &self.validated_epoch)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Creates a graph holding only the root.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates a graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_key_scheme(config, Box::new(DefaultKeyScheme))
    }

    /// Creates a graph using a custom path → key scheme.
    pub fn with_key_scheme(config: GraphConfig, keys: Box<dyn KeyScheme>) -> Self {
        let mut entities = HashMap::new();
        entities.insert(ROOT_ID.to_string(), EntityNode::new(ROOT_ID));

        let mut graph = Self {
            entities,
            detached: HashSet::new(),
            observers: Vec::new(),
            next_observer_id: 0,
            epoch: 1,
            validated_epoch: 0,
            keys,
            config,
        };

        if graph.config.reserved_anchors {
            for anchor in [CAMERA_ID, GROUND_PLANE_ID] {
                graph.ensure(anchor);
                graph.set_parent(anchor, ROOT_ID);
            }
            graph.insert_correction(GROUND_PLANE_ID, CorrectionVariant::Plane);
        }

        graph
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The key scheme used to address entities.
    pub fn keys(&self) -> &dyn KeyScheme {
        self.keys.as_ref()
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<&EntityNode> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Resolves a path to the ID of a live entity.
    pub fn resolve(&self, path: &EntityPath<'_>) -> Option<EntityId> {
        let id = self.keys.key(path);
        self.entities.contains_key(&id).then_some(id)
    }

    /// Number of entities, including the root.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if only the root is present.
    pub fn is_empty(&self) -> bool {
        self.entities.len() == 1
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// IDs of entities that are not deactivated.
    pub fn active_ids(&self) -> Vec<&str> {
        self.entities
            .values()
            .filter(|node| !node.is_deactivated())
            .map(EntityNode::id)
            .collect()
    }

    /// True if following parent links from `id` reaches the root.
    pub fn is_reachable(&self, id: &str) -> bool {
        let mut current = self.entities.get(id);
        while let Some(node) = current {
            if node.id() == ROOT_ID {
                return true;
            }
            current = node.parent().and_then(|p| self.entities.get(p));
        }
        false
    }

    /// True if the cached world matrix of `id` reflects every mutation of the
    /// node and its ancestors.
    pub fn is_current(&self, id: &str) -> bool {
        let Some(mut node) = self.entities.get(id) else {
            return false;
        };
        loop {
            if node.is_stale() {
                return false;
            }
            match node.parent().and_then(|p| self.entities.get(p)) {
                Some(parent) => {
                    if parent.world_epoch() > node.world_epoch() {
                        return false;
                    }
                    node = parent;
                }
                None => return true,
            }
        }
    }

    /// Returns statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        let mut reachable = 0;
        let mut queue = VecDeque::from([ROOT_ID]);
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.entities.get(id) {
                reachable += 1;
                queue.extend(node.children().iter().map(String::as_str));
            }
        }

        GraphStats {
            total_entities: self.entities.len(),
            reachable_entities: reachable,
            detached_entities: self.detached.len(),
            deactivated_entities: self.entities.values().filter(|n| n.is_deactivated()).count(),
            epoch: self.epoch,
        }
    }

    // ========================================================================
    // INSERTION
    // ========================================================================

    /// Creates or fetches an object and parents it under the root.
    ///
    /// Re-adding an existing object updates its matrix and moves it back
    /// under the root, undoing an earlier reparent to a world anchor. With
    /// `needs_correction` a point-variant correction child is inserted and
    /// the object's frames attach below it.
    pub fn add_object(
        &mut self,
        object: &str,
        local_matrix: Option<Matrix4<f64>>,
        needs_correction: bool,
    ) -> EntityId {
        let id = self.keys.object_key(object);
        if is_reserved(&id) || is_correction(&id) {
            trace!(id = %id, "ignoring object update addressed to a reserved id");
            return id;
        }

        self.ensure(&id);
        self.set_parent(&id, ROOT_ID);
        if let Some(matrix) = local_matrix {
            self.apply_local(&id, matrix);
        }
        if needs_correction {
            self.insert_correction(&id, CorrectionVariant::Point);
        }

        self.notify();
        id
    }

    /// Creates or fetches a frame and parents it under its object.
    ///
    /// If the object is not registered yet the frame stays detached until a
    /// later `add_frame` call finds it.
    pub fn add_frame(
        &mut self,
        object: &str,
        frame: &str,
        linked_payload: Option<serde_json::Value>,
        local_matrix: Option<Matrix4<f64>>,
    ) -> EntityId {
        let object_id = self.keys.object_key(object);
        let id = self.keys.frame_key(object, frame);
        self.insert_child(&id, &object_id, linked_payload, local_matrix);
        id
    }

    /// Creates or fetches a node and parents it under its frame.
    pub fn add_node(
        &mut self,
        object: &str,
        frame: &str,
        node: &str,
        linked_payload: Option<serde_json::Value>,
        local_matrix: Option<Matrix4<f64>>,
    ) -> EntityId {
        let frame_id = self.keys.frame_key(object, frame);
        let id = self.keys.node_key(object, frame, node);
        self.insert_child(&id, &frame_id, linked_payload, local_matrix);
        id
    }

    /// Inserts a synthetic correction child below `parent` and routes the
    /// parent's logical children through it.
    ///
    /// Returns the correction node's ID, or `None` if `parent` is unknown.
    pub fn add_coordinate_correction(
        &mut self,
        parent: &str,
        variant: CorrectionVariant,
    ) -> Option<EntityId> {
        self.insert_correction(parent, variant)?;
        self.notify();
        Some(correction_id(parent))
    }

    /// Places the camera anchor under the root.
    pub fn set_camera_pose(&mut self, local_matrix: Matrix4<f64>) {
        self.set_anchor(CAMERA_ID, local_matrix, None);
    }

    /// Places the ground-plane anchor under the root. Content attached to it
    /// goes through a plane-variant correction.
    pub fn set_ground_plane(&mut self, local_matrix: Matrix4<f64>) {
        self.set_anchor(GROUND_PLANE_ID, local_matrix, Some(CorrectionVariant::Plane));
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Sets the local matrix of an entity by ID. Unknown IDs and the root are
    /// left alone.
    pub fn set_local_matrix(&mut self, id: &str, local_matrix: Matrix4<f64>) -> bool {
        if !self.entities.contains_key(id) || id == ROOT_ID {
            trace!(id, "local matrix update for unknown entity ignored");
            return false;
        }
        self.apply_local(id, local_matrix);
        self.notify();
        true
    }

    /// Updates the tracked pose and local matrix of a fully addressed node.
    pub fn update_pose(
        &mut self,
        object: &str,
        frame: &str,
        node: &str,
        local_matrix: Matrix4<f64>,
        x: f64,
        y: f64,
        scale: f64,
    ) -> bool {
        let id = self.keys.node_key(object, frame, node);
        let Some(entity) = self.entities.get_mut(&id) else {
            trace!(id = %id, "pose update for unknown node ignored");
            return false;
        };

        entity.set_tracked_pose(TrackedPose { x, y, scale });
        self.apply_local(&id, local_matrix);
        self.notify();
        true
    }

    /// Moves an object under a world anchor.
    ///
    /// No-op if either path is unresolved, both resolve to the same node, or
    /// the move would put the anchor below the object.
    pub fn reparent_object_to_world(&mut self, object: &str, world: &str) -> bool {
        let object_id = self.keys.object_key(object);
        let world_id = self.keys.object_key(world);
        if object_id == world_id
            || !self.entities.contains_key(&object_id)
            || !self.entities.contains_key(&world_id)
        {
            trace!(object = %object_id, world = %world_id, "reparent ignored");
            return false;
        }

        if !self.set_parent(&object_id, &world_id) {
            return false;
        }
        debug!(object = %object_id, world = %world_id, "object reparented to world");
        self.notify();
        true
    }

    /// Detaches an entity from its parent and deletes it from the registry.
    ///
    /// Removal does not cascade: the entity's children stay registered as
    /// detached entities (their parent link is cleared) until they are
    /// removed individually or re-added under a live parent.
    pub fn remove_entity_and_descendants(&mut self, id: &str) -> bool {
        if id == ROOT_ID {
            warn!("refusing to remove the root");
            return false;
        }
        let Some(mut node) = self.entities.remove(id) else {
            trace!(id, "remove of unknown entity ignored");
            return false;
        };

        if let Some(parent) = node.parent() {
            if let Some(parent) = self.entities.get_mut(parent) {
                parent.remove_child(id);
            }
        }
        self.detached.remove(id);

        let orphans = node.take_children();
        for child in &orphans {
            if let Some(entity) = self.entities.get_mut(child) {
                entity.set_parent_link(None);
                self.detached.insert(child.clone());
                self.touch(child);
            }
        }

        debug!(id, orphans = orphans.len(), "entity removed");
        self.notify();
        true
    }

    /// Soft-deletes an entity. Notifies only if the flag changed.
    pub fn deactivate(&mut self, id: &str) -> bool {
        self.set_deactivated(id, true)
    }

    /// Reverses [`deactivate`](Self::deactivate). Notifies only if the flag changed.
    pub fn activate(&mut self, id: &str) -> bool {
        self.set_deactivated(id, false)
    }

    // ========================================================================
    // OBSERVERS
    // ========================================================================

    /// Registers a callback invoked after every successful mutation.
    pub fn on_mutation<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut() + Send + 'static,
    {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Unregisters an observer. Returns false if it was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    fn notify(&mut self) {
        let isolate = self.config.isolate_observers;
        for (id, observer) in self.observers.iter_mut() {
            if !isolate {
                observer();
                continue;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
                warn!(observer = id.0, "mutation observer panicked");
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Refreshes every stale world matrix.
    pub fn recompute(&mut self) {
        if self.validated_epoch == self.epoch {
            return;
        }
        let epoch = self.epoch;
        let identity = Matrix4::identity();

        let mut stack: Vec<(EntityId, Matrix4<f64>, bool)> = Vec::with_capacity(1 + self.detached.len());
        stack.push((ROOT_ID.to_string(), identity, false));
        stack.extend(self.detached.iter().map(|id| (id.clone(), identity, false)));

        let mut refreshed = 0usize;
        while let Some((id, parent_world, forced)) = stack.pop() {
            let Some(node) = self.entities.get_mut(&id) else {
                continue;
            };
            let updated = node.update_world_matrix(&parent_world, forced, epoch);
            if !updated && !node.subtree_needs_walk() {
                continue;
            }
            if updated {
                refreshed += 1;
            }
            node.mark_subtree_validated(epoch);

            let world = *node.world_matrix();
            for child in node.children().iter().rev() {
                stack.push((child.clone(), world, updated));
            }
        }

        self.validated_epoch = epoch;
        trace!(epoch, refreshed, "world matrices recomputed");
    }

    /// World matrix of an entity by ID, after recomputing.
    pub fn world_matrix(&mut self, id: &str) -> Option<Matrix4<f64>> {
        self.recompute();
        self.entities.get(id).map(|node| *node.world_matrix())
    }

    /// World matrix of the entity at (object, frame, node), after recomputing.
    pub fn world_position(
        &mut self,
        object: &str,
        frame: Option<&str>,
        node: Option<&str>,
    ) -> Option<Matrix4<f64>> {
        let id = self.keys.key(&EntityPath::new(object, frame, node));
        self.world_matrix(&id)
    }

    /// Distance between the world translations of two entities, or
    /// [`DISTANCE_UNRESOLVED`] if either is unknown.
    pub fn distance_between(&mut self, a: &str, b: &str) -> f64 {
        self.recompute();
        match (self.entities.get(a), self.entities.get(b)) {
            (Some(a), Some(b)) => a.distance_to(b),
            _ => DISTANCE_UNRESOLVED,
        }
    }

    // ========================================================================
    // SNAPSHOT
    // ========================================================================

    /// Serializable state of every entity, after recomputing.
    pub fn export_snapshot(&mut self) -> Snapshot {
        self.recompute();
        let mut snapshot = Snapshot::new();
        for (id, node) in &self.entities {
            snapshot.insert(id.clone(), node.to_serializable());
        }
        snapshot
    }

    /// [`export_snapshot`](Self::export_snapshot) encoded as JSON.
    pub fn export_snapshot_json(&mut self) -> Result<String, GraphError> {
        self.export_snapshot().to_json()
    }

    /// Merges a snapshot into this graph and returns the number of entities
    /// created.
    ///
    /// Entities already present locally are left untouched: local state wins
    /// and no conflict resolution is attempted. Newly created entities are
    /// hydrated from their records; links to IDs that exist neither locally
    /// nor in the snapshot are dropped.
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        // Phase 1: placeholders for every unknown ID
        let created: BTreeSet<EntityId> = snapshot
            .entities
            .keys()
            .filter(|id| !self.entities.contains_key(id.as_str()))
            .cloned()
            .collect();
        if created.is_empty() {
            return 0;
        }
        for id in &created {
            self.entities.insert(id.clone(), EntityNode::new(id.as_str()));
        }

        // Phase 2: hydrate fields and relationships
        self.epoch += 1;
        let epoch = self.epoch;
        for id in &created {
            let Some(mut node) = self.entities.remove(id) else {
                continue;
            };
            let record = &snapshot.entities[id];
            let entities = &self.entities;
            node.hydrate_from(
                record,
                epoch,
                |parent| entities.contains_key(parent),
                |child| {
                    created.contains(child)
                        && snapshot
                            .get(child)
                            .and_then(|r| r.parent.as_deref())
                            == Some(id.as_str())
                },
            );
            self.entities.insert(id.clone(), node);
        }

        // Pre-existing parents adopt created children in the order their own
        // record lists them, then any the record left out.
        for (parent_id, record) in &snapshot.entities {
            if created.contains(parent_id) {
                continue;
            }
            for child in &record.children {
                let claims_parent = self
                    .entities
                    .get(child)
                    .is_some_and(|n| created.contains(child) && n.parent() == Some(parent_id.as_str()));
                if claims_parent {
                    if let Some(parent) = self.entities.get_mut(parent_id) {
                        parent.push_child(child.clone());
                    }
                }
            }
        }
        for id in &created {
            let parent = self.entities.get(id).and_then(|n| n.parent()).map(str::to_string);
            if let Some(parent) = parent {
                if let Some(parent) = self.entities.get_mut(&parent) {
                    parent.push_child(id.clone());
                }
            }
        }

        self.break_cycles(&created);

        for id in &created {
            if self.entities.get(id).is_some_and(|n| n.parent().is_none()) {
                self.detached.insert(id.clone());
            }
            self.touch(id);
        }

        debug!(created = created.len(), total = self.entities.len(), "snapshot imported");
        self.notify();
        created.len()
    }

    /// Decodes a JSON snapshot and merges it.
    pub fn import_snapshot_json(&mut self, json: &str) -> Result<usize, GraphError> {
        let snapshot = Snapshot::from_json(json)?;
        Ok(self.import_snapshot(&snapshot))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Creates a detached entity if `id` is unknown. Returns whether it was created.
    fn ensure(&mut self, id: &str) -> bool {
        if self.entities.contains_key(id) {
            return false;
        }
        self.entities.insert(id.to_string(), EntityNode::new(id));
        self.detached.insert(id.to_string());
        self.touch(id);
        debug!(id, "entity created");
        true
    }

    /// Records a mutation of `id` and flags its ancestors for the next walk.
    fn touch(&mut self, id: &str) {
        self.epoch += 1;
        let epoch = self.epoch;
        let parent = match self.entities.get_mut(id) {
            Some(node) => {
                node.mark_stale(epoch);
                node.parent().map(str::to_string)
            }
            None => return,
        };
        self.mark_ancestors(parent, epoch);
    }

    fn mark_ancestors(&mut self, mut current: Option<EntityId>, epoch: u64) {
        while let Some(id) = current {
            current = match self.entities.get_mut(&id) {
                Some(node) => {
                    node.mark_subtree_changed(epoch);
                    node.parent().map(str::to_string)
                }
                None => None,
            };
        }
    }

    /// Stores a local matrix if it differs from the current one.
    fn apply_local(&mut self, id: &str, matrix: Matrix4<f64>) -> bool {
        if id == ROOT_ID {
            return false;
        }
        let epoch = self.epoch + 1;
        let parent = match self.entities.get_mut(id) {
            Some(node) if node.local_matrix() != &matrix => {
                node.set_local_matrix(matrix, epoch);
                node.parent().map(str::to_string)
            }
            _ => return false,
        };
        self.epoch = epoch;
        self.mark_ancestors(parent, epoch);
        true
    }

    /// True if `ancestor` is `id` or lies on the path from `id` to its root.
    fn is_ancestor_or_self(&self, ancestor: &str, id: &str) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.entities.get(cur).and_then(EntityNode::parent);
        }
        false
    }

    /// Moves `id` under `parent_id`, keeping both sides of the link in sync.
    ///
    /// Rejects self-parenting, moving the root, unknown IDs, and moves that
    /// would create a cycle. Returns whether the parent changed.
    fn set_parent(&mut self, id: &str, parent_id: &str) -> bool {
        if id == parent_id || id == ROOT_ID || !self.entities.contains_key(parent_id) {
            return false;
        }
        let old_parent = match self.entities.get(id) {
            Some(node) => node.parent().map(str::to_string),
            None => return false,
        };
        if old_parent.as_deref() == Some(parent_id) {
            return false;
        }
        if self.is_ancestor_or_self(id, parent_id) {
            warn!(id, parent = parent_id, "reparent would create a cycle; ignored");
            return false;
        }

        if let Some(old) = old_parent {
            if let Some(old) = self.entities.get_mut(&old) {
                old.remove_child(id);
            }
        }
        if let Some(parent) = self.entities.get_mut(parent_id) {
            parent.push_child(id.to_string());
        }
        if let Some(node) = self.entities.get_mut(id) {
            node.set_parent_link(Some(parent_id.to_string()));
        }
        self.detached.remove(id);
        self.touch(id);
        true
    }

    /// Where children of `id` attach: its correction node if it has one.
    fn attach_point(&self, id: &str) -> Option<EntityId> {
        let node = self.entities.get(id)?;
        if node.needs_rotate_x() {
            let correction = correction_id(id);
            if self.entities.contains_key(&correction) {
                return Some(correction);
            }
        }
        Some(id.to_string())
    }

    fn insert_child(
        &mut self,
        id: &str,
        parent: &str,
        linked_payload: Option<serde_json::Value>,
        local_matrix: Option<Matrix4<f64>>,
    ) {
        if is_reserved(id) || is_correction(id) {
            trace!(id, "ignoring update addressed to a reserved id");
            return;
        }
        self.ensure(id);
        match self.attach_point(parent) {
            Some(anchor) => {
                self.set_parent(id, &anchor);
            }
            None => trace!(id, parent, "parent not registered yet; entity stays detached"),
        }
        if let Some(payload) = linked_payload {
            if let Some(node) = self.entities.get_mut(id) {
                node.set_linked_payload(payload);
            }
        }
        if let Some(matrix) = local_matrix {
            self.apply_local(id, matrix);
        }
        self.notify();
    }

    /// Returns `None` if `parent` is unknown or the root.
    fn insert_correction(&mut self, parent: &str, variant: CorrectionVariant) -> Option<()> {
        if parent == ROOT_ID || !self.entities.contains_key(parent) {
            trace!(parent, "correction for unknown entity ignored");
            return None;
        }

        let id = correction_id(parent);
        self.ensure(&id);
        self.set_parent(&id, parent);
        let angle = self.config.correction_angle(variant);
        self.apply_local(&id, coords::rotation_x(angle));

        let logical_children: Vec<EntityId> = match self.entities.get_mut(parent) {
            Some(node) => {
                node.set_needs_rotate_x(true);
                node.children().iter().filter(|c| **c != id).cloned().collect()
            }
            None => Vec::new(),
        };
        for child in logical_children {
            self.set_parent(&child, &id);
        }
        Some(())
    }

    fn set_anchor(&mut self, id: &str, matrix: Matrix4<f64>, correction: Option<CorrectionVariant>) {
        self.ensure(id);
        self.set_parent(id, ROOT_ID);
        self.apply_local(id, matrix);
        if let Some(variant) = correction {
            self.insert_correction(id, variant);
        }
        self.notify();
    }

    fn set_deactivated(&mut self, id: &str, deactivated: bool) -> bool {
        match self.entities.get_mut(id) {
            Some(node) if node.is_deactivated() != deactivated => {
                node.set_deactivated(deactivated);
            }
            _ => return false,
        }
        debug!(id, deactivated, "activation changed");
        self.notify();
        true
    }

    /// Detaches one member of every parent cycle among `candidates`.
    ///
    /// Only an inconsistent snapshot can produce a cycle.
    fn break_cycles(&mut self, candidates: &BTreeSet<EntityId>) {
        for start in candidates {
            let mut seen = HashSet::new();
            let mut current = Some(start.clone());
            while let Some(id) = current {
                if !seen.insert(id.clone()) {
                    warn!(id = %id, "snapshot contained a parent cycle; detaching");
                    self.detach(&id);
                    break;
                }
                current = self.entities.get(&id).and_then(|n| n.parent()).map(str::to_string);
            }
        }
    }

    fn detach(&mut self, id: &str) {
        let parent = self.entities.get(id).and_then(|n| n.parent()).map(str::to_string);
        if let Some(parent) = parent {
            if let Some(parent) = self.entities.get_mut(&parent) {
                parent.remove_child(id);
            }
        }
        if let Some(node) = self.entities.get_mut(id) {
            node.set_parent_link(None);
        }
        self.detached.insert(id.to_string());
    }
}
