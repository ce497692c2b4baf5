//! Entity Node - one addressable spatial entity in the scene graph.
//!
//! Nodes live in the graph's arena and refer to each other by [`EntityId`]:
//! the parent's `children` list is the ownership edge, the child's `parent`
//! is a plain lookup key. Operations that must touch more than one node
//! (subtree invalidation, recursive refresh, relationship hydration) are
//! driven by [`SceneGraph`](crate::SceneGraph); this type provides the
//! per-node halves.
//!
//! # Staleness
//!
//! Freshness is tracked with epochs taken from the graph's mutation counter
//! rather than a single dirty bit:
//!
//! - `local_epoch`: last mutation of this node's local matrix or parent link
//! - `world_epoch`: when `world_matrix` was last computed
//! - `subtree_epoch`: newest mutation anywhere in this subtree
//! - `subtree_validated`: when this subtree was last walked by a refresh
//!
//! A node whose own `local_epoch` is newer than its `world_epoch` must be
//! recomputed, and so must every descendant, since their cached matrices
//! were composed against the superseded value.

use crate::address::EntityId;
use crate::coords;
use crate::snapshot::EntityRecord;
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// 2D screen-space summary of a tracked pose, set alongside the local matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPose {
    /// Horizontal position
    pub x: f64,

    /// Vertical position
    pub y: f64,

    /// Uniform scale
    pub scale: f64,
}

/// A node of the scene graph.
#[derive(Debug, Clone)]
pub struct EntityNode {
    /// Unique ID, stable for the node's lifetime
    id: EntityId,

    /// Non-owning reference to the parent (None for root and detached nodes)
    parent: Option<EntityId>,

    /// Owned, ordered child references
    children: Vec<EntityId>,

    /// Transform relative to the parent
    local_matrix: Matrix4<f64>,

    /// Cached transform relative to the root
    world_matrix: Matrix4<f64>,

    local_epoch: u64,
    world_epoch: u64,
    subtree_epoch: u64,
    subtree_validated: u64,

    /// Soft-delete flag; the node stays in the tree
    deactivated: bool,

    /// A coordinate-correction child sits between this node and its logical children
    needs_rotate_x: bool,

    /// Source-specific tracked-entity data, never interpreted by the graph
    linked_payload: Option<serde_json::Value>,

    /// Auxiliary 2D pose summary
    tracked_pose: Option<TrackedPose>,
}

impl EntityNode {
    /// Creates a detached node with identity transforms.
    ///
    /// The node starts stale: its world matrix has never been computed.
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            children: Vec::new(),
            local_matrix: Matrix4::identity(),
            world_matrix: Matrix4::identity(),
            local_epoch: 1,
            world_epoch: 0,
            subtree_epoch: 1,
            subtree_validated: 0,
            deactivated: false,
            needs_rotate_x: false,
            linked_payload: None,
            tracked_pose: None,
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn local_matrix(&self) -> &Matrix4<f64> {
        &self.local_matrix
    }

    /// Cached world matrix. Only meaningful after the graph has recomputed.
    pub fn world_matrix(&self) -> &Matrix4<f64> {
        &self.world_matrix
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    pub fn needs_rotate_x(&self) -> bool {
        self.needs_rotate_x
    }

    pub fn linked_payload(&self) -> Option<&serde_json::Value> {
        self.linked_payload.as_ref()
    }

    pub fn tracked_pose(&self) -> Option<TrackedPose> {
        self.tracked_pose
    }

    /// True if this node's own local matrix or parent link changed since its
    /// world matrix was last computed. Ancestor changes are not visible here;
    /// see [`SceneGraph::is_current`](crate::SceneGraph::is_current).
    pub fn is_stale(&self) -> bool {
        self.local_epoch > self.world_epoch
    }

    pub(crate) fn world_epoch(&self) -> u64 {
        self.world_epoch
    }

    /// World-space translation.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        coords::translation_of(&self.world_matrix)
    }

    /// Euclidean distance between the world translations of two nodes.
    ///
    /// Both world matrices must be current; the caller recomputes first.
    pub fn distance_to(&self, other: &EntityNode) -> f64 {
        (self.translation() - other.translation()).norm()
    }

    // ========================================================================
    // MUTATION (driven by the graph)
    // ========================================================================

    /// Stores `matrix` and marks the node stale at `epoch`.
    pub(crate) fn set_local_matrix(&mut self, matrix: Matrix4<f64>, epoch: u64) {
        self.local_matrix = matrix;
        self.mark_stale(epoch);
    }

    /// Records a mutation of this node at `epoch`.
    pub(crate) fn mark_stale(&mut self, epoch: u64) {
        self.local_epoch = epoch;
        self.mark_subtree_changed(epoch);
    }

    /// Records a mutation somewhere below this node at `epoch`.
    pub(crate) fn mark_subtree_changed(&mut self, epoch: u64) {
        self.subtree_epoch = self.subtree_epoch.max(epoch);
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn push_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: &str) {
        self.children.retain(|c| c != child);
    }

    pub(crate) fn take_children(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.children)
    }

    pub(crate) fn set_deactivated(&mut self, deactivated: bool) {
        self.deactivated = deactivated;
    }

    pub(crate) fn set_needs_rotate_x(&mut self, needs_rotate_x: bool) {
        self.needs_rotate_x = needs_rotate_x;
    }

    pub(crate) fn set_linked_payload(&mut self, payload: serde_json::Value) {
        self.linked_payload = Some(payload);
    }

    pub(crate) fn set_tracked_pose(&mut self, pose: TrackedPose) {
        self.tracked_pose = Some(pose);
    }

    /// Refreshes the world matrix from `parent_world` if needed.
    ///
    /// `forced` is set when the parent was refreshed in this pass. Returns
    /// whether the matrix was recomputed; the caller then forces every child.
    pub(crate) fn update_world_matrix(
        &mut self,
        parent_world: &Matrix4<f64>,
        forced: bool,
        epoch: u64,
    ) -> bool {
        if !forced && !self.is_stale() {
            return false;
        }

        self.world_matrix = parent_world * self.local_matrix;
        self.world_epoch = epoch;
        true
    }

    /// Whether a refresh pass must descend into this node's children.
    pub(crate) fn subtree_needs_walk(&self) -> bool {
        self.subtree_epoch > self.subtree_validated
    }

    pub(crate) fn mark_subtree_validated(&mut self, epoch: u64) {
        self.subtree_validated = epoch;
    }

    // ========================================================================
    // SERIALIZATION
    // ========================================================================

    /// Snapshot record of this node.
    pub fn to_serializable(&self) -> EntityRecord {
        EntityRecord {
            local_matrix: coords::to_flat(&self.local_matrix),
            parent: self.parent.clone(),
            children: self.children.clone(),
            deactivated: self.deactivated,
            needs_rotate_x: self.needs_rotate_x,
            linked_payload: self.linked_payload.clone(),
            tracked_pose: self.tracked_pose,
        }
    }

    /// Fills this node from `record`.
    ///
    /// Relationships are resolved through the graph's registry:
    /// `accept_parent` decides whether the recorded parent ID is live, and
    /// `accept_child` whether a recorded child belongs under this node. IDs
    /// that fail the check are dropped, which keeps forward references across
    /// a two-phase import from dangling.
    pub fn hydrate_from(
        &mut self,
        record: &EntityRecord,
        epoch: u64,
        accept_parent: impl Fn(&str) -> bool,
        accept_child: impl Fn(&str) -> bool,
    ) {
        self.local_matrix = coords::from_flat(&record.local_matrix);
        self.parent = record.parent.clone().filter(|p| accept_parent(p));
        self.children = record
            .children
            .iter()
            .filter(|c| accept_child(c))
            .cloned()
            .collect();
        self.deactivated = record.deactivated;
        self.needs_rotate_x = record.needs_rotate_x;
        self.linked_payload = record.linked_payload.clone();
        self.tracked_pose = record.tracked_pose;
        self.mark_stale(epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::translation;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_node_is_stale_identity() {
        let node = EntityNode::new("obj");

        assert!(node.is_stale());
        assert_eq!(node.local_matrix(), &Matrix4::identity());
        assert!(node.parent().is_none());
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_update_skips_current_node() {
        let mut node = EntityNode::new("obj");
        node.set_local_matrix(translation(1.0, 0.0, 0.0), 2);

        assert!(node.update_world_matrix(&Matrix4::identity(), false, 2));
        assert!(!node.is_stale());

        // A different parent world is ignored unless the caller forces it
        let moved = translation(0.0, 5.0, 0.0);
        assert!(!node.update_world_matrix(&moved, false, 3));
        assert_relative_eq!(node.translation(), Vector3::new(1.0, 0.0, 0.0));

        assert!(node.update_world_matrix(&moved, true, 3));
        assert_relative_eq!(node.translation(), Vector3::new(1.0, 5.0, 0.0));
    }

    #[test]
    fn test_distance_to() {
        let mut a = EntityNode::new("a");
        let mut b = EntityNode::new("b");
        a.set_local_matrix(translation(3.0, 0.0, 0.0), 2);
        b.set_local_matrix(translation(0.0, 4.0, 0.0), 2);
        a.update_world_matrix(&Matrix4::identity(), false, 2);
        b.update_world_matrix(&Matrix4::identity(), false, 2);

        assert_relative_eq!(a.distance_to(&b), 5.0);
        assert_relative_eq!(b.distance_to(&a), 5.0);
        assert_relative_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_push_child_is_idempotent() {
        let mut node = EntityNode::new("p");
        node.push_child("c".to_string());
        node.push_child("c".to_string());
        assert_eq!(node.children(), &["c".to_string()]);

        node.remove_child("c");
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_hydrate_filters_unresolved_relations() {
        let mut source = EntityNode::new("frame");
        source.set_local_matrix(translation(1.0, 2.0, 3.0), 2);
        source.set_parent_link(Some("obj".to_string()));
        source.push_child("known".to_string());
        source.push_child("missing".to_string());
        source.set_deactivated(true);
        source.set_tracked_pose(TrackedPose { x: 1.0, y: 2.0, scale: 0.5 });
        let record = source.to_serializable();

        let mut target = EntityNode::new("frame");
        target.hydrate_from(&record, 7, |p| p == "obj", |c| c == "known");

        assert_eq!(target.parent(), Some("obj"));
        assert_eq!(target.children(), &["known".to_string()]);
        assert_eq!(target.local_matrix(), source.local_matrix());
        assert!(target.is_deactivated());
        assert_eq!(target.tracked_pose(), source.tracked_pose());
        assert!(target.is_stale());
    }
}
