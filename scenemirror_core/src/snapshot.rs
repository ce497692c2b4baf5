//! Snapshot format for cross-process graph synchronization.
//!
//! A snapshot maps every entity ID to a record carrying enough state to
//! rebuild the node and its relationships. JSON is the wire encoding.

use crate::address::EntityId;
use crate::entity::TrackedPose;
use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Local matrix, 16 floats, column-major
    pub local_matrix: [f64; 16],

    /// Parent ID (None for root and detached entities)
    pub parent: Option<EntityId>,

    /// Ordered child IDs
    pub children: Vec<EntityId>,

    pub deactivated: bool,

    pub needs_rotate_x: bool,

    /// Opaque source-specific data
    #[serde(default)]
    pub linked_payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_pose: Option<TrackedPose>,
}

/// Full graph state keyed by entity ID.
///
/// Keys are ordered so that the encoding of a given graph is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: BTreeMap<EntityId, EntityRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn insert(&mut self, id: EntityId, record: EntityRecord) {
        self.entities.insert(id, record);
    }

    /// Encodes as compact JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string(self).map_err(GraphError::encode)
    }

    /// Encodes as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(GraphError::encode)
    }

    /// Decodes from JSON.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(GraphError::decode)
    }
}
