//! SceneMirror Core - server-side scene graph for distributed AR clients
//!
//! Clients report poses of tracked objects, the frames attached to them and
//! the nodes inside those frames. This crate keeps a mirror of those spatial
//! relationships and answers derived queries on demand:
//! 1. **Hierarchy**: objects under the root, frames under objects, nodes under
//!    frames, with coordinate-correction nodes where tracking sources disagree
//! 2. **Transforms**: lazy, epoch-driven propagation of world matrices
//! 3. **Queries**: world position and inter-entity distance
//! 4. **Sync**: full-state snapshots merged across independent graphs

pub mod address;
pub mod config;
pub mod coords;
pub mod entity;
pub mod error;
pub mod scene_graph;
pub mod snapshot;

// Re-export key types for convenience
pub use address::{DefaultKeyScheme, EntityId, EntityPath, KeyScheme, CAMERA_ID, GROUND_PLANE_ID, ROOT_ID};
pub use config::GraphConfig;
pub use coords::CorrectionVariant;
pub use entity::{EntityNode, TrackedPose};
pub use error::GraphError;
pub use scene_graph::{GraphStats, ObserverId, SceneGraph, DISTANCE_UNRESOLVED};
pub use snapshot::{EntityRecord, Snapshot};
