//! Update messages - what an AR client sends to the mirror.
//!
//! The transport that carries them is outside this crate; the harness
//! delivers them in-process, in order.

use scenemirror_core::coords::{from_flat, to_flat};
use scenemirror_core::{EntityPath, SceneGraph};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

/// A single update from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialUpdate {
    /// Object pose (registers the object on first sight)
    Object {
        object: String,
        matrix: [f64; 16],
        needs_correction: bool,
    },

    /// Frame attached to an object
    Frame {
        object: String,
        frame: String,
        matrix: [f64; 16],
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },

    /// Node inside a frame
    Node {
        object: String,
        frame: String,
        node: String,
        matrix: [f64; 16],
    },

    /// Tracked pose of an existing node
    Pose {
        object: String,
        frame: String,
        node: String,
        matrix: [f64; 16],
        x: f64,
        y: f64,
        scale: f64,
    },

    /// Removal of an object or frame
    Remove {
        object: String,
        frame: Option<String>,
    },

    /// Soft-delete of an object or frame
    Deactivate {
        object: String,
        frame: Option<String>,
    },

    /// Reversal of a soft-delete
    Activate {
        object: String,
        frame: Option<String>,
    },

    /// Object moved under a world anchor
    Reparent {
        object: String,
        world: String,
    },
}

impl SpatialUpdate {
    /// Builds an object pose update.
    pub fn object(object: impl Into<String>, matrix: &Matrix4<f64>, needs_correction: bool) -> Self {
        Self::Object {
            object: object.into(),
            matrix: to_flat(matrix),
            needs_correction,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SpatialUpdate::Object { .. } => "object",
            SpatialUpdate::Frame { .. } => "frame",
            SpatialUpdate::Node { .. } => "node",
            SpatialUpdate::Pose { .. } => "pose",
            SpatialUpdate::Remove { .. } => "remove",
            SpatialUpdate::Deactivate { .. } => "deactivate",
            SpatialUpdate::Activate { .. } => "activate",
            SpatialUpdate::Reparent { .. } => "reparent",
        }
    }

    /// Applies the update. Returns false if the graph ignored it.
    pub fn apply(&self, graph: &mut SceneGraph) -> bool {
        match self {
            SpatialUpdate::Object { object, matrix, needs_correction } => {
                graph.add_object(object, Some(from_flat(matrix)), *needs_correction);
                true
            }
            SpatialUpdate::Frame { object, frame, matrix, payload } => {
                graph.add_frame(object, frame, payload.clone(), Some(from_flat(matrix)));
                true
            }
            SpatialUpdate::Node { object, frame, node, matrix } => {
                graph.add_node(object, frame, node, None, Some(from_flat(matrix)));
                true
            }
            SpatialUpdate::Pose { object, frame, node, matrix, x, y, scale } => {
                graph.update_pose(object, frame, node, from_flat(matrix), *x, *y, *scale)
            }
            SpatialUpdate::Remove { object, frame } => {
                let id = graph.keys().key(&EntityPath::new(object, frame.as_deref(), None));
                graph.remove_entity_and_descendants(&id)
            }
            SpatialUpdate::Deactivate { object, frame } => {
                let id = graph.keys().key(&EntityPath::new(object, frame.as_deref(), None));
                graph.deactivate(&id)
            }
            SpatialUpdate::Activate { object, frame } => {
                let id = graph.keys().key(&EntityPath::new(object, frame.as_deref(), None));
                graph.activate(&id)
            }
            SpatialUpdate::Reparent { object, world } => graph.reparent_object_to_world(object, world),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scenemirror_core::coords::translation;

    #[test]
    fn test_wire_format_is_tagged() {
        let update = SpatialUpdate::Reparent {
            object: "obj".into(),
            world: "world".into(),
        };
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json["type"], "reparent");
        assert_eq!(serde_json::from_value::<SpatialUpdate>(json).unwrap(), update);
    }

    #[test]
    fn test_apply_builds_hierarchy() {
        let mut graph = SceneGraph::new();
        let updates = vec![
            SpatialUpdate::object("obj", &translation(1.0, 0.0, 0.0), false),
            SpatialUpdate::Frame {
                object: "obj".into(),
                frame: "frame".into(),
                matrix: to_flat(&translation(0.0, 1.0, 0.0)),
                payload: None,
            },
            SpatialUpdate::Node {
                object: "obj".into(),
                frame: "frame".into(),
                node: "node".into(),
                matrix: to_flat(&Matrix4::identity()),
            },
        ];
        for update in &updates {
            assert!(update.apply(&mut graph));
        }

        let world = graph.world_position("obj", Some("frame"), Some("node")).unwrap();
        assert_relative_eq!(world, translation(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_updates_for_unknown_entities_are_ignored() {
        let mut graph = SceneGraph::new();
        let ignored = [
            SpatialUpdate::Remove { object: "ghost".into(), frame: None },
            SpatialUpdate::Deactivate { object: "ghost".into(), frame: Some("f".into()) },
            SpatialUpdate::Reparent { object: "ghost".into(), world: "nowhere".into() },
        ];

        for update in &ignored {
            assert!(!update.apply(&mut graph), "{} applied", update.kind());
        }
        assert!(graph.is_empty());
    }
}
