//! Simulated AR client.
//!
//! Each client tracks a handful of objects, each carrying frames with nodes,
//! plus one world anchor. Poses drift with Gaussian jitter drawn from a
//! seeded ChaCha8 RNG, so a given seed always produces the same update
//! stream.

use crate::error::SimError;
use crate::update::SpatialUpdate;

use nalgebra::{Matrix4, Vector3};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use scenemirror_core::coords::{rotation_y, to_flat, translation};
use serde::{Deserialize, Serialize};

/// Shape of the content one client reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientLayout {
    /// Tracked objects per client (default: 3)
    pub objects: usize,

    /// Frames per object (default: 2)
    pub frames_per_object: usize,

    /// Nodes per frame (default: 2)
    pub nodes_per_frame: usize,

    /// Pose jitter standard deviation in meters / radians (default: 0.01)
    pub jitter_std: f64,
}

impl Default for ClientLayout {
    fn default() -> Self {
        Self {
            objects: 3,
            frames_per_object: 2,
            nodes_per_frame: 2,
            jitter_std: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedObject {
    name: String,
    position: Vector3<f64>,
    heading: f64,
    needs_correction: bool,
    deactivated: bool,
    /// Content was removed from the mirror; re-registered on the next tick
    needs_register: bool,

    /// World anchor the object was handed to
    world: Option<String>,
}

impl TrackedObject {
    fn pose(&self) -> Matrix4<f64> {
        translation(self.position.x, self.position.y, self.position.z) * rotation_y(self.heading)
    }

    /// Object pose update, followed by a reparent when the object lives
    /// under a world anchor (a pose update alone puts it back under the root).
    fn pose_updates(&self) -> Vec<SpatialUpdate> {
        let mut updates = vec![SpatialUpdate::object(&self.name, &self.pose(), self.needs_correction)];
        if let Some(world) = &self.world {
            updates.push(SpatialUpdate::Reparent {
                object: self.name.clone(),
                world: world.clone(),
            });
        }
        updates
    }
}

/// A simulated AR client.
pub struct SimClient {
    id: usize,
    rng: ChaCha8Rng,
    jitter: Normal<f64>,
    layout: ClientLayout,
    objects: Vec<TrackedObject>,
}

impl SimClient {
    /// Creates a client with objects scattered within 10m of the origin.
    pub fn new(id: usize, seed: u64, layout: ClientLayout) -> Result<Self, SimError> {
        let jitter = Normal::new(0.0, layout.jitter_std).map_err(SimError::config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let objects = (0..layout.objects)
            .map(|i| TrackedObject {
                name: format!("client{id}_obj{i}"),
                position: Vector3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(0.0..2.0),
                    rng.gen_range(-10.0..10.0),
                ),
                heading: rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
                needs_correction: i % 2 == 0,
                deactivated: false,
                needs_register: false,
                world: None,
            })
            .collect();

        Ok(Self {
            id,
            rng,
            jitter,
            layout,
            objects,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Name of this client's world anchor object.
    pub fn world_name(&self) -> String {
        format!("client{}_world", self.id)
    }

    /// Names of this client's tracked objects.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name.as_str())
    }

    fn frame_name(f: usize) -> String {
        format!("frame{f}")
    }

    fn node_name(n: usize) -> String {
        format!("node{n}")
    }

    /// Updates announcing the world anchor and every object with its content.
    pub fn register(&mut self) -> Vec<SpatialUpdate> {
        let mut updates = vec![SpatialUpdate::object(self.world_name(), &Matrix4::identity(), false)];
        for index in 0..self.objects.len() {
            updates.extend(self.register_object(index));
        }
        updates
    }

    fn register_object(&mut self, index: usize) -> Vec<SpatialUpdate> {
        let object = &mut self.objects[index];
        object.needs_register = false;

        let mut updates = object.pose_updates();
        for f in 0..self.layout.frames_per_object {
            updates.push(SpatialUpdate::Frame {
                object: object.name.clone(),
                frame: Self::frame_name(f),
                matrix: to_flat(&translation(0.1 * f as f64, 0.0, 0.0)),
                payload: Some(serde_json::json!({ "client": self.id, "frame": f })),
            });
            for n in 0..self.layout.nodes_per_frame {
                updates.push(SpatialUpdate::Node {
                    object: object.name.clone(),
                    frame: Self::frame_name(f),
                    node: Self::node_name(n),
                    matrix: to_flat(&translation(0.0, 0.05 * n as f64, 0.0)),
                });
            }
        }
        updates
    }

    /// One tick of tracking: jittered object poses and node poses.
    ///
    /// Objects removed by an earlier churn tick are re-registered instead.
    pub fn pose_updates(&mut self) -> Vec<SpatialUpdate> {
        let mut updates = Vec::new();

        for index in 0..self.objects.len() {
            if self.objects[index].needs_register {
                updates.extend(self.register_object(index));
                continue;
            }

            let dx = self.jitter.sample(&mut self.rng);
            let dy = self.jitter.sample(&mut self.rng);
            let dz = self.jitter.sample(&mut self.rng);
            let dh = self.jitter.sample(&mut self.rng);

            let object = &mut self.objects[index];
            object.position += Vector3::new(dx, dy, dz);
            object.heading += dh;
            updates.extend(object.pose_updates());

            let name = object.name.clone();
            for f in 0..self.layout.frames_per_object {
                for n in 0..self.layout.nodes_per_frame {
                    let offset = self.jitter.sample(&mut self.rng);
                    updates.push(SpatialUpdate::Pose {
                        object: name.clone(),
                        frame: Self::frame_name(f),
                        node: Self::node_name(n),
                        matrix: to_flat(&translation(0.0, 0.05 * n as f64 + offset, 0.0)),
                        x: self.rng.gen_range(0.0..1920.0),
                        y: self.rng.gen_range(0.0..1080.0),
                        scale: 1.0 + offset,
                    });
                }
            }
        }

        updates
    }

    /// Structural churn: frame removals, object removals, activation toggles.
    pub fn churn_updates(&mut self) -> Vec<SpatialUpdate> {
        let mut updates = Vec::new();
        if self.objects.is_empty() {
            return updates;
        }

        let index = self.rng.gen_range(0..self.objects.len());
        let roll: f64 = self.rng.gen();
        let object = &mut self.objects[index];
        if object.needs_register {
            return updates;
        }

        if roll < 0.05 {
            // A re-registered object starts out active, under the root
            object.needs_register = true;
            object.deactivated = false;
            object.world = None;
            updates.push(SpatialUpdate::Remove {
                object: object.name.clone(),
                frame: None,
            });
        } else if roll < 0.15 && self.layout.frames_per_object > 0 {
            let frame = self.rng.gen_range(0..self.layout.frames_per_object);
            // The frame comes back with the next full registration
            object.needs_register = true;
            updates.push(SpatialUpdate::Remove {
                object: object.name.clone(),
                frame: Some(Self::frame_name(frame)),
            });
        } else if roll < 0.30 {
            object.deactivated = !object.deactivated;
            let update = if object.deactivated {
                SpatialUpdate::Deactivate { object: object.name.clone(), frame: None }
            } else {
                SpatialUpdate::Activate { object: object.name.clone(), frame: None }
            };
            updates.push(update);
        }

        updates
    }

    /// Moves one of this client's objects under a randomly chosen world anchor.
    ///
    /// The client keeps re-asserting the anchor with every later pose update.
    pub fn handoff_update(&mut self, worlds: &[String]) -> Option<SpatialUpdate> {
        let world = worlds.choose(&mut self.rng)?.clone();
        let object = self.objects.choose_mut(&mut self.rng)?;
        if object.needs_register {
            return None;
        }
        object.world = Some(world.clone());
        Some(SpatialUpdate::Reparent {
            object: object.name.clone(),
            world,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SimClient::new(0, 7, ClientLayout::default()).unwrap();
        let mut b = SimClient::new(0, 7, ClientLayout::default()).unwrap();

        assert_eq!(a.register(), b.register());
        for _ in 0..5 {
            assert_eq!(a.pose_updates(), b.pose_updates());
            assert_eq!(a.churn_updates(), b.churn_updates());
        }
    }

    #[test]
    fn test_register_covers_layout() {
        let layout = ClientLayout {
            objects: 2,
            frames_per_object: 3,
            nodes_per_frame: 1,
            jitter_std: 0.0,
        };
        let mut client = SimClient::new(4, 1, layout).unwrap();
        let updates = client.register();

        // world + 2 × (object + 3 × (frame + node))
        assert_eq!(updates.len(), 1 + 2 * (1 + 3 * 2));
        assert_eq!(client.world_name(), "client4_world");
        assert_eq!(client.object_names().count(), 2);
    }

    #[test]
    fn test_handed_off_object_stays_under_world() {
        let mut client = SimClient::new(0, 3, ClientLayout::default()).unwrap();
        let mut graph = scenemirror_core::SceneGraph::new();
        for update in client.register() {
            update.apply(&mut graph);
        }

        let worlds = vec![client.world_name()];
        let handoff = client.handoff_update(&worlds).unwrap();
        assert!(handoff.apply(&mut graph));
        let SpatialUpdate::Reparent { object, .. } = &handoff else {
            panic!("expected a reparent, got {}", handoff.kind());
        };

        // Pose updates re-root the object, then re-assert the anchor
        for update in client.pose_updates() {
            update.apply(&mut graph);
        }
        let id = graph.keys().object_key(object);
        assert_eq!(graph.get(&id).unwrap().parent(), Some(worlds[0].as_str()));
    }

    #[test]
    fn test_negative_jitter_is_rejected() {
        let layout = ClientLayout {
            jitter_std: -1.0,
            ..Default::default()
        };
        assert!(matches!(SimClient::new(0, 0, layout), Err(SimError::Config(_))));
    }
}
