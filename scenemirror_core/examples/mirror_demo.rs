//! Mirror Demo - two clients, one world anchor, one synced replica
//! ===============================================================
//!
//! Demonstrates:
//! - Objects, frames and nodes reported by two AR clients
//! - Coordinate correction below a point-tracked object
//! - Handing an object to another client's world anchor
//! - Bootstrapping a second graph from a JSON snapshot
//!
//! Run:
//! ```bash
//! cargo run --example mirror_demo
//! ```

use scenemirror_core::coords::{rotation_y, translation, translation_of};
use scenemirror_core::{GraphError, SceneGraph};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn main() -> Result<(), GraphError> {
    let mut graph = SceneGraph::new();

    let mutations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&mutations);
    graph.on_mutation(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    // Client A: a poster tracked as an image target
    graph.add_object("poster", Some(translation(2.0, 1.5, -3.0)), true);
    graph.add_frame("poster", "front", Some(serde_json::json!({ "client": "A" })), None);
    graph.add_node("poster", "front", "label", None, Some(translation(0.0, 0.2, 0.0)));

    // Client B: its world anchor and a mug on a table
    graph.add_object("b_world", Some(rotation_y(0.5)), false);
    graph.add_object("mug", Some(translation(0.5, 0.8, 0.0)), false);

    let label = graph.keys().node_key("poster", "front", "label");
    let mug = graph.keys().object_key("mug");
    println!("label -> mug: {:.3} m", graph.distance_between(&label, &mug));

    // The mug is now expressed in client B's world
    graph.reparent_object_to_world("mug", "b_world");
    if let Some(world) = graph.world_position("mug", None, None) {
        println!("mug world position: {:?}", translation_of(&world));
    }
    println!("label -> mug: {:.3} m", graph.distance_between(&label, &mug));

    // A replica bootstrapped from the wire format sees the same geometry
    let json = graph.export_snapshot_json()?;
    let mut replica = SceneGraph::new();
    let created = replica.import_snapshot_json(&json)?;
    println!(
        "replica: {} entities from {} bytes, label -> mug: {:.3} m",
        created,
        json.len(),
        replica.distance_between(&label, &mug)
    );

    println!("stats: {:?}", graph.stats());
    println!("mutations observed: {}", mutations.load(Ordering::Relaxed));
    Ok(())
}
