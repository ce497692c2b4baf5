//! Entity addressing - turning (object, frame, node) paths into unique keys.
//!
//! The graph itself only needs keys that are deterministic, collision-free
//! across distinct paths, and stable for the process lifetime. Deployments
//! that already have a key format plug it in through [`KeyScheme`].

/// Unique string key of an entity in the graph.
pub type EntityId = String;

/// Reserved ID of the graph root.
pub const ROOT_ID: &str = "ROOT";

/// Reserved ID of the camera anchor.
pub const CAMERA_ID: &str = "CAMERA";

/// Reserved ID of the ground-plane anchor.
pub const GROUND_PLANE_ID: &str = "GROUNDPLANE";

/// Suffix appended to a parent ID to name its coordinate-correction child.
///
/// `#` is escaped by [`DefaultKeyScheme`], so no path key ends in an
/// unescaped suffix.
pub const CORRECTION_SUFFIX: &str = "#rotateX";

/// Returns true for the IDs no update source may claim.
pub fn is_reserved(id: &str) -> bool {
    id == ROOT_ID || id == CAMERA_ID || id == GROUND_PLANE_ID
}

/// Returns true if `id` names a coordinate-correction node, i.e. it ends in
/// [`CORRECTION_SUFFIX`] and the `#` is not escaped.
pub fn is_correction(id: &str) -> bool {
    match id.strip_suffix(CORRECTION_SUFFIX) {
        Some(prefix) => prefix.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0,
        None => false,
    }
}

/// ID of the coordinate-correction child of `parent`.
pub fn correction_id(parent: &str) -> EntityId {
    format!("{parent}{CORRECTION_SUFFIX}")
}

/// A 1–3 segment entity path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityPath<'a> {
    /// A tracked object
    Object(&'a str),

    /// A frame attached to an object
    Frame(&'a str, &'a str),

    /// A node inside a frame
    Node(&'a str, &'a str, &'a str),
}

impl<'a> EntityPath<'a> {
    /// Builds a path from optional trailing segments.
    pub fn new(object: &'a str, frame: Option<&'a str>, node: Option<&'a str>) -> Self {
        match (frame, node) {
            (Some(frame), Some(node)) => EntityPath::Node(object, frame, node),
            (Some(frame), None) => EntityPath::Frame(object, frame),
            _ => EntityPath::Object(object),
        }
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        match self {
            EntityPath::Object(..) => 1,
            EntityPath::Frame(..) => 2,
            EntityPath::Node(..) => 3,
        }
    }
}

/// Deterministic path → key construction.
pub trait KeyScheme: Send + Sync {
    /// Key of an object.
    fn object_key(&self, object: &str) -> EntityId;

    /// Key of a frame.
    fn frame_key(&self, object: &str, frame: &str) -> EntityId;

    /// Key of a node.
    fn node_key(&self, object: &str, frame: &str, node: &str) -> EntityId;

    /// Key of any path.
    fn key(&self, path: &EntityPath<'_>) -> EntityId {
        match *path {
            EntityPath::Object(object) => self.object_key(object),
            EntityPath::Frame(object, frame) => self.frame_key(object, frame),
            EntityPath::Node(object, frame, node) => self.node_key(object, frame, node),
        }
    }
}

/// Escapes `\`, `/` and `#` inside each segment and joins segments with `/`.
///
/// Escaping makes the join injective, so distinct paths never share a key,
/// and keeps `#` free for synthetic correction IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyScheme;

impl DefaultKeyScheme {
    fn escape(segment: &str, out: &mut String) {
        for ch in segment.chars() {
            if matches!(ch, '\\' | '/' | '#') {
                out.push('\\');
            }
            out.push(ch);
        }
    }

    fn join(segments: &[&str]) -> EntityId {
        let mut key = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                key.push('/');
            }
            Self::escape(segment, &mut key);
        }
        key
    }
}

impl KeyScheme for DefaultKeyScheme {
    fn object_key(&self, object: &str) -> EntityId {
        Self::join(&[object])
    }

    fn frame_key(&self, object: &str, frame: &str) -> EntityId {
        Self::join(&[object, frame])
    }

    fn node_key(&self, object: &str, frame: &str, node: &str) -> EntityId {
        Self::join(&[object, frame, node])
    }
}
