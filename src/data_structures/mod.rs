//! Engine data structures: meshes, images, transforms and the scene graph.
//!
//! - `model` contains CPU-side mesh data and vertex layouts
//! - `texture` contains decoded images and the GPU texture wrapper
//! - `instance` holds node transformations
//! - `scene_graph` holds the node set of a running scene

pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
