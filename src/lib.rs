//! Preparation of room geometry and acoustic materials for ray-traced room
//! acoustics.
//!
//! A mesh is loaded from an OBJ, STL or PLY file and split into connected
//! parts. If the mesh does not enclose a volume, a padded box (the "Bounds"
//! part) is synthesized around it with inward-facing normals. Parts are then
//! assigned materials from a JSON library, and the result is stored as a
//! project file that a simulator can pick up.

pub mod bands;
pub mod enclosure;
pub mod error;
pub mod frame;
pub mod geom;
pub mod material;
pub mod mesh_io;
pub mod project;
pub mod project_file;
pub mod report;
pub mod session;
pub mod settings;
pub mod viewer;

pub use error::{Error, Result};
