//! Error types for geometry, material and project operations.
//!
//! Errors fall into a few families:
//! - **Geometry**: empty or malformed meshes handed to an operation
//! - **I/O**: files that cannot be read, written or parsed
//! - **Materials**: libraries whose coefficient arrays disagree with their bands
//! - **Session**: actions requested before the state they need exists
//!
//! None of these are fatal to the process. Callers recover at the nearest
//! operation boundary, usually by logging through a [`crate::report::Reporter`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Mesh has no vertices or no faces
    #[error("Empty mesh")]
    EmptyMesh,

    /// Mesh data is structurally invalid (e.g. a face refers to a missing vertex)
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Enclosure padding must be a finite, non-negative fraction
    #[error("Invalid enclosure padding {0}")]
    InvalidPadding(f64),

    /// File system error, with the path that caused it
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed JSON in a project or material library
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wavefront OBJ could not be loaded
    #[error("Failed to load OBJ {path}: {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// STL or PLY content that cannot be read as a mesh
    #[error("Failed to parse mesh {path}: {message}")]
    MeshParse { path: PathBuf, message: String },

    /// Mesh file extension with no reader
    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Band layout problem in a material library
    #[error("Material '{material}' has {found} {field} values but the library declares {expected} bands")]
    MaterialBands {
        material: String,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    /// Absorption and scattering coefficients live in [0, 1]
    #[error("Material '{material}' has {field} coefficient {value} outside [0, 1]")]
    InvalidCoefficient {
        material: String,
        field: &'static str,
        value: f64,
    },

    /// Band centres must be positive and strictly increasing
    #[error("Invalid frequency bands: {0}")]
    InvalidBands(String),

    /// Interpolation between band sets failed
    #[error("Band resampling failed: {0}")]
    Resample(String),

    #[error("Unknown part '{0}'")]
    UnknownPart(String),

    #[error("Unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("No mesh loaded")]
    NoMesh,

    #[error("No material library loaded")]
    NoMaterialLibrary,

    #[error("No part selected")]
    NoSelection,

    /// Save requested before the project was given a file name
    #[error("Project has no file name yet")]
    NoProjectPath,

    /// Project file declares a version this build cannot read
    #[error("Unsupported project version {0}")]
    UnsupportedVersion(u32),
}

impl Error {
    /// Wraps an [`io::Error`] together with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
