//! Mesh file readers.
//!
//! The format is picked from the file extension:
//! - `.obj`: Wavefront OBJ through tobj, polygons triangulated
//! - `.stl`: ASCII or binary STL
//! - `.ply`: ASCII or binary PLY through ply-rs, polygons fan-triangulated
//!
//! Readers return the raw triangle data. Welding and cleanup happen in
//! [`crate::geom::Mesh::from_file`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::error::{Error, Result};
use crate::geom::Mesh;


/// Binary STL header size in bytes.
const STL_HEADER_SIZE: usize = 80;
/// One binary STL triangle: normal, three vertices, attribute count.
const STL_TRIANGLE_SIZE: usize = 50;

/// Mesh file formats that can be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Stl,
    Ply,
}

impl MeshFormat {
    /// Format for the extension of `path`, ignoring case.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(MeshFormat::Obj),
            "stl" => Some(MeshFormat::Stl),
            "ply" => Some(MeshFormat::Ply),
            _ => None,
        }
    }
}

/// Reads the triangles in `path` without any cleanup.
pub fn load(path: impl AsRef<Path>) -> Result<Mesh> {
    let path = path.as_ref();
    match MeshFormat::from_path(path) {
        Some(MeshFormat::Obj) => load_obj(path),
        Some(MeshFormat::Stl) => load_stl(path),
        Some(MeshFormat::Ply) => load_ply(path),
        None => Err(Error::UnsupportedFormat(path.to_path_buf())),
    }
}

fn parse_error(path: &Path, message: impl Into<String>) -> Error {
    Error::MeshParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// All objects in the file concatenated into one mesh.
fn load_obj(path: &Path) -> Result<Mesh> {
    let options = tobj::LoadOptions {
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    };
    let (models, _) = tobj::load_obj(path, &options).map_err(|source| Error::ObjLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let mut mesh = Mesh::new();
    for model in &models {
        let m = &model.mesh;
        let offset = mesh.vertices.len();
        mesh.vertices.extend(
            m.positions
                .chunks_exact(3)
                .map(|p| Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)),
        );
        mesh.faces.extend(m.indices.chunks_exact(3).map(|f| {
            [
                offset + f[0] as usize,
                offset + f[1] as usize,
                offset + f[2] as usize,
            ]
        }));
    }
    Ok(mesh)
}

fn load_stl(path: &Path) -> Result<Mesh> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(STL_HEADER_SIZE)]);
    if head.trim_start().starts_with("solid") && !is_binary_stl(&bytes) {
        load_stl_ascii(path, &bytes)
    } else {
        load_stl_binary(path, &bytes)
    }
}

/// Binary STL whose size matches its declared triangle count. Binary files
/// may start with "solid" too, so the size decides.
fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < STL_HEADER_SIZE + 4 {
        return false;
    }
    let count = stl_triangle_count(bytes) as usize;
    bytes.len() == STL_HEADER_SIZE + 4 + count * STL_TRIANGLE_SIZE
}

fn stl_triangle_count(bytes: &[u8]) -> u32 {
    let h = STL_HEADER_SIZE;
    u32::from_le_bytes([bytes[h], bytes[h + 1], bytes[h + 2], bytes[h + 3]])
}

fn read_f32(buf: &[u8]) -> f64 {
    f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

fn load_stl_binary(path: &Path, bytes: &[u8]) -> Result<Mesh> {
    if bytes.len() < STL_HEADER_SIZE + 4 {
        return Err(parse_error(path, "file too small to be binary STL"));
    }
    let count = stl_triangle_count(bytes) as usize;
    let body = &bytes[STL_HEADER_SIZE + 4..];
    if body.len() < count * STL_TRIANGLE_SIZE {
        return Err(parse_error(
            path,
            format!(
                "binary STL declares {} triangles but holds {}",
                count,
                body.len() / STL_TRIANGLE_SIZE
            ),
        ));
    }

    let mut mesh = Mesh::new();
    for tri in body.chunks_exact(STL_TRIANGLE_SIZE).take(count) {
        let base = mesh.vertices.len();
        // skip the 12-byte normal
        for v in tri[12..48].chunks_exact(12) {
            mesh.vertices
                .push(Point3::new(read_f32(&v[0..4]), read_f32(&v[4..8]), read_f32(&v[8..12])));
        }
        mesh.faces.push([base, base + 1, base + 2]);
    }
    Ok(mesh)
}

fn load_stl_ascii(path: &Path, bytes: &[u8]) -> Result<Mesh> {
    let mut mesh = Mesh::new();
    let mut corners: Vec<Point3<f64>> = Vec::with_capacity(3);

    for (line_no, line) in bytes.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        let mut tokens = line.split_whitespace();
        match tokens.next().map(str::to_ascii_lowercase).as_deref() {
            Some("outer") => corners.clear(),
            Some("vertex") => {
                let mut coord = || -> Result<f64> {
                    tokens
                        .next()
                        .and_then(|t| t.parse::<f64>().ok())
                        .ok_or_else(|| {
                            parse_error(path, format!("bad vertex on line {}", line_no + 1))
                        })
                };
                let p = Point3::new(coord()?, coord()?, coord()?);
                corners.push(p);
            }
            Some("endfacet") => {
                if corners.len() == 3 {
                    let base = mesh.vertices.len();
                    mesh.vertices.append(&mut corners);
                    mesh.faces.push([base, base + 1, base + 2]);
                }
                corners.clear();
            }
            Some("endsolid") => break,
            _ => {}
        }
    }
    Ok(mesh)
}

fn load_ply(path: &Path) -> Result<Mesh> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(&mut reader)
        .map_err(|e| parse_error(path, format!("bad PLY header: {}", e)))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| parse_error(path, format!("bad PLY payload: {}", e)))?;

    let mut mesh = Mesh::new();
    if let Some(vertices) = payload.get("vertex") {
        mesh.vertices.reserve(vertices.len());
        for (i, element) in vertices.iter().enumerate() {
            let coord = |key: &str| {
                float_property(element, key)
                    .ok_or_else(|| parse_error(path, format!("vertex {} has no {}", i, key)))
            };
            mesh.vertices
                .push(Point3::new(coord("x")?, coord("y")?, coord("z")?));
        }
    }
    if let Some(faces) = payload.get("face") {
        for (i, element) in faces.iter().enumerate() {
            let indices = index_list(element)
                .ok_or_else(|| parse_error(path, format!("face {} has no vertex indices", i)))?;
            for k in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[k], indices[k + 1]]);
            }
        }
    }
    Ok(mesh)
}

fn float_property(element: &DefaultElement, key: &str) -> Option<f64> {
    match element.get(key)? {
        Property::Float(v) => Some(f64::from(*v)),
        Property::Double(v) => Some(*v),
        _ => None,
    }
}

/// Face indices under either common property name. Negative indices map to
/// `usize::MAX` so mesh validation rejects them.
fn index_list(element: &DefaultElement) -> Option<Vec<usize>> {
    fn convert<T: Copy>(values: &[T]) -> Vec<usize>
    where
        usize: TryFrom<T>,
    {
        values
            .iter()
            .map(|&v| usize::try_from(v).unwrap_or(usize::MAX))
            .collect()
    }

    ["vertex_indices", "vertex_index"]
        .iter()
        .find_map(|key| match element.get(*key)? {
            Property::ListChar(v) => Some(convert(v)),
            Property::ListUChar(v) => Some(convert(v)),
            Property::ListShort(v) => Some(convert(v)),
            Property::ListUShort(v) => Some(convert(v)),
            Property::ListInt(v) => Some(convert(v)),
            Property::ListUInt(v) => Some(convert(v)),
            _ => None,
        })
}
