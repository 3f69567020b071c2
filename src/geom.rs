use std::collections::{HashMap, HashSet};
use std::path::Path;

use nalgebra::{Isometry3, Point3, Vector3};

use crate::error::{Error, Result};
use crate::mesh_io;
use crate::settings::VERTEX_MERGE_DISTANCE;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    /// Two unit squares side by side in the z = 0 plane, sharing the edge x = 1.
    fn open_strip() -> Mesh {
        Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [1, 4, 5], [1, 5, 2]],
        )
    }

    fn write_obj(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn cuboid_is_closed_and_outward() {
        let cube = Mesh::cuboid(Point3::new(1.0, 2.0, 3.0), Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(cube.num_vertices(), 8);
        assert_eq!(cube.num_faces(), 12);
        assert!(cube.is_watertight());
        assert_relative_eq!(cube.signed_volume(), 48.0, epsilon = 1e-9);
        assert_relative_eq!(cube.area(), 2.0 * (8.0 + 12.0 + 24.0), epsilon = 1e-9);

        let bounds = cube.bounds().unwrap();
        assert_relative_eq!(bounds.min, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(bounds.max, Point3::new(2.0, 4.0, 6.0), epsilon = 1e-12);
    }

    #[test]
    fn invert_faces_flips_volume_sign() {
        let mut cube = Mesh::cuboid(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        cube.invert_faces();
        assert_relative_eq!(cube.signed_volume(), -1.0, epsilon = 1e-9);
        assert!(cube.is_watertight());
    }

    #[test]
    fn open_strip_is_not_watertight() {
        let strip = open_strip();
        assert!(!strip.is_watertight());
        assert_eq!(strip.edges_unique().len(), 9);
        assert_relative_eq!(strip.area(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_face_is_invalid() {
        let mesh = Mesh::from_parts(vec![Point3::origin(); 3], vec![[0, 1, 7]]);
        assert!(mesh.validate().is_err());
        assert!(!mesh.is_watertight());
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        assert!(Mesh::new().bounds().is_none());
        assert!(!Mesh::new().is_watertight());
    }

    #[test]
    fn aabb_padding_and_diagonal() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(aabb.diagonal(), 5.0);
        let padded = aabb.padded(0.5);
        assert_relative_eq!(padded.extents(), Vector3::new(4.0, 5.0, 1.0));
        assert_relative_eq!(padded.center(), aabb.center());
    }

    #[test]
    fn transform_round_trip() {
        let strip = open_strip();
        let iso = Isometry3::new(Vector3::new(1.0, -2.0, 0.5), Vector3::new(0.3, 0.2, 0.1));
        let moved = strip.transformed(&iso);
        let back = moved.transformed(&iso.inverse());
        for (a, b) in strip.vertices.iter().zip(back.vertices.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
        assert_relative_eq!(moved.area(), strip.area(), epsilon = 1e-12);
    }

    #[test]
    fn weld_joins_duplicate_vertices() {
        // the same strip, but each square carries its own copy of the shared edge
        let mut mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [4, 5, 6], [4, 6, 7]],
        );
        assert_eq!(mesh.split().len(), 2);

        let merged = mesh.merge_vertices(VERTEX_MERGE_DISTANCE);
        assert_eq!(merged, 2);
        mesh.remove_unreferenced_vertices();
        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(mesh.split().len(), 1);
    }

    #[test]
    fn process_drops_degenerate_and_duplicate_faces() {
        let mut mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(9.0, 9.0, 9.0),
            ],
            vec![[0, 1, 2], [1, 2, 0], [0, 0, 1], [0, 1, 3]],
        );
        mesh.process();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.num_vertices(), 3);
    }

    #[test]
    fn split_separates_disjoint_boxes() {
        let a = Mesh::cuboid(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Mesh::cuboid(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 2.0, 1.0));
        let mut combined = a.clone();
        combined.append(&b);

        let parts = combined.split();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].num_faces(), 12);
        assert_relative_eq!(parts[0].signed_volume(), 1.0, epsilon = 1e-9);
        assert!(parts.iter().all(|p| p.is_watertight()));
        assert_relative_eq!(parts[1].signed_volume(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn load_obj_concatenates_objects() {
        let file = write_obj(
            "o first\n\
             v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             f 1 2 3 4\n\
             o second\n\
             v 5 0 0\nv 6 0 0\nv 6 1 0\n\
             f 5 6 7\n",
        );
        let mesh = Mesh::from_file(file.path()).unwrap();
        assert_eq!(mesh.num_faces(), 3);
        assert_eq!(mesh.num_vertices(), 7);
        assert_eq!(mesh.split().len(), 2);
    }

    #[test]
    fn load_obj_without_faces_is_empty() {
        let file = write_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\n");
        assert!(matches!(Mesh::from_file(file.path()), Err(Error::EmptyMesh)));
    }

    #[test]
    fn load_missing_obj_fails() {
        let result = Mesh::from_file("definitely/not/here.obj");
        assert!(matches!(result, Err(Error::ObjLoad { .. })));
    }

    #[test]
    fn parts_are_named_in_order() {
        let parts = Part::from_components(vec![open_strip(), open_strip()]);
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Part_0", "Part_1"]);
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or `None` for an empty set.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((*first, *first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        });
        Some(Self { min, max })
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths along x, y and z.
    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f64 {
        self.extents().norm()
    }

    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// Grows the box by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Self {
        let pad = Vector3::repeat(pad);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }
}

/// A triangulated surface: vertex positions plus counter-clockwise index triples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Loads an OBJ, STL or PLY file, chosen by extension. All objects in
    /// the file are concatenated into one mesh, polygons are triangulated
    /// and the result is cleaned with [`Mesh::process`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Mesh> {
        let mut mesh = mesh_io::load(path)?;

        mesh.validate()?;
        mesh.process();

        if mesh.is_empty() {
            return Err(Error::EmptyMesh);
        }
        Ok(mesh)
    }

    /// Axis-aligned box with the given center and edge lengths, wound so
    /// that normals point outward.
    pub fn cuboid(center: Point3<f64>, extents: Vector3<f64>) -> Mesh {
        let h = extents / 2.0;
        let corners = [
            Vector3::new(-h.x, -h.y, -h.z),
            Vector3::new(h.x, -h.y, -h.z),
            Vector3::new(h.x, h.y, -h.z),
            Vector3::new(-h.x, h.y, -h.z),
            Vector3::new(-h.x, -h.y, h.z),
            Vector3::new(h.x, -h.y, h.z),
            Vector3::new(h.x, h.y, h.z),
            Vector3::new(-h.x, h.y, h.z),
        ];
        let vertices = corners.iter().map(|c| center + c).collect();
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2], // -z
            [4, 5, 6],
            [4, 6, 7], // +z
            [0, 1, 5],
            [0, 5, 4], // -y
            [3, 7, 6],
            [3, 6, 2], // +y
            [0, 4, 7],
            [0, 7, 3], // -x
            [1, 2, 6],
            [1, 6, 5], // +x
        ];
        Mesh { vertices, faces }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Checks that every face refers to existing vertices.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        match self.faces.iter().position(|f| f.iter().any(|&i| i >= n)) {
            Some(face) => Err(Error::InvalidMesh(format!(
                "face {} refers to a vertex outside 0..{}",
                face, n
            ))),
            None => Ok(()),
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    /// Appends another mesh, offsetting its face indices.
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
    }

    pub fn triangle(&self, face: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Unit normal following the winding of `face`. Zero for degenerate faces.
    pub fn face_normal(&self, face: usize) -> Vector3<f64> {
        let [a, b, c] = self.triangle(face);
        (b - a)
            .cross(&(c - a))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn face_area(&self, face: usize) -> f64 {
        let [a, b, c] = self.triangle(face);
        0.5 * (b - a).cross(&(c - a)).norm()
    }

    pub fn area(&self) -> f64 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume. Positive when a closed surface is wound with
    /// outward normals, negative when the normals point inward.
    pub fn signed_volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (
                    self.vertices[a].coords,
                    self.vertices[b].coords,
                    self.vertices[c].coords,
                );
                a.dot(&b.cross(&c))
            })
            .sum::<f64>()
            / 6.0
    }

    /// Mean of the vertex positions.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.vertices.iter().map(|v| v.coords).sum();
        Some(Point3::from(sum / self.vertices.len() as f64))
    }

    pub fn transform_mut(&mut self, transform: &Isometry3<f64>) {
        for v in &mut self.vertices {
            *v = transform * *v;
        }
    }

    pub fn transformed(&self, transform: &Isometry3<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform_mut(transform);
        mesh
    }

    /// Reverses the winding of every face, flipping all normals.
    pub fn invert_faces(&mut self) {
        for face in &mut self.faces {
            face.reverse();
        }
    }

    /// Number of faces using each undirected edge, keyed `(low, high)`.
    fn edge_face_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts = HashMap::new();
        for &[a, b, c] in &self.faces {
            for edge in [sorted_edge(a, b), sorted_edge(b, c), sorted_edge(c, a)] {
                *counts.entry(edge).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Unique undirected edges, sorted.
    pub fn edges_unique(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<_> = self.edge_face_counts().into_keys().collect();
        edges.sort_unstable();
        edges
    }

    /// True when every edge is shared by exactly two faces. Malformed or
    /// empty meshes are never watertight.
    pub fn is_watertight(&self) -> bool {
        if self.is_empty() || self.validate().is_err() {
            return false;
        }
        self.edge_face_counts().values().all(|&n| n == 2)
    }

    /// Merges vertices closer than `epsilon`, returning how many were merged.
    /// Faces that collapse as a result are removed.
    pub fn merge_vertices(&mut self, epsilon: f64) -> usize {
        if self.vertices.is_empty() || epsilon <= 0.0 {
            return 0;
        }
        let cell_size = epsilon * 2.0;
        let cell_of = |p: &Point3<f64>| {
            (
                (p.x / cell_size).floor() as i64,
                (p.y / cell_size).floor() as i64,
                (p.z / cell_size).floor() as i64,
            )
        };

        let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, v) in self.vertices.iter().enumerate() {
            grid.entry(cell_of(v)).or_default().push(i);
        }

        let mut remap: Vec<usize> = (0..self.vertices.len()).collect();
        let mut merged = 0;
        for (i, v) in self.vertices.iter().enumerate() {
            if remap[i] != i {
                continue;
            }
            let (cx, cy, cz) = cell_of(v);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                            continue;
                        };
                        for &j in candidates {
                            if j > i && remap[j] == j && (self.vertices[j] - v).norm() < epsilon {
                                remap[j] = i;
                                merged += 1;
                            }
                        }
                    }
                }
            }
        }

        if merged > 0 {
            for face in &mut self.faces {
                for i in face.iter_mut() {
                    *i = remap[*i];
                }
            }
            self.remove_degenerate_faces();
        }
        merged
    }

    /// Removes faces with repeated indices or zero area.
    pub fn remove_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let vertices = &self.vertices;
        self.faces.retain(|&[a, b, c]| {
            a != b
                && b != c
                && a != c
                && (vertices[b] - vertices[a])
                    .cross(&(vertices[c] - vertices[a]))
                    .norm()
                    > f64::EPSILON
        });
        before - self.faces.len()
    }

    /// Removes faces that use the same three vertices as an earlier face,
    /// regardless of winding.
    pub fn remove_duplicate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let mut seen = HashSet::new();
        self.faces.retain(|f| {
            let mut key = *f;
            key.sort_unstable();
            seen.insert(key)
        });
        before - self.faces.len()
    }

    /// Drops vertices no face refers to and compacts the indices.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for face in &mut self.faces {
            for i in face.iter_mut() {
                if remap[*i] == usize::MAX {
                    remap[*i] = vertices.len();
                    vertices.push(self.vertices[*i]);
                }
                *i = remap[*i];
            }
        }
        let removed = self.vertices.len() - vertices.len();
        self.vertices = vertices;
        removed
    }

    /// Welds coincident vertices and removes degenerate, duplicate and
    /// unreferenced elements. Assumes [`Mesh::validate`] passes.
    pub fn process(&mut self) {
        self.merge_vertices(VERTEX_MERGE_DISTANCE);
        self.remove_degenerate_faces();
        self.remove_duplicate_faces();
        self.remove_unreferenced_vertices();
    }

    /// Splits into connected components, where faces are connected when they
    /// share an edge. Components are ordered by their lowest face index and
    /// keep the original face order.
    pub fn split(&self) -> Vec<Mesh> {
        let mut sets = DisjointSet::new(self.faces.len());
        let mut first_face: HashMap<(usize, usize), usize> = HashMap::new();
        for (fi, &[a, b, c]) in self.faces.iter().enumerate() {
            for edge in [sorted_edge(a, b), sorted_edge(b, c), sorted_edge(c, a)] {
                match first_face.get(&edge) {
                    Some(&other) => sets.union(fi, other),
                    None => {
                        first_face.insert(edge, fi);
                    }
                }
            }
        }

        let mut component_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<usize>> = Vec::new();
        for fi in 0..self.faces.len() {
            let root = sets.find(fi);
            let ci = *component_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[ci].push(fi);
        }

        components
            .into_iter()
            .map(|faces| self.submesh(&faces))
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Copies the given faces into a new mesh with compact vertex indices.
    fn submesh(&self, faces: &[usize]) -> Mesh {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let mut mesh = Mesh::new();
        for &fi in faces {
            let mut face = self.faces[fi];
            for i in face.iter_mut() {
                let old = *i;
                *i = *remap.entry(old).or_insert_with(|| {
                    mesh.vertices.push(self.vertices[old]);
                    mesh.vertices.len() - 1
                });
            }
            mesh.faces.push(face);
        }
        mesh
    }
}

fn sorted_edge(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Union-find over face indices, used for component splitting.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // the lower root wins so component roots stay stable
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// A named piece of geometry in a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub mesh: Mesh,
}

impl Part {
    pub fn new(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            mesh,
        }
    }

    /// Names connected components `Part_0`, `Part_1`, ... in order.
    pub fn from_components(components: Vec<Mesh>) -> Vec<Part> {
        components
            .into_iter()
            .enumerate()
            .map(|(i, mesh)| Part::new(format!("Part_{}", i), mesh))
            .collect()
    }
}
