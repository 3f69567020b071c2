//! Principal inertia frame of a triangulated surface.
//!
//! The frame is used to build oriented enclosures: a mesh expressed in its
//! principal frame has its longest spread along local x, then y, then z, so
//! an axis-aligned box computed there hugs elongated or rotated rooms more
//! tightly than a world-aligned one.
//!
//! The second moments are taken over the surface (area-weighted), not over
//! the vertex cloud, so that tessellation density does not bias the axes.
//! Meshes with no area fall back to the vertex cloud.

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::geom::Mesh;


/// Rigid transform whose rotation columns are the principal axes of `mesh`
/// (largest spread first) and whose translation is its surface centroid.
///
/// The transform maps the local principal frame into world space; its
/// inverse expresses the mesh in the principal frame. Each axis is signed so
/// that its largest component is positive and the third axis completes a
/// right-handed basis, so identical geometry always yields the same frame.
pub fn principal_inertia_transform(mesh: &Mesh) -> Isometry3<f64> {
    let (centroid, covariance) =
        surface_moments(mesh).unwrap_or_else(|| vertex_moments(mesh));

    let rotation = principal_axes(&covariance);
    Isometry3::from_parts(
        Translation3::from(centroid.coords),
        UnitQuaternion::from_rotation_matrix(&rotation),
    )
}

/// Area-weighted centroid and covariance of the surface, or `None` if the
/// surface has no area.
fn surface_moments(mesh: &Mesh) -> Option<(Point3<f64>, Matrix3<f64>)> {
    let mut total_area = 0.0;
    let mut first = Vector3::zeros();
    let mut second = Matrix3::zeros();

    for face in 0..mesh.num_faces() {
        let [a, b, c] = mesh.triangle(face).map(|p| p.coords);
        let area = 0.5 * (b - a).cross(&(c - a)).norm();
        if area <= f64::EPSILON {
            continue;
        }
        let sum = a + b + c;
        total_area += area;
        first += sum * (area / 3.0);
        // exact second moment of a uniform triangle about the origin
        second += (a * a.transpose() + b * b.transpose() + c * c.transpose() + sum * sum.transpose())
            * (area / 12.0);
    }

    if total_area <= f64::EPSILON {
        return None;
    }
    let centroid = first / total_area;
    let covariance = second / total_area - centroid * centroid.transpose();
    Some((Point3::from(centroid), covariance))
}

fn vertex_moments(mesh: &Mesh) -> (Point3<f64>, Matrix3<f64>) {
    let Some(centroid) = mesh.centroid() else {
        return (Point3::origin(), Matrix3::zeros());
    };
    let covariance = mesh
        .vertices
        .iter()
        .map(|v| {
            let d = v - centroid;
            d * d.transpose()
        })
        .sum::<Matrix3<f64>>()
        / mesh.num_vertices() as f64;
    (centroid, covariance)
}

fn principal_axes(covariance: &Matrix3<f64>) -> Rotation3<f64> {
    if covariance.iter().all(|v| v.abs() <= f64::EPSILON) {
        return Rotation3::identity();
    }

    let eigen = covariance.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    // descending eigenvalue; ties keep the solver's order
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

    let x = canonical_sign(eigen.eigenvectors.column(order[0]).into_owned());
    let y = canonical_sign(eigen.eigenvectors.column(order[1]).into_owned());
    let z = x.cross(&y);

    Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z.normalize()]))
}

/// Flips `axis` so that its component of largest magnitude is positive.
fn canonical_sign(axis: Vector3<f64>) -> Vector3<f64> {
    let largest = axis.iamax();
    if axis[largest] < 0.0 {
        -axis
    } else {
        axis
    }
}
