//! Synthesis of the room enclosure ("Bounds" part).
//!
//! Room models are often open: a floor plan with walls but no ceiling, or a
//! stage set without surrounding walls. A ray tracer needs a closed boundary,
//! so when the loaded geometry is not watertight a padded box is wrapped
//! around it and added as an extra part.
//!
//! The enclosure provides:
//! - A fail-safe watertightness check
//! - Axis-aligned ([`EnclosureMode::Aabb`]) or principal-axis
//!   ([`EnclosureMode::Obb`]) shells with padding relative to the mesh size
//! - Inward-facing normals, since the shell bounds the interior of the room
//! - Replacement (never accumulation) of the bounds part in a part list

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::principal_inertia_transform;
use crate::geom::{Mesh, Part};
use crate::report::Reporter;
use crate::settings::{DEFAULT_PAD_REL, DIAGONAL_EPSILON};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Level, MemoryReporter};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Point3, Vector3};
    use proptest::prelude::*;

    const BOUNDS: &str = "Bounds";

    fn open_box() -> Mesh {
        // a closed box with its lid removed
        let mut mesh = Mesh::cuboid(Point3::new(2.0, 1.0, 0.5), Vector3::new(4.0, 2.0, 1.0));
        mesh.faces.drain(2..4);
        mesh
    }

    fn closed_box() -> Mesh {
        Mesh::cuboid(Point3::origin(), Vector3::new(3.0, 2.0, 1.0))
    }

    fn names(parts: &[Part]) -> Vec<&str> {
        parts.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn watertight_check_is_fail_safe() {
        assert!(!is_watertight(None));
        assert!(!is_watertight(Some(&Mesh::new())));
        assert!(!is_watertight(Some(&open_box())));
        assert!(is_watertight(Some(&closed_box())));

        let broken = Mesh::from_parts(vec![Point3::origin()], vec![[0, 1, 2]]);
        assert!(!is_watertight(Some(&broken)));
    }

    #[test]
    fn zero_pad_aabb_matches_mesh_bounds() {
        let mesh = open_box();
        let shell = make_bounding_shell(&mesh, EnclosureMode::Aabb, 0.0).unwrap();
        let (a, b) = (mesh.bounds().unwrap(), shell.bounds().unwrap());
        assert_relative_eq!(a.min, b.min, epsilon = 1e-12);
        assert_relative_eq!(a.max, b.max, epsilon = 1e-12);
        assert_relative_eq!(a.diagonal(), b.diagonal(), epsilon = 1e-12);
    }

    #[test]
    fn aabb_pad_is_relative_to_diagonal() {
        let mesh = open_box();
        let diag = mesh.bounds().unwrap().diagonal();
        let shell = make_bounding_shell(&mesh, EnclosureMode::Aabb, 0.05).unwrap();
        let expected = Vector3::new(4.0, 2.0, 1.0).add_scalar(2.0 * 0.05 * diag);
        assert_relative_eq!(shell.bounds().unwrap().extents(), expected, epsilon = 1e-12);
        assert_relative_eq!(
            shell.bounds().unwrap().center(),
            Point3::new(2.0, 1.0, 0.5),
            epsilon = 1e-12
        );
    }

    #[test]
    fn shell_normals_point_inward() {
        for mode in [EnclosureMode::Aabb, EnclosureMode::Obb] {
            let shell = make_bounding_shell(&open_box(), mode, 0.1).unwrap();
            assert!(shell.is_watertight());
            assert!(shell.signed_volume() < 0.0, "mode {}", mode);

            // every face normal points toward the shell center
            let center = shell.bounds().unwrap().center();
            for f in 0..shell.num_faces() {
                let [a, b, c] = shell.triangle(f);
                let face_center = Point3::from((a.coords + b.coords + c.coords) / 3.0);
                assert!(shell.face_normal(f).dot(&(center - face_center)) > 0.0);
            }
        }
    }

    #[test]
    fn shell_does_not_touch_input() {
        let mesh = open_box();
        let before = mesh.clone();
        let _ = make_bounding_shell(&mesh, EnclosureMode::Obb, 0.2).unwrap();
        assert_eq!(mesh, before);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let result = make_bounding_shell(&Mesh::new(), EnclosureMode::Aabb, 0.05);
        assert!(matches!(result, Err(Error::EmptyMesh)));
    }

    #[test]
    fn negative_pad_is_rejected() {
        assert!(make_bounding_shell(&open_box(), EnclosureMode::Aabb, -0.1).is_err());
        assert!(make_bounding_shell(&open_box(), EnclosureMode::Aabb, f64::NAN).is_err());
    }

    #[test]
    fn degenerate_mesh_still_gets_a_shell() {
        let point = Mesh::from_parts(vec![Point3::new(1.0, 1.0, 1.0)], vec![]);
        let shell = make_bounding_shell(&point, EnclosureMode::Aabb, 0.5).unwrap();
        let extents = shell.bounds().unwrap().extents();
        assert_relative_eq!(extents, Vector3::repeat(DIAGONAL_EPSILON), epsilon = 1e-15);
    }

    #[test]
    fn obb_is_tighter_for_rotated_slab() {
        // distinct extents so the principal axes are well defined
        let slab = Mesh::cuboid(Point3::origin(), Vector3::new(10.0, 2.0, 1.0));
        let tilt = Isometry3::rotation(Vector3::z() * std::f64::consts::FRAC_PI_4);
        let rotated = slab.transformed(&tilt);

        let aabb = make_bounding_shell(&rotated, EnclosureMode::Aabb, 0.0).unwrap();
        let obb = make_bounding_shell(&rotated, EnclosureMode::Obb, 0.0).unwrap();
        assert!(obb.signed_volume().abs() < aabb.signed_volume().abs());
        assert_relative_eq!(obb.signed_volume(), -20.0, epsilon = 1e-6);
    }

    #[test]
    fn obb_local_bounds_grow_by_pad() {
        // a single open planar quad, tilted out of the world axes
        let quad = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(6.0, 0.0, 0.0),
                Point3::new(6.0, 2.0, 0.0),
                Point3::new(0.0, 2.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let mesh = quad.transformed(&Isometry3::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.3, -0.2, 0.5),
        ));
        let diag = mesh.bounds().unwrap().diagonal();
        let pad = 0.1 * diag;

        let shell = make_bounding_shell(&mesh, EnclosureMode::Obb, 0.1).unwrap();

        let frame = principal_inertia_transform(&mesh);
        let mesh_local = mesh.transformed(&frame.inverse()).bounds().unwrap();
        let shell_local = shell.transformed(&frame.inverse()).bounds().unwrap();
        assert_relative_eq!(shell_local.min, mesh_local.min - Vector3::repeat(pad), epsilon = 1e-9);
        assert_relative_eq!(shell_local.max, mesh_local.max + Vector3::repeat(pad), epsilon = 1e-9);
    }

    #[test]
    fn disabled_enclosure_adds_nothing() {
        let log = MemoryReporter::new();
        let settings = EnclosureSettings {
            enabled: false,
            ..Default::default()
        };
        let mesh = open_box();
        let parts = update_enclosure(
            Some(&mesh),
            vec![Part::new("Part_0", mesh.clone())],
            &settings,
            false,
            BOUNDS,
            &log,
        );
        assert_eq!(names(&parts), vec!["Part_0"]);
    }

    #[test]
    fn disabled_enclosure_still_strips_old_bounds() {
        let log = MemoryReporter::new();
        let settings = EnclosureSettings {
            enabled: false,
            ..Default::default()
        };
        let parts = vec![
            Part::new(BOUNDS, closed_box()),
            Part::new("Part_0", open_box()),
        ];
        let parts = update_enclosure(Some(&open_box()), parts, &settings, false, BOUNDS, &log);
        assert_eq!(names(&parts), vec!["Part_0"]);
    }

    #[test]
    fn watertight_mesh_gets_no_bounds() {
        let log = MemoryReporter::new();
        let mesh = closed_box();
        let parts = update_enclosure(
            Some(&mesh),
            vec![Part::new("Part_0", mesh.clone())],
            &EnclosureSettings::default(),
            false,
            BOUNDS,
            &log,
        );
        assert_eq!(names(&parts), vec!["Part_0"]);
    }

    #[test]
    fn force_adds_bounds_even_when_watertight() {
        let log = MemoryReporter::new();
        let mesh = closed_box();
        let settings = EnclosureSettings {
            enabled: false,
            ..Default::default()
        };
        let parts = update_enclosure(
            Some(&mesh),
            vec![Part::new("Part_0", mesh.clone())],
            &settings,
            true,
            BOUNDS,
            &log,
        );
        assert_eq!(names(&parts), vec!["Part_0", BOUNDS]);
    }

    #[test]
    fn repeated_updates_keep_one_bounds_part() {
        let log = MemoryReporter::new();
        let mesh = open_box();
        let settings = EnclosureSettings::default();
        let once = update_enclosure(
            Some(&mesh),
            vec![Part::new("Part_0", mesh.clone())],
            &settings,
            false,
            BOUNDS,
            &log,
        );
        let twice = update_enclosure(Some(&mesh), once.clone(), &settings, false, BOUNDS, &log);
        assert_eq!(once, twice);
        assert_eq!(twice.iter().filter(|p| p.name == BOUNDS).count(), 1);
    }

    #[test]
    fn shell_failure_is_downgraded_to_warning() {
        let log = MemoryReporter::new();
        let parts = update_enclosure(
            None,
            vec![Part::new("Part_0", open_box())],
            &EnclosureSettings::default(),
            true,
            BOUNDS,
            &log,
        );
        assert_eq!(names(&parts), vec!["Part_0"]);
        assert_eq!(log.messages(Level::Warn).len(), 1);
    }

    #[test]
    fn mode_parsing_is_lenient() {
        assert_eq!(EnclosureMode::from("AABB".to_string()), EnclosureMode::Aabb);
        assert_eq!(EnclosureMode::from("obb".to_string()), EnclosureMode::Obb);
        assert_eq!(EnclosureMode::from("tight".to_string()), EnclosureMode::Obb);
    }

    #[test]
    fn pad_percent_rounds() {
        let mut settings = EnclosureSettings::default();
        assert_eq!(settings.pad_percent(), 5);
        settings.pad = 0.126;
        assert_eq!(settings.pad_percent(), 13);
        settings.pad = 0.125;
        assert_eq!(settings.pad_percent(), 12);
        settings.pad = 0.135;
        assert_eq!(settings.pad_percent(), 14);
        settings.set_pad_percent(20);
        assert_relative_eq!(settings.pad, 0.2);
    }

    fn named(name: &str) -> Part {
        Part::new(name, Mesh::new())
    }

    proptest! {
        #[test]
        fn bounds_always_last(n in 0usize..8, pos in 0usize..8) {
            let mut parts: Vec<Part> = (0..n).map(|i| named(&format!("Part_{}", i))).collect();
            let pos = pos.min(parts.len());
            parts.insert(pos, named(BOUNDS));

            let ordered = reorder_bounds_last(parts, BOUNDS);
            prop_assert_eq!(ordered.last().map(|p| p.name.as_str()), Some(BOUNDS));
            let expected: Vec<String> = (0..n).map(|i| format!("Part_{}", i)).collect();
            let rest: Vec<String> = ordered[..n].iter().map(|p| p.name.clone()).collect();
            prop_assert_eq!(rest, expected);
        }

        #[test]
        fn shell_volume_grows_with_pad(a in 0.0f64..1.0, b in 0.0f64..1.0, obb in any::<bool>()) {
            let mode = if obb { EnclosureMode::Obb } else { EnclosureMode::Aabb };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let mesh = open_box();
            let small = make_bounding_shell(&mesh, mode, lo).unwrap().signed_volume().abs();
            let large = make_bounding_shell(&mesh, mode, hi).unwrap().signed_volume().abs();
            prop_assert!(large >= small * (1.0 - 1e-12));
        }
    }
}

/// How the enclosing box is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EnclosureMode {
    /// World axis-aligned box. Fast, loose for rotated rooms.
    #[default]
    Aabb,
    /// Box aligned with the principal inertia axes of the mesh.
    Obb,
}

impl EnclosureMode {
    /// Label used in menus and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            EnclosureMode::Aabb => "AABB (fast)",
            EnclosureMode::Obb => "OBB (tight)",
        }
    }
}

impl From<String> for EnclosureMode {
    /// Anything other than `"aabb"` selects the oriented box, matching how
    /// project files have always been read.
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("aabb") {
            EnclosureMode::Aabb
        } else {
            EnclosureMode::Obb
        }
    }
}

impl fmt::Display for EnclosureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnclosureMode::Aabb => write!(f, "aabb"),
            EnclosureMode::Obb => write!(f, "obb"),
        }
    }
}

/// User-facing enclosure options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnclosureSettings {
    pub enabled: bool,
    pub mode: EnclosureMode,
    /// Padding as a fraction of the mesh bounding-box diagonal (0.05 = 5%).
    pub pad: f64,
}

impl Default for EnclosureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: EnclosureMode::Aabb,
            pad: DEFAULT_PAD_REL,
        }
    }
}

impl EnclosureSettings {
    /// Padding as a whole percentage, as presented to the user. Halves
    /// round to even.
    pub fn pad_percent(&self) -> u32 {
        (self.pad * 100.0).round_ties_even().max(0.0) as u32
    }

    pub fn set_pad_percent(&mut self, percent: u32) {
        self.pad = percent as f64 / 100.0;
    }
}

/// True if `mesh` is present and closed. Never fails: a missing or
/// malformed mesh is reported as not watertight.
pub fn is_watertight(mesh: Option<&Mesh>) -> bool {
    mesh.is_some_and(Mesh::is_watertight)
}

/// Builds a padded box around `mesh` with inward-facing normals.
///
/// The pad is `pad_rel` times the diagonal of the mesh's axis-aligned
/// bounding box (clamped to [`DIAGONAL_EPSILON`]) and is applied on every
/// side. For [`EnclosureMode::Obb`] the box is built in the principal frame
/// of the mesh and mapped back to world space. The input is never modified.
pub fn make_bounding_shell(mesh: &Mesh, mode: EnclosureMode, pad_rel: f64) -> Result<Mesh> {
    if !pad_rel.is_finite() || pad_rel < 0.0 {
        return Err(Error::InvalidPadding(pad_rel));
    }
    mesh.validate()?;
    let bounds = mesh.bounds().ok_or(Error::EmptyMesh)?;

    let pad = bounds.diagonal().max(DIAGONAL_EPSILON) * pad_rel;

    let mut shell = match mode {
        EnclosureMode::Aabb => {
            let padded = bounds.padded(pad);
            Mesh::cuboid(padded.center(), padded.extents())
        }
        EnclosureMode::Obb => {
            let frame = principal_inertia_transform(mesh);
            let local = mesh.transformed(&frame.inverse());
            let local_bounds = local.bounds().ok_or(Error::EmptyMesh)?.padded(pad);
            let mut shell = Mesh::cuboid(local_bounds.center(), local_bounds.extents());
            shell.transform_mut(&frame);
            shell
        }
    };

    shell.invert_faces();
    Ok(shell)
}

/// Returns `parts` with the enclosure brought up to date.
///
/// Any existing part called `bounds_name` is removed first, so repeated calls
/// replace rather than accumulate. A new shell is appended when `force` is
/// set, or when the enclosure is enabled and `mesh` is not watertight. Shell
/// construction errors are reported as warnings and leave the list without
/// an enclosure.
pub fn update_enclosure(
    mesh: Option<&Mesh>,
    parts: Vec<Part>,
    settings: &EnclosureSettings,
    force: bool,
    bounds_name: &str,
    reporter: &dyn Reporter,
) -> Vec<Part> {
    let mut parts: Vec<Part> = parts.into_iter().filter(|p| p.name != bounds_name).collect();

    if !settings.enabled && !force {
        return parts;
    }
    if !force && is_watertight(mesh) {
        return parts;
    }

    let shell = mesh
        .ok_or(Error::NoMesh)
        .and_then(|m| make_bounding_shell(m, settings.mode, settings.pad));
    match shell {
        Ok(shell) => parts.push(Part::new(bounds_name, shell)),
        Err(e) => reporter.warn(&format!("Enclosure update failed: {}", e)),
    }
    parts
}

/// Stable partition placing the part named `bounds_name` last. Works on
/// owned parts as well as references.
pub fn reorder_bounds_last<P: Borrow<Part>>(parts: Vec<P>, bounds_name: &str) -> Vec<P> {
    let (mut rest, bounds): (Vec<P>, Vec<P>) = parts
        .into_iter()
        .partition(|p| p.borrow().name != bounds_name);
    rest.extend(bounds);
    rest
}
