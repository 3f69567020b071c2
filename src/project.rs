//! In-memory state of the project being edited.

use std::collections::BTreeMap;
use std::fmt;

use crate::enclosure::reorder_bounds_last;
use crate::error::{Error, Result};
use crate::geom::{Mesh, Part};
use crate::material::MaterialLibrary;
use crate::project_file::RenderMode;

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn unit_box() -> Mesh {
        Mesh::cuboid(Point3::origin(), Vector3::new(1.0, 1.0, 1.0))
    }

    fn state_with_parts(names: &[&str]) -> ProjectState {
        let mut state = ProjectState::new();
        let parts = names.iter().map(|n| Part::new(*n, unit_box())).collect();
        state.set_parts(unit_box(), parts);
        state
    }

    #[test]
    fn material_colors_are_stable_and_bright() {
        let a = material_color("Concrete", 0.95);
        assert_eq!(a, material_color("Concrete", 0.95));
        assert_ne!(a, material_color("Carpet", 0.95));
        assert!(a[..3].iter().all(|c| (0.2..=1.0).contains(c)));
        assert_eq!(a[3], 0.95);
    }

    #[test]
    fn new_parts_clear_assignments() {
        let mut state = state_with_parts(&["Part_0", "Part_1"]);
        state.assign("Part_0", "Concrete").unwrap();
        state.select(1);

        state.set_parts(unit_box(), vec![Part::new("Part_0", unit_box())]);
        assert!(state.assignments.is_empty());
        assert!(state.current_part_index.is_none());
    }

    #[test]
    fn assignment_requires_existing_part() {
        let mut state = state_with_parts(&["Part_0"]);
        assert_eq!(state.assign("Part_0", "Concrete").unwrap(), None);
        assert_eq!(
            state.assign("Part_0", "Glass").unwrap().as_deref(),
            Some("Concrete")
        );
        assert!(matches!(
            state.assign("Part_9", "Glass"),
            Err(Error::UnknownPart(_))
        ));
        assert_eq!(state.assignment("Part_0"), Some("Glass"));
        assert_eq!(state.unassign("Part_0").as_deref(), Some("Glass"));
        assert_eq!(state.assignment("Part_0"), None);
    }

    #[test]
    fn selection_out_of_range_clears() {
        let mut state = state_with_parts(&["Part_0", "Part_1"]);
        assert_eq!(state.select(1).map(|p| p.name.as_str()), Some("Part_1"));
        assert!(state.select(2).is_none());
        assert!(state.current_part_index.is_none());
    }

    #[test]
    fn replacing_parts_keeps_assignments() {
        let mut state = state_with_parts(&["Part_0", "Part_1"]);
        state.assign("Part_1", "Glass").unwrap();
        state.select(1);
        state.replace_parts(vec![Part::new("Part_0", unit_box())]);
        assert_eq!(state.assignment("Part_1"), Some("Glass"));
        assert!(state.selected_part().is_none());
    }

    #[test]
    fn summaries_list_bounds_last() {
        let mut state = state_with_parts(&["Bounds", "Part_0"]);
        state.assign("Part_0", "Concrete").unwrap();
        let rows: Vec<String> = state
            .part_summaries("Bounds")
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            rows,
            vec![
                "Part_0 | faces=12 | area=6.000 | mat=Concrete",
                "Bounds | faces=12 | area=6.000 | mat=(none)",
            ]
        );
    }

    #[test]
    fn color_map_follows_assignments() {
        let mut state = state_with_parts(&["Part_0", "Part_1"]);
        state.assign("Part_1", "Glass").unwrap();
        let map = state.material_color_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["Part_1"], material_color("Glass", MATERIAL_ALPHA));
    }

    #[test]
    fn highlight_overrides_material() {
        let mut state = state_with_parts(&["Part_0", "Part_1"]);
        state.assign("Part_0", "Glass").unwrap();
        let shaded = RenderMode::Shaded;
        assert_eq!(state.part_color("Part_1", shaded, None), DEFAULT_COLOR);
        assert_eq!(
            state.part_color("Part_0", shaded, None),
            material_color("Glass", MATERIAL_ALPHA)
        );
        assert_eq!(state.part_color("Part_0", shaded, Some("Part_0")), HIGHLIGHT_COLOR);
        assert_eq!(
            state.part_color("Part_0", RenderMode::Wireframe, Some("Part_0")),
            WIRE_HIGHLIGHT_COLOR
        );
        assert_eq!(state.part_color("Part_0", RenderMode::Wireframe, None), WIRE_COLOR);
    }
}

/// Linear RGBA colour.
pub type Rgba = [f32; 4];

/// Shaded colour of parts without a material.
pub const DEFAULT_COLOR: Rgba = [0.8, 0.85, 0.9, 0.95];
/// Shaded colour of the highlighted part.
pub const HIGHLIGHT_COLOR: Rgba = [1.0, 0.85, 0.2, 0.95];
pub const WIRE_COLOR: Rgba = [1.0, 1.0, 1.0, 1.0];
pub const WIRE_HIGHLIGHT_COLOR: Rgba = [1.0, 0.9, 0.2, 1.0];
/// Opacity of material colours.
pub const MATERIAL_ALPHA: f32 = 0.95;

/// Stable colour for a material name.
///
/// The name is hashed (64-bit FNV-1a) into the RGB cube and each channel is
/// lifted into `[0.2, 1.0]` so no material renders near-black.
pub fn material_color(name: &str, alpha: f32) -> Rgba {
    let hash = name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
        % (1 << 24);
    let channel = |shift: u32| ((hash >> shift) & 0xff) as f32 / 255.0 * 0.8 + 0.2;
    [channel(16), channel(8), channel(0), alpha]
}

/// One row of the parts list.
#[derive(Debug, Clone, PartialEq)]
pub struct PartSummary {
    pub name: String,
    pub faces: usize,
    pub area: f64,
    pub material: Option<String>,
}

impl fmt::Display for PartSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | faces={} | area={:.3} | mat={}",
            self.name,
            self.faces,
            self.area,
            self.material.as_deref().unwrap_or("(none)")
        )
    }
}

/// Mesh, parts, materials and assignments of the open project.
///
/// `parts` are kept in display order: whenever the enclosure part is
/// present it is the last entry.
#[derive(Debug, Default)]
pub struct ProjectState {
    /// The mesh as loaded, before splitting.
    pub mesh: Option<Mesh>,
    pub parts: Vec<Part>,
    pub matlib: Option<MaterialLibrary>,
    /// Part name to material name. Parts may be unassigned.
    pub assignments: BTreeMap<String, String>,
    /// Index into `parts` of the selected part.
    pub current_part_index: Option<usize>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replaces mesh and parts. Assignments and selection refer to the old
    /// parts and are cleared.
    pub fn set_parts(&mut self, mesh: Mesh, parts: Vec<Part>) {
        self.mesh = Some(mesh);
        self.parts = parts;
        self.assignments.clear();
        self.current_part_index = None;
    }

    /// Replaces the parts of the current mesh, keeping assignments.
    pub fn replace_parts(&mut self, parts: Vec<Part>) {
        self.parts = parts;
        if self
            .current_part_index
            .is_some_and(|i| i >= self.parts.len())
        {
            self.current_part_index = None;
        }
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// Assigns `material` to the part called `part`, returning the previous
    /// assignment.
    pub fn assign(&mut self, part: &str, material: &str) -> Result<Option<String>> {
        if !self.has_part(part) {
            return Err(Error::UnknownPart(part.to_string()));
        }
        Ok(self
            .assignments
            .insert(part.to_string(), material.to_string()))
    }

    pub fn unassign(&mut self, part: &str) -> Option<String> {
        self.assignments.remove(part)
    }

    pub fn assignment(&self, part: &str) -> Option<&str> {
        self.assignments.get(part).map(String::as_str)
    }

    /// Colour of every assigned part, keyed by part name.
    pub fn material_color_map(&self) -> BTreeMap<String, Rgba> {
        self.assignments
            .iter()
            .map(|(part, material)| (part.clone(), material_color(material, MATERIAL_ALPHA)))
            .collect()
    }

    /// Selects the part at `index`, or clears the selection if out of range.
    pub fn select(&mut self, index: usize) -> Option<&Part> {
        self.current_part_index = (index < self.parts.len()).then_some(index);
        self.selected_part()
    }

    pub fn selected_part(&self) -> Option<&Part> {
        self.current_part_index.and_then(|i| self.parts.get(i))
    }

    /// Parts in the order they are listed and drawn.
    pub fn display_parts(&self, bounds_name: &str) -> Vec<&Part> {
        reorder_bounds_last(self.parts.iter().collect(), bounds_name)
    }

    pub fn part_summaries(&self, bounds_name: &str) -> Vec<PartSummary> {
        self.display_parts(bounds_name)
            .into_iter()
            .map(|p| PartSummary {
                name: p.name.clone(),
                faces: p.mesh.num_faces(),
                area: p.mesh.area(),
                material: self.assignment(&p.name).map(String::from),
            })
            .collect()
    }

    /// Colour a part is drawn with. The highlight wins over the material.
    pub fn part_color(&self, name: &str, mode: RenderMode, highlight: Option<&str>) -> Rgba {
        let highlighted = highlight == Some(name);
        match mode {
            RenderMode::Wireframe if highlighted => WIRE_HIGHLIGHT_COLOR,
            RenderMode::Wireframe => WIRE_COLOR,
            RenderMode::Shaded if highlighted => HIGHLIGHT_COLOR,
            RenderMode::Shaded => self
                .assignment(name)
                .map(|m| material_color(m, MATERIAL_ALPHA))
                .unwrap_or(DEFAULT_COLOR),
        }
    }
}
