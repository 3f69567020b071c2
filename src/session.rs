//! User-level actions on a project.
//!
//! A [`Session`] ties together the project state, the active settings and
//! the file the project lives in. Each action reports progress and failures
//! through the [`Reporter`] it is given; failures are also returned as
//! `Err`, but always leave the session in a usable state.

use std::path::{Path, PathBuf};

use crate::enclosure::{reorder_bounds_last, update_enclosure, EnclosureSettings};
use crate::error::{Error, Result};
use crate::geom::{Mesh, Part};
use crate::material::MaterialLibrary;
use crate::project::{PartSummary, ProjectState};
use crate::project_file::{with_project_extension, ProjectFile};
use crate::report::Reporter;
use crate::settings::Settings;

/// Logs `result` as an error under `context` if it failed.
fn logged<T>(reporter: &dyn Reporter, context: &str, result: Result<T>) -> Result<T> {
    result.inspect_err(|e| reporter.error(&format!("{}: {}", context, e)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug)]
pub struct Session {
    pub state: ProjectState,
    pub settings: Settings,
    /// Mesh the current parts were loaded from.
    pub mesh_path: Option<PathBuf>,
    /// File the project was last opened from or saved to.
    pub project_path: Option<PathBuf>,
    defaults: Settings,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: ProjectState::new(),
            defaults: settings.clone(),
            settings,
            mesh_path: None,
            project_path: None,
        }
    }

    fn bounds_name(&self) -> &str {
        &self.settings.bounds_name
    }

    /// Discards the project and restores the settings the session started with.
    pub fn new_project(&mut self, reporter: &dyn Reporter) {
        self.state.reset();
        self.settings = self.defaults.clone();
        self.mesh_path = None;
        self.project_path = None;
        reporter.info("New project.");
    }

    /// Loads a material library, replacing the current one. Assignments are kept.
    pub fn load_materials(&mut self, path: impl AsRef<Path>, reporter: &dyn Reporter) -> Result<()> {
        let library = logged(
            reporter,
            "Material load failed",
            MaterialLibrary::from_json(path.as_ref(), reporter),
        )?;
        self.state.matlib = Some(library);
        Ok(())
    }

    /// Loads a mesh, splits it into parts and adds an enclosure if the mesh
    /// is open. Previous parts and assignments are discarded.
    pub fn load_mesh(&mut self, path: impl AsRef<Path>, reporter: &dyn Reporter) -> Result<()> {
        let path = path.as_ref();
        reporter.info(&format!("Loading mesh: {}", path.display()));
        let mesh = logged(reporter, "Geometry load failed", Mesh::from_file(path))?;

        let parts = Part::from_components(mesh.split());
        let parts = update_enclosure(
            Some(&mesh),
            parts,
            &self.settings.enclosure,
            false,
            self.bounds_name(),
            reporter,
        );
        let parts = reorder_bounds_last(parts, self.bounds_name());

        self.state.set_parts(mesh, parts);
        self.mesh_path = Some(path.to_path_buf());
        self.auto_assign_free_space(reporter);

        reporter.info(&format!(
            "Loaded {} parts from {}",
            self.state.parts.len(),
            file_name(path)
        ));
        Ok(())
    }

    /// Adds or replaces the enclosure regardless of watertightness.
    pub fn update_enclosure_now(&mut self, reporter: &dyn Reporter) -> Result<()> {
        let Some(mesh) = self.state.mesh.as_ref() else {
            reporter.error("Load a mesh before adding enclosure.");
            return Err(Error::NoMesh);
        };
        let settings = EnclosureSettings {
            enabled: true,
            ..self.settings.enclosure.clone()
        };
        let parts = std::mem::take(&mut self.state.parts);
        let parts = update_enclosure(
            Some(mesh),
            parts,
            &settings,
            true,
            &self.settings.bounds_name,
            reporter,
        );
        let parts = reorder_bounds_last(parts, &self.settings.bounds_name);
        self.state.replace_parts(parts);
        self.auto_assign_free_space(reporter);
        Ok(())
    }

    /// Assigns the absorbing boundary material to the enclosure, creating
    /// the enclosure first if there is none.
    pub fn assign_free_space(&mut self, reporter: &dyn Reporter) -> Result<String> {
        if self.state.matlib.is_none() {
            reporter.error("Load a material library first.");
            return Err(Error::NoMaterialLibrary);
        }
        if !self.state.has_part(self.bounds_name()) {
            self.update_enclosure_now(reporter)?;
        }
        self.auto_assign_free_space(reporter)
            .ok_or_else(|| Error::UnknownPart(self.settings.bounds_name.clone()))
    }

    /// Gives the enclosure part, if any, the free space material. Needs a
    /// material library; without one nothing is assigned.
    fn auto_assign_free_space(&mut self, reporter: &dyn Reporter) -> Option<String> {
        let bounds = self.settings.bounds_name.clone();
        if !self.state.has_part(&bounds) {
            return None;
        }
        let library = self.state.matlib.as_mut()?;
        let free_name = library.ensure_free_space(&self.settings.free_space_candidates, reporter);
        self.state
            .assignments
            .insert(bounds.clone(), free_name.clone());
        reporter.info(&format!("Assigned \"{}\" to {}", free_name, bounds));
        Some(free_name)
    }

    /// Selects the part at `index` in the part list.
    pub fn select_part(&mut self, index: usize) -> Result<&Part> {
        self.state.select(index).ok_or(Error::NoSelection)
    }

    /// Assigns `material` to the selected part.
    pub fn assign_material(&mut self, material: &str, reporter: &dyn Reporter) -> Result<()> {
        let Some(part) = self.state.selected_part().map(|p| p.name.clone()) else {
            reporter.error("Select a part and a material first.");
            return Err(Error::NoSelection);
        };
        self.assign(&part, material, reporter)
    }

    /// Assigns `material` from the loaded library to the part called `part`.
    pub fn assign(&mut self, part: &str, material: &str, reporter: &dyn Reporter) -> Result<()> {
        let known = match &self.state.matlib {
            None => Err(Error::NoMaterialLibrary),
            Some(library) if !library.contains(material) => {
                Err(Error::UnknownMaterial(material.to_string()))
            }
            Some(_) => Ok(()),
        };
        logged(reporter, "Assignment failed", known)?;
        logged(
            reporter,
            "Assignment failed",
            self.state.assign(part, material),
        )?;
        reporter.info(&format!("Assigned {} to {}", material, part));
        Ok(())
    }

    pub fn display_parts(&self) -> Vec<&Part> {
        self.state.display_parts(self.bounds_name())
    }

    pub fn part_summaries(&self) -> Vec<PartSummary> {
        self.state.part_summaries(self.bounds_name())
    }

    /// Name of the selected part, drawn highlighted.
    pub fn highlight(&self) -> Option<&str> {
        self.state.selected_part().map(|p| p.name.as_str())
    }

    /// Snapshot of the session in its on-disk form.
    pub fn to_project_file(&self) -> ProjectFile {
        ProjectFile::new(
            self.mesh_path.clone(),
            self.state.assignments.clone(),
            self.settings.render_mode,
            self.settings.enclosure.clone(),
            self.settings.sim.clone(),
        )
    }

    /// Saves to the file the project was opened from or last saved to.
    pub fn save_project(&mut self, reporter: &dyn Reporter) -> Result<PathBuf> {
        let Some(path) = self.project_path.clone() else {
            reporter.error("Save project failed: choose a file name first.");
            return Err(Error::NoProjectPath);
        };
        logged(
            reporter,
            "Save project failed",
            self.to_project_file().save(&path),
        )?;
        reporter.info(&format!("Saved project: {}", file_name(&path)));
        Ok(path)
    }

    /// Saves under a new name, adding the project suffix if it is missing.
    pub fn save_project_as(
        &mut self,
        path: impl AsRef<Path>,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf> {
        self.project_path = Some(with_project_extension(path));
        self.save_project(reporter)
    }

    /// Opens a project: restores settings, reloads the mesh if it can be
    /// found and re-applies the stored assignments to the parts that exist.
    pub fn open_project(&mut self, path: impl AsRef<Path>, reporter: &dyn Reporter) -> Result<()> {
        let path = path.as_ref();
        let project = logged(reporter, "Open project failed", ProjectFile::load(path))?;
        self.project_path = Some(path.to_path_buf());

        self.settings.enclosure = project.restored_enclosure();
        self.settings.render_mode = project.render_mode;
        if let Some(sim) = &project.sim {
            self.settings.sim = sim.clone();
        }

        match resolve_mesh_path(path, project.mesh_path.as_deref()) {
            Some(mesh_path) => {
                // a broken mesh is logged by load_mesh; the project still opens
                let _ = self.load_mesh(&mesh_path, reporter);
            }
            None => reporter.warn("Project has no mesh_path or file missing. Load a model manually."),
        }

        let mut applied = 0;
        for part in &self.state.parts {
            if let Some(material) = project.assignments.get(&part.name) {
                self.state
                    .assignments
                    .insert(part.name.clone(), material.clone());
                applied += 1;
            }
        }
        reporter.info(&format!(
            "Restored {} material assignments from project.",
            applied
        ));
        reporter.info(&format!("Opened project: {}", file_name(path)));
        Ok(())
    }
}

/// Finds the project's mesh on disk. Relative paths are tried as given and
/// then next to the project file.
fn resolve_mesh_path(project_path: &Path, mesh_path: Option<&Path>) -> Option<PathBuf> {
    let mesh_path = mesh_path?;
    if mesh_path.exists() {
        return Some(mesh_path.to_path_buf());
    }
    if mesh_path.is_relative() {
        let beside = project_path.parent()?.join(mesh_path);
        if beside.exists() {
            return Some(beside);
        }
    }
    None
}
