use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::enclosure::{EnclosureMode, EnclosureSettings};
use crate::project_file::RenderMode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_defaults() {
        let config = load_default_config().unwrap();
        assert_eq!(config, Settings::default());
    }

    #[test]
    fn environment_overrides_file() {
        env::set_var("ATLAS_BOUNDS_NAME", "Shell");
        let config = load_config(&CliArgs::default());
        env::remove_var("ATLAS_BOUNDS_NAME");
        assert_eq!(config.unwrap().bounds_name, "Shell");
    }

    #[test]
    fn cli_overrides_settings() {
        let args = CliArgs::try_parse_from([
            "atlas-prep",
            "--no-enclosure",
            "--mode",
            "obb",
            "--pad",
            "12",
            "--render-mode",
            "wireframe",
            "--materials",
            "lib.json",
        ])
        .unwrap();

        let mut config = Settings::default();
        config.apply_args(&args);
        assert!(!config.enclosure.enabled);
        assert_eq!(config.enclosure.mode, EnclosureMode::Obb);
        assert!((config.enclosure.pad - 0.12).abs() < 1e-12);
        assert_eq!(config.render_mode, RenderMode::Wireframe);
        assert_eq!(config.material_library, Some(PathBuf::from("lib.json")));
    }

    #[test]
    fn pad_percent_is_range_checked() {
        assert!(CliArgs::try_parse_from(["atlas-prep", "--pad", "101"]).is_err());
        assert!(CliArgs::try_parse_from(["atlas-prep", "--pad", "-1"]).is_err());
    }

    #[test]
    fn repeated_assignments() {
        let args = CliArgs::try_parse_from([
            "atlas-prep",
            "--assign",
            "Part_0=Concrete",
            "--assign",
            "Bounds = Free Space",
        ])
        .unwrap();
        assert_eq!(
            args.assign,
            vec![
                ("Part_0".to_string(), "Concrete".to_string()),
                ("Bounds".to_string(), "Free Space".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_assignment() {
        assert!(parse_assignment("Part_0").is_err());
        assert!(parse_assignment("=Concrete").is_err());
        assert!(parse_assignment("Part_0=").is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Settings::default();
        config.enclosure.pad = -0.1;
        assert!(config.validate().is_err());

        let mut config = Settings::default();
        config.bounds_name = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Settings::default();
        config.sim.rays = 0;
        assert!(config.validate().is_err());
    }
}

/// Maximum distance for loaded vertices to be welded into one.
pub const VERTEX_MERGE_DISTANCE: f64 = 1e-8;
/// Lower bound on the bounding diagonal used to size enclosure padding.
pub const DIAGONAL_EPSILON: f64 = 1e-6;
/// Default enclosure padding, as a fraction of the bounding diagonal.
pub const DEFAULT_PAD_REL: f64 = 0.05;
/// Project file format version written by this build.
pub const PROJECT_VERSION: u32 = 1;
/// File name suffix of project files.
pub const PROJECT_EXTENSION: &str = ".atlasproj.json";
/// Name of the synthetic fully absorbing material.
pub const FREE_SPACE_NAME: &str = "Free Space";
/// Name of the synthesized enclosure part.
pub const DEFAULT_BOUNDS_NAME: &str = "Bounds";

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub enclosure: EnclosureSettings,
    pub bounds_name: String,
    pub render_mode: RenderMode,
    /// Material library loaded at startup, if any.
    pub material_library: Option<PathBuf>,
    /// Existing materials accepted as the absorbing boundary, in order of preference.
    pub free_space_candidates: Vec<String>,
    pub sim: SimSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enclosure: EnclosureSettings::default(),
            bounds_name: DEFAULT_BOUNDS_NAME.to_string(),
            render_mode: RenderMode::default(),
            material_library: None,
            free_space_candidates: ["Free Space", "FreeSpace", "Boundary", "Absorbing Boundary"]
                .map(String::from)
                .to_vec(),
            sim: SimSettings::default(),
        }
    }
}

/// Parameters for the downstream ray tracer. Saved into every project file
/// under `sim`, which is where the tracer reads them from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimSettings {
    pub rays: u32,
    /// Maximum reflections per ray; 0 traces the direct path only.
    pub bounces: u32,
    /// Wall-clock budget per run, in seconds.
    pub time_budget: f64,
    /// Random seed; every value is valid.
    pub seed: u64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            rays: 10_000,
            bounces: 50,
            time_budget: 2.0,
            seed: 42,
        }
    }
}

impl Settings {
    /// Overrides configured values with those given on the command line.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if args.no_enclosure {
            self.enclosure.enabled = false;
        }
        if let Some(mode) = args.mode {
            self.enclosure.mode = mode;
        }
        if let Some(percent) = args.pad {
            self.enclosure.set_pad_percent(percent);
        }
        if let Some(render_mode) = args.render_mode {
            self.render_mode = render_mode;
        }
        if let Some(materials) = &args.materials {
            self.material_library = Some(materials.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enclosure.pad.is_finite() || self.enclosure.pad < 0.0 {
            bail!(
                "Enclosure padding must be a non-negative fraction, got {}",
                self.enclosure.pad
            );
        }
        if self.bounds_name.trim().is_empty() {
            bail!("Bounds part name must not be empty");
        }
        if self.sim.rays == 0 {
            bail!("Number of rays must be greater than 0");
        }
        if !self.sim.time_budget.is_finite() || self.sim.time_budget <= 0.0 {
            bail!("Time budget must be greater than 0");
        }
        Ok(())
    }
}

/// Loads `config/default.toml` only, ignoring local overrides and the environment.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;
    config.validate()?;

    Ok(config)
}

/// Loads the layered configuration: `config/default.toml`, then
/// `config/local.toml` if present, then `ATLAS_*` environment variables
/// (nested keys separated by `__`, e.g. `ATLAS_ENCLOSURE__PAD`), then `args`.
pub fn load_config(args: &CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");
    if local_config.exists() {
        tracing::info!("Using local configuration: {:?}", local_config);
    } else {
        tracing::debug!("Using default configuration: {:?}", default_config_file);
    }

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .add_source(File::from(local_config).required(false))
        .add_source(
            Environment::with_prefix("atlas")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    config.apply_args(args);
    config.validate()?;

    tracing::debug!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the ATLAS_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("ATLAS_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    // Walk upward from the executable looking for a "config" subdirectory
    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(|dir| dir.to_path_buf())
        .context("Could not find project root directory")
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    version,
    about = "Atlas Prep - room geometry and acoustic material preparation"
)]
pub struct CliArgs {
    /// OBJ, STL or PLY file with the room geometry. Each connected component becomes a part.
    #[arg(short, long)]
    pub mesh: Option<PathBuf>,

    /// JSON material library.
    #[arg(long)]
    pub materials: Option<PathBuf>,

    /// Project file to open before any other action.
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Save the project to this path when done. The .atlasproj.json suffix is added if missing.
    #[arg(short, long)]
    pub save: Option<PathBuf>,

    /// Do not add an enclosure to open meshes.
    #[arg(long)]
    pub no_enclosure: bool,

    /// Enclosure orientation.
    #[arg(long, value_enum)]
    pub mode: Option<EnclosureMode>,

    /// Enclosure padding in percent of the mesh bounding diagonal.
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub pad: Option<u32>,

    /// Add or replace the enclosure even if the mesh is watertight.
    #[arg(long)]
    pub force_bounds: bool,

    /// Assign a material to a part. Format: PART=MATERIAL. May be repeated.
    #[arg(long = "assign", value_parser = parse_assignment)]
    pub assign: Vec<(String, String)>,

    /// Render mode of the viewer and of saved projects.
    #[arg(long, value_enum)]
    pub render_mode: Option<RenderMode>,

    /// Open the 3D viewer (requires the `visualization` feature).
    #[arg(long)]
    pub view: bool,
}

/// Parse a part assignment in the format "part=material"
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (part, material) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid assignment '{}'. Expected 'PART=MATERIAL'", s))?;
    let (part, material) = (part.trim(), material.trim());
    if part.is_empty() || material.is_empty() {
        return Err(format!(
            "Invalid assignment '{}'. Part and material must not be empty",
            s
        ));
    }
    Ok((part.to_string(), material.to_string()))
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Enclosure: {} ({}, pad {}%)
  - Bounds Part: {}
  - Render Mode: {}
  - Material Library: {}
  - Simulation: {} rays, {} bounces, {:.1} s budget, seed {}
  ",
            if self.enclosure.enabled { "on" } else { "off" },
            self.enclosure.mode.label(),
            self.enclosure.pad_percent(),
            self.bounds_name,
            self.render_mode,
            self.material_library
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string()),
            self.sim.rays,
            self.sim.bounces,
            self.sim.time_budget,
            self.sim.seed,
        )
    }
}
