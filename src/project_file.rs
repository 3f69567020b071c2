use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::enclosure::EnclosureSettings;
use crate::error::{Error, Result};
use crate::settings::{SimSettings, PROJECT_EXTENSION, PROJECT_VERSION};


/// How parts are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum RenderMode {
    #[default]
    Shaded,
    Wireframe,
}

impl RenderMode {
    pub fn label(&self) -> &'static str {
        match self {
            RenderMode::Shaded => "Shaded",
            RenderMode::Wireframe => "Wireframe",
        }
    }
}

impl From<String> for RenderMode {
    /// Any value starting with "wire" is wireframe, everything else shaded.
    fn from(s: String) -> Self {
        if s.trim().to_lowercase().starts_with("wire") {
            RenderMode::Wireframe
        } else {
            RenderMode::Shaded
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Shaded => write!(f, "shaded"),
            RenderMode::Wireframe => write!(f, "wireframe"),
        }
    }
}

fn default_version() -> u32 {
    PROJECT_VERSION
}

/// On-disk form of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Mesh the parts were split from. Parts themselves are not stored.
    #[serde(default)]
    pub mesh_path: Option<PathBuf>,
    #[serde(default)]
    pub render_mode: RenderMode,
    /// Part name to material name.
    #[serde(default)]
    pub assignments: BTreeMap<String, String>,
    #[serde(default)]
    pub enclosure: EnclosureSettings,
    /// Ray tracer parameters. Older projects have none.
    #[serde(default)]
    pub sim: Option<SimSettings>,
}

impl ProjectFile {
    pub fn new(
        mesh_path: Option<PathBuf>,
        assignments: BTreeMap<String, String>,
        render_mode: RenderMode,
        enclosure: EnclosureSettings,
        sim: SimSettings,
    ) -> Self {
        Self {
            version: PROJECT_VERSION,
            mesh_path,
            render_mode,
            assignments,
            enclosure,
            sim: Some(sim),
        }
    }

    /// Writes the project as indented JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer).map_err(|e| Error::io(path, e))?;
        writer.flush().map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let project: ProjectFile = serde_json::from_reader(BufReader::new(file))?;
        project.check_version()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let project: ProjectFile = serde_json::from_str(text)?;
        project.check_version()
    }

    fn check_version(self) -> Result<Self> {
        if self.version > PROJECT_VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }
        Ok(self)
    }

    /// Enclosure settings as the user sees them after opening the project:
    /// padding is shown in whole percent, so it is rounded to one.
    pub fn restored_enclosure(&self) -> EnclosureSettings {
        let mut enclosure = self.enclosure.clone();
        enclosure.set_pad_percent(self.enclosure.pad_percent());
        enclosure
    }
}

/// Appends the project file suffix unless `path` already ends with it
/// (compared case-insensitively).
pub fn with_project_extension(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let has_extension = path
        .to_string_lossy()
        .to_lowercase()
        .ends_with(PROJECT_EXTENSION);
    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(PROJECT_EXTENSION);
        PathBuf::from(name)
    }
}
