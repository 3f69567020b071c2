//! Acoustic materials and material libraries.
//!
//! A material is a set of per-band coefficients: absorption (`alpha`),
//! scattering (`scatter`) and an auxiliary transmission term (`tau`, always
//! zero for now). All coefficient arrays share the band layout of the
//! material's `freqs`.
//!
//! A library owns one native band set. Every material it stores is on those
//! bands; materials arriving on other bands are resampled on insertion.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use ndarray::Array1;
use serde::Deserialize;

use crate::bands::{resample_bands, validate_bands};
use crate::error::{Error, Result};
use crate::report::Reporter;
use crate::settings::FREE_SPACE_NAME;


/// Classification used when a library record does not name one.
pub const DEFAULT_KIND: &str = "generic";

/// Per-band acoustic coefficients of a surface material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub freqs: Array1<f64>,
    pub alpha: Array1<f64>,
    pub tau: Array1<f64>,
    pub scatter: Array1<f64>,
    pub kind: String,
}

impl Material {
    /// Builds a material, zero-filling `scatter` when absent.
    ///
    /// Fails if a coefficient array does not match the band count or holds a
    /// value outside `[0, 1]`.
    pub fn new(
        name: impl Into<String>,
        freqs: Array1<f64>,
        alpha: Array1<f64>,
        scatter: Option<Array1<f64>>,
        kind: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        let scatter = scatter.unwrap_or_else(|| Array1::zeros(alpha.len()));
        for (field, values) in [("alpha", &alpha), ("scatter", &scatter)] {
            check_coefficients(&name, field, values, freqs.len())?;
        }
        Ok(Self {
            name,
            tau: Array1::zeros(freqs.len()),
            freqs,
            alpha,
            scatter,
            kind: kind.unwrap_or_else(|| DEFAULT_KIND.to_string()),
        })
    }

    /// Fully absorbing, non-scattering boundary, for open sides of a room.
    pub fn free_space(freqs: &Array1<f64>) -> Self {
        let n = freqs.len();
        Self {
            name: FREE_SPACE_NAME.to_string(),
            freqs: freqs.clone(),
            alpha: Array1::ones(n),
            tau: Array1::zeros(n),
            scatter: Array1::zeros(n),
            kind: "boundary".to_string(),
        }
    }

    /// Copy of this material on the `dst` bands.
    pub fn resampled(&self, dst: &Array1<f64>) -> Result<Material> {
        let alpha = resample_bands(&self.freqs, &self.alpha, dst)?;
        let scatter = resample_bands(&self.freqs, &self.scatter, dst)?;
        Ok(Material {
            name: self.name.clone(),
            freqs: dst.clone(),
            tau: Array1::zeros(alpha.len()),
            alpha,
            scatter,
            kind: self.kind.clone(),
        })
    }

    /// Absorption at exactly `freq`, if it is one of the material's bands.
    pub fn alpha_at(&self, freq: f64) -> Option<f64> {
        self.freqs
            .iter()
            .position(|&f| (f - freq).abs() < 1e-9)
            .map(|i| self.alpha[i])
    }
}

fn check_coefficients(
    material: &str,
    field: &'static str,
    values: &Array1<f64>,
    expected: usize,
) -> Result<()> {
    if values.len() != expected {
        return Err(Error::MaterialBands {
            material: material.to_string(),
            field,
            expected,
            found: values.len(),
        });
    }
    if let Some(v) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
        return Err(Error::InvalidCoefficient {
            material: material.to_string(),
            field,
            value: *v,
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    #[serde(rename = "_meta")]
    meta: LibraryMeta,
    #[serde(default)]
    materials: BTreeMap<String, MaterialRecord>,
}

#[derive(Debug, Deserialize)]
struct LibraryMeta {
    bands_hz: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct MaterialRecord {
    #[serde(default)]
    alpha: Vec<f64>,
    scatter: Option<Vec<f64>>,
    kind: Option<String>,
}

/// Named materials on a shared band grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLibrary {
    native_bands: Array1<f64>,
    items: BTreeMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new(native_bands: Array1<f64>) -> Result<Self> {
        validate_bands(&native_bands.to_vec())?;
        Ok(Self {
            native_bands,
            items: BTreeMap::new(),
        })
    }

    /// Loads a JSON library file. Records whose coefficient count differs
    /// from `_meta.bands_hz` are rejected and fail the whole load.
    pub fn from_json(path: impl AsRef<Path>, reporter: &dyn Reporter) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let library = Self::from_json_str(&text)?;
        reporter.info(&format!(
            "Materials loaded: {} entries from {} (bands: {} Hz)",
            library.len(),
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            library.native_bands.iter().join(", ")
        ));
        Ok(library)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: LibraryFile = serde_json::from_str(text)?;
        let bands = Array1::from(file.meta.bands_hz);
        let mut library = Self::new(bands)?;
        for (name, record) in file.materials {
            let material = Material::new(
                name,
                library.native_bands.clone(),
                Array1::from(record.alpha),
                record.scatter.map(Array1::from),
                record.kind,
            )?;
            library.items.insert(material.name.clone(), material);
        }
        Ok(library)
    }

    pub fn native_bands(&self) -> &Array1<f64> {
        &self.native_bands
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Material names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Stores `material`, resampling it onto the native bands if needed.
    /// Replaces any material of the same name.
    pub fn insert(&mut self, material: Material) -> Result<()> {
        let material = if material.freqs == self.native_bands {
            material
        } else {
            material.resampled(&self.native_bands)?
        };
        self.items.insert(material.name.clone(), material);
        Ok(())
    }

    /// Every material resampled onto `dst`.
    pub fn to_bands(&self, dst: &Array1<f64>) -> Result<BTreeMap<String, Material>> {
        self.items
            .iter()
            .map(|(name, m)| Ok((name.clone(), m.resampled(dst)?)))
            .collect()
    }

    /// Sorted names containing `query`, ignoring case. An empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.trim().to_lowercase();
        self.names()
            .filter(|n| query.is_empty() || n.to_lowercase().contains(&query))
            .collect()
    }

    /// Name of a fully absorbing boundary material, creating a synthetic
    /// "Free Space" entry when neither it nor any of `candidates` exist.
    pub fn ensure_free_space(&mut self, candidates: &[String], reporter: &dyn Reporter) -> String {
        if let Some(existing) = candidates.iter().find(|c| self.contains(c)) {
            return existing.clone();
        }
        if self.contains(FREE_SPACE_NAME) {
            return FREE_SPACE_NAME.to_string();
        }
        let material = Material::free_space(&self.native_bands);
        let name = material.name.clone();
        self.items.insert(name.clone(), material);
        reporter.info(&format!(
            "Created synthetic material \"{}\" (alpha=1 across bands).",
            name
        ));
        name
    }
}
