use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::data::loader::StackSource;
use crate::data::model::{Extent, ZoneId};
use crate::data::table::TableFormat;
use crate::data::zones::ZoneSource;

// ---------------------------------------------------------------------------
// Walkthrough configuration (JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub size: usize,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self { size: 100, seed: 42 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Score maps to produce.
    pub components: usize,
    /// Decompose the correlation instead of the covariance matrix.
    pub use_correlation: bool,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            components: 3,
            use_correlation: false,
        }
    }
}

/// Everything the headless walkthrough needs.
///
/// ```json
/// {
///   "stack": { "dir": "data/ndvi", "glob": "*.tif",
///              "date_pattern": { "regex": "(\\d{4}_\\d{3})", "format": "%Y_%j" } },
///   "crop": { "xmin": -147.5, "xmax": -146.0, "ymin": 64.5, "ymax": 65.5 },
///   "zones": { "polygons": "data/scars.geojson", "fallback_raster": "data/scars.tif" },
///   "sample": { "size": 100, "seed": 42 },
///   "pca": { "components": 3 },
///   "output_dir": "output"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkthroughConfig {
    pub stack: StackSource,
    pub crop: Option<Extent>,
    pub zones: ZoneSource,
    pub sample: SampleConfig,
    pub pca: PcaConfig,
    /// Zone whose mean the deviation maps are measured against; each cell's
    /// own zone when absent.
    pub deviation_reference: Option<ZoneId>,
    pub output_dir: PathBuf,
    pub table_format: TableFormat,
}

impl Default for WalkthroughConfig {
    fn default() -> Self {
        Self {
            stack: StackSource::default(),
            crop: None,
            zones: ZoneSource::default(),
            sample: SampleConfig::default(),
            pca: PcaConfig::default(),
            deviation_reference: None,
            output_dir: PathBuf::from("output"),
            table_format: TableFormat::Csv,
        }
    }
}

impl WalkthroughConfig {
    /// Read and validate a JSON config. Relative paths are resolved against
    /// the config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.stack.dir);
        resolve(&mut self.output_dir);
        if let Some(p) = self.zones.polygons.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.zones.fallback_raster.as_mut() {
            resolve(p);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pca.components == 0 {
            bail!("pca.components must be at least 1");
        }
        if self.sample.size == 0 {
            bail!("sample.size must be at least 1");
        }
        if let Some(crop) = &self.crop {
            if !crop.is_valid() {
                bail!("crop extent {crop} is empty or inverted");
            }
        }
        if self.stack.glob.is_empty() {
            bail!("stack.glob must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: WalkthroughConfig = serde_json::from_str(r#"{"pca": {"components": 2}}"#).unwrap();
        assert_eq!(cfg.pca.components, 2);
        assert!(!cfg.pca.use_correlation);
        assert_eq!(cfg.sample.size, 100);
        assert_eq!(cfg.stack.glob, "*.tif");
        assert_eq!(cfg.table_format, TableFormat::Csv);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.json");
        std::fs::write(
            &path,
            r#"{"stack": {"dir": "ndvi"}, "zones": {"fallback_raster": "zones.tif"},
                "table_format": "parquet"}"#,
        )
        .unwrap();
        let cfg = WalkthroughConfig::load(&path).unwrap();
        assert_eq!(cfg.stack.dir, dir.path().join("ndvi"));
        assert_eq!(cfg.zones.fallback_raster, Some(dir.path().join("zones.tif")));
        assert_eq!(cfg.output_dir, dir.path().join("output"));
        assert_eq!(cfg.table_format, TableFormat::Parquet);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = WalkthroughConfig::default();
        cfg.pca.components = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = WalkthroughConfig::default();
        cfg.crop = Some(Extent::new(5.0, 1.0, 0.0, 1.0));
        assert!(cfg.validate().is_err());
    }
}
