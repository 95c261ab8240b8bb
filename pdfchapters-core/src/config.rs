use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub zoom: ZoomConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            min: 0.5,
            max: 2.0,
            step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Explicit pdfium shared library; system lookup when unset.
    pub pdfium_library: Option<PathBuf>,
    /// Pages on each side of the current one to warm in the render cache.
    pub prefetch: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pdfium_library: None,
            prefetch: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            file_name: "pdfchapters.log".to_owned(),
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let zoom = &self.zoom;
        if !(zoom.min > 0.0 && zoom.min <= zoom.max) {
            bail!(
                "zoom.min ({}) must be positive and not exceed zoom.max ({})",
                zoom.min,
                zoom.max
            );
        }
        if !(zoom.min..=zoom.max).contains(&zoom.initial) {
            bail!(
                "zoom.initial ({}) must lie within [{}, {}]",
                zoom.initial,
                zoom.min,
                zoom.max
            );
        }
        if !(zoom.step > 0.0) {
            bail!("zoom.step ({}) must be positive", zoom.step);
        }
        if self.logging.file_name.trim().is_empty() {
            bail!("logging.file_name must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.zoom.max, 2.0);
        assert_eq!(config.render.prefetch, 2);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[zoom]\nmax = 3.0\n\n[render]\npdfium_library = \"/opt/pdfium/libpdfium.so\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.zoom.max, 3.0);
        assert_eq!(config.zoom.min, 0.5);
        assert_eq!(
            config.render.pdfium_library.as_deref(),
            Some(Path::new("/opt/pdfium/libpdfium.so"))
        );
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn inconsistent_zoom_bounds_are_rejected() {
        let err = Config::from_toml_str("[zoom]\nmin = 2.5\nmax = 2.0\n").unwrap_err();
        assert!(err.to_string().contains("zoom.min"));

        let err = Config::from_toml_str("[zoom]\nstep = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("zoom.step"));

        let err = Config::from_toml_str("[zoom]\ninitial = 4.0\n").unwrap_err();
        assert!(err.to_string().contains("zoom.initial"));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[zoom\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:?}", err).contains("invalid config file"));
    }
}
