//! Engine installations and how they become loading units

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::native::LoadingUnit;

/// Materializes a distribution found on disk into an isolated unit.
///
/// The host supplies the loader; the adapter only decides when it runs.
pub trait UnitLoader: Send + Sync {
    fn load(&self, path: &Path, config: Option<&[u8]>) -> Result<Arc<dyn LoadingUnit>>;
}

/// Where an engine's code comes from.
#[derive(Clone)]
pub enum Distribution {
    /// A library archive on disk
    Path(PathBuf),
    /// A unit that was already loaded
    Unit(Arc<dyn LoadingUnit>),
}

impl fmt::Debug for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Distribution::Unit(unit) => f.debug_tuple("Unit").field(&unit.name()).finish(),
        }
    }
}

/// A located vendor distribution plus optional configuration data.
#[derive(Debug, Clone)]
pub struct Installation {
    pub distribution: Distribution,
    pub config: Option<Arc<[u8]>>,
}

impl Installation {
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            distribution: Distribution::Path(path.into()),
            config: None,
        }
    }

    pub fn from_unit(unit: Arc<dyn LoadingUnit>) -> Self {
        Self {
            distribution: Distribution::Unit(unit),
            config: None,
        }
    }

    pub fn with_config<C: Into<Arc<[u8]>>>(mut self, config: C) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn config(&self) -> Option<&[u8]> {
        self.config.as_deref()
    }

    /// Human-readable name of the distribution
    pub fn describe(&self) -> String {
        match &self.distribution {
            Distribution::Path(path) => path.display().to_string(),
            Distribution::Unit(unit) => unit.name().to_string(),
        }
    }

    /// Load the distribution, failing before any engine code runs if it is
    /// missing or cannot be materialized.
    pub fn load(&self, loader: Option<&dyn UnitLoader>) -> Result<Arc<dyn LoadingUnit>> {
        match &self.distribution {
            Distribution::Unit(unit) => Ok(Arc::clone(unit)),
            Distribution::Path(path) => {
                if !path.exists() {
                    return Err(Error::MissingDistribution(path.clone()));
                }
                let loader = loader.ok_or_else(|| {
                    Error::unsupported_distribution(self.describe(), "no loader for on-disk distributions")
                })?;
                match loader.load(path, self.config()) {
                    Ok(unit) => Ok(unit),
                    Err(e @ Error::UnsupportedDistribution { .. }) => Err(e),
                    Err(e @ Error::MissingDistribution(_)) => Err(e),
                    Err(e) => Err(Error::unsupported_distribution(self.describe(), e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::StaticUnit;

    struct DirLoader;

    impl UnitLoader for DirLoader {
        fn load(&self, path: &Path, _config: Option<&[u8]>) -> Result<Arc<dyn LoadingUnit>> {
            if path.join("engine.lib").exists() {
                Ok(StaticUnit::new(path.display().to_string()).into_unit())
            } else {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "not an engine archive",
                )))
            }
        }
    }

    #[test]
    fn missing_path_fails_before_loading() {
        let installation = Installation::from_path("/nonexistent/basex.jar");
        let err = installation.load(Some(&DirLoader)).err().unwrap();
        assert!(matches!(err, Error::MissingDistribution(_)));
    }

    #[test]
    fn existing_path_without_loader_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Installation::from_path(dir.path()).load(None).err().unwrap();
        assert!(matches!(err, Error::UnsupportedDistribution { .. }));
    }

    #[test]
    fn loader_failure_becomes_unsupported_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let err = Installation::from_path(dir.path())
            .load(Some(&DirLoader))
            .err()
            .unwrap();
        match err {
            Error::UnsupportedDistribution { reason, .. } => {
                assert!(reason.contains("not an engine archive"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loader_materializes_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("engine.lib"), b"").unwrap();
        let unit = Installation::from_path(dir.path())
            .with_config(b"<config/>".to_vec())
            .load(Some(&DirLoader))
            .unwrap();
        assert_eq!(unit.name(), dir.path().display().to_string());
    }

    #[test]
    fn prebuilt_unit_is_returned_as_is() {
        let unit = StaticUnit::new("saxon-he-12").into_unit();
        let loaded = Installation::from_unit(Arc::clone(&unit)).load(None).unwrap();
        assert!(Arc::ptr_eq(&unit, &loaded));
    }
}
