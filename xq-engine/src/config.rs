//! Processor configuration
//!
//! A TOML file lists the configured processors:
//!
//! ```toml
//! [[processor]]
//! name = "basex-server"
//! backend = "basex"
//! distribution = "/opt/basex/BaseX.jar"
//!
//! [processor.connection]
//! hostname = "localhost"
//! port = 1984
//! username = "admin"
//! password = "admin"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xq_engine_traits::{ConnectionSettings, Error, Installation, Result, UnitLoader};

use crate::session::Session;
use crate::unified::{Backend, Engine};

pub const CONFIG_FILE: &str = "processors.toml";

/// One configured processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub name: String,
    pub backend: Backend,
    /// Path of the vendor distribution
    pub distribution: PathBuf,
    /// Engine configuration file passed to the distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    /// Server to connect to instead of running in-process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionSettings>,
}

impl ProcessorConfig {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, backend: Backend, distribution: P) -> Self {
        Self {
            name: name.into(),
            backend,
            distribution: distribution.into(),
            config: None,
            connection: None,
        }
    }

    /// The installation, with the configuration file's bytes attached.
    pub fn installation(&self) -> Result<Installation> {
        let installation = Installation::from_path(&self.distribution);
        match &self.config {
            Some(path) => Ok(installation.with_config(fs::read(path)?)),
            None => Ok(installation),
        }
    }

    pub fn resolve(&self, loader: Option<&dyn UnitLoader>) -> Result<Engine> {
        Engine::resolve(self.backend, &self.installation()?, loader)
    }

    /// A client session when a connection is configured, a local one otherwise.
    pub fn session(&self, engine: &Engine) -> Result<Session> {
        match &self.connection {
            Some(settings) => engine.connect(settings.clone()),
            None => engine.create_session(),
        }
    }
}

/// A problem found by [`ProcessorsConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub processor: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.processor, self.message)
    }
}

/// All configured processors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default, rename = "processor")]
    pub processors: Vec<ProcessorConfig>,
}

impl ProcessorsConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xq-engine")
            .join(CONFIG_FILE)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Load the default file; no file means no processors.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProcessorConfig> {
        self.processors.iter().find(|p| p.name == name)
    }

    /// Check every entry without loading any engine.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut report = |processor: &ProcessorConfig, message: String| {
            issues.push(ConfigIssue {
                processor: processor.name.clone(),
                message,
            })
        };

        for processor in &self.processors {
            if processor.name.trim().is_empty() {
                report(processor, "empty processor name".to_string());
            } else if !seen.insert(processor.name.as_str()) {
                report(processor, "duplicate processor name".to_string());
            }
            if !processor.distribution.exists() {
                report(
                    processor,
                    format!("distribution not found: {}", processor.distribution.display()),
                );
            }
            if let Some(config) = &processor.config {
                if !config.is_file() {
                    report(processor, format!("config file not found: {}", config.display()));
                }
            }
            if let Some(connection) = &processor.connection {
                if processor.backend == Backend::Saxon {
                    report(processor, "saxon has no client sessions".to_string());
                }
                if connection.hostname.trim().is_empty() {
                    report(processor, "empty hostname".to_string());
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[processor]]
name = "local-basex"
backend = "basex"
distribution = "/opt/basex/BaseX.jar"

[[processor]]
name = "remote-basex"
backend = "basex"
distribution = "/opt/basex/BaseX.jar"

[processor.connection]
hostname = "db.example.com"
port = 1984
username = "admin"
password = "secret"

[[processor]]
name = "saxon"
backend = "saxon"
distribution = "/opt/saxon/saxon-he-12.jar"
config = "/opt/saxon/config.xml"
"#;

    #[test]
    fn test_parse_processors() {
        let config = ProcessorsConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.processors.len(), 3);

        let remote = config.get("remote-basex").unwrap();
        assert_eq!(remote.backend, Backend::Basex);
        let connection = remote.connection.as_ref().unwrap();
        assert_eq!(connection.display_string(), "admin@db.example.com:1984");

        let saxon = config.get("saxon").unwrap();
        assert_eq!(saxon.config.as_deref(), Some(Path::new("/opt/saxon/config.xml")));
        assert!(saxon.connection.is_none());
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = ProcessorsConfig::parse("[[processor]]\nname = \"x\"\nbackend = \"exist\"\ndistribution = \"x\"\n")
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = ProcessorsConfig::default();
        let mut processor = ProcessorConfig::new("remote", Backend::Basex, "/opt/basex/BaseX.jar");
        processor.connection = Some(ConnectionSettings::new("localhost", 1984).with_credentials("admin", "pw"));
        config.processors.push(processor);
        config.save(&path).unwrap();

        let loaded = ProcessorsConfig::load(&path).unwrap();
        let connection = loaded.processors[0].connection.as_ref().unwrap();
        assert_eq!(connection.username.as_deref(), Some("admin"));
        // passwords are never written back
        assert_eq!(connection.password, None);
    }

    #[test]
    fn test_validate_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("BaseX.jar");
        std::fs::write(&jar, b"PK").unwrap();

        let mut ok = ProcessorConfig::new("basex", Backend::Basex, &jar);
        ok.connection = Some(ConnectionSettings::new("localhost", 1984));
        let duplicate = ProcessorConfig::new("basex", Backend::Basex, &jar);
        let mut saxon = ProcessorConfig::new("saxon", Backend::Saxon, dir.path().join("missing.jar"));
        saxon.connection = Some(ConnectionSettings::new("  ", 0));

        let config = ProcessorsConfig {
            processors: vec![ok, duplicate, saxon],
        };
        let messages: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), 4, "{messages:?}");
        assert_eq!(messages[0], "basex: duplicate processor name");
        assert!(messages[1].starts_with("saxon: distribution not found"));
        assert_eq!(messages[2], "saxon: saxon has no client sessions");
        assert_eq!(messages[3], "saxon: empty hostname");
    }

    #[test]
    fn test_installation_reads_config_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("saxon.xml");
        std::fs::write(&config_path, b"<configuration/>").unwrap();

        let mut processor = ProcessorConfig::new("saxon", Backend::Saxon, dir.path().join("saxon.jar"));
        processor.config = Some(config_path);
        let installation = processor.installation().unwrap();
        assert_eq!(installation.config(), Some(&b"<configuration/>"[..]));
    }
}
