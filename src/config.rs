//! Threshold configuration files.
//!
//! A threshold file is a JSON object with any subset of the
//! [`ThresholdConfig`] fields; missing fields keep their defaults:
//!
//! ```json
//! { "critical_cpu": 10.0, "critical_mem": 900000000 }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::validator::ThresholdConfig;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    /// Levels are not ordered accepted <= warning <= critical.
    InvalidBands(ThresholdConfig),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid threshold file {}: {}", path.display(), source)
            }
            ConfigError::InvalidBands(t) => write!(
                f,
                "thresholds must satisfy accepted <= warning <= critical \
                 (cpu {}/{}/{}, mem {}/{}/{})",
                t.accepted_cpu,
                t.warning_cpu,
                t.critical_cpu,
                t.accepted_mem,
                t.warning_mem,
                t.critical_mem
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidBands(_) => None,
        }
    }
}

/// Parses thresholds from JSON text.
pub fn parse_thresholds(text: &str, path: &Path) -> Result<ThresholdConfig, ConfigError> {
    let thresholds: ThresholdConfig =
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if !thresholds.is_ordered() {
        return Err(ConfigError::InvalidBands(thresholds));
    }
    Ok(thresholds)
}

/// Reads thresholds from a JSON file.
pub fn load_thresholds(path: &Path) -> Result<ThresholdConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let thresholds = parse_thresholds(&text, path)?;
    debug!("Loaded thresholds from {}: {:?}", path.display(), thresholds);
    Ok(thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_file(r#"{ "critical_cpu": 10.0, "critical_mem": 900000000 }"#);

        let t = load_thresholds(file.path()).unwrap();

        assert_eq!(t.critical_cpu, 10.0);
        assert_eq!(t.critical_mem, 900_000_000);
        assert_eq!(t.accepted_cpu, ThresholdConfig::default().accepted_cpu);
        assert_eq!(t.warning_mem, ThresholdConfig::default().warning_mem);
    }

    #[test]
    fn test_empty_object_is_default() {
        let file = write_file("{}");
        assert_eq!(
            load_thresholds(file.path()).unwrap(),
            ThresholdConfig::default()
        );
    }

    #[test]
    fn test_missing_file() {
        let err = load_thresholds(Path::new("/nonexistent/thresholds.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/thresholds.json"));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_file("{ critical_cpu: ");
        assert!(matches!(
            load_thresholds(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_file(r#"{ "critical_cpus": 10.0 }"#);
        assert!(matches!(
            load_thresholds(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unordered_bands_rejected() {
        let err = parse_thresholds(r#"{ "warning_cpu": 8.0 }"#, Path::new("t.json")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBands(_)));
    }

    #[test]
    fn test_roundtrip_through_serde() {
        let t = ThresholdConfig {
            critical_cpu: 12.5,
            ..Default::default()
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(parse_thresholds(&json, Path::new("t.json")).unwrap(), t);
    }
}
