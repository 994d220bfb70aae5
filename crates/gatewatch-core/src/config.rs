use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("match_threshold must be a positive number, got {0}")]
    InvalidThreshold(f32),
}

/// Runtime configuration.
///
/// Layered as: built-in defaults, then the TOML file named by
/// `GATEWATCH_CONFIG`, then `GATEWATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base directory for the default file locations.
    pub data_dir: PathBuf,
    /// Roster CSV (`Nombre,Rol,Permiso`).
    pub roster_path: PathBuf,
    /// JSON gallery of known face encodings.
    pub gallery_path: PathBuf,
    /// Access ledger CSV.
    pub ledger_path: PathBuf,
    /// Rejection log CSV.
    pub rejections_path: PathBuf,
    /// Distance below which a gallery candidate is accepted.
    pub match_threshold: f32,
}

/// Optional keys accepted in the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    roster_path: Option<PathBuf>,
    gallery_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    rejections_path: Option<PathBuf>,
    match_threshold: Option<f32>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup("GATEWATCH_CONFIG") {
            Some(path) => read_file_config(Path::new(&path))?,
            None => FileConfig::default(),
        };

        let data_dir = lookup("GATEWATCH_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| default_data_dir(&lookup));

        let path = |key: &str, from_file: Option<PathBuf>, default: PathBuf| {
            lookup(key).map(PathBuf::from).or(from_file).unwrap_or(default)
        };

        let records = data_dir.join("registros");
        let config = Self {
            roster_path: path(
                "GATEWATCH_ROSTER_PATH",
                file.roster_path,
                data_dir.join("roster.csv"),
            ),
            gallery_path: path(
                "GATEWATCH_GALLERY_PATH",
                file.gallery_path,
                data_dir.join("gallery.json"),
            ),
            ledger_path: path(
                "GATEWATCH_LEDGER_PATH",
                file.ledger_path,
                records.join("accesos_autorizados.csv"),
            ),
            rejections_path: path(
                "GATEWATCH_REJECTIONS_PATH",
                file.rejections_path,
                records.join("intentos_no_aut.csv"),
            ),
            match_threshold: env_f32(&lookup, "GATEWATCH_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
            data_dir,
        };

        if config.match_threshold.is_nan() || config.match_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(config.match_threshold));
        }
        Ok(config)
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn default_data_dir<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("gatewatch")
}

/// Unparsable values are ignored, falling through to the next layer.
fn env_f32<F>(lookup: &F, key: &str) -> Option<f32>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/op")])).unwrap();
        let base = PathBuf::from("/home/op/.local/share/gatewatch");
        assert_eq!(config.data_dir, base);
        assert_eq!(config.roster_path, base.join("roster.csv"));
        assert_eq!(
            config.ledger_path,
            base.join("registros/accesos_autorizados.csv")
        );
        assert_eq!(
            config.rejections_path,
            base.join("registros/intentos_no_aut.csv")
        );
        assert_eq!(config.match_threshold, 0.6);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gatewatch.toml");
        std::fs::write(
            &file,
            "data_dir = \"/srv/gate\"\nmatch_threshold = 0.5\nledger_path = \"/srv/gate/ledger.csv\"\n",
        )
        .unwrap();

        let config = Config::from_lookup(lookup(&[
            ("GATEWATCH_CONFIG", file.to_str().unwrap()),
            ("GATEWATCH_MATCH_THRESHOLD", "0.45"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/gate"));
        assert_eq!(config.roster_path, PathBuf::from("/srv/gate/roster.csv"));
        assert_eq!(config.ledger_path, PathBuf::from("/srv/gate/ledger.csv"));
        assert_eq!(config.match_threshold, 0.45);
    }

    #[test]
    fn test_bad_env_number_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("HOME", "/h"),
            ("GATEWATCH_MATCH_THRESHOLD", "strict"),
        ]))
        .unwrap();
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("HOME", "/h"),
            ("GATEWATCH_MATCH_THRESHOLD", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold(_)));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gatewatch.toml");
        std::fs::write(&file, "match_threshold = \"high\"\n").unwrap();

        let err = Config::from_lookup(lookup(&[("GATEWATCH_CONFIG", file.to_str().unwrap())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
