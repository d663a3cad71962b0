//! Config file discovery, loading and serialization.

use crate::config::{DeploymentConfig, RawConfig};
use crate::error::ConfigError;
use crate::system::paths::{default_config_search_paths, first_existing};
use std::fs;
use std::path::{Path, PathBuf};

/// Decide which configuration file to use.
///
/// An explicit `--config` path must exist. Otherwise the default search list
/// is tried in order.
pub fn locate_config(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        return Ok(path.to_path_buf());
    }

    let candidates = default_config_search_paths();
    first_existing(&candidates).ok_or_else(|| {
        let tried = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ConfigError::FileNotFound(format!("no configuration found (tried {})", tried))
    })
}

/// Parse TOML text into a resolved, validated configuration.
pub fn parse_config(content: &str) -> Result<DeploymentConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(content)?;
    raw.resolve()
}

/// Load config from a TOML file.
pub fn load_config_from_file(path: &Path) -> Result<DeploymentConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config = parse_config(&content)?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Render the resolved configuration, defaults included, as TOML.
pub fn render_config(config: &DeploymentConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(&config.to_raw())
        .map_err(|e| ConfigError::ValidationFailed(format!("cannot serialize config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
authority_address = "10.0.0.1"
replica_address = "10.0.0.2"
cache_address = "10.0.0.3"
edge_address = "10.0.0.4"
repo_org = "example.org"
repos = ["software"]
cache_allow = ["10.0.0.0/24"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).expect("sample parses");
        assert_eq!(config.repos, vec!["software"]);
        assert_eq!(config.edge.address, "10.0.0.4");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let content = format!("{}\ncache_alow = [\"10.0.0.0/8\"]\n", SAMPLE);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::InvalidToml(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_from_file(Path::new("/nonexistent/path/tierup.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_locate_explicit_missing() {
        let result = locate_config(Some(Path::new("/nonexistent/tierup.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_render_then_parse() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tierup.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = load_config_from_file(&path).unwrap();

        let rendered = render_config(&config).unwrap();
        assert!(rendered.contains("cache_disk_mb = 5000"));
        assert_eq!(parse_config(&rendered).unwrap(), config);
    }
}
