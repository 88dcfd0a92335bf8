//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult, ENV_PREFIX};
use std::path::{Path, PathBuf};

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the first default location found, then the environment
    pub fn load_default() -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = Self::config_exists() {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a specific file, then the environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::File {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Save configuration to a file, format chosen by extension (YAML by default)
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = Self::render(config, path)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::File {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Render a configuration in the format implied by `path`
    pub fn render<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<String> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::to_string_pretty(config).map_err(|e| ConfigError::render("TOML", e))
            }
            Some("json") => {
                serde_json::to_string_pretty(config).map_err(|e| ConfigError::render("JSON", e))
            }
            _ => serde_yaml::to_string(config).map_err(|e| ConfigError::render("YAML", e)),
        }
    }

    /// Default configuration file paths in order of preference
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("auralist.yaml"),
            PathBuf::from("auralist.yml"),
            PathBuf::from("auralist.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let auralist_dir = config_dir.join("auralist");
            paths.push(auralist_dir.join("config.yaml"));
            paths.push(auralist_dir.join("config.yml"));
            paths.push(auralist_dir.join("config.toml"));
        }

        paths
    }

    /// First configuration file found in the default locations
    pub fn config_exists() -> Option<PathBuf> {
        Self::default_config_paths()
            .into_iter()
            .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Config {
        let mut config = Config::default();
        config.index.search_directory = "/music/".to_string();
        config.remote.host = "mirror.local".to_string();
        config.remote.old_root = Some("/srv/old".to_string());
        config
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::File { .. })));
    }

    #[test]
    fn test_save_and_load_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("auralist.yaml");

        ConfigLoader::save_to_file(&sample(), &config_path).unwrap();
        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.index.search_directory, "/music/");
        assert_eq!(loaded.remote.host, "mirror.local");
        assert_eq!(loaded.remote.old_root(), Some("/srv/old"));
    }

    #[test]
    fn test_save_and_load_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("auralist.toml");

        ConfigLoader::save_to_file(&sample(), &config_path).unwrap();
        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.sync.chunk_size, sample().sync.chunk_size);
        assert_eq!(loaded.remote.port, 22);
    }

    #[test]
    fn test_render_json() {
        let rendered = ConfigLoader::render(&sample(), "out.json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["remote"]["host"], "mirror.local");
    }
}
