//! Finding config files and stacking them.
//!
//! Layers, lowest precedence first:
//! 1. `<user config dir>/config.toml`, where the directory is
//!    `$TRACERY_CONFIG_DIR` or the platform config dir + `tracery`
//! 2. `tracery.toml` in the project directory (the working directory by
//!    default)
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, TraceryConfig};

/// Project-local file name.
const PROJECT_CONFIG_FILE: &str = "tracery.toml";

/// File name inside the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Subdirectory of the platform config dir.
const APP_NAME: &str = "tracery";

/// Overrides the user config directory when set and non-empty.
const CONFIG_DIR_ENV: &str = "TRACERY_CONFIG_DIR";

/// One candidate layer and whether it contributed.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// Stacked configuration plus the layers that produced it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TraceryConfig,
    /// Every layer that was looked for, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Layers skipped because they could not be read or parsed.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Layers that contributed, lowest precedence first.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|s| s.loaded.then_some(s.path.as_path()))
            .collect()
    }
}

/// Stack the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Stack the layers, reading the user layer from `config_dir` when given.
///
/// `config_dir` wins over `TRACERY_CONFIG_DIR` and the platform default. A
/// layer that fails to parse is skipped with a warning; the stacked result
/// must pass [`TraceryConfig::validate`].
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user_layer = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(user_config_path);
    let project_layer = match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };

    let mut loaded = LoadedConfig {
        config: TraceryConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for path in user_layer.into_iter().chain([project_layer]) {
        loaded.stack(path);
    }

    loaded.config.validate()?;
    Ok(loaded)
}

impl LoadedConfig {
    /// Merge the file at `path` over what is loaded so far, if it exists.
    fn stack(&mut self, path: PathBuf) {
        let mut loaded = false;
        if path.is_file() {
            match load_config_file(&path) {
                Ok(layer) => {
                    self.config.merge(layer);
                    loaded = true;
                }
                Err(e) => self
                    .warnings
                    .push(format!("Skipped {}: {}", path.display(), e)),
            }
        }
        self.sources.push(ConfigSource { path, loaded });
    }
}

/// Parse one config file without discovery or validation.
pub fn load_config_file(path: &Path) -> Result<TraceryConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    TraceryConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating missing directories.
pub fn save_config(config: &TraceryConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path| {
        let at = at.display().to_string();
        move |source| ConfigError::WriteFile { path: at, source }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(write_error(path))
}

pub fn user_config_path() -> Option<PathBuf> {
    Some(user_config_dir()?.join(USER_CONFIG_FILE))
}

/// `$TRACERY_CONFIG_DIR`, else `~/.config/tracery` or the platform
/// equivalent.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => Some(dirs::config_dir()?.join(APP_NAME)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;
    use tracery_graph::BackendKind;

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = load_config_file(Path::new("/nonexistent/tracery.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let scratch = TempDir::new().unwrap();
        let path = scratch.path().join("broken.toml");
        fs::write(&path, "[graph\nbackend = ").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_no_layers_gives_defaults() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.config, TraceryConfig::new());
        assert_eq!(loaded.loaded_from().len(), 0);
        assert_eq!(loaded.sources.len(), 2);
    }

    #[test]
    fn test_layered_merge() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            r#"
[graph]
backend = "sqlite"
path = "/var/lib/tracery/graph.db"

[query]
search_limit = 50
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("tracery.toml"),
            r#"
[graph]
backend = "native"
path = "graph.json"
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        let graph = loaded.config.graph_section();
        assert_eq!(graph.backend_kind().unwrap(), BackendKind::Native);
        assert_eq!(graph.path, Some(PathBuf::from("graph.json")));
        assert_eq!(loaded.config.query_config().search_limit, 50);
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("tracery.toml"), "not valid {{{{").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("Skipped"));
        assert!(!loaded.sources[1].loaded);
    }

    #[test]
    fn test_invalid_values_fail_loading() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("tracery.toml"),
            "[builder]\nsimilarity_threshold = 2.0\n",
        )
        .unwrap();

        let err = load_config_with_options(Some(project.path()), Some(user.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = TraceryConfig::from_toml("[query]\nmax_trace_depth = 2\n").unwrap();

        save_config(&config, &path).unwrap();
        assert_eq!(load_config_file(&path).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let dir = TempDir::new().unwrap();
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        let path = user_config_path();
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        assert_eq!(path, Some(dir.path().join("config.toml")));
    }

    #[test]
    #[serial]
    fn test_empty_env_falls_back_to_platform_dir() {
        unsafe { std::env::set_var(CONFIG_DIR_ENV, "") };
        let dir = user_config_dir();
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        if let Some(dir) = dir {
            assert!(dir.ends_with("tracery"));
        }
    }
}
