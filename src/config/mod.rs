use crate::models::{AppConfig, MappingStore};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;
use thiserror::Error;

/// Settings file name inside the config directory
pub const APP_CONFIG_FILE: &str = "OBS Refresh Config.yaml";

/// Prefix of environment variables overriding settings, e.g. `OBS_REFRESH_OBS__PORT=4460`
pub const ENV_PREFIX: &str = "OBS_REFRESH";

/// The mapping document could not be loaded; fatal at startup
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Mapping file not found: {0}")]
    NotFound(Utf8PathBuf),

    #[error("Failed to read mapping file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mapping file {path} is not valid JSON: {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Mapping file {path} is not valid YAML: {source}")]
    Yaml {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// The mapping document could not be saved; the file on disk is untouched
#[derive(Error, Debug)]
pub enum MappingSaveError {
    #[error("Mapping document must be an object of groups, got {0}")]
    NotAnObject(&'static str),

    #[error("Mapping document must map groups to objects of source paths: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("Failed to encode mapping document: {0}")]
    Encode(String),

    #[error("Failed to write mapping file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn is_yaml_path(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Configuration manager for the settings file and the mapping document.
///
/// - Settings (`OBS Refresh Config.yaml`): connection and refresh options,
///   layered with `OBS_REFRESH_*` environment overrides
/// - Mapping document (`data.json` by default): group → source → path
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    app_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "OBS Refresh Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            app_config_path: config_dir.join(APP_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the application settings.
    ///
    /// Sources, later ones winning:
    /// 1. Built-in defaults
    /// 2. The settings file, if present
    /// 3. `OBS_REFRESH_*` environment variables (`__` separates nesting levels)
    pub fn load_app_config(&self) -> Result<AppConfig> {
        if !self.app_config_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.app_config_path
            );
        }

        let config = Config::builder()
            .add_source(
                File::from(self.app_config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.app_config_path))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.app_config_path))?;

        tracing::info!(
            "Loaded settings: obs={}, mapping={}, interval={}s",
            app_config.obs.url(),
            app_config.refresh.mapping_file,
            app_config.refresh.default_interval
        );
        Ok(app_config)
    }

    /// Save the application settings.
    pub fn save_app_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize settings to YAML")?;

        fs::write(&self.app_config_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.app_config_path))?;

        tracing::info!("Saved settings to {}", self.app_config_path);
        Ok(())
    }

    /// Write default settings if no settings file exists yet.
    ///
    /// # Returns
    /// `true` if a file was written
    pub fn ensure_app_config(&self) -> Result<bool> {
        if self.app_config_path.exists() {
            return Ok(false);
        }
        self.save_app_config(&AppConfig::default())?;
        Ok(true)
    }

    /// Resolve the mapping document path from the settings.
    ///
    /// Relative paths are taken relative to the config directory.
    pub fn mapping_path(&self, config: &AppConfig) -> Utf8PathBuf {
        let path = Utf8Path::new(&config.refresh.mapping_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Load the mapping document.
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    pub fn load_mapping_store(&self, path: &Utf8Path) -> Result<MappingStore, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let store: MappingStore = if is_yaml_path(path) {
            serde_yaml_ng::from_str(&contents).map_err(|source| ConfigLoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_str(&contents).map_err(|source| ConfigLoadError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };

        tracing::info!(
            "Loaded mapping store from {}: {} groups, {} sources",
            path,
            store.len(),
            store.source_count()
        );
        Ok(store)
    }

    /// Write `store` to `path`, as YAML for `.yaml`/`.yml` and pretty JSON
    /// otherwise.
    pub fn save_mapping_store(
        &self,
        path: &Utf8Path,
        store: &MappingStore,
    ) -> Result<(), MappingSaveError> {
        let contents = if is_yaml_path(path) {
            serde_yaml_ng::to_string(store).map_err(|e| MappingSaveError::Encode(e.to_string()))?
        } else {
            serde_json::to_string_pretty(store)
                .map_err(|e| MappingSaveError::Encode(e.to_string()))?
        };

        fs::write(path, contents).map_err(|source| MappingSaveError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            "Saved mapping store to {}: {} groups, {} sources",
            path,
            store.len(),
            store.source_count()
        );
        Ok(())
    }

    /// Validate an untyped mapping document and save it.
    ///
    /// Anything but an object of groups, each an object of string paths, is
    /// rejected before the file is touched.
    pub fn save_mapping_document(
        &self,
        path: &Utf8Path,
        document: &serde_json::Value,
    ) -> Result<MappingStore, MappingSaveError> {
        if !document.is_object() {
            return Err(MappingSaveError::NotAnObject(json_kind(document)));
        }

        let store: MappingStore =
            serde_json::from_value(document.clone()).map_err(MappingSaveError::Shape)?;
        self.save_mapping_store(path, &store)?;
        Ok(store)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn app_config_path(&self) -> &Utf8Path {
        &self.app_config_path
    }
}
