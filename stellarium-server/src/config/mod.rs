//! Configuration module for the bot server.
//!
//! Handles loading configuration from the TOML file, CLI arguments and
//! environment variables, and validating the result.

pub mod file;

use crate::config::file::FileConfig;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use stellarium_core::config::PipelineConfig;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub token: Option<String>,
}

/// Validated configuration.
#[derive(Clone)]
pub struct LoadedConfig {
    pub token: String,
    /// Always ends with `/` so endpoint paths can be joined onto it.
    pub horizon_url: Url,
    pub database_path: PathBuf,
    pub listen: Option<SocketAddr>,
    pub pipeline: PipelineConfig,
}

impl fmt::Debug for LoadedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedConfig")
            .field("token", &"<redacted>")
            .field("horizon_url", &self.horizon_url.as_str())
            .field("database_path", &self.database_path)
            .field("listen", &self.listen)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// A missing config file is not an error: every section has defaults
    /// and the token may come from the environment.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::IoError {
                    path: self.config_path.clone(),
                    source,
                });
            }
        };
        self.build(file_config)
    }

    fn build(&self, file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let token = match &self.overrides.token {
            Some(token) => token.trim().to_owned(),
            None => read_token(&file_config.telegram.token_file)?,
        };
        let database_path = self
            .overrides
            .database
            .clone()
            .unwrap_or(file_config.database.path);

        let loaded = LoadedConfig {
            token,
            horizon_url: with_trailing_slash(file_config.horizon.url),
            database_path,
            listen: file_config.server.listen,
            pipeline: file_config.pipeline.apply(PipelineConfig::default()),
        };
        validate(&loaded)?;
        Ok(loaded)
    }
}

fn read_token(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_owned())
        .map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn validate(config: &LoadedConfig) -> Result<(), ConfigError> {
    if config.token.is_empty() {
        return Err(ConfigError::ValidationError(
            "telegram bot token is empty".into(),
        ));
    }
    if config.horizon_url.cannot_be_a_base() {
        return Err(ConfigError::ValidationError(format!(
            "horizon url {} cannot be used as a base url",
            config.horizon_url
        )));
    }

    let pipeline = &config.pipeline;
    if pipeline.debounce.is_zero() || pipeline.flush_tick.is_zero() {
        return Err(ConfigError::ValidationError(
            "pipeline debounce and flush tick must be non-zero".into(),
        ));
    }
    if pipeline.checkpoint_interval.is_zero() {
        return Err(ConfigError::ValidationError(
            "checkpoint interval must be non-zero".into(),
        ));
    }
    if pipeline.max_fragments == 0 || pipeline.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "max_fragments and queue_capacity must be at least 1".into(),
        ));
    }
    if pipeline.max_message_chars == 0 {
        return Err(ConfigError::ValidationError(
            "max_message_chars must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(token: Option<&str>) -> ConfigLoader {
        ConfigLoader::new(
            "/nonexistent/stellarium.toml",
            Overrides {
                database: None,
                token: token.map(str::to_owned),
            },
        )
    }

    fn parse(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_missing_file_with_env_token() {
        let config = loader(Some(" 123:abc \n")).load().unwrap();
        assert_eq!(config.token, "123:abc");
        assert_eq!(config.horizon_url.as_str(), "https://horizon.stellar.org/");
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_horizon_url_gets_trailing_slash() {
        let config = loader(Some("t"))
            .build(parse("[horizon]\nurl = \"https://example.com/horizon\""))
            .unwrap();
        assert_eq!(config.horizon_url.as_str(), "https://example.com/horizon/");
        assert_eq!(
            config.horizon_url.join("operations").unwrap().as_str(),
            "https://example.com/horizon/operations"
        );
    }

    #[test]
    fn test_token_file_is_read_and_trimmed() {
        let path = std::env::temp_dir().join(format!("stellarium-token-{}", std::process::id()));
        std::fs::write(&path, "  42:secret\r\n").unwrap();
        let toml_str = format!("[telegram]\ntoken_file = {:?}", path.to_str().unwrap());

        let config = loader(None).build(parse(&toml_str)).unwrap();
        assert_eq!(config.token, "42:secret");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_token_file_is_an_error() {
        let err = loader(None)
            .build(parse("[telegram]\ntoken_file = \"/nonexistent/bot.key\""))
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            loader(Some("   ")).build(FileConfig::default()),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            loader(Some("t")).build(parse("[pipeline]\nflush_tick_ms = 0")),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            loader(Some("t")).build(parse("[pipeline]\nmax_fragments = 0")),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_database_override() {
        let loader = ConfigLoader::new(
            "/nonexistent/stellarium.toml",
            Overrides {
                database: Some("/tmp/other.db".into()),
                token: Some("t".into()),
            },
        );
        let config = loader.build(parse("[database]\npath = \"a.db\"")).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
    }
}
