//! Runtime configuration for the inference core.
//!
//! The checkpoint path and preprocessing size come from a JSON file, from
//! `LEAFBOT_*` environment variables, or both (environment wins).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{LeafbotError, Result};
use crate::{DEFAULT_TOP_K, IMAGE_SIZE};

pub const ENV_CHECKPOINT: &str = "LEAFBOT_CHECKPOINT";
pub const ENV_IMAGE_SIZE: &str = "LEAFBOT_IMAGE_SIZE";
pub const ENV_TOP_K: &str = "LEAFBOT_TOP_K";
pub const ENV_LOG_FILE: &str = "LEAFBOT_LOG_FILE";

/// Inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Path to the checkpoint file (class names + weights)
    pub checkpoint_path: Option<PathBuf>,

    /// Side of the square the input image is resized to
    pub image_size: u32,

    /// Number of ranked labels returned by default
    pub top_k: usize,

    /// Optional log file (stderr when unset)
    pub log_file: Option<PathBuf>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            image_size: IMAGE_SIZE as u32,
            top_k: DEFAULT_TOP_K,
            log_file: None,
        }
    }
}

impl InferenceConfig {
    /// Create a configuration pointing at a checkpoint, other fields default
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: Some(checkpoint_path.into()),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            LeafbotError::Config(format!("cannot read config file {:?}: {}", path, e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            LeafbotError::Config(format!("invalid config file {:?}: {}", path, e))
        })
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Override fields with any `LEAFBOT_*` variables that are set
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = var(ENV_CHECKPOINT) {
            self.checkpoint_path = Some(PathBuf::from(path));
        }
        if let Some(size) = var(ENV_IMAGE_SIZE) {
            self.image_size = parse_var(ENV_IMAGE_SIZE, &size)?;
        }
        if let Some(k) = var(ENV_TOP_K) {
            self.top_k = parse_var(ENV_TOP_K, &k)?;
        }
        if let Some(path) = var(ENV_LOG_FILE) {
            self.log_file = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// The configured checkpoint path, or a configuration error if unset
    pub fn checkpoint_path(&self) -> Result<&Path> {
        match self.checkpoint_path.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(LeafbotError::Config(format!(
                "checkpoint path is not set (use --checkpoint, the config file or {})",
                ENV_CHECKPOINT
            ))),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.checkpoint_path()?;

        if self.image_size == 0 {
            return Err(LeafbotError::Config(
                "image_size must be greater than 0".to_string(),
            ));
        }

        if self.top_k == 0 {
            return Err(LeafbotError::Config(
                "top_k must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LeafbotError::Config(format!("{} has an invalid value: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::utils::error::ErrorKind;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.top_k, 3);
        assert!(config.checkpoint_path.is_none());
    }

    #[test]
    fn test_unset_checkpoint_is_config_error() {
        let err = InferenceConfig::default().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let empty = InferenceConfig::new("");
        assert_eq!(
            empty.checkpoint_path().unwrap_err().kind(),
            ErrorKind::ConfigError
        );
    }

    #[test]
    fn test_validation() {
        assert!(InferenceConfig::new("model.mpk").validate().is_ok());

        let zero_k = InferenceConfig {
            top_k: 0,
            ..InferenceConfig::new("model.mpk")
        };
        assert!(zero_k.validate().is_err());

        let zero_size = InferenceConfig {
            image_size: 0,
            ..InferenceConfig::new("model.mpk")
        };
        assert!(zero_size.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = InferenceConfig::default()
            .merge_vars(vars(&[
                (ENV_CHECKPOINT, "/srv/leaf.mpk"),
                (ENV_IMAGE_SIZE, "256"),
                (ENV_TOP_K, " 5 "),
            ]))
            .unwrap();

        assert_eq!(config.checkpoint_path, Some(PathBuf::from("/srv/leaf.mpk")));
        assert_eq!(config.image_size, 256);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = InferenceConfig::default()
            .merge_vars(vars(&[(ENV_TOP_K, "three")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.to_string().contains(ENV_TOP_K));
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leafbot.json");
        std::fs::write(&path, r#"{ "checkpoint_path": "plant_disease_model.mpk" }"#).unwrap();

        let config = InferenceConfig::from_file(&path).unwrap();
        assert_eq!(
            config.checkpoint_path,
            Some(PathBuf::from("plant_disease_model.mpk"))
        );
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_from_file_missing() {
        let err = InferenceConfig::from_file(Path::new("/nonexistent/leafbot.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
