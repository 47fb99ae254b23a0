use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TutorError};
use crate::llm::{GenerationConfig, ModelSelector};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Holds `profile.json` and `lessons.json`
    pub data_dir: PathBuf,
    /// Root under which each model has its own directory
    pub model_dir: PathBuf,
    pub model: ModelSelector,
    pub generation: GenerationConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Upper bound on simultaneous generations; backends that cannot run
    /// concurrently are always limited to one.
    pub max_concurrent_generations: usize,
    /// Enforce the math-only / Spanish-only policy before the model sees the question
    pub strict_gating: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: 1,
            strict_gating: false,
        }
    }
}

impl TutorConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.max_new_tokens == 0 {
            return Err(TutorError::Config("generation.max_new_tokens must be > 0".into()));
        }
        if generation.temperature <= 0.0 {
            return Err(TutorError::Config("generation.temperature must be > 0".into()));
        }
        if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
            return Err(TutorError::Config("generation.top_p must be in (0.0, 1.0]".into()));
        }
        if generation.max_new_tokens >= generation.context_size as usize {
            return Err(TutorError::Config(
                "generation.max_new_tokens must be < generation.context_size".into(),
            ));
        }
        if self.service.max_concurrent_generations == 0 {
            return Err(TutorError::Config(
                "service.max_concurrent_generations must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TutorError::Config(format!("Failed to read config file: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| TutorError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.json")
    }

    pub fn lessons_path(&self) -> PathBuf {
        self.data_dir.join("lessons.json")
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("math-tutor");

        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            data_dir.join("models")
        };

        Self {
            data_dir,
            model_dir,
            model: ModelSelector::default(),
            generation: GenerationConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_default_is_valid() {
        let config = TutorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model, ModelSelector::Gemma);
        assert!(!config.service.strict_gating);
        assert!(config.profile_path().ends_with("profile.json"));
    }

    #[test]
    fn test_validate_rejects_broken_values() {
        let mut config = TutorConfig::default();
        config.generation.temperature = 0.0;
        assert!(config.validate().is_err());

        let mut config = TutorConfig::default();
        config.generation.top_p = 1.5;
        assert!(config.validate().is_err());

        let mut config = TutorConfig::default();
        config.service.max_concurrent_generations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let path = std::env::temp_dir().join(format!("tutor-config-{}.json", Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"model": "qwen", "model_dir": "/opt/models", "generation": {"max_new_tokens": 128}}"#,
        )
        .unwrap();

        let config = TutorConfig::from_file(&path).unwrap();
        assert_eq!(config.model, ModelSelector::Qwen);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.generation.max_new_tokens, 128);
        assert_eq!(config.generation.top_p, 0.9);
        assert_eq!(config.service.max_concurrent_generations, 1);

        std::fs::remove_file(path).ok();
    }
}
