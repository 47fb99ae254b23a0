//! LLM module - local causal language model behind a synchronous generator trait

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::prompt::PromptTemplate;

pub mod llamacpp_provider;
pub mod model_config;

pub use llamacpp_provider::LlamaCppBackend;
pub use model_config::{model_directory_name, resolve_model_dir, resolve_weights_file};

/// Models the tutor ships adapters for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelSelector {
    Gemma,          // Gemma 3 1B instruct, SFT + DPO tuned
    Qwen,           // Qwen3 0.6B, SFT + DPO tuned
    Custom(String), // Any other directory under the model root
}

impl ModelSelector {
    pub fn key(&self) -> &str {
        match self {
            Self::Gemma => "gemma",
            Self::Qwen => "qwen",
            Self::Custom(name) => name,
        }
    }

    /// Prompt shape the model family was tuned on.
    pub fn template(&self) -> PromptTemplate {
        match self {
            Self::Qwen => PromptTemplate::RoleTagged,
            Self::Gemma | Self::Custom(_) => PromptTemplate::Dialogue,
        }
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::Gemma
    }
}

impl FromStr for ModelSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "gemma" => Self::Gemma,
            "qwen" => Self::Qwen,
            _ => Self::Custom(s.trim().to_string()),
        })
    }
}

impl From<String> for ModelSelector {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(selector) => selector,
            Err(never) => match never {},
        }
    }
}

impl From<ModelSelector> for String {
    fn from(selector: ModelSelector) -> Self {
        selector.key().to_string()
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Device type for local models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu,
    Cuda(usize), // GPU index
    Metal,       // Apple Silicon
}

impl DeviceType {
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

/// Numeric precision preferred for the selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    F16,
    F32,
}

impl Precision {
    /// Filename fragments of GGUF weights that suit this precision, best first.
    pub fn weight_markers(&self) -> &'static [&'static str] {
        match self {
            Self::F16 => &["f16", "bf16"],
            Self::F32 => &["f32", "q8_0", "q4_k_m"],
        }
    }
}

/// Hardware detection result
#[derive(Debug, Clone)]
pub struct HardwareInfo {
    pub has_cuda: bool,
    pub has_metal: bool,
    pub recommended_device: DeviceType,
}

impl HardwareInfo {
    /// Auto-detect acceleration that this build of llama.cpp can actually use
    pub fn detect() -> Self {
        let has_cuda = cfg!(feature = "cuda") && Self::check_cuda();
        let has_metal = cfg!(feature = "metal") && Self::check_metal();

        let recommended_device = if has_cuda {
            DeviceType::Cuda(0)
        } else if has_metal {
            DeviceType::Metal
        } else {
            DeviceType::Cpu
        };

        tracing::debug!(
            cuda = has_cuda,
            metal = has_metal,
            recommended = ?recommended_device,
            "Hardware summary"
        );

        HardwareInfo {
            has_cuda,
            has_metal,
            recommended_device,
        }
    }

    fn check_cuda() -> bool {
        if std::env::var("CUDA_PATH").is_ok() || std::env::var("CUDA_HOME").is_ok() {
            return true;
        }

        #[cfg(not(target_os = "windows"))]
        let result = std::process::Command::new("nvidia-smi").output();
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("nvidia-smi.exe").output();

        result.map(|o| o.status.success()).unwrap_or(false)
    }

    fn check_metal() -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }
}

/// Device, precision and layer offload chosen for a backend instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub device: DeviceType,
    pub precision: Precision,
    pub gpu_layers: u32,
}

impl DeviceProfile {
    pub fn for_device(device: DeviceType) -> Self {
        if device.is_accelerated() {
            Self {
                device,
                precision: Precision::F16,
                gpu_layers: 999,
            }
        } else {
            Self {
                device,
                precision: Precision::F32,
                gpu_layers: 0,
            }
        }
    }

    pub fn detect() -> Self {
        Self::for_device(HardwareInfo::detect().recommended_device)
    }
}

/// Sampling parameters for a single generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    /// Window of recent tokens the repetition penalty looks at
    pub repeat_last_n: i32,
    pub context_size: u32,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.3,
            top_p: 0.9,
            repetition_penalty: 1.2,
            repeat_last_n: 64,
            context_size: 4096,
            stop_sequences: vec![],
            seed: None,
        }
    }
}

/// Owner of the long-lived model handle.
///
/// `generate` blocks for the whole decode; callers that must stay responsive
/// run it on a blocking thread.
pub trait TextGenerator: Send + Sync {
    fn selector(&self) -> &ModelSelector;

    /// Continuation only, prompt excluded.
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Reloads weights for `selector`. On error the current model stays loaded.
    fn set_model(&mut self, selector: ModelSelector) -> Result<()>;

    /// Whether `generate` may run on several threads at once.
    fn supports_concurrent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("gemma".parse::<ModelSelector>().unwrap(), ModelSelector::Gemma);
        assert_eq!(" QWEN ".parse::<ModelSelector>().unwrap(), ModelSelector::Qwen);
        assert_eq!(
            "phi-mini".parse::<ModelSelector>().unwrap(),
            ModelSelector::Custom("phi-mini".to_string())
        );
        assert_eq!(ModelSelector::Qwen.to_string(), "qwen");
    }

    #[test]
    fn test_selector_serde_as_string() {
        let json = serde_json::to_string(&ModelSelector::Qwen).unwrap();
        assert_eq!(json, "\"qwen\"");
        let back: ModelSelector = serde_json::from_str("\"my-model\"").unwrap();
        assert_eq!(back, ModelSelector::Custom("my-model".to_string()));
    }

    #[test]
    fn test_template_per_family() {
        assert_eq!(ModelSelector::Qwen.template(), PromptTemplate::RoleTagged);
        assert_eq!(ModelSelector::Gemma.template(), PromptTemplate::Dialogue);
        assert_eq!(
            ModelSelector::Custom("x".into()).template(),
            PromptTemplate::Dialogue
        );
    }

    #[test]
    fn test_device_profile_precision() {
        let cpu = DeviceProfile::for_device(DeviceType::Cpu);
        assert_eq!(cpu.precision, Precision::F32);
        assert_eq!(cpu.gpu_layers, 0);

        let gpu = DeviceProfile::for_device(DeviceType::Cuda(0));
        assert_eq!(gpu.precision, Precision::F16);
        assert!(gpu.gpu_layers > 0);
    }

    #[test]
    fn test_generation_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_new_tokens, 256);
        assert!(config.temperature > 0.0);
        assert!(config.top_p > 0.0 && config.top_p <= 1.0);
    }
}
