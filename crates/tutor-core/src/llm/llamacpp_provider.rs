//! llama.cpp generation backend: native local inference via llama-cpp-2 bindings.
//!
//! Loads a GGUF model (weights and tokenizer in one file) from the selector's
//! directory and runs blocking single-shot decoding. A fresh context is
//! created per call, so the loaded model can serve several threads.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;

use super::{
    resolve_model_dir, resolve_weights_file, DeviceProfile, GenerationConfig, ModelSelector,
    TextGenerator,
};
use crate::error::{Result, TutorError};

static LLAMA_BACKEND: OnceLock<LlamaBackend> = OnceLock::new();
static BACKEND_INIT: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// llama.cpp may only be initialized once per process.
fn shared_backend() -> Result<&'static LlamaBackend> {
    if let Some(backend) = LLAMA_BACKEND.get() {
        return Ok(backend);
    }
    let _guard = BACKEND_INIT.lock();
    if let Some(backend) = LLAMA_BACKEND.get() {
        return Ok(backend);
    }
    let backend = LlamaBackend::init()
        .map_err(|e| TutorError::Config(format!("Failed to initialize llama.cpp backend: {e:?}")))?;
    Ok(LLAMA_BACKEND.get_or_init(|| backend))
}

pub struct LlamaCppBackend {
    model: LlamaModel,
    selector: ModelSelector,
    weights_path: PathBuf,
    model_root: PathBuf,
    profile: DeviceProfile,
    config: GenerationConfig,
}

// SAFETY: LlamaModel is only read after loading. Mutable decoding state
// (LlamaContext) is created per generate() call and never shared.
unsafe impl Send for LlamaCppBackend {}
unsafe impl Sync for LlamaCppBackend {}

impl LlamaCppBackend {
    pub fn new(
        selector: ModelSelector,
        config: GenerationConfig,
        model_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let model_root = model_root.into();
        let profile = DeviceProfile::detect();
        let (model, weights_path) = Self::load(&model_root, &selector, profile)?;

        Ok(Self {
            model,
            selector,
            weights_path,
            model_root,
            profile,
            config,
        })
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    pub fn device_profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Resolve and load without touching `self`, so a failed reload leaves
    /// the current model in place.
    fn load(
        model_root: &Path,
        selector: &ModelSelector,
        profile: DeviceProfile,
    ) -> Result<(LlamaModel, PathBuf)> {
        let model_dir = resolve_model_dir(model_root, selector)?;
        let weights = resolve_weights_file(&model_dir, selector, profile.precision)?;
        let backend = shared_backend()?;

        tracing::info!(
            model = %selector,
            path = %weights.display(),
            device = ?profile.device,
            precision = ?profile.precision,
            "Loading GGUF model via llama.cpp"
        );

        let params = LlamaModelParams::default().with_n_gpu_layers(profile.gpu_layers);
        let model = LlamaModel::load_from_file(backend, &weights, &params).map_err(|e| {
            TutorError::ModelLoad {
                path: weights.clone(),
                reason: format!("{e:?}"),
            }
        })?;

        tracing::info!(model = %selector, "llama.cpp model loaded successfully");
        Ok((model, weights))
    }

    fn stop_sequences(&self) -> Vec<&str> {
        self.selector
            .template()
            .stop_sequences()
            .iter()
            .copied()
            .chain(self.config.stop_sequences.iter().map(String::as_str))
            .collect()
    }

    fn run_inference(&self, prompt: &str) -> Result<String> {
        let backend = shared_backend()?;
        let config = &self.config;
        let n_ctx = config.context_size.max(512);

        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(n_ctx));
        let mut ctx = self
            .model
            .new_context(backend, ctx_params)
            .map_err(|e| TutorError::generation(format!("Failed to create llama context: {e:?}")))?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| TutorError::generation(format!("Tokenization failed: {e:?}")))?;

        if tokens.is_empty() {
            return Ok(String::new());
        }

        // Keep the tail of an oversized prompt; the question sits at the end
        let max_prompt_tokens = (n_ctx as usize).saturating_sub(config.max_new_tokens).max(1);
        let tokens = if tokens.len() > max_prompt_tokens {
            tracing::warn!(
                n_prompt = tokens.len(),
                max = max_prompt_tokens,
                "Prompt truncated to fit context window"
            );
            tokens[tokens.len() - max_prompt_tokens..].to_vec()
        } else {
            tokens
        };
        let n_prompt = tokens.len();

        let n_batch = 512usize;
        let mut batch = LlamaBatch::new(n_batch, 1);

        let mut processed = 0usize;
        while processed < n_prompt {
            batch.clear();
            let chunk_end = (processed + n_batch).min(n_prompt);
            for (i, token) in tokens.iter().enumerate().take(chunk_end).skip(processed) {
                let is_last = i == n_prompt - 1;
                batch
                    .add(*token, i as i32, &[0], is_last)
                    .map_err(|e| TutorError::generation(format!("Failed to add token to batch: {e:?}")))?;
            }
            ctx.decode(&mut batch).map_err(|e| {
                TutorError::generation(format!(
                    "Prompt decode chunk {processed}-{chunk_end} failed: {e:?}"
                ))
            })?;
            processed = chunk_end;
        }

        let seed = config
            .seed
            .unwrap_or_else(|| chrono::Utc::now().timestamp_subsec_nanos());
        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::penalties(config.repeat_last_n, config.repetition_penalty, 0.0, 0.0),
            LlamaSampler::temp(config.temperature),
            LlamaSampler::top_p(config.top_p, 1),
            LlamaSampler::dist(seed),
        ]);

        let stops = self.stop_sequences();
        let mut output = String::new();
        let mut n_decoded = 0usize;
        let mut cur_pos = n_prompt as i32;

        while n_decoded < config.max_new_tokens {
            let new_token = sampler.sample(&ctx, -1);
            // EOS and end-of-turn tokens such as Gemma's <end_of_turn>
            if self.model.is_eog_token(new_token) {
                break;
            }

            // Plaintext renders control tokens as nothing
            #[allow(deprecated)]
            let piece = self
                .model
                .token_to_str(new_token, Special::Plaintext)
                .unwrap_or_default();
            output.push_str(&piece);

            if truncate_at_stop(&mut output, &stops) {
                break;
            }

            if n_decoded > 100 && n_decoded % 50 == 0 {
                let tail_start = output.len().saturating_sub(300);
                let tail_start = (tail_start..output.len())
                    .find(|i| output.is_char_boundary(*i))
                    .unwrap_or(output.len());
                if has_repetition(&output[tail_start..]) {
                    tracing::warn!(tokens = n_decoded, "Repetition detected, stopping generation");
                    break;
                }
            }

            n_decoded += 1;

            batch.clear();
            batch
                .add(new_token, cur_pos, &[0], true)
                .map_err(|e| TutorError::generation(format!("Failed to add generated token: {e:?}")))?;
            cur_pos += 1;

            ctx.decode(&mut batch)
                .map_err(|e| TutorError::generation(format!("Decode step {n_decoded} failed: {e:?}")))?;
        }

        tracing::debug!(
            prompt_tokens = n_prompt,
            generated_tokens = n_decoded,
            "llama.cpp inference complete"
        );

        Ok(output.trim().to_string())
    }
}

impl TextGenerator for LlamaCppBackend {
    fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.run_inference(prompt)
    }

    fn set_model(&mut self, selector: ModelSelector) -> Result<()> {
        if selector == self.selector {
            return Ok(());
        }
        let (model, weights_path) = Self::load(&self.model_root, &selector, self.profile)?;
        self.model = model;
        self.weights_path = weights_path;
        tracing::info!(from = %self.selector, to = %selector, "Switched local model");
        self.selector = selector;
        Ok(())
    }

    fn supports_concurrent(&self) -> bool {
        true
    }
}

/// Cut `output` at the first stop sequence it contains. Returns whether one was found.
fn truncate_at_stop(output: &mut String, stops: &[&str]) -> bool {
    let cut = stops.iter().filter_map(|stop| output.find(stop)).min();
    match cut {
        Some(at) => {
            output.truncate(at);
            true
        }
        None => false,
    }
}

/// Detect if text ends in a block that already appeared twice before.
fn has_repetition(text: &str) -> bool {
    let bytes = text.as_bytes();
    let len = bytes.len();
    if len < 100 {
        return false;
    }

    for block_size in [30, 50, 80] {
        if len < block_size * 3 {
            continue;
        }
        let last_block = &bytes[len - block_size..];
        let count = bytes[..len - block_size]
            .windows(block_size)
            .filter(|w| *w == last_block)
            .count();
        if count >= 2 {
            return true;
        }
    }

    false
}
