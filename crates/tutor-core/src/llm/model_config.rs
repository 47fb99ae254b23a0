//! Model directory resolution: selector -> on-disk folder -> GGUF weights

use std::path::{Path, PathBuf};

use super::{ModelSelector, Precision};
use crate::error::{Result, TutorError};

/// Static alias table for the bundled fine-tunes.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gemma", "gemma-3-1b-it-sft-dpo"),
    ("qwen", "Qwen3-0.6B-sft-dpo"),
];

/// Directory name for a selector. Unknown selectors name their own directory.
pub fn model_directory_name(selector: &ModelSelector) -> &str {
    let key = selector.key();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, dir)| *dir)
        .unwrap_or(key)
}

pub fn resolve_model_dir(model_root: &Path, selector: &ModelSelector) -> Result<PathBuf> {
    let dir = model_root.join(model_directory_name(selector));
    if !dir.is_dir() {
        return Err(TutorError::ModelNotFound {
            selector: selector.to_string(),
            path: dir,
        });
    }
    Ok(dir)
}

/// Pick the GGUF file inside `model_dir`, preferring weights that match the
/// device precision and falling back to the first file by name.
pub fn resolve_weights_file(
    model_dir: &Path,
    selector: &ModelSelector,
    precision: Precision,
) -> Result<PathBuf> {
    let not_found = || TutorError::ModelNotFound {
        selector: selector.to_string(),
        path: model_dir.to_path_buf(),
    };

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)
        .map_err(|_| not_found())?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case("gguf"))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    for marker in precision.weight_markers() {
        let hit = candidates.iter().find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().contains(marker))
                .unwrap_or(false)
        });
        if let Some(path) = hit {
            return Ok(path.clone());
        }
    }

    candidates.into_iter().next().ok_or_else(not_found)
}
