pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod guard;
pub mod llm;
pub mod prompt;
pub mod service;

// Re-export primary types for convenience
pub use config::{ServiceConfig, TutorConfig};
pub use error::{Result, TutorError};
pub use service::{
    AnswerEvent, AnswerHandle, AnswerService, GeneratedAnswer, InFlightSummary, RequestId,
};

pub use content::{Lesson, LessonCatalog, ProfileStore, StageCursor, Unit};
pub use extract::{postprocess, GenerationMode};
pub use guard::{gate_for_policy, ContentFilter, Gate, StrictContentFilter};
pub use prompt::{build_prompt, PromptTemplate, DEFAULT_POLICY_ES};

// Re-export LLM types
pub use llm::{
    DeviceProfile, DeviceType, GenerationConfig, LlamaCppBackend, ModelSelector, TextGenerator,
};
