//! Prompt composition: policy block + question, in the template the model was tuned on.

use serde::{Deserialize, Serialize};

use crate::guard::{MSG_INAPPROPRIATE, MSG_NOT_MATH, MSG_NOT_SPANISH};
use crate::llm::ModelSelector;

/// Default pedagogical policy. The refusal sentences must stay identical to
/// the canned gating messages.
pub static DEFAULT_POLICY_ES: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    format!(
        "Eres un tutor de matemáticas en español. Políticas OBLIGATORIAS:\n\
         1) Solo respondes temas de matemáticas escolares/universitarias. \
         Si la consulta no es de matemáticas, responde exactamente: '{MSG_NOT_MATH}'\n\
         2) Siempre respondes en español, con pasos claros. \
         Si el usuario escribe en otro idioma, responde exactamente: '{MSG_NOT_SPANISH}'\n\
         3) Si la consulta es grosera, inapropiada u ofensiva, responde exactamente: '{MSG_INAPPROPRIATE}'\n\
         4) Cuando incluyas fórmulas, usa notación LaTeX entre $...$ o $$...$$. \
         Sé breve, correcto y pedagógico."
    )
});

/// Role-delimiter convention of a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// `<|system|>` / `<|user|>` / `<|assistant|>` turns
    RoleTagged,
    /// Instruction block followed by a `Usuario:` / `Asistente:` exchange
    Dialogue,
}

impl PromptTemplate {
    pub fn render(&self, system: &str, question: &str) -> String {
        match self {
            Self::RoleTagged => format!(
                "<|system|>\n{system}\n<|user|>\n{question}\n<|assistant|>\n"
            ),
            Self::Dialogue => format!("{system}\n\nUsuario: {question}\nAsistente:"),
        }
    }

    /// Markers that open a new turn; generation stops when one appears.
    pub fn stop_sequences(&self) -> &'static [&'static str] {
        match self {
            Self::RoleTagged => &["<|user|>", "<|system|>", "<|im_end|>", "<|endoftext|>"],
            Self::Dialogue => &["\nUsuario:", "\nUser:", "<end_of_turn>", "<eos>"],
        }
    }
}

pub fn build_prompt(question: &str, system_prompt: Option<&str>, selector: &ModelSelector) -> String {
    let system = system_prompt.unwrap_or(DEFAULT_POLICY_ES.as_str());
    selector.template().render(system, question)
}
