//! Pre-generation gating.
//!
//! The authoritative rule is the banned-content filter. Topic and language
//! policy is normally left to the model's system prompt; `StrictContentFilter`
//! enforces both as hard rules for deployments that want it.

use regex::Regex;
use std::sync::{Arc, LazyLock};

pub const MSG_INAPPROPRIATE: &str = "No puedo ayudar con ese tipo de contenido.";
pub const MSG_NOT_MATH: &str =
    "Este tutor solo responde preguntas de matemáticas. Reformula tu consulta dentro de ese ámbito.";
pub const MSG_NOT_SPANISH: &str = "Por favor, formula tu pregunta en español para poder ayudarte.";

static BANNED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(insult\w*|groser\w*|obscen\w*|porn\w*|sexual\w*|violaci[oó]n|odio|racis\w*|matar|asesin\w*|suicid\w*|autolesi\w*)\b",
        r"\b(armas?|drogas?|explosiv\w*)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("banned pattern is valid"))
    .collect()
});

/// Stems, so "fracción" and "fracciones" both hit "fracci".
const MATH_TOPICS: &[&str] = &[
    "aritm", "álge", "alge", "geometr", "trigonom", "cálcul", "calcul", "estad", "probab",
    "fracci", "divis", "multip", "sum", "rest", "porcent", "proporc", "matem", "ecuaci",
    "inecuac", "vect", "matriz", "funci", "deriv", "integr",
];

const SPANISH_MARKERS: &[&str] = &[
    " el ", " la ", " de ", " que ", " y ", " con ", " una ", " por ", " para ", " como ",
    " esto ", " es ", " qué ", " cómo ", " cuál ",
];

const SPANISH_CHARS: &[char] = &['á', 'é', 'í', 'ó', 'ú', 'ñ', '¿', '¡'];

pub fn is_banned(text: &str) -> bool {
    let lowered = text.to_lowercase();
    BANNED_PATTERNS.iter().any(|re| re.is_match(&lowered))
}

pub fn is_math_related(text: &str) -> bool {
    let lowered = text.to_lowercase();
    MATH_TOPICS.iter().any(|k| lowered.contains(k))
}

/// Cheap heuristic: a Spanish function word or a Spanish-only character.
pub fn looks_spanish(text: &str) -> bool {
    let padded = format!(" {} ", text.to_lowercase());
    SPANISH_MARKERS.iter().any(|m| padded.contains(m)) || padded.contains(SPANISH_CHARS)
}

/// Returns the canned reply when the question must not reach the model.
pub fn pregate(text: &str) -> Option<&'static str> {
    if is_banned(text) {
        return Some(MSG_INAPPROPRIATE);
    }
    None
}

/// Gating policy injected into the answer service.
pub trait Gate: Send + Sync {
    fn pregate(&self, text: &str) -> Option<&'static str>;

    fn name(&self) -> &'static str;
}

/// Banned-content filter only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentFilter;

impl Gate for ContentFilter {
    fn pregate(&self, text: &str) -> Option<&'static str> {
        pregate(text)
    }

    fn name(&self) -> &'static str {
        "content-filter"
    }
}

/// Hard gate. Priority: banned > not math > not Spanish.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictContentFilter;

impl Gate for StrictContentFilter {
    fn pregate(&self, text: &str) -> Option<&'static str> {
        if is_banned(text) {
            Some(MSG_INAPPROPRIATE)
        } else if !is_math_related(text) {
            Some(MSG_NOT_MATH)
        } else if !looks_spanish(text) {
            Some(MSG_NOT_SPANISH)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "strict-content-filter"
    }
}

pub fn gate_for_policy(strict: bool) -> Arc<dyn Gate> {
    if strict {
        Arc::new(StrictContentFilter)
    } else {
        Arc::new(ContentFilter)
    }
}
