//! Structured tag extraction for raw model output.
//!
//! The tuned models answer with tagged segments (`<RESUMEN>…</RESUMEN>` and
//! friends). Extraction turns them into labeled plain text; untagged output is
//! cleaned of role markers instead.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::LazyLock;

/// Which extraction rules apply to a request's output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Problem chat: EJEMPLO / RESUMEN
    #[default]
    Default,
    /// Lesson explanation: TEMATICA / OBJETIVO / EXPLICACION / CONEXION, or ERROR
    Explain,
}

impl FromStr for GenerationMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "explain" => Self::Explain,
            _ => Self::Default,
        })
    }
}

static ERROR_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ERROR>.*?</ERROR>").expect("error block regex is valid")
});

static EXPLAIN_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(<\|assistant\|>|Asistente:)").expect("explain lead regex is valid")
});

static ASSISTANT_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(<\|assistant\|>|\*\*Asistente:?\*\*|Asistente:)\s*")
        .expect("assistant lead regex is valid")
});

// Without (?s) `.*` stops at the first newline: only the marker line goes.
static ROLE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(<\|system\|>|<\|user\|>).*").expect("role line regex is valid")
});

static TRAILING_ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(<\|user\|>|<\|system\|>|<\|assistant\|>|Usuario:)\s*$")
        .expect("trailing role regex is valid")
});

const EXPLAIN_SECTIONS: &[(&str, &str)] = &[
    ("TEMATICA", "Temática"),
    ("OBJETIVO", "Objetivo"),
    ("EXPLICACION", "Explicación"),
    ("CONEXION", "Conexión"),
];

fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?is)<{tag}>(.*?)</{tag}>")).expect("tag regex is valid")
}

static TAG_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    EXPLAIN_SECTIONS
        .iter()
        .map(|(tag, _)| *tag)
        .chain(["EJEMPLO", "RESUMEN"])
        .map(|tag| (tag, tag_regex(tag)))
        .collect()
});

/// Trimmed body of the first `<tag>…</tag>` segment, possibly empty.
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let (_, re) = TAG_RES.iter().find(|(t, _)| *t == tag)?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

pub fn postprocess(raw: &str, mode: GenerationMode) -> String {
    match mode {
        GenerationMode::Explain => postprocess_explain(raw),
        GenerationMode::Default => postprocess_default(raw),
    }
}

fn postprocess_explain(raw: &str) -> String {
    if let Some(m) = ERROR_BLOCK_RE.find(raw) {
        return m.as_str().trim().to_string();
    }

    let sections: Vec<String> = EXPLAIN_SECTIONS
        .iter()
        .filter_map(|(tag, label)| extract_tag(raw, tag).map(|body| format!("{label}: {body}")))
        .collect();
    if !sections.is_empty() {
        return sections.join("\n");
    }

    EXPLAIN_LEAD_RE.replace(raw, "").trim().to_string()
}

fn postprocess_default(raw: &str) -> String {
    // Empty bodies count as absent here; explain mode keeps them.
    let example = extract_tag(raw, "EJEMPLO").filter(|body| !body.is_empty());
    let summary = extract_tag(raw, "RESUMEN").filter(|body| !body.is_empty());

    if example.is_some() || summary.is_some() {
        let mut parts = Vec::new();
        if let Some(example) = example {
            parts.push(format!("Ejemplo:\n{example}"));
        }
        if let Some(summary) = summary {
            parts.push(format!("Resumen:\n{summary}"));
        }
        return parts.join("\n\n");
    }

    let cleaned = ASSISTANT_LEAD_RE.replace(raw, "");
    let cleaned = ROLE_LINE_RE.replace(&cleaned, "");
    let cleaned = TRAILING_ROLE_RE.replace(&cleaned, "");
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing_defaults_unknown() {
        assert_eq!("explain".parse::<GenerationMode>().unwrap(), GenerationMode::Explain);
        assert_eq!("EXPLAIN".parse::<GenerationMode>().unwrap(), GenerationMode::Explain);
        assert_eq!("quiz".parse::<GenerationMode>().unwrap(), GenerationMode::Default);
    }

    #[test]
    fn test_example_and_summary_in_order() {
        let out = postprocess(
            "<RESUMEN>B</RESUMEN> ruido <EJEMPLO>A</EJEMPLO>",
            GenerationMode::Default,
        );
        assert_eq!(out, "Ejemplo:\nA\n\nResumen:\nB");

        let out = postprocess("<EJEMPLO>A</EJEMPLO><RESUMEN>B</RESUMEN>", GenerationMode::Default);
        let a = out.find('A').unwrap();
        let b = out.find('B').unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_summary_only() {
        let out = postprocess(
            "<RESUMEN>Una fracción representa...</RESUMEN>",
            GenerationMode::Default,
        );
        assert_eq!(out, "Resumen:\nUna fracción representa...");
    }

    #[test]
    fn test_tags_are_case_insensitive_and_multiline() {
        let out = postprocess(
            "<ejemplo>\n1/2 + 1/4\n= 3/4\n</ejemplo>",
            GenerationMode::Default,
        );
        assert_eq!(out, "Ejemplo:\n1/2 + 1/4\n= 3/4");
    }

    #[test]
    fn test_leading_assistant_marker_stripped() {
        let out = postprocess("Asistente:  La respuesta es 4. ", GenerationMode::Default);
        assert_eq!(out, "La respuesta es 4.");

        let out = postprocess("<|assistant|>\nx = 2", GenerationMode::Default);
        assert_eq!(out, "x = 2");

        let out = postprocess("**Asistente:** Claro.", GenerationMode::Default);
        assert_eq!(out, "Claro.");
    }

    #[test]
    fn test_role_line_and_trailing_marker_stripped() {
        let out = postprocess("<|user|> repetido\nx = 3\nUsuario:", GenerationMode::Default);
        assert_eq!(out, "x = 3");
    }

    #[test]
    fn test_plain_text_is_only_trimmed() {
        assert_eq!(postprocess("  2 + 2 = 4\n", GenerationMode::Default), "2 + 2 = 4");
        assert_eq!(postprocess("  2 + 2 = 4\n", GenerationMode::Explain), "2 + 2 = 4");
    }

    #[test]
    fn test_explain_sections_fixed_order() {
        let raw = "<CONEXION>Se usa en física</CONEXION>\
                   <TEMATICA>Derivadas</TEMATICA>\
                   <EXPLICACION>Mide el cambio</EXPLICACION>";
        let out = postprocess(raw, GenerationMode::Explain);
        assert_eq!(
            out,
            "Temática: Derivadas\nExplicación: Mide el cambio\nConexión: Se usa en física"
        );
    }

    #[test]
    fn test_explain_keeps_empty_sections() {
        let raw = "<TEMATICA></TEMATICA><OBJETIVO> Resolver sistemas </OBJETIVO>";
        assert_eq!(
            postprocess(raw, GenerationMode::Explain),
            "Temática: \nObjetivo: Resolver sistemas"
        );
    }

    #[test]
    fn test_default_ignores_empty_sections() {
        assert_eq!(
            postprocess("<EJEMPLO> </EJEMPLO>Asistente: nada", GenerationMode::Default),
            "<EJEMPLO> </EJEMPLO>Asistente: nada"
        );
        assert_eq!(
            postprocess("<EJEMPLO></EJEMPLO><RESUMEN>B</RESUMEN>", GenerationMode::Default),
            "Resumen:\nB"
        );
    }

    #[test]
    fn test_explain_error_block_verbatim() {
        let raw = "ruido <ERROR>Tema fuera de matemáticas</ERROR> <TEMATICA>x</TEMATICA>";
        assert_eq!(
            postprocess(raw, GenerationMode::Explain),
            "<ERROR>Tema fuera de matemáticas</ERROR>"
        );
    }

    #[test]
    fn test_explain_fallback_strips_marker() {
        assert_eq!(
            postprocess("Asistente: Las matrices...", GenerationMode::Explain),
            "Las matrices..."
        );
    }

    #[test]
    fn test_postprocess_is_pure() {
        let raws = [
            "<EJEMPLO>A</EJEMPLO>",
            "Asistente: hola",
            "<TEMATICA>T</TEMATICA>",
            "",
        ];
        for raw in raws {
            for mode in [GenerationMode::Default, GenerationMode::Explain] {
                assert_eq!(postprocess(raw, mode), postprocess(raw, mode));
            }
        }
    }
}
