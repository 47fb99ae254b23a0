//! Lesson catalogue: units -> lessons -> stages of displayable markup

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

const EMPTY_STAGE_HTML: &str = "<h1>Vacío</h1>";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub html: Option<String>,
}

impl Stage {
    pub fn html(&self) -> &str {
        self.html.as_deref().unwrap_or(EMPTY_STAGE_HTML)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default = "untitled")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

fn untitled() -> String {
    "(sin título)".to_string()
}

impl Lesson {
    /// Question sent to the tutor when the student asks for an AI explanation.
    pub fn explain_question(&self) -> String {
        format!("Explícame {} con más detalle", self.title)
    }

    pub fn cursor(&self) -> StageCursor<'_> {
        StageCursor {
            stages: &self.stages,
            index: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub unit: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Read-only catalogue loaded from `lessons.json` (a JSON list of units).
#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    units: Vec<Unit>,
}

impl LessonCatalog {
    pub fn new(units: Vec<Unit>) -> Self {
        Self { units }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let units: Vec<Unit> = serde_json::from_str(content)?;
        tracing::debug!(units = units.len(), "Lesson catalogue loaded");
        Ok(Self { units })
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.unit.as_str()).collect()
    }

    pub fn lessons(&self, unit: &str) -> Option<&[Lesson]> {
        self.units
            .iter()
            .find(|u| u.unit == unit)
            .map(|u| u.lessons.as_slice())
    }

    pub fn find(&self, unit: &str, title: &str) -> Option<&Lesson> {
        self.lessons(unit)?.iter().find(|l| l.title == title)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Position inside a lesson's stages. Moves past either end are ignored.
#[derive(Debug, Clone)]
pub struct StageCursor<'a> {
    stages: &'a [Stage],
    index: usize,
}

impl<'a> StageCursor<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn at_first(&self) -> bool {
        self.index == 0
    }

    pub fn at_last(&self) -> bool {
        self.index + 1 >= self.stages.len()
    }

    pub fn current_html(&self) -> &'a str {
        self.stages
            .get(self.index)
            .map(Stage::html)
            .unwrap_or(EMPTY_STAGE_HTML)
    }

    pub fn forward(&mut self) -> bool {
        if self.index + 1 < self.stages.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn back(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }
}
