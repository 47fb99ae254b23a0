//! Lesson and profile collaborators used around the answer pipeline.

pub mod lessons;
pub mod profile;

pub use lessons::{Lesson, LessonCatalog, Stage, StageCursor, Unit};
pub use profile::{Completion, Profile, ProfileStore};
