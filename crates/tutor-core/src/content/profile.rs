//! Student profile: experience points and completed lessons, persisted as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub unit: String,
    pub title: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub xp: u64,
    pub lessons_completed: u32,
    pub completed: Vec<Completion>,
}

pub struct ProfileStore {
    path: PathBuf,
    profile: Profile,
}

impl ProfileStore {
    /// Missing, empty or unreadable files start a fresh profile.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let profile = Self::load(&path);
        Self { path, profile }
    }

    fn load(path: &Path) -> Profile {
        let content = match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => content,
            _ => return Profile::default(),
        };
        match serde_json::from_str(&content) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt profile file, starting fresh");
                Profile::default()
            }
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.profile)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn xp(&self) -> u64 {
        self.profile.xp
    }

    pub fn lessons_completed(&self) -> u32 {
        self.profile.lessons_completed
    }

    pub fn add_xp(&mut self, points: u64) -> Result<()> {
        self.profile.xp += points;
        self.save()
    }

    /// Returns `false` when the lesson was already recorded.
    pub fn record_completion(&mut self, unit: &str, title: &str, xp_gain: u64) -> Result<bool> {
        let already = self
            .profile
            .completed
            .iter()
            .any(|c| c.unit == unit && c.title == title);
        if already {
            return Ok(false);
        }

        self.profile.completed.push(Completion {
            unit: unit.to_string(),
            title: title.to_string(),
            ts: Utc::now(),
        });
        self.profile.lessons_completed += 1;
        self.profile.xp += xp_gain;
        self.save()?;

        tracing::info!(unit = %unit, title = %title, xp = self.profile.xp, "Lesson completed");
        Ok(true)
    }

    pub fn completed_pairs(&self) -> HashSet<(String, String)> {
        self.profile
            .completed
            .iter()
            .map(|c| (c.unit.clone(), c.title.clone()))
            .collect()
    }

    /// Newest first.
    pub fn recent(&self, n: usize) -> Vec<Completion> {
        let mut completed = self.profile.completed.clone();
        completed.sort_by(|a, b| b.ts.cmp(&a.ts));
        completed.truncate(n);
        completed
    }

    pub fn reset(&mut self) -> Result<()> {
        self.profile = Profile::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tutor-profile-{}", Uuid::new_v4()))
            .join("profile.json")
    }

    #[test]
    fn test_missing_file_starts_fresh() {
        let store = ProfileStore::open(scratch_path());
        assert_eq!(store.xp(), 0);
        assert_eq!(store.lessons_completed(), 0);
        assert!(store.recent(6).is_empty());
    }

    #[test]
    fn test_xp_and_completion_persist() {
        let path = scratch_path();
        {
            let mut store = ProfileStore::open(&path);
            store.add_xp(1).unwrap();
            assert!(store.record_completion("Aritmética", "Fracciones", 5).unwrap());
        }

        let store = ProfileStore::open(&path);
        assert_eq!(store.xp(), 6);
        assert_eq!(store.lessons_completed(), 1);
        assert!(store
            .completed_pairs()
            .contains(&("Aritmética".to_string(), "Fracciones".to_string())));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_completion_is_idempotent() {
        let path = scratch_path();
        let mut store = ProfileStore::open(&path);
        assert!(store.record_completion("Álgebra", "Ecuaciones", 5).unwrap());
        assert!(!store.record_completion("Álgebra", "Ecuaciones", 5).unwrap());
        assert_eq!(store.xp(), 5);
        assert_eq!(store.lessons_completed(), 1);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_recent_is_newest_first() {
        let path = scratch_path();
        let mut store = ProfileStore::open(&path);
        for title in ["Uno", "Dos", "Tres"] {
            store.record_completion("U", title, 1).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let recent: Vec<String> = store.recent(2).into_iter().map(|c| c.title).collect();
        assert_eq!(recent, vec!["Tres", "Dos"]);

        store.reset().unwrap();
        assert_eq!(store.xp(), 0);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ broken").unwrap();

        let store = ProfileStore::open(&path);
        assert_eq!(store.profile(), &Profile::default());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_reads_legacy_camel_case_fields() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"xp": 12, "lessonsCompleted": 3}"#).unwrap();

        let store = ProfileStore::open(&path);
        assert_eq!(store.xp(), 12);
        assert_eq!(store.lessons_completed(), 3);
        assert!(store.profile().completed.is_empty());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
