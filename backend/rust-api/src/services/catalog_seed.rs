use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

use crate::config::Config;
use crate::models::{Achievement, Level, Question};
use crate::repo::Repositories;

/// Catalog content loaded at start-up: levels with embedded steps, the
/// questions they reference and the achievement catalog.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub levels: Vec<Level>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub questions: usize,
    pub levels: usize,
    pub achievements: usize,
}

impl CatalogSeed {
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut seed: CatalogSeed =
            serde_json::from_str(contents).context("Failed to deserialize catalog seed payload")?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&mut self) -> Result<()> {
        for question in &self.questions {
            if !question.is_well_formed() {
                bail!(
                    "Question {} needs at least two choices and one correct choice",
                    question.id
                );
            }
        }

        let known: HashSet<i64> = self.questions.iter().map(|q| q.id).collect();
        for level in &mut self.levels {
            level.normalize_steps().map_err(anyhow::Error::msg)?;
            if let Some(missing) = level
                .question_steps()
                .filter_map(|step| step.question_id)
                .find(|id| !known.contains(id))
            {
                bail!("Level {} references unknown question {}", level.id, missing);
            }
            if let Some(repeated) = level.repeated_question() {
                bail!(
                    "Level {} asks question {} from more than one step",
                    level.id,
                    repeated
                );
            }
        }

        let mut codes = HashSet::new();
        for achievement in &self.achievements {
            if !codes.insert(achievement.code.as_str()) {
                bail!("Duplicate achievement code {}", achievement.code);
            }
        }

        Ok(())
    }

    /// Upserts everything; re-running with the same file is harmless.
    pub async fn apply(&self, repos: &Repositories) -> Result<SeedReport> {
        for question in &self.questions {
            repos
                .questions
                .upsert(question)
                .await
                .with_context(|| format!("Failed to seed question {}", question.id))?;
        }
        for level in &self.levels {
            repos
                .levels
                .upsert(level)
                .await
                .with_context(|| format!("Failed to seed level {}", level.id))?;
        }
        for achievement in &self.achievements {
            repos
                .achievements
                .upsert(achievement)
                .await
                .with_context(|| format!("Failed to seed achievement {}", achievement.code))?;
        }

        Ok(SeedReport {
            questions: self.questions.len(),
            levels: self.levels.len(),
            achievements: self.achievements.len(),
        })
    }
}

pub async fn bootstrap(config: &Config, repos: &Repositories) -> Result<()> {
    let path = match &config.catalog_seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No catalog seed file configured, skipping bootstrap");
            return Ok(());
        }
    };

    if !path.exists() {
        tracing::warn!(
            "Catalog seed file {} not found, skipping bootstrap",
            path.display()
        );
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read catalog seed file")?;
    let seed = CatalogSeed::from_json(&contents)?;
    let report = seed.apply(repos).await?;

    tracing::info!(
        questions = report.questions,
        levels = report.levels,
        achievements = report.achievements,
        "Catalog seeded from {}",
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "questions": [
            {"id": 1, "prompt": "2 + 2?", "explanation": "Arithmetic",
             "choices": [
                {"id": 10, "text": "4", "is_correct": true, "order": 1},
                {"id": 11, "text": "5", "is_correct": false, "order": 2}
             ]}
        ],
        "levels": [
            {"id": 1, "title": "Warm-up", "topic": "math", "difficulty": "easy",
             "reward_points": 10,
             "steps": [
                {"id": 2, "order": 2, "type": "question", "question_id": 1},
                {"id": 1, "order": 1, "type": "text", "title": "Intro"}
             ]}
        ],
        "achievements": [
            {"id": 1, "code": "first_steps", "name": "First steps", "points": 10}
        ]
    }"#;

    #[tokio::test]
    async fn seed_is_validated_and_applied() {
        let seed = CatalogSeed::from_json(SEED).unwrap();
        assert_eq!(seed.levels[0].steps[0].id, 1);

        let repos = Repositories::in_memory();
        let report = seed.apply(&repos).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                questions: 1,
                levels: 1,
                achievements: 1
            }
        );

        // Re-applying is idempotent.
        seed.apply(&repos).await.unwrap();
        assert_eq!(repos.levels.list_active().await.unwrap().len(), 1);
        assert!(repos.levels.get(1).await.unwrap().unwrap().is_active);
    }

    #[test]
    fn dangling_question_references_are_rejected() {
        let seed = r#"{"levels": [{"id": 1, "title": "x", "topic": "t", "difficulty": "easy",
            "steps": [{"id": 1, "order": 1, "type": "question", "question_id": 99}]}]}"#;
        assert!(CatalogSeed::from_json(seed).is_err());
    }

    #[test]
    fn a_question_may_appear_only_once_per_level() {
        let seed = r#"{
            "questions": [{"id": 1, "prompt": "?", "choices": [
                {"id": 1, "text": "a", "is_correct": true},
                {"id": 2, "text": "b", "is_correct": false}]}],
            "levels": [{"id": 1, "title": "x", "topic": "t", "difficulty": "easy",
                "steps": [
                    {"id": 1, "order": 1, "type": "question", "question_id": 1},
                    {"id": 2, "order": 2, "type": "question", "question_id": 1}
                ]}]
        }"#;
        let err = CatalogSeed::from_json(seed).unwrap_err();
        assert!(err.to_string().contains("more than one step"));
    }

    #[test]
    fn questions_without_a_correct_choice_are_rejected() {
        let seed = r#"{"questions": [{"id": 1, "prompt": "?", "choices": [
            {"id": 1, "text": "a", "is_correct": false},
            {"id": 2, "text": "b", "is_correct": false}]}]}"#;
        assert!(CatalogSeed::from_json(seed).is_err());
    }

    #[tokio::test]
    async fn bundled_catalog_is_valid() {
        let contents = include_str!("../../config/catalog.seed.json");
        let seed = CatalogSeed::from_json(contents).unwrap();
        assert!(seed.levels.len() >= 3);
        assert_eq!(seed.achievements.len(), 3);
    }
}
