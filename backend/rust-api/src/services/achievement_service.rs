use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::metrics::{record_secondary_failure, ACHIEVEMENTS_AWARDED_TOTAL};
use crate::models::achievement::{FIRST_STEPS, PERFECT_SCORE, STREAK_3};
use crate::models::{Achievement, AchievementEvent, AchievementProgress};
use crate::repo::{AchievementRepo, Repositories};

/// Which achievement codes an event qualifies for.
pub fn matching_codes(event: &AchievementEvent) -> Vec<&'static str> {
    let rules: [(&str, fn(&AchievementEvent) -> bool); 3] = [
        (FIRST_STEPS, |event| {
            matches!(event, AchievementEvent::LevelCompleted { .. })
        }),
        (STREAK_3, |event| {
            matches!(event, AchievementEvent::StreakUpdated { streak } if *streak >= 3)
        }),
        (PERFECT_SCORE, |event| {
            matches!(event, AchievementEvent::LevelCompleted { score } if *score == 100)
        }),
    ];

    rules
        .iter()
        .filter(|(_, applies)| applies(event))
        .map(|(code, _)| *code)
        .collect()
}

pub struct AchievementService {
    achievements: Arc<dyn AchievementRepo>,
}

impl AchievementService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            achievements: repos.achievements.clone(),
        }
    }

    /// Awards every achievement the event qualifies for and the user does not
    /// hold yet. A failure on one achievement is logged and the rest still run.
    pub async fn evaluate(&self, user_id: i64, event: AchievementEvent) -> Vec<Achievement> {
        let mut awarded = Vec::new();

        for code in matching_codes(&event) {
            match self.try_award(user_id, code).await {
                Ok(Some(achievement)) => {
                    ACHIEVEMENTS_AWARDED_TOTAL.with_label_values(&[code]).inc();
                    tracing::info!(user_id, code, event = event.name(), "Achievement awarded");
                    awarded.push(achievement);
                }
                Ok(None) => {}
                Err(e) => {
                    record_secondary_failure("achievement");
                    tracing::warn!(user_id, code, "Failed to award achievement: {:#}", e);
                }
            }
        }

        awarded
    }

    async fn try_award(&self, user_id: i64, code: &str) -> anyhow::Result<Option<Achievement>> {
        let Some(achievement) = self.achievements.get_by_code(code).await? else {
            tracing::debug!(code, "Achievement not in catalog, skipping");
            return Ok(None);
        };

        if self.achievements.has(user_id, achievement.id).await? {
            return Ok(None);
        }

        let inserted = self.achievements.award(user_id, achievement.id).await?;
        Ok(inserted.then_some(achievement))
    }

    pub async fn list_achievements(&self) -> CoreResult<Vec<Achievement>> {
        Ok(self.achievements.list_all().await?)
    }

    pub async fn user_achievements(&self, user_id: i64) -> CoreResult<Vec<Achievement>> {
        Ok(self.achievements.list_for_user(user_id).await?)
    }

    pub async fn progress(&self, user_id: i64, code: &str) -> CoreResult<AchievementProgress> {
        let achievement = self
            .achievements
            .get_by_code(code)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("achievement {}", code)))?;

        let held = self.achievements.has(user_id, achievement.id).await?;

        Ok(AchievementProgress {
            achievement,
            progress: u32::from(held),
            max_progress: 1,
            is_completed: held,
        })
    }
}
