use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::models::profile::RESERVED_META_KEYS;
use crate::models::{Profile, ProfileMeta, ProfileUpdate, StreakUpdate, UserStats};
use crate::repo::{AchievementRepo, AttemptRepo, ProfileRepo, Repositories, RewardTxRepo};
use crate::services::scoring::PASS_THRESHOLD;
use crate::utils::time::{is_known_timezone, resolve_timezone, streak_transition, today_in};

pub struct ProfileService {
    profiles: Arc<dyn ProfileRepo>,
    attempts: Arc<dyn AttemptRepo>,
    rewards: Arc<dyn RewardTxRepo>,
    achievements: Arc<dyn AchievementRepo>,
}

impl ProfileService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            profiles: repos.profiles.clone(),
            attempts: repos.attempts.clone(),
            rewards: repos.rewards.clone(),
            achievements: repos.achievements.clone(),
        }
    }

    /// Profiles are created on first access.
    pub async fn get_or_create(&self, user_id: i64) -> CoreResult<Profile> {
        if let Some(profile) = self.profiles.get(user_id).await? {
            return Ok(profile);
        }

        let profile = Profile::new(user_id, Utc::now());
        self.profiles.save(&profile).await?;
        tracing::info!(user_id, "Profile created");
        Ok(profile)
    }

    pub async fn update_profile(&self, user_id: i64, update: ProfileUpdate) -> CoreResult<Profile> {
        if update.is_empty() {
            return Err(CoreError::Validation("no fields to update".to_string()));
        }

        let mut profile = self.get_or_create(user_id).await?;

        if let Some(streak) = update.streak {
            profile.streak = streak;
        }

        if let Some(stats) = update.stats {
            profile.stats = stats;
        }

        if let Some(patch) = update.meta {
            profile.meta = merge_meta(&profile.meta, patch)?;
        }

        profile.updated_at = Utc::now();
        self.profiles.save(&profile).await?;

        tracing::info!(user_id, "Profile updated");
        Ok(profile)
    }

    /// Daily streak in the user's own time zone.
    pub async fn update_streak(&self, user_id: i64, now: DateTime<Utc>) -> CoreResult<StreakUpdate> {
        let mut profile = self.get_or_create(user_id).await?;

        let tz = resolve_timezone(profile.meta.timezone.as_deref());
        let today = today_in(tz, now);
        let update = streak_transition(profile.streak, profile.meta.streak_last_date, today);

        if update.changed {
            profile.streak = update.streak;
            profile.meta.streak_last_date = Some(today);
            profile.updated_at = now;
            self.profiles.save(&profile).await?;

            tracing::info!(
                user_id,
                streak = update.streak,
                timezone = %tz,
                "Streak updated"
            );
        }

        Ok(update)
    }

    pub async fn user_stats(&self, user_id: i64) -> CoreResult<UserStats> {
        let profile = self.get_or_create(user_id).await?;
        let attempts = self.attempts.list_for_user(user_id).await?;

        let passing: Vec<_> = attempts
            .iter()
            .filter(|attempt| attempt.passed(PASS_THRESHOLD))
            .collect();

        let completed_levels = passing
            .iter()
            .map(|attempt| attempt.level_id)
            .collect::<HashSet<_>>()
            .len();

        let average_score = if passing.is_empty() {
            0.0
        } else {
            passing.iter().map(|attempt| f64::from(attempt.score)).sum::<f64>()
                / passing.len() as f64
        };

        Ok(UserStats {
            total_attempts: attempts.len(),
            completed_levels,
            total_diamonds: self.rewards.balance(user_id).await?,
            current_streak: profile.streak,
            average_score,
            achievements_count: self.achievements.list_for_user(user_id).await?.len(),
        })
    }
}

/// Applies a client meta patch: keys merge over the stored meta, reserved
/// keys are refused, and `timezone` must name a known IANA zone.
fn merge_meta(
    current: &ProfileMeta,
    patch: serde_json::Map<String, serde_json::Value>,
) -> CoreResult<ProfileMeta> {
    if let Some(key) = patch
        .keys()
        .find(|key| RESERVED_META_KEYS.contains(&key.as_str()))
    {
        return Err(CoreError::Validation(format!(
            "meta.{} is managed by the server",
            key
        )));
    }

    if let Some(timezone) = patch.get("timezone") {
        match timezone.as_str() {
            Some(name) if is_known_timezone(name) => {}
            _ => {
                return Err(CoreError::Validation(format!(
                    "unknown time zone: {}",
                    timezone
                )))
            }
        }
    }

    let mut merged = serde_json::to_value(current)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();
    merged.extend(patch);

    serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|e| CoreError::Validation(format!("invalid meta: {}", e)))
}
