use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FIRST_STEPS: &str = "first_steps";
pub const STREAK_3: &str = "streak_3";
pub const PERFECT_SCORE: &str = "perfect_score";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: i64,
    pub achievement_id: i64,
    pub awarded_at: DateTime<Utc>,
}

/// Domain events the achievement rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementEvent {
    LevelCompleted { score: i32 },
    StreakUpdated { streak: u32 },
}

impl AchievementEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AchievementEvent::LevelCompleted { .. } => "level_completed",
            AchievementEvent::StreakUpdated { .. } => "streak_updated",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AchievementProgress {
    pub achievement: Achievement,
    pub progress: u32,
    pub max_progress: u32,
    pub is_completed: bool,
}
