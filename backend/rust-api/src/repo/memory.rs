use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    AchievementRepo, AttemptRepo, LevelRepo, ProfileRepo, QuestionRepo, RewardTxRepo,
    StorageHealth,
};
use crate::models::{
    Achievement, Attempt, AttemptStatus, AttemptStep, Difficulty, Level, NewAttempt,
    NewAttemptStep, NewRewardTx, Profile, Question, RewardTx, RewardTxType, UserAchievement,
};

#[derive(Default)]
struct Tables {
    levels: BTreeMap<i64, Level>,
    questions: BTreeMap<i64, Question>,
    attempts: BTreeMap<i64, Attempt>,
    attempt_steps: BTreeMap<i64, AttemptStep>,
    reward_txs: BTreeMap<i64, RewardTx>,
    achievements: BTreeMap<i64, Achievement>,
    user_achievements: Vec<UserAchievement>,
    profiles: HashMap<i64, Profile>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, sequence: &'static str) -> i64 {
        let value = self.sequences.entry(sequence).or_insert(0);
        *value += 1;
        *value
    }

    fn steps_for(&self, attempt_id: i64) -> Vec<AttemptStep> {
        let mut steps: Vec<AttemptStep> = self
            .attempt_steps
            .values()
            .filter(|step| step.attempt_id == attempt_id)
            .cloned()
            .collect();
        steps.sort_by_key(|step| (step.step_order, step.id));
        steps
    }
}

/// Process-local store with the same ordering and uniqueness rules as the
/// MongoDB adapter. Used by tests and by `storage = "memory"`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl LevelRepo for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Level>> {
        let tables = self.tables.read().await;
        Ok(tables
            .levels
            .values()
            .filter(|level| level.is_active)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Level>> {
        Ok(self.tables.read().await.levels.get(&id).cloned())
    }

    async fn list_by_difficulty(&self, difficulty: Difficulty) -> Result<Vec<Level>> {
        let tables = self.tables.read().await;
        Ok(tables
            .levels
            .values()
            .filter(|level| level.is_active && level.difficulty == difficulty)
            .cloned()
            .collect())
    }

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<Level>> {
        let tables = self.tables.read().await;
        Ok(tables
            .levels
            .values()
            .filter(|level| level.is_active && level.topic == topic)
            .cloned()
            .collect())
    }

    async fn upsert(&self, level: &Level) -> Result<()> {
        let mut level = level.clone();
        level.steps.sort_by_key(|step| step.order);
        self.tables.write().await.levels.insert(level.id, level);
        Ok(())
    }
}

#[async_trait]
impl QuestionRepo for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Question>> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .filter(|question| ids.contains(&question.id))
            .cloned()
            .collect())
    }

    async fn upsert(&self, question: &Question) -> Result<()> {
        self.tables
            .write()
            .await
            .questions
            .insert(question.id, question.clone());
        Ok(())
    }
}

#[async_trait]
impl AttemptRepo for MemoryStore {
    async fn create(&self, attempt: NewAttempt) -> Result<Attempt> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("attempts");
        let record = Attempt {
            id,
            user_id: attempt.user_id,
            level_id: attempt.level_id,
            status: AttemptStatus::InProgress,
            score: 0,
            started_at: attempt.started_at,
            completed_at: None,
            steps: Vec::new(),
        };
        tables.attempts.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<Attempt>> {
        let tables = self.tables.read().await;
        Ok(tables.attempts.get(&id).map(|attempt| {
            let mut attempt = attempt.clone();
            attempt.steps = tables.steps_for(id);
            attempt
        }))
    }

    async fn find_in_progress(&self, user_id: i64, level_id: i64) -> Result<Option<Attempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .find(|attempt| {
                attempt.user_id == user_id
                    && attempt.level_id == level_id
                    && attempt.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Attempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .rev()
            .filter(|attempt| attempt.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn finalize(&self, attempt: &Attempt) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.attempts.get_mut(&attempt.id) else {
            anyhow::bail!("Attempt {} not found", attempt.id);
        };
        if stored.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        stored.status = attempt.status;
        stored.score = attempt.score;
        stored.completed_at = attempt.completed_at;
        Ok(true)
    }

    async fn append_step(&self, step: NewAttemptStep) -> Result<AttemptStep> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("attempt_steps");
        let record = step.into_step(id);
        tables.attempt_steps.insert(id, record.clone());
        Ok(record)
    }

    async fn list_steps(&self, attempt_id: i64) -> Result<Vec<AttemptStep>> {
        Ok(self.tables.read().await.steps_for(attempt_id))
    }
}

#[async_trait]
impl RewardTxRepo for MemoryStore {
    async fn append(&self, tx: NewRewardTx) -> Result<RewardTx> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("reward_txs");
        let record = tx.into_tx(id, Utc::now());
        tables.reward_txs.insert(id, record.clone());
        Ok(record)
    }

    async fn balance(&self, user_id: i64) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .reward_txs
            .values()
            .filter(|tx| tx.user_id == user_id)
            .map(|tx| tx.amount)
            .sum())
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        tx_type: Option<RewardTxType>,
    ) -> Result<Vec<RewardTx>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reward_txs
            .values()
            .rev()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| tx_type.map_or(true, |wanted| tx.tx_type == wanted))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AchievementRepo for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Achievement>> {
        Ok(self
            .tables
            .read()
            .await
            .achievements
            .values()
            .cloned()
            .collect())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Achievement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .achievements
            .values()
            .find(|achievement| achievement.code == code)
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Achievement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_achievements
            .iter()
            .rev()
            .filter(|award| award.user_id == user_id)
            .filter_map(|award| tables.achievements.get(&award.achievement_id).cloned())
            .collect())
    }

    async fn has(&self, user_id: i64, achievement_id: i64) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .user_achievements
            .iter()
            .any(|award| award.user_id == user_id && award.achievement_id == achievement_id))
    }

    async fn award(&self, user_id: i64, achievement_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let exists = tables
            .user_achievements
            .iter()
            .any(|award| award.user_id == user_id && award.achievement_id == achievement_id);
        if exists {
            return Ok(false);
        }
        tables.user_achievements.push(UserAchievement {
            user_id,
            achievement_id,
            awarded_at: Utc::now(),
        });
        Ok(true)
    }

    async fn upsert(&self, achievement: &Achievement) -> Result<()> {
        self.tables
            .write()
            .await
            .achievements
            .insert(achievement.id, achievement.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for MemoryStore {
    async fn get(&self, user_id: i64) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn save(&self, profile: &Profile) -> Result<()> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.user_id, profile.clone());
        Ok(())
    }
}

#[async_trait]
impl StorageHealth for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_step(attempt_id: i64, step_order: i32) -> NewAttemptStep {
        NewAttemptStep {
            attempt_id,
            level_step_id: Some(1),
            question_id: Some(1),
            step_order,
            response: crate::models::AnswerPayload {
                question_id: 1,
                choice_ids: vec![1],
            },
            correct: false,
            duration_ms: 0,
            answered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn finalize_refuses_terminal_records() {
        let store = MemoryStore::default();
        let mut attempt = store
            .create(NewAttempt {
                user_id: 1,
                level_id: 1,
                started_at: Utc::now(),
            })
            .await
            .unwrap();

        attempt.transition(AttemptStatus::Failed, Utc::now());
        assert!(store.finalize(&attempt).await.unwrap());

        attempt.status = AttemptStatus::Completed;
        assert!(!store.finalize(&attempt).await.unwrap());

        let stored = AttemptRepo::get(&store, attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Failed);
    }

    #[tokio::test]
    async fn steps_come_back_in_step_order() {
        let store = MemoryStore::default();
        store.append_step(new_step(3, 2)).await.unwrap();
        store.append_step(new_step(3, 1)).await.unwrap();
        store.append_step(new_step(4, 1)).await.unwrap();

        let orders: Vec<i32> = store
            .list_steps(3)
            .await
            .unwrap()
            .iter()
            .map(|step| step.step_order)
            .collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn award_is_idempotent_per_pair() {
        let store = MemoryStore::default();
        assert!(store.award(1, 10).await.unwrap());
        assert!(!store.award(1, 10).await.unwrap());
        assert!(store.award(2, 10).await.unwrap());
        assert!(store.has(1, 10).await.unwrap());
        assert!(!store.has(1, 11).await.unwrap());
    }
}
