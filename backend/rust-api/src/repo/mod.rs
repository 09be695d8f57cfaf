//! Collaborator contracts consumed by the services, plus their adapters.
//!
//! All list operations return records in a deterministic order: catalog lists
//! ascend by id (creation order), per-user histories are newest first, and
//! attempt steps ascend by `step_order`.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    Achievement, Attempt, AttemptStep, Difficulty, Level, NewAttempt, NewAttemptStep,
    NewRewardTx, Profile, Question, RewardTx, RewardTxType,
};

pub mod memory;
pub mod mongo;

#[async_trait]
pub trait LevelRepo: Send + Sync {
    /// Active levels, ascending by id.
    async fn list_active(&self) -> Result<Vec<Level>>;

    /// Any level (active or not) with its ordered steps.
    async fn get(&self, id: i64) -> Result<Option<Level>>;

    async fn list_by_difficulty(&self, difficulty: Difficulty) -> Result<Vec<Level>>;

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<Level>>;

    async fn upsert(&self, level: &Level) -> Result<()>;
}

#[async_trait]
pub trait QuestionRepo: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Question>>;

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Question>>;

    async fn upsert(&self, question: &Question) -> Result<()>;
}

#[async_trait]
pub trait AttemptRepo: Send + Sync {
    async fn create(&self, attempt: NewAttempt) -> Result<Attempt>;

    /// Attempt with its step log.
    async fn get(&self, id: i64) -> Result<Option<Attempt>>;

    async fn find_in_progress(&self, user_id: i64, level_id: i64) -> Result<Option<Attempt>>;

    /// Newest first, without step logs.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Attempt>>;

    /// Writes status, score and completion time, but only while the stored
    /// record is still in progress. Returns false when it was already terminal.
    async fn finalize(&self, attempt: &Attempt) -> Result<bool>;

    async fn append_step(&self, step: NewAttemptStep) -> Result<AttemptStep>;

    async fn list_steps(&self, attempt_id: i64) -> Result<Vec<AttemptStep>>;
}

#[async_trait]
pub trait RewardTxRepo: Send + Sync {
    async fn append(&self, tx: NewRewardTx) -> Result<RewardTx>;

    /// Sum of every entry for the user, recomputed on each call.
    async fn balance(&self, user_id: i64) -> Result<i64>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: i64,
        tx_type: Option<RewardTxType>,
    ) -> Result<Vec<RewardTx>>;
}

#[async_trait]
pub trait AchievementRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Achievement>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Achievement>>;

    /// Most recently awarded first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Achievement>>;

    async fn has(&self, user_id: i64, achievement_id: i64) -> Result<bool>;

    /// Records the award; returns false if the pair was already awarded.
    async fn award(&self, user_id: i64, achievement_id: i64) -> Result<bool>;

    async fn upsert(&self, achievement: &Achievement) -> Result<()>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get(&self, user_id: i64) -> Result<Option<Profile>>;

    async fn save(&self, profile: &Profile) -> Result<()>;
}

/// Liveness probe for whichever backend is in use.
#[async_trait]
pub trait StorageHealth: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Repositories {
    pub levels: Arc<dyn LevelRepo>,
    pub questions: Arc<dyn QuestionRepo>,
    pub attempts: Arc<dyn AttemptRepo>,
    pub rewards: Arc<dyn RewardTxRepo>,
    pub achievements: Arc<dyn AchievementRepo>,
    pub profiles: Arc<dyn ProfileRepo>,
    pub health: Arc<dyn StorageHealth>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            levels: store.clone(),
            questions: store.clone(),
            attempts: store.clone(),
            rewards: store.clone(),
            achievements: store.clone(),
            profiles: store.clone(),
            health: store,
        }
    }

    pub async fn mongo(db: mongodb::Database) -> Result<Self> {
        let store = Arc::new(mongo::MongoStore::new(db));
        store.ensure_indexes().await?;
        Ok(Self {
            levels: store.clone(),
            questions: store.clone(),
            attempts: store.clone(),
            rewards: store.clone(),
            achievements: store.clone(),
            profiles: store.clone(),
            health: store,
        })
    }
}
