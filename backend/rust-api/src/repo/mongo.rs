use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use super::{
    AchievementRepo, AttemptRepo, LevelRepo, ProfileRepo, QuestionRepo, RewardTxRepo,
    StorageHealth,
};
use crate::metrics::track_db_operation;
use crate::models::{
    Achievement, AnswerPayload, Attempt, AttemptStatus, AttemptStep, Difficulty, Level,
    NewAttempt, NewAttemptStep, NewRewardTx, Profile, ProfileMeta, Question, RewardTx,
    RewardTxType,
};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

const LEVELS: &str = "levels";
const QUESTIONS: &str = "questions";
const ATTEMPTS: &str = "attempts";
const ATTEMPT_STEPS: &str = "attempt_steps";
const REWARD_TXS: &str = "reward_txs";
const ACHIEVEMENTS: &str = "achievements";
const USER_ACHIEVEMENTS: &str = "user_achievements";
const PROFILES: &str = "profiles";
const COUNTERS: &str = "counters";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct AttemptDocument {
    id: i64,
    user_id: i64,
    level_id: i64,
    status: AttemptStatus,
    score: i32,
    started_at: BsonDateTime,
    #[serde(default)]
    completed_at: Option<BsonDateTime>,
}

impl AttemptDocument {
    fn into_attempt(self, steps: Vec<AttemptStep>) -> Attempt {
        Attempt {
            id: self.id,
            user_id: self.user_id,
            level_id: self.level_id,
            status: self.status,
            score: self.score,
            started_at: bson_to_chrono(self.started_at),
            completed_at: self.completed_at.map(bson_to_chrono),
            steps,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AttemptStepDocument {
    id: i64,
    attempt_id: i64,
    level_step_id: Option<i64>,
    question_id: Option<i64>,
    step_order: i32,
    response: AnswerPayload,
    correct: bool,
    duration_ms: i64,
    answered_at: BsonDateTime,
}

impl From<AttemptStepDocument> for AttemptStep {
    fn from(document: AttemptStepDocument) -> Self {
        AttemptStep {
            id: document.id,
            attempt_id: document.attempt_id,
            level_step_id: document.level_step_id,
            question_id: document.question_id,
            step_order: document.step_order,
            response: document.response,
            correct: document.correct,
            duration_ms: document.duration_ms,
            answered_at: bson_to_chrono(document.answered_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RewardTxDocument {
    id: i64,
    user_id: i64,
    amount: i64,
    #[serde(rename = "type")]
    tx_type: RewardTxType,
    reason: String,
    attempt_id: Option<i64>,
    created_at: BsonDateTime,
}

impl From<RewardTxDocument> for RewardTx {
    fn from(document: RewardTxDocument) -> Self {
        RewardTx {
            id: document.id,
            user_id: document.user_id,
            amount: document.amount,
            tx_type: document.tx_type,
            reason: document.reason,
            attempt_id: document.attempt_id,
            created_at: bson_to_chrono(document.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserAchievementDocument {
    user_id: i64,
    achievement_id: i64,
    awarded_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileDocument {
    user_id: i64,
    streak: u32,
    #[serde(default)]
    stats: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    meta: ProfileMeta,
    updated_at: BsonDateTime,
}

impl From<ProfileDocument> for Profile {
    fn from(document: ProfileDocument) -> Self {
        Profile {
            user_id: document.user_id,
            streak: document.streak,
            stats: document.stats,
            meta: document.meta,
            updated_at: bson_to_chrono(document.updated_at),
        }
    }
}

impl From<&Profile> for ProfileDocument {
    fn from(profile: &Profile) -> Self {
        ProfileDocument {
            user_id: profile.user_id,
            streak: profile.streak,
            stats: profile.stats.clone(),
            meta: profile.meta.clone(),
            updated_at: chrono_to_bson(profile.updated_at),
        }
    }
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        let specs: Vec<(&str, Document, bool)> = vec![
            (LEVELS, doc! { "id": 1 }, true),
            (QUESTIONS, doc! { "id": 1 }, true),
            (ATTEMPTS, doc! { "id": 1 }, true),
            (ATTEMPTS, doc! { "user_id": 1, "level_id": 1, "status": 1 }, false),
            (ATTEMPT_STEPS, doc! { "attempt_id": 1, "step_order": 1 }, false),
            (REWARD_TXS, doc! { "user_id": 1, "id": -1 }, false),
            (ACHIEVEMENTS, doc! { "id": 1 }, true),
            (ACHIEVEMENTS, doc! { "code": 1 }, true),
            (
                USER_ACHIEVEMENTS,
                doc! { "user_id": 1, "achievement_id": 1 },
                true,
            ),
            (PROFILES, doc! { "user_id": 1 }, true),
        ];

        for (collection, keys, is_unique) in specs {
            let mut index = IndexModel::builder().keys(keys).build();
            if is_unique {
                index.options = Some(unique());
            }
            self.collection::<Document>(collection)
                .create_index(index)
                .await
                .with_context(|| format!("Failed to create index on {}", collection))?;
        }

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    /// Monotonic integer ids so that id order equals creation order.
    async fn next_id(&self, sequence: &str) -> Result<i64> {
        let counter = self
            .collection::<Document>(COUNTERS)
            .find_one_and_update(doc! { "_id": sequence }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .with_context(|| format!("Failed to advance counter {}", sequence))?
            .ok_or_else(|| anyhow!("Counter {} missing after upsert", sequence))?;

        match counter.get("seq") {
            Some(Bson::Int64(value)) => Ok(*value),
            Some(Bson::Int32(value)) => Ok(*value as i64),
            _ => Err(anyhow!("Counter {} has unsupported type", sequence)),
        }
    }

    async fn find_levels(&self, filter: Document) -> Result<Vec<Level>> {
        track_db_operation("find", LEVELS, async {
            let cursor = self
                .collection::<Level>(LEVELS)
                .find(filter)
                .sort(doc! { "id": 1 })
                .await
                .context("Failed to query levels")?;
            cursor
                .try_collect::<Vec<_>>()
                .await
                .context("Level cursor error")
        })
        .await
    }

    async fn load_attempt_steps(&self, attempt_id: i64) -> Result<Vec<AttemptStep>> {
        let cursor = self
            .collection::<AttemptStepDocument>(ATTEMPT_STEPS)
            .find(doc! { "attempt_id": attempt_id })
            .sort(doc! { "step_order": 1, "id": 1 })
            .await
            .context("Failed to query attempt steps")?;
        let documents: Vec<AttemptStepDocument> = cursor
            .try_collect()
            .await
            .context("Attempt step cursor error")?;
        Ok(documents.into_iter().map(AttemptStep::from).collect())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl LevelRepo for MongoStore {
    async fn list_active(&self) -> Result<Vec<Level>> {
        self.find_levels(doc! { "is_active": true }).await
    }

    async fn get(&self, id: i64) -> Result<Option<Level>> {
        track_db_operation("find_one", LEVELS, async {
            let level = self
                .collection::<Level>(LEVELS)
                .find_one(doc! { "id": id })
                .await
                .context("Failed to query level")?;
            Ok(level.map(|mut level| {
                level.steps.sort_by_key(|step| step.order);
                level
            }))
        })
        .await
    }

    async fn list_by_difficulty(&self, difficulty: Difficulty) -> Result<Vec<Level>> {
        self.find_levels(doc! { "is_active": true, "difficulty": difficulty.as_str() })
            .await
    }

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<Level>> {
        self.find_levels(doc! { "is_active": true, "topic": topic })
            .await
    }

    async fn upsert(&self, level: &Level) -> Result<()> {
        self.collection::<Level>(LEVELS)
            .replace_one(doc! { "id": level.id }, level)
            .upsert(true)
            .await
            .context("Failed to upsert level")?;
        Ok(())
    }
}

#[async_trait]
impl QuestionRepo for MongoStore {
    async fn get(&self, id: i64) -> Result<Option<Question>> {
        track_db_operation("find_one", QUESTIONS, async {
            self.collection::<Question>(QUESTIONS)
                .find_one(doc! { "id": id })
                .await
                .context("Failed to query question")
        })
        .await
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Question>> {
        let cursor = self
            .collection::<Question>(QUESTIONS)
            .find(doc! { "id": { "$in": ids.to_vec() } })
            .sort(doc! { "id": 1 })
            .await
            .context("Failed to query questions")?;
        cursor.try_collect().await.context("Question cursor error")
    }

    async fn upsert(&self, question: &Question) -> Result<()> {
        self.collection::<Question>(QUESTIONS)
            .replace_one(doc! { "id": question.id }, question)
            .upsert(true)
            .await
            .context("Failed to upsert question")?;
        Ok(())
    }
}

#[async_trait]
impl AttemptRepo for MongoStore {
    async fn create(&self, attempt: NewAttempt) -> Result<Attempt> {
        let id = self.next_id(ATTEMPTS).await?;
        let document = AttemptDocument {
            id,
            user_id: attempt.user_id,
            level_id: attempt.level_id,
            status: AttemptStatus::InProgress,
            score: 0,
            started_at: chrono_to_bson(attempt.started_at),
            completed_at: None,
        };

        track_db_operation("insert_one", ATTEMPTS, async {
            self.collection::<AttemptDocument>(ATTEMPTS)
                .insert_one(&document)
                .await
                .context("Failed to insert attempt")
        })
        .await?;

        Ok(document.into_attempt(Vec::new()))
    }

    async fn get(&self, id: i64) -> Result<Option<Attempt>> {
        let document = track_db_operation("find_one", ATTEMPTS, async {
            self.collection::<AttemptDocument>(ATTEMPTS)
                .find_one(doc! { "id": id })
                .await
                .context("Failed to query attempt")
        })
        .await?;

        match document {
            Some(document) => {
                let steps = self.load_attempt_steps(id).await?;
                Ok(Some(document.into_attempt(steps)))
            }
            None => Ok(None),
        }
    }

    async fn find_in_progress(&self, user_id: i64, level_id: i64) -> Result<Option<Attempt>> {
        let document = self
            .collection::<AttemptDocument>(ATTEMPTS)
            .find_one(doc! {
                "user_id": user_id,
                "level_id": level_id,
                "status": AttemptStatus::InProgress.as_str(),
            })
            .sort(doc! { "id": -1 })
            .await
            .context("Failed to query active attempt")?;
        Ok(document.map(|document| document.into_attempt(Vec::new())))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Attempt>> {
        let cursor = self
            .collection::<AttemptDocument>(ATTEMPTS)
            .find(doc! { "user_id": user_id })
            .sort(doc! { "id": -1 })
            .await
            .context("Failed to query user attempts")?;
        let documents: Vec<AttemptDocument> =
            cursor.try_collect().await.context("Attempt cursor error")?;
        Ok(documents
            .into_iter()
            .map(|document| document.into_attempt(Vec::new()))
            .collect())
    }

    async fn finalize(&self, attempt: &Attempt) -> Result<bool> {
        let completed_at = attempt
            .completed_at
            .map(chrono_to_bson)
            .map(Bson::DateTime)
            .unwrap_or(Bson::Null);

        let result = track_db_operation("update_one", ATTEMPTS, async {
            self.collection::<Document>(ATTEMPTS)
                .update_one(
                    doc! {
                        "id": attempt.id,
                        "status": AttemptStatus::InProgress.as_str(),
                    },
                    doc! { "$set": {
                        "status": attempt.status.as_str(),
                        "score": attempt.score,
                        "completed_at": completed_at,
                    } },
                )
                .await
                .context("Failed to update attempt")
        })
        .await?;

        Ok(result.modified_count == 1)
    }

    async fn append_step(&self, step: NewAttemptStep) -> Result<AttemptStep> {
        let id = self.next_id(ATTEMPT_STEPS).await?;
        let record = step.into_step(id);
        let document = AttemptStepDocument {
            id,
            attempt_id: record.attempt_id,
            level_step_id: record.level_step_id,
            question_id: record.question_id,
            step_order: record.step_order,
            response: record.response.clone(),
            correct: record.correct,
            duration_ms: record.duration_ms,
            answered_at: chrono_to_bson(record.answered_at),
        };

        track_db_operation("insert_one", ATTEMPT_STEPS, async {
            self.collection::<AttemptStepDocument>(ATTEMPT_STEPS)
                .insert_one(&document)
                .await
                .context("Failed to insert attempt step")
        })
        .await?;

        Ok(record)
    }

    async fn list_steps(&self, attempt_id: i64) -> Result<Vec<AttemptStep>> {
        self.load_attempt_steps(attempt_id).await
    }
}

#[async_trait]
impl RewardTxRepo for MongoStore {
    async fn append(&self, tx: NewRewardTx) -> Result<RewardTx> {
        let id = self.next_id(REWARD_TXS).await?;
        let record = tx.into_tx(id, Utc::now());
        let document = RewardTxDocument {
            id,
            user_id: record.user_id,
            amount: record.amount,
            tx_type: record.tx_type,
            reason: record.reason.clone(),
            attempt_id: record.attempt_id,
            created_at: chrono_to_bson(record.created_at),
        };

        track_db_operation("insert_one", REWARD_TXS, async {
            self.collection::<RewardTxDocument>(REWARD_TXS)
                .insert_one(&document)
                .await
                .context("Failed to insert reward transaction")
        })
        .await?;

        Ok(record)
    }

    async fn balance(&self, user_id: i64) -> Result<i64> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$amount" } } },
        ];

        let mut cursor = self
            .collection::<Document>(REWARD_TXS)
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate balance")?;

        let Some(row) = cursor.try_next().await.context("Balance cursor error")? else {
            return Ok(0);
        };

        match row.get("total") {
            Some(Bson::Int64(total)) => Ok(*total),
            Some(Bson::Int32(total)) => Ok(*total as i64),
            None => Ok(0),
            Some(other) => Err(anyhow!("Unexpected balance type: {:?}", other)),
        }
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        tx_type: Option<RewardTxType>,
    ) -> Result<Vec<RewardTx>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(tx_type) = tx_type {
            filter.insert("type", tx_type.as_str());
        }

        let cursor = self
            .collection::<RewardTxDocument>(REWARD_TXS)
            .find(filter)
            .sort(doc! { "id": -1 })
            .await
            .context("Failed to query reward transactions")?;
        let documents: Vec<RewardTxDocument> = cursor
            .try_collect()
            .await
            .context("Reward transaction cursor error")?;
        Ok(documents.into_iter().map(RewardTx::from).collect())
    }
}

#[async_trait]
impl AchievementRepo for MongoStore {
    async fn list_all(&self) -> Result<Vec<Achievement>> {
        let cursor = self
            .collection::<Achievement>(ACHIEVEMENTS)
            .find(doc! {})
            .sort(doc! { "id": 1 })
            .await
            .context("Failed to query achievements")?;
        cursor.try_collect().await.context("Achievement cursor error")
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Achievement>> {
        self.collection::<Achievement>(ACHIEVEMENTS)
            .find_one(doc! { "code": code })
            .await
            .context("Failed to query achievement")
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Achievement>> {
        let cursor = self
            .collection::<UserAchievementDocument>(USER_ACHIEVEMENTS)
            .find(doc! { "user_id": user_id })
            .sort(doc! { "awarded_at": -1 })
            .await
            .context("Failed to query user achievements")?;
        let awards: Vec<UserAchievementDocument> = cursor
            .try_collect()
            .await
            .context("User achievement cursor error")?;
        if awards.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = awards.iter().map(|award| award.achievement_id).collect();
        let cursor = self
            .collection::<Achievement>(ACHIEVEMENTS)
            .find(doc! { "id": { "$in": ids } })
            .await
            .context("Failed to query awarded achievements")?;
        let achievements: Vec<Achievement> = cursor
            .try_collect()
            .await
            .context("Achievement cursor error")?;

        Ok(awards
            .iter()
            .filter_map(|award| {
                achievements
                    .iter()
                    .find(|achievement| achievement.id == award.achievement_id)
                    .cloned()
            })
            .collect())
    }

    async fn has(&self, user_id: i64, achievement_id: i64) -> Result<bool> {
        let count = self
            .collection::<Document>(USER_ACHIEVEMENTS)
            .count_documents(doc! { "user_id": user_id, "achievement_id": achievement_id })
            .await
            .context("Failed to count user achievements")?;
        Ok(count > 0)
    }

    async fn award(&self, user_id: i64, achievement_id: i64) -> Result<bool> {
        let document = UserAchievementDocument {
            user_id,
            achievement_id,
            awarded_at: chrono_to_bson(Utc::now()),
        };

        match self
            .collection::<UserAchievementDocument>(USER_ACHIEVEMENTS)
            .insert_one(&document)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(anyhow!(err).context("Failed to award achievement")),
        }
    }

    async fn upsert(&self, achievement: &Achievement) -> Result<()> {
        self.collection::<Achievement>(ACHIEVEMENTS)
            .replace_one(doc! { "id": achievement.id }, achievement)
            .upsert(true)
            .await
            .context("Failed to upsert achievement")?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for MongoStore {
    async fn get(&self, user_id: i64) -> Result<Option<Profile>> {
        let document = self
            .collection::<ProfileDocument>(PROFILES)
            .find_one(doc! { "user_id": user_id })
            .await
            .context("Failed to query profile")?;
        Ok(document.map(Profile::from))
    }

    async fn save(&self, profile: &Profile) -> Result<()> {
        let document = ProfileDocument::from(profile);
        track_db_operation("replace_one", PROFILES, async {
            self.collection::<ProfileDocument>(PROFILES)
                .replace_one(doc! { "user_id": profile.user_id }, &document)
                .upsert(true)
                .await
                .context("Failed to save profile")
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StorageHealth for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            self.db.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| anyhow!("MongoDB timeout after 1s"))?
        .context("MongoDB ping failed")?;
        Ok(())
    }
}
