use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::metrics::{
    record_answer, record_attempt, record_secondary_failure, ATTEMPT_SCORE,
    REWARDS_CREDITED_TOTAL,
};
use crate::models::{
    AchievementEvent, AnswerOutcome, AnswerPayload, Attempt, AttemptResult, AttemptStatus,
    Level, NewAttempt, NewAttemptStep, Question, RewardInfo, WrongQuestion,
};
use crate::repo::{AttemptRepo, LevelRepo, QuestionRepo, Repositories};
use crate::services::{
    achievement_service::AchievementService,
    level_service::LevelService,
    profile_service::ProfileService,
    reward_service::RewardService,
    scoring::{choice_sets_match, score_attempt, PASS_THRESHOLD},
};

pub const COMPLETION_REWARD_REASON: &str = "Level completion reward";

/// Drives one attempt from start to its terminal state.
pub struct AttemptService {
    levels: Arc<dyn LevelRepo>,
    questions: Arc<dyn QuestionRepo>,
    attempts: Arc<dyn AttemptRepo>,
    gating: LevelService,
    rewards: RewardService,
    profiles: ProfileService,
    achievements: AchievementService,
}

impl AttemptService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            levels: repos.levels.clone(),
            questions: repos.questions.clone(),
            attempts: repos.attempts.clone(),
            gating: LevelService::new(repos),
            rewards: RewardService::new(repos),
            profiles: ProfileService::new(repos),
            achievements: AchievementService::new(repos),
        }
    }

    pub async fn start_attempt(&self, user_id: i64, level_id: i64) -> CoreResult<Attempt> {
        let level = self.load_level(level_id).await?;
        if !level.is_active {
            return Err(CoreError::forbidden("level is not active"));
        }

        if !self.gating.is_level_available(level_id, user_id).await? {
            return Err(CoreError::forbidden("previous level not completed"));
        }

        if let Some(existing) = self.attempts.find_in_progress(user_id, level_id).await? {
            if existing.status.is_terminal() {
                return Ok(existing);
            }

            let existing = self.load_attempt(existing.id).await?;
            match self.next_question_for(&existing, &level).await {
                Ok(_) => {
                    record_attempt("resumed");
                    tracing::info!(attempt_id = existing.id, user_id, level_id, "Attempt resumed");
                    return Ok(existing);
                }
                Err(CoreError::Exhausted) => {
                    tracing::info!(
                        attempt_id = existing.id,
                        user_id,
                        level_id,
                        "Abandoning attempt with no questions left"
                    );
                    self.fail_attempt(existing, "abandoned").await?;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt_id = existing.id,
                        "Next-question probe failed, keeping attempt: {}",
                        e
                    );
                    return Ok(existing);
                }
            }
        }

        let attempt = self
            .attempts
            .create(NewAttempt {
                user_id,
                level_id,
                started_at: Utc::now(),
            })
            .await?;

        record_attempt("started");
        tracing::info!(attempt_id = attempt.id, user_id, level_id, "Attempt started");
        Ok(attempt)
    }

    /// First question step of the level that this attempt has not answered.
    pub async fn get_next_question(&self, attempt_id: i64) -> CoreResult<Question> {
        let attempt = self.load_attempt(attempt_id).await?;
        if !attempt.is_in_progress() {
            return Err(CoreError::invalid_state("attempt is not in progress"));
        }
        let level = self.load_level(attempt.level_id).await?;
        self.next_question_for(&attempt, &level).await
    }

    pub async fn answer_question(
        &self,
        attempt_id: i64,
        question_id: i64,
        choice_ids: Vec<i64>,
    ) -> CoreResult<AnswerOutcome> {
        let attempt = self.load_attempt(attempt_id).await?;
        if !attempt.is_in_progress() {
            return Err(CoreError::invalid_state("attempt is not in progress"));
        }

        let level = self.load_level(attempt.level_id).await?;
        let level_step = level.step_for_question(question_id).ok_or_else(|| {
            CoreError::not_found(format!("question {} in level {}", question_id, level.id))
        })?;

        let question = self
            .questions
            .get(question_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("question {}", question_id)))?;

        let correct = choice_sets_match(&choice_ids, &question.correct_choice_ids());

        let now = Utc::now();
        let since = attempt
            .steps
            .last()
            .map(|step| step.answered_at)
            .unwrap_or(attempt.started_at);
        let duration_ms = (now - since).num_milliseconds().max(0);

        let step = self
            .attempts
            .append_step(NewAttemptStep {
                attempt_id,
                level_step_id: Some(level_step.id),
                question_id: Some(question_id),
                step_order: attempt.steps.len() as i32 + 1,
                response: AnswerPayload {
                    question_id,
                    choice_ids,
                },
                correct,
                duration_ms,
                answered_at: now,
            })
            .await?;

        record_answer(correct);
        tracing::info!(
            attempt_id,
            question_id,
            step_order = step.step_order,
            correct,
            "Answer recorded"
        );

        Ok(AnswerOutcome {
            correct,
            explanation: question.explanation,
        })
    }

    pub async fn complete_attempt(&self, attempt_id: i64) -> CoreResult<AttemptResult> {
        let mut attempt = self.load_attempt(attempt_id).await?;
        if !attempt.is_in_progress() {
            return Err(CoreError::invalid_state("attempt is not in progress"));
        }

        let level = match self.levels.get(attempt.level_id).await {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(
                    attempt_id,
                    "Level lookup failed, scoring on answered questions: {:#}",
                    e
                );
                None
            }
        };

        let summary = score_attempt(&attempt.steps, level.as_ref().map(Level::question_count));

        let now = Utc::now();
        attempt.transition(AttemptStatus::Completed, now);
        attempt.score = summary.score;

        if !self.attempts.finalize(&attempt).await? {
            return Err(CoreError::invalid_state("attempt is not in progress"));
        }

        record_attempt("completed");
        ATTEMPT_SCORE.observe(f64::from(summary.score));
        tracing::info!(
            attempt_id,
            user_id = attempt.user_id,
            level_id = attempt.level_id,
            score = summary.score,
            "Attempt completed"
        );

        let wrong_questions = self.describe_unresolved(attempt_id, &summary.unresolved).await;

        let mut reward = None;
        let reward_points = level.as_ref().map_or(0, |level| level.reward_points);
        if summary.score >= PASS_THRESHOLD && reward_points > 0 {
            match self
                .rewards
                .award_diamonds(
                    attempt.user_id,
                    reward_points,
                    COMPLETION_REWARD_REASON,
                    Some(attempt_id),
                )
                .await
            {
                Ok(tx) => {
                    REWARDS_CREDITED_TOTAL.inc_by(reward_points.unsigned_abs());
                    reward = Some(RewardInfo {
                        diamonds: tx.amount,
                        tx_id: tx.id,
                        reason: tx.reason,
                    });
                }
                Err(e) => swallow(attempt_id, CoreError::dependency("ledger", e)),
            }
        }

        let mut new_achievements = self
            .achievements
            .evaluate(
                attempt.user_id,
                AchievementEvent::LevelCompleted {
                    score: summary.score,
                },
            )
            .await;

        match self.profiles.update_streak(attempt.user_id, now).await {
            Ok(update) if update.changed => {
                let unlocked = self
                    .achievements
                    .evaluate(
                        attempt.user_id,
                        AchievementEvent::StreakUpdated {
                            streak: update.streak,
                        },
                    )
                    .await;
                new_achievements.extend(unlocked);
            }
            Ok(_) => {}
            Err(e) => swallow(attempt_id, CoreError::dependency("streak", e)),
        }

        Ok(AttemptResult {
            attempt,
            score: summary.score,
            total_questions: summary.total_questions,
            correct_answers: summary.correct_answers,
            wrong_questions,
            reward,
            new_achievements,
        })
    }

    /// Fails an in-progress attempt owned by `user_id`; terminal attempts are
    /// returned unchanged.
    pub async fn cancel_attempt(&self, attempt_id: i64, user_id: i64) -> CoreResult<Attempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != user_id {
            return Err(CoreError::forbidden("attempt belongs to another user"));
        }
        if attempt.status.is_terminal() {
            return Ok(attempt);
        }
        self.fail_attempt(attempt, "cancelled").await
    }

    pub async fn get_active_attempt(&self, user_id: i64, level_id: i64) -> CoreResult<Attempt> {
        self.attempts
            .find_in_progress(user_id, level_id)
            .await?
            .ok_or_else(|| CoreError::not_found("active attempt"))
    }

    pub async fn get_user_attempts(&self, user_id: i64) -> CoreResult<Vec<Attempt>> {
        Ok(self.attempts.list_for_user(user_id).await?)
    }

    /// Attempt with its step log, visible to its owner only.
    pub async fn get_user_attempt(&self, attempt_id: i64, user_id: i64) -> CoreResult<Attempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != user_id {
            return Err(CoreError::forbidden("attempt belongs to another user"));
        }
        Ok(attempt)
    }

    async fn load_attempt(&self, attempt_id: i64) -> CoreResult<Attempt> {
        self.attempts
            .get(attempt_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("attempt {}", attempt_id)))
    }

    async fn load_level(&self, level_id: i64) -> CoreResult<Level> {
        self.levels
            .get(level_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("level {}", level_id)))
    }

    async fn next_question_for(&self, attempt: &Attempt, level: &Level) -> CoreResult<Question> {
        let answered: HashSet<i64> = attempt
            .steps
            .iter()
            .filter_map(|step| step.question_id)
            .collect();

        let next = level
            .question_steps()
            .filter_map(|step| step.question_id)
            .find(|question_id| !answered.contains(question_id))
            .ok_or(CoreError::Exhausted)?;

        self.questions
            .get(next)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("question {}", next)))
    }

    async fn fail_attempt(&self, mut attempt: Attempt, reason: &str) -> CoreResult<Attempt> {
        attempt.transition(AttemptStatus::Failed, Utc::now());
        if !self.attempts.finalize(&attempt).await? {
            // Someone else closed it first; report what is stored.
            return self.load_attempt(attempt.id).await;
        }

        record_attempt(reason);
        tracing::info!(attempt_id = attempt.id, user_id = attempt.user_id, reason, "Attempt failed");
        Ok(attempt)
    }

    async fn describe_unresolved(
        &self,
        attempt_id: i64,
        unresolved: &[crate::services::scoring::QuestionOutcome],
    ) -> Vec<WrongQuestion> {
        if unresolved.is_empty() {
            return Vec::new();
        }

        let ids: Vec<i64> = unresolved.iter().map(|outcome| outcome.question_id).collect();
        let questions: HashMap<i64, Question> = match self.questions.get_many(&ids).await {
            Ok(questions) => questions.into_iter().map(|q| (q.id, q)).collect(),
            Err(e) => {
                tracing::warn!(attempt_id, "Failed to load wrong questions: {:#}", e);
                HashMap::new()
            }
        };

        unresolved
            .iter()
            .map(|outcome| {
                let question = questions.get(&outcome.question_id);
                WrongQuestion {
                    question_id: outcome.question_id,
                    prompt: question.map(|q| q.prompt.clone()).unwrap_or_default(),
                    your_choice_ids: outcome.last_choice_ids.clone(),
                    correct_choice_ids: question
                        .map(Question::correct_choice_ids)
                        .unwrap_or_default(),
                    explanation: question.map(|q| q.explanation.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Secondary effects never undo a decided transition.
fn swallow(attempt_id: i64, failure: CoreError) {
    if let CoreError::DependencyFailure { effect, source } = &failure {
        record_secondary_failure(effect);
        tracing::warn!(
            attempt_id,
            effect = *effect,
            "Secondary effect failed, continuing: {:#}",
            source
        );
    }
}
