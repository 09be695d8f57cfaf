use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::achievement::Achievement;
use super::level::QuestionView;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            AttemptStatus::InProgress => false,
            AttemptStatus::Completed | AttemptStatus::Failed => true,
        }
    }

    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::InProgress, AttemptStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub level_id: i64,
    pub status: AttemptStatus,
    pub score: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Step log ordered by `step_order`; only populated by by-id lookups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<AttemptStep>,
}

impl Attempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    /// Moves the attempt into a terminal state, stamping the completion time.
    /// Returns false (and leaves the attempt untouched) for illegal transitions.
    pub fn transition(&mut self, next: AttemptStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.completed_at = Some(now);
        true
    }

    pub fn passed(&self, threshold: i32) -> bool {
        self.status == AttemptStatus::Completed && self.score >= threshold
    }
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub level_id: i64,
    pub started_at: DateTime<Utc>,
}

/// Raw answer as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerPayload {
    pub question_id: i64,
    pub choice_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptStep {
    pub id: i64,
    pub attempt_id: i64,
    pub level_step_id: Option<i64>,
    pub question_id: Option<i64>,
    pub step_order: i32,
    pub response: AnswerPayload,
    pub correct: bool,
    pub duration_ms: i64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttemptStep {
    pub attempt_id: i64,
    pub level_step_id: Option<i64>,
    pub question_id: Option<i64>,
    pub step_order: i32,
    pub response: AnswerPayload,
    pub correct: bool,
    pub duration_ms: i64,
    pub answered_at: DateTime<Utc>,
}

impl NewAttemptStep {
    pub fn into_step(self, id: i64) -> AttemptStep {
        AttemptStep {
            id,
            attempt_id: self.attempt_id,
            level_step_id: self.level_step_id,
            question_id: self.question_id,
            step_order: self.step_order,
            response: self.response,
            correct: self.correct,
            duration_ms: self.duration_ms,
            answered_at: self.answered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrongQuestion {
    pub question_id: i64,
    pub prompt: String,
    pub your_choice_ids: Vec<i64>,
    pub correct_choice_ids: Vec<i64>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardInfo {
    pub diamonds: i64,
    pub tx_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub attempt: Attempt,
    pub score: i32,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub wrong_questions: Vec<WrongQuestion>,
    pub reward: Option<RewardInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_achievements: Vec<Achievement>,
}

/// Outcome of a single AnswerQuestion call.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub explanation: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(range(min = 1, message = "level_id must be positive"))]
    pub level_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(range(min = 1, message = "question_id must be positive"))]
    pub question_id: i64,
    #[validate(length(min = 1, message = "choice_ids must not be empty"))]
    pub choice_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub correct: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub explanation: String,
    pub next_question: Option<QuestionView>,
    pub finished: bool,
}

#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub question: Option<QuestionView>,
    pub finished: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveAttemptQuery {
    pub level_id: i64,
}
