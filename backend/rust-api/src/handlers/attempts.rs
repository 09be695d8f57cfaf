use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use super::error::ApiResult;
use crate::error::CoreError;
use crate::extractors::AppJson;
use crate::middlewares::auth::AuthUser;
use crate::models::attempt::{
    ActiveAttemptQuery, AnswerRequest, AnswerResponse, NextQuestionResponse, StartAttemptRequest,
};
use crate::models::{Attempt, AttemptResult, QuestionView};
use crate::services::{attempt_service::AttemptService, AppState};

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> ApiResult<Json<Attempt>> {
    req.validate()?;

    tracing::info!(
        "Starting attempt for user_id={}, level_id={}",
        user.user_id,
        req.level_id
    );

    let service = AttemptService::new(&state.repos);
    let attempt = service.start_attempt(user.user_id, req.level_id).await?;
    Ok(Json(attempt))
}

pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Attempt>>> {
    let service = AttemptService::new(&state.repos);
    Ok(Json(service.get_user_attempts(user.user_id).await?))
}

pub async fn active_attempt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ActiveAttemptQuery>,
) -> ApiResult<Json<Attempt>> {
    let service = AttemptService::new(&state.repos);
    Ok(Json(
        service
            .get_active_attempt(user.user_id, query.level_id)
            .await?,
    ))
}

pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> ApiResult<Json<Attempt>> {
    let service = AttemptService::new(&state.repos);
    Ok(Json(service.get_user_attempt(attempt_id, user.user_id).await?))
}

pub async fn next_question(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> ApiResult<Json<NextQuestionResponse>> {
    let service = AttemptService::new(&state.repos);
    service.get_user_attempt(attempt_id, user.user_id).await?;

    let question = next_question_view(&service, attempt_id).await?;
    Ok(Json(NextQuestionResponse {
        finished: question.is_none(),
        question,
    }))
}

pub async fn answer_question(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
    AppJson(req): AppJson<AnswerRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    req.validate()?;

    let service = AttemptService::new(&state.repos);
    service.get_user_attempt(attempt_id, user.user_id).await?;

    let outcome = service
        .answer_question(attempt_id, req.question_id, req.choice_ids)
        .await?;
    // The answer is recorded by now; report it even if the lookahead fails.
    let (next_question, finished) = match next_question_view(&service, attempt_id).await {
        Ok(next_question) => {
            let finished = next_question.is_none();
            (next_question, finished)
        }
        Err(e) => {
            tracing::warn!(attempt_id, "Failed to load the next question: {}", e);
            (None, false)
        }
    };

    Ok(Json(AnswerResponse {
        correct: outcome.correct,
        explanation: outcome.explanation,
        next_question,
        finished,
    }))
}

pub async fn complete_attempt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> ApiResult<Json<AttemptResult>> {
    let service = AttemptService::new(&state.repos);
    service.get_user_attempt(attempt_id, user.user_id).await?;

    tracing::info!("Completing attempt: {}", attempt_id);
    Ok(Json(service.complete_attempt(attempt_id).await?))
}

pub async fn cancel_attempt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<i64>,
) -> ApiResult<Json<Attempt>> {
    let service = AttemptService::new(&state.repos);
    Ok(Json(service.cancel_attempt(attempt_id, user.user_id).await?))
}

/// `None` once every question of the level has been answered.
async fn next_question_view(
    service: &AttemptService,
    attempt_id: i64,
) -> Result<Option<QuestionView>, CoreError> {
    match service.get_next_question(attempt_id).await {
        Ok(question) => Ok(Some(QuestionView::from(&question))),
        Err(CoreError::Exhausted) => Ok(None),
        Err(e) => Err(e),
    }
}
