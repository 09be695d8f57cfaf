use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use crate::middlewares::auth::AuthUser;
use crate::models::level::{LevelAvailabilityResponse, LevelDetail, LevelSummary, ListLevelsQuery};
use crate::models::Difficulty;
use crate::services::{level_service::LevelService, AppState};

pub async fn list_levels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLevelsQuery>,
) -> ApiResult<Json<Vec<LevelSummary>>> {
    let difficulty = query
        .difficulty
        .as_deref()
        .map(str::parse::<Difficulty>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let service = LevelService::new(&state.repos);
    let levels = service
        .list_levels(difficulty, query.topic.as_deref())
        .await?;
    Ok(Json(levels))
}

pub async fn get_level(
    State(state): State<Arc<AppState>>,
    Path(level_id): Path<i64>,
) -> ApiResult<Json<LevelDetail>> {
    let service = LevelService::new(&state.repos);
    Ok(Json(service.get_level_detail(level_id).await?))
}

pub async fn level_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(level_id): Path<i64>,
) -> ApiResult<Json<LevelAvailabilityResponse>> {
    let service = LevelService::new(&state.repos);
    let available = service.is_level_available(level_id, user.user_id).await?;
    Ok(Json(LevelAvailabilityResponse {
        level_id,
        available,
    }))
}
