use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use super::error::ApiResult;
use crate::middlewares::auth::AuthUser;
use crate::models::{Achievement, AchievementProgress};
use crate::services::{achievement_service::AchievementService, AppState};

pub async fn list_achievements(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Achievement>>> {
    let service = AchievementService::new(&state.repos);
    Ok(Json(service.list_achievements().await?))
}

pub async fn my_achievements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Achievement>>> {
    let service = AchievementService::new(&state.repos);
    Ok(Json(service.user_achievements(user.user_id).await?))
}

pub async fn achievement_progress(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<Json<AchievementProgress>> {
    let service = AchievementService::new(&state.repos);
    Ok(Json(service.progress(user.user_id, &code).await?))
}
