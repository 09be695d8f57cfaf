use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use super::error::ApiResult;
use crate::extractors::AppJson;
use crate::middlewares::auth::AuthUser;
use crate::models::{Profile, ProfileUpdate, UserStats};
use crate::services::{profile_service::ProfileService, AppState};

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Profile>> {
    let service = ProfileService::new(&state.repos);
    Ok(Json(service.get_or_create(user.user_id).await?))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    AppJson(update): AppJson<ProfileUpdate>,
) -> ApiResult<Json<Profile>> {
    let service = ProfileService::new(&state.repos);
    Ok(Json(service.update_profile(user.user_id, update).await?))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserStats>> {
    let service = ProfileService::new(&state.repos);
    Ok(Json(service.user_stats(user.user_id).await?))
}
