use axum::{
    extract::{Query, State},
    Extension, Json,
};
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use crate::middlewares::auth::AuthUser;
use crate::models::reward::{BalanceResponse, TransactionsQuery};
use crate::models::{RewardTx, RewardTxType};
use crate::services::{reward_service::RewardService, AppState};

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<BalanceResponse>> {
    let service = RewardService::new(&state.repos);
    let diamonds = service.balance(user.user_id).await?;
    Ok(Json(BalanceResponse { diamonds }))
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<Vec<RewardTx>>> {
    let tx_type = query
        .tx_type
        .as_deref()
        .map(str::parse::<RewardTxType>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let service = RewardService::new(&state.repos);
    Ok(Json(
        service.transaction_history(user.user_id, tx_type).await?,
    ))
}
