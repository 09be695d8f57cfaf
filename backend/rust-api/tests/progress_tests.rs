use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{get, send};

#[tokio::test]
async fn test_ledger_lists_completion_rewards() {
    let app = common::create_test_app().await;
    let result = common::pass_basics(&app, 40).await;

    let (status, txs) = get(&app, "/api/v1/rewards/transactions", 40).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(txs.as_array().map(Vec::len), Some(1));
    assert_eq!(txs[0]["amount"], 10);
    assert_eq!(txs[0]["type"], "earn");
    assert_eq!(txs[0]["attempt_id"], result["attempt"]["id"]);

    let (_, spends) = get(&app, "/api/v1/rewards/transactions?type=spend", 40).await;
    assert_eq!(spends, json!([]));

    let (status, _) = get(&app, "/api/v1/rewards/transactions?type=gift", 40).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_perfect_run_unlocks_achievements_once() {
    let app = common::create_test_app().await;

    let (_, catalog) = get(&app, "/api/v1/achievements", 41).await;
    assert_eq!(catalog.as_array().map(Vec::len), Some(3));

    let result = common::pass_basics(&app, 41).await;
    let mut codes: Vec<&str> = result["new_achievements"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["code"].as_str())
        .collect();
    codes.sort_unstable();
    assert_eq!(codes, vec!["first_steps", "perfect_score"]);

    let again = common::pass_basics(&app, 41).await;
    assert!(again.get("new_achievements").is_none());

    let (_, mine) = get(&app, "/api/v1/achievements/my", 41).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(2));

    let (_, progress) = get(&app, "/api/v1/achievements/perfect_score/progress", 41).await;
    assert_eq!(progress["is_completed"], true);
    let (_, progress) = get(&app, "/api/v1/achievements/streak_3/progress", 41).await;
    assert_eq!(progress["is_completed"], false);

    let (status, _) = get(&app, "/api/v1/achievements/unknown/progress", 41).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_is_created_and_streak_starts_on_completion() {
    let app = common::create_test_app().await;

    let (status, profile) = get(&app, "/api/v1/me/profile", 42).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user_id"], 42);
    assert_eq!(profile["streak"], 0);

    common::pass_basics(&app, 42).await;

    let (_, profile) = get(&app, "/api/v1/me/profile", 42).await;
    assert_eq!(profile["streak"], 1);
    assert!(profile["meta"]["streak_last_date"].is_string());

    let (_, stats) = get(&app, "/api/v1/me/stats", 42).await;
    assert_eq!(stats["total_attempts"], 1);
    assert_eq!(stats["completed_levels"], 1);
    assert_eq!(stats["total_diamonds"], 10);
    assert_eq!(stats["current_streak"], 1);
    assert_eq!(stats["achievements_count"], 2);
}

#[tokio::test]
async fn test_profile_update_merges_meta() {
    let app = common::create_test_app().await;

    let (status, profile) = send(
        &app,
        "PUT",
        "/api/v1/me/profile",
        Some(43),
        Some(json!({ "meta": { "timezone": "America/Mexico_City", "language": "es" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", profile);
    assert_eq!(profile["meta"]["timezone"], "America/Mexico_City");
    assert_eq!(profile["meta"]["language"], "es");

    let (_, profile) = send(
        &app,
        "PUT",
        "/api/v1/me/profile",
        Some(43),
        Some(json!({ "stats": { "lessons": 4 } })),
    )
    .await;
    assert_eq!(profile["stats"]["lessons"], 4);
    assert_eq!(profile["meta"]["language"], "es");
}

#[tokio::test]
async fn test_profile_update_rejects_bad_input() {
    let app = common::create_test_app().await;

    for body in [
        json!({ "user_id": 7 }),
        json!({}),
        json!({ "meta": { "timezone": "Mars/Olympus" } }),
        json!({ "meta": { "streak_last_date": "2020-01-01" } }),
    ] {
        let (status, response) =
            send(&app, "PUT", "/api/v1/me/profile", Some(44), Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} -> {}", body, response);
        assert_eq!(response["code"], "validation_error");
    }

    let (_, profile) = get(&app, "/api/v1/me/profile", 44).await;
    assert_eq!(profile["meta"], json!({}));
    assert_eq!(profile["stats"], Value::Object(Default::default()));
}
