//! Integration tests: boot the real server on an ephemeral port with an
//! in-memory database and drive it over HTTP.

use kolflow_server::config::ServerConfig;
use kolflow_server::distribution::ScalePolicy;
use serde_json::{json, Value};

fn test_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        db_path: ":memory:".to_string(),
        default_user_weight: 1.0,
        scale_policy: ScalePolicy::default(),
    }
}

async fn start_server() -> kolflow_server::ServerHandle {
    kolflow_server::start(test_config()).await.unwrap()
}

/// Create a blogger with a douyin account and walk it to approved.
async fn approved_blogger(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    weight: f64,
    avg_views: i64,
    followers: i64,
) -> i64 {
    let resp = client
        .post(format!("{url}/api/v1/users"))
        .json(&json!({
            "username": username,
            "display_name": username,
            "follower_total": followers,
            "avg_views": avg_views,
            "weight": weight,
            "accounts": [{
                "platform": "douyin",
                "account_name": username,
                "account_id": format!("dy-{username}"),
                "follower_count": followers,
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let user: Value = resp.json().await.unwrap();
    let user_id = user["id"].as_i64().unwrap();

    for status in ["under_review", "approved"] {
        let resp = client
            .patch(format!("{url}/api/v1/users/{user_id}/review"))
            .json(&json!({"review_status": status}))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "review -> {status}");
    }
    user_id
}

#[tokio::test]
async fn test_health() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();

    let resp = client
        .get(format!("{}/api/health", handle.url))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let health: Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "ok");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_estimate_empty_pool_has_advisory() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();

    let resp = client
        .get(format!(
            "{}/api/v1/eligible-bloggers-estimate?platform=weibo&accept_limit=5",
            handle.url
        ))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let estimate: Value = resp.json().await.unwrap();
    assert_eq!(estimate["eligible_count"], 0);
    assert_eq!(estimate["estimated_accept_count"], 0);
    assert!(!estimate["advisory"].as_str().unwrap().is_empty());
    assert_eq!(estimate["recommended_scale_max"], 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_estimate_rejects_unknown_platform() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();

    let resp = client
        .get(format!(
            "{}/api/v1/eligible-bloggers-estimate?platform=bilibili",
            handle.url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_estimate_saturation_with_limit() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    // Pool of 5 approved bloggers, weights [1,1,2,1,1].
    for (i, weight) in [1.0, 1.0, 2.0, 1.0, 1.0].iter().enumerate() {
        approved_blogger(&client, url, &format!("blogger{i}"), *weight, 100, 1000).await;
    }

    let resp = client
        .get(format!(
            "{url}/api/v1/eligible-bloggers-estimate?platform=douyin&accept_limit=3&preview_limit=5"
        ))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let estimate: Value = resp.json().await.unwrap();
    assert_eq!(estimate["platform"], "douyin");
    assert_eq!(estimate["eligible_count"], 5);
    assert_eq!(estimate["estimated_accept_count"], 3);
    assert_eq!(estimate["input_accept_limit"], 3);
    assert_eq!(estimate["saturation_rate"], 1.0);
    // Highest weight ranks first.
    assert_eq!(estimate["preview_bloggers"][0]["username"], "blogger2");

    // Repeated call returns identical ordering.
    let again: Value = client
        .get(format!(
            "{url}/api/v1/eligible-bloggers-estimate?platform=douyin&accept_limit=3&preview_limit=5"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["preview_bloggers"], estimate["preview_bloggers"]);

    // Out-of-range limit downgrades to unlimited with an advisory.
    let downgraded: Value = client
        .get(format!(
            "{url}/api/v1/eligible-bloggers-estimate?platform=douyin&accept_limit=99999"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(downgraded["input_accept_limit"], Value::Null);
    assert_eq!(downgraded["estimated_accept_count"], 5);
    assert_eq!(downgraded["saturation_rate"], 0.0);
    assert!(!downgraded["advisory"].as_str().unwrap().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_registration_leaves_no_user() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    // The duplicated account id fails after the user insert; the whole
    // registration must roll back.
    let account = json!({
        "platform": "douyin",
        "account_name": "dup",
        "account_id": "dy-dup",
    });
    let resp = client
        .post(format!("{url}/api/v1/users"))
        .json(&json!({
            "username": "dup",
            "accounts": [account.clone(), account],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 503);

    let users: Value = client
        .get(format!("{url}/api/v1/users"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(users.as_array().unwrap().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_review_state_machine_enforced() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    let resp = client
        .post(format!("{url}/api/v1/users"))
        .json(&json!({"username": "newbie"}))
        .send()
        .await
        .unwrap();
    let user: Value = resp.json().await.unwrap();
    let user_id = user["id"].as_i64().unwrap();
    assert_eq!(user["review_status"], "pending");

    // pending -> approved is not allowed.
    let resp = client
        .patch(format!("{url}/api/v1/users/{user_id}/review"))
        .json(&json!({"review_status": "approved"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Rejecting without a reason fails.
    client
        .patch(format!("{url}/api/v1/users/{user_id}/review"))
        .json(&json!({"review_status": "under_review"}))
        .send()
        .await
        .unwrap();
    let resp = client
        .patch(format!("{url}/api/v1/users/{user_id}/review"))
        .json(&json!({"review_status": "rejected"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_distribution_skips_existing_assignments() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    for i in 0..3 {
        approved_blogger(&client, url, &format!("dist{i}"), 1.0, 10, 10).await;
    }

    let task: Value = client
        .post(format!("{url}/api/v1/tasks"))
        .json(&json!({
            "title": "spring campaign",
            "description": "short video promo",
            "platform": "douyin",
            "base_reward_cents": 5000,
            "accept_limit": 10,
            "instructions": "post before friday",
            "status": "published",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = task["id"].as_i64().unwrap();

    let result: Value = client
        .post(format!("{url}/api/v1/tasks/{task_id}/distribute"))
        .json(&json!({"limit": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["created_count"], 2);
    assert_eq!(result["skipped_existing_count"], 0);

    // Same top-2 again: everything is skipped.
    let result: Value = client
        .post(format!("{url}/api/v1/tasks/{task_id}/distribute"))
        .json(&json!({"limit": 2}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["created_count"], 0);
    assert_eq!(result["skipped_existing_count"], 2);

    // Unknown users are rejected outright.
    let resp = client
        .post(format!("{url}/api/v1/tasks/{task_id}/distribute"))
        .json(&json!({"user_ids": [9999]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_settlement_lifecycle() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    let user_id = approved_blogger(&client, url, "earner", 1.0, 100, 1000).await;

    let task: Value = client
        .post(format!("{url}/api/v1/tasks"))
        .json(&json!({
            "title": "product review",
            "description": "unboxing video",
            "platform": "douyin",
            "base_reward_cents": 5000,
            "status": "published",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let task_id = task["id"].as_i64().unwrap();

    client
        .post(format!("{url}/api/v1/tasks/{task_id}/distribute"))
        .json(&json!({"user_ids": [user_id]}))
        .send()
        .await
        .unwrap();

    // First assignment in a fresh database.
    let completed: Value = client
        .post(format!("{url}/api/v1/assignments/1/complete"))
        .json(&json!({
            "likes": 10,
            "favorites": 5,
            "shares": 2,
            "views": 1000,
            "post_link": "https://v.douyin.com/abc",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // 50.00 base + engagement 36.0 * coef 1.0 * weight 1.0 = 86.00
    assert_eq!(completed["revenue_cents"], 8600);

    let summary_user = |overview: &Value| overview["users"][0].clone();

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let user = summary_user(&overview);
    assert_eq!(user["total_revenue"], 8600);
    assert_eq!(user["settlement_status"], "pending");
    assert_eq!(user["pending_settlement"], 8600);
    assert_eq!(overview["pending_blogger_count"], 1);

    // Partial payout, recorded by admin 1.
    let resp = client
        .post(format!("{url}/api/v1/settlements/{user_id}/records"))
        .json(&json!({"amount_cents": 4000, "note": "first batch", "admin_id": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let record: Value = resp.json().await.unwrap();
    assert_eq!(record["admin_id"], 1);

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let user = summary_user(&overview);
    assert_eq!(user["settlement_status"], "partially_paid");
    assert_eq!(user["pending_settlement"], 4600);

    // Pay off the rest, then overpay.
    for amount in [4600, 100] {
        client
            .post(format!("{url}/api/v1/settlements/{user_id}/records"))
            .json(&json!({"amount_cents": amount}))
            .send()
            .await
            .unwrap();
    }

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let user = summary_user(&overview);
    assert_eq!(user["settlement_status"], "paid_off");
    assert_eq!(user["pending_settlement"], 0);
    assert_eq!(user["overpaid"], true);

    // Detail view carries records and activity.
    let detail: Value = client
        .get(format!("{url}/api/v1/settlements/{user_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["recent_records"].as_array().unwrap().len(), 3);
    let records = detail["recent_records"].as_array().unwrap();
    assert!(records.iter().any(|r| r["admin_id"] == 1));
    assert!(records.iter().any(|r| r["admin_id"].is_null()));
    assert!(!detail["recent_activities"].as_array().unwrap().is_empty());
    assert_eq!(
        detail["recent_completed_assignments"][0]["revenue_cents"],
        8600
    );

    // Zero or negative amounts are rejected.
    let resp = client
        .post(format!("{url}/api/v1/settlements/{user_id}/records"))
        .json(&json!({"amount_cents": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_payout_info_round_trip() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    let user_id = approved_blogger(&client, url, "payee", 1.0, 10, 10).await;

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["users"][0]["has_valid_payout_info"], false);

    let resp = client
        .put(format!("{url}/api/v1/settlements/{user_id}/payout-info"))
        .json(&json!({
            "method": "alipay",
            "account_name": "Payee",
            "account_no": "138-0000-0000",
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["users"][0]["has_valid_payout_info"], true);
    assert_eq!(overview["users"][0]["preferred_method"], "alipay");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_platform_config_overrides_revenue() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    let resp = client
        .put(format!("{url}/api/v1/platform-configs/douyin"))
        .json(&json!({
            "platform_coef": 2.0,
            "like_weight": 1.0,
            "favorite_weight": 2.0,
            "share_weight": 3.0,
            "view_weight": 0.01,
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let configs: Value = client
        .get(format!("{url}/api/v1/platform-configs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(configs[0]["platform"], "douyin");
    assert_eq!(configs[0]["platform_coef"], 2.0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_keyword_and_status_filters() {
    let handle = start_server().await;
    let client = kolflow_common::http::build_client();
    let url = &handle.url;

    approved_blogger(&client, url, "alice", 1.0, 10, 10).await;
    approved_blogger(&client, url, "bob", 1.0, 10, 10).await;

    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary?keyword=ali"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["blogger_count"], 1);
    assert_eq!(overview["users"][0]["username"], "alice");

    // Nobody has revenue yet, so a pending filter matches no one.
    let overview: Value = client
        .get(format!("{url}/api/v1/settlements/summary?status=pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["blogger_count"], 0);

    let resp = client
        .get(format!("{url}/api/v1/settlements/summary?status=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    handle.shutdown().await;
}
