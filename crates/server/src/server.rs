//! HTTP server: blogger onboarding, task distribution, eligibility
//! estimation and settlement bookkeeping.

use crate::config::ServerConfig;
use crate::db::{
    ActivityRead, CompletedAssignmentRead, Database, NewActivity, NewSocialAccount, NewTask,
    NewUser, PayoutInfoRead, SettlementRecordRead, TaskRecord, UserRecord,
};
use crate::distribution::{self, clamp_preview_limit, rank_bloggers, Estimate};
use crate::revenue::{self, EngagementMetrics, RevenueConfig};
use crate::settlement::{self, SettlementStatus, UserSettlementSummary};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use kolflow_common::error::ApiError;
use kolflow_common::types::{
    AssignmentStatus, HealthResponse, PayoutMethod, Platform, ReviewStatus, Role, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub config: ServerConfig,
    pub db: Database,
    pub start_time: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Users
        .route("/api/v1/users", get(list_users).post(create_user))
        .route("/api/v1/users/{user_id}/review", patch(review_user))
        .route("/api/v1/users/{user_id}/weight", patch(update_user_weight))
        // Estimation
        .route(
            "/api/v1/eligible-bloggers-estimate",
            get(estimate_eligible_bloggers),
        )
        // Tasks
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/{task_id}/publish", post(publish_task))
        .route("/api/v1/tasks/{task_id}/cancel", post(cancel_task))
        .route(
            "/api/v1/tasks/{task_id}/eligible-bloggers",
            get(task_eligible_bloggers),
        )
        .route("/api/v1/tasks/{task_id}/distribute", post(distribute_task))
        // Assignments
        .route(
            "/api/v1/assignments/{assignment_id}/complete",
            post(complete_assignment),
        )
        // Settlements
        .route("/api/v1/settlements/summary", get(settlement_summary))
        .route("/api/v1/settlements/{user_id}", get(settlement_detail))
        .route(
            "/api/v1/settlements/{user_id}/records",
            post(add_settlement_record),
        )
        .route(
            "/api/v1/settlements/{user_id}/payout-info",
            put(upsert_payout_info),
        )
        // Revenue policy
        .route("/api/v1/platform-configs", get(list_platform_configs))
        .route(
            "/api/v1/platform-configs/{platform}",
            put(upsert_platform_config),
        )
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// --- Users ---

#[derive(Deserialize)]
struct SocialAccountPayload {
    platform: String,
    account_name: String,
    account_id: String,
    #[serde(default)]
    follower_count: i64,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    display_name: Option<String>,
    phone: Option<String>,
    city: Option<String>,
    #[serde(default)]
    follower_total: i64,
    #[serde(default)]
    avg_views: i64,
    weight: Option<f64>,
    #[serde(default)]
    accounts: Vec<SocialAccountPayload>,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    if req.username.trim().is_empty() {
        return Err(ApiError::unprocessable("username must not be empty"));
    }
    if req.follower_total < 0 || req.avg_views < 0 {
        return Err(ApiError::unprocessable(
            "follower_total and avg_views must be non-negative",
        ));
    }
    let weight = req.weight.unwrap_or(state.config.default_user_weight);
    if weight <= 0.0 {
        return Err(ApiError::unprocessable("weight must be positive"));
    }

    let mut accounts = Vec::with_capacity(req.accounts.len());
    for account in req.accounts {
        let platform = Platform::from_tag(&account.platform)
            .ok_or_else(|| ApiError::bad_request(format!("unknown platform: {}", account.platform)))?;
        accounts.push(NewSocialAccount {
            platform,
            account_name: account.account_name,
            account_id: account.account_id,
            follower_count: account.follower_count,
        });
    }

    let user_id = state
        .db
        .create_user(
            &NewUser {
                username: req.username.clone(),
                display_name: req.display_name,
                phone: req.phone,
                city: req.city,
                follower_total: req.follower_total,
                avg_views: req.avg_views,
                weight,
            },
            &accounts,
        )
        .await?;

    tracing::info!(user_id, username = %req.username, "blogger registered");
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::internal("user vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserRecord>>, ApiError> {
    Ok(Json(state.db.list_users().await?))
}

#[derive(Deserialize)]
struct ReviewRequest {
    review_status: String,
    review_reason: Option<String>,
}

async fn review_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    let next = ReviewStatus::from_str(&req.review_status)
        .ok_or_else(|| ApiError::bad_request(format!("unknown review status: {}", req.review_status)))?;

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    if user.role != Role::Blogger {
        return Err(ApiError::bad_request("only blogger accounts can be reviewed"));
    }
    if !user.review_status.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "cannot move review from {} to {}",
            user.review_status.as_str(),
            next.as_str()
        )));
    }
    if next == ReviewStatus::Rejected && req.review_reason.as_deref().unwrap_or("").is_empty() {
        return Err(ApiError::unprocessable(
            "review_reason is required when rejecting",
        ));
    }

    state
        .db
        .update_review_status(user_id, next, req.review_reason.as_deref())
        .await?;
    tracing::info!(user_id, status = next.as_str(), "blogger review updated");

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct WeightRequest {
    weight: f64,
}

async fn update_user_weight(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<WeightRequest>,
) -> Result<Json<UserRecord>, ApiError> {
    if req.weight <= 0.0 {
        return Err(ApiError::unprocessable("weight must be positive"));
    }
    if state.db.get_user(user_id).await?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }
    state.db.update_weight(user_id, req.weight).await?;

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(user))
}

// --- Eligibility estimation ---

#[derive(Deserialize)]
struct EstimateQuery {
    platform: String,
    accept_limit: Option<i64>,
    preview_limit: Option<i64>,
}

#[derive(Serialize)]
struct EstimateRead {
    platform: &'static str,
    #[serde(flatten)]
    estimate: Estimate,
}

async fn estimate_eligible_bloggers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<EstimateRead>, ApiError> {
    let platform = Platform::from_tag(&query.platform)
        .ok_or_else(|| ApiError::bad_request(format!("unknown platform: {}", query.platform)))?;

    let pool = state.db.eligible_bloggers(Some(platform)).await?;
    let estimate = distribution::estimate(
        pool,
        query.accept_limit,
        clamp_preview_limit(query.preview_limit),
        state.config.scale_policy,
    );

    if let Some(advisory) = &estimate.advisory {
        tracing::warn!(platform = %platform, advisory, "estimate advisory");
    }
    Ok(Json(EstimateRead {
        platform: platform.as_str(),
        estimate,
    }))
}

// --- Tasks ---

#[derive(Deserialize)]
struct CreateTaskRequest {
    title: String,
    description: String,
    platform: String,
    #[serde(default)]
    base_reward_cents: i64,
    accept_limit: Option<i64>,
    #[serde(default)]
    instructions: String,
    status: Option<TaskStatus>,
}

#[derive(Serialize)]
struct TaskRead {
    #[serde(flatten)]
    task: TaskRecord,
    accepted_count: i64,
    remaining_slots: Option<i64>,
    is_full: bool,
}

async fn task_read(state: &AppState, task: TaskRecord) -> Result<TaskRead, ApiError> {
    let accepted_count = state.db.task_accepted_count(task.id).await?;
    let remaining_slots = task.accept_limit.map(|limit| (limit - accepted_count).max(0));
    Ok(TaskRead {
        is_full: remaining_slots == Some(0),
        task,
        accepted_count,
        remaining_slots,
    })
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskRead>), ApiError> {
    if req.base_reward_cents < 0 {
        return Err(ApiError::unprocessable("base_reward_cents must be non-negative"));
    }
    if req.accept_limit.is_some_and(|limit| limit < 1) {
        return Err(ApiError::unprocessable("accept_limit must be at least 1"));
    }
    if Platform::from_tag(&req.platform).is_none() {
        return Err(ApiError::bad_request(format!("unknown platform: {}", req.platform)));
    }

    let task_id = state
        .db
        .create_task(&NewTask {
            title: req.title,
            description: req.description,
            platform: req.platform,
            base_reward_cents: req.base_reward_cents,
            accept_limit: req.accept_limit,
            instructions: req.instructions,
            status: req.status.unwrap_or(TaskStatus::Draft),
        })
        .await?;
    tracing::info!(task_id, "task created");

    let task = state
        .db
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::internal("task vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(task_read(&state, task).await?)))
}

#[derive(Deserialize)]
struct ListTasksQuery {
    status: Option<String>,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskRead>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            TaskStatus::from_str(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown task status: {raw}")))?,
        ),
        None => None,
    };

    let tasks = state.db.list_tasks(status).await?;
    let mut reads = Vec::with_capacity(tasks.len());
    for task in tasks {
        reads.push(task_read(&state, task).await?);
    }
    Ok(Json(reads))
}

async fn set_task_status(
    state: &AppState,
    task_id: i64,
    status: TaskStatus,
) -> Result<Json<TaskRead>, ApiError> {
    if !state.db.set_task_status(task_id, status).await? {
        return Err(ApiError::not_found("task not found"));
    }
    tracing::info!(task_id, status = status.as_str(), "task status updated");
    let task = state
        .db
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    Ok(Json(task_read(state, task).await?))
}

async fn publish_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
) -> Result<Json<TaskRead>, ApiError> {
    set_task_status(&state, task_id, TaskStatus::Published).await
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
) -> Result<Json<TaskRead>, ApiError> {
    set_task_status(&state, task_id, TaskStatus::Cancelled).await
}

#[derive(Deserialize)]
struct EligibleQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct EligibleBloggerRead {
    user_id: i64,
    username: String,
    display_name: Option<String>,
    follower_total: i64,
    avg_views: i64,
    weight: f64,
    platform: String,
}

async fn published_task(state: &AppState, task_id: i64) -> Result<TaskRecord, ApiError> {
    let task = state
        .db
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    if task.status != TaskStatus::Published {
        return Err(ApiError::bad_request("only published tasks can be distributed"));
    }
    Ok(task)
}

async fn task_eligible_bloggers(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Query(query): Query<EligibleQuery>,
) -> Result<Json<Vec<EligibleBloggerRead>>, ApiError> {
    let task = published_task(&state, task_id).await?;
    let limit = query.limit.unwrap_or(100).clamp(1, 500) as usize;

    let platform = Platform::from_tag(&task.platform);
    let platform_tag = platform
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| task.platform.clone());

    let mut pool = state.db.eligible_bloggers(platform).await?;
    rank_bloggers(&mut pool);
    pool.truncate(limit);

    Ok(Json(
        pool.into_iter()
            .map(|b| EligibleBloggerRead {
                user_id: b.user_id,
                username: b.username,
                display_name: b.display_name,
                follower_total: b.follower_total,
                avg_views: b.avg_views,
                weight: b.weight,
                platform: platform_tag.clone(),
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
struct DistributeRequest {
    #[serde(default)]
    user_ids: Vec<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct DistributeResult {
    task_id: i64,
    created_count: u32,
    skipped_existing_count: u32,
    target_user_ids: Vec<i64>,
}

async fn distribute_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Json(req): Json<DistributeRequest>,
) -> Result<Json<DistributeResult>, ApiError> {
    let task = published_task(&state, task_id).await?;
    let limit = req.limit.unwrap_or(20).clamp(1, 500) as usize;

    let mut eligible = state.db.eligible_bloggers(Platform::from_tag(&task.platform)).await?;
    rank_bloggers(&mut eligible);

    let target_user_ids: Vec<i64> = if req.user_ids.is_empty() {
        eligible.iter().take(limit).map(|b| b.user_id).collect()
    } else {
        let mut seen = std::collections::HashSet::new();
        let targets: Vec<i64> = req
            .user_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let eligible_ids: std::collections::HashSet<i64> =
            eligible.iter().map(|b| b.user_id).collect();
        let invalid: Vec<i64> = targets
            .iter()
            .copied()
            .filter(|id| !eligible_ids.contains(id))
            .collect();
        if !invalid.is_empty() {
            return Err(ApiError::bad_request(format!(
                "users not eligible for task platform: {invalid:?}"
            )));
        }
        targets
    };

    if target_user_ids.is_empty() {
        return Err(ApiError::bad_request("no eligible bloggers found"));
    }

    let detail = format!("任务ID: {} / {}", task.id, task.title);
    let (created_count, skipped_existing_count) = state
        .db
        .distribute_assignments(task_id, &target_user_ids, "task_assigned", "任务已分配", &detail)
        .await?;

    tracing::info!(task_id, created_count, skipped_existing_count, "task distributed");
    Ok(Json(DistributeResult {
        task_id,
        created_count,
        skipped_existing_count,
        target_user_ids,
    }))
}

// --- Assignments ---

#[derive(Deserialize)]
struct CompleteAssignmentRequest {
    #[serde(flatten)]
    metrics: EngagementMetrics,
    post_link: Option<String>,
}

#[derive(Serialize)]
struct CompleteAssignmentResult {
    assignment_id: i64,
    status: AssignmentStatus,
    revenue_cents: i64,
}

async fn complete_assignment(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<i64>,
    Json(req): Json<CompleteAssignmentRequest>,
) -> Result<Json<CompleteAssignmentResult>, ApiError> {
    let assignment = state
        .db
        .get_assignment(assignment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("assignment not found"))?;

    if !matches!(
        assignment.status,
        AssignmentStatus::Accepted | AssignmentStatus::Submitted | AssignmentStatus::InReview
    ) {
        return Err(ApiError::bad_request(format!(
            "assignment in state {} cannot be completed",
            assignment.status.as_str()
        )));
    }
    if req.metrics.likes < 0
        || req.metrics.favorites < 0
        || req.metrics.shares < 0
        || req.metrics.views < 0
    {
        return Err(ApiError::unprocessable("metrics must be non-negative"));
    }

    let task = state
        .db
        .get_task(assignment.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;
    let user = state
        .db
        .get_user(assignment.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let platform_key = Platform::from_tag(&task.platform)
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| task.platform.clone());
    let config = state.db.revenue_config(&platform_key).await?;
    let score = revenue::engagement_score(&req.metrics, &config);
    let revenue_cents =
        revenue::revenue_cents(task.base_reward_cents, user.weight, score, config.platform_coef);

    let detail = format!("任务ID: {} / 收益 {} 分", task.id, revenue_cents);
    state
        .db
        .complete_assignment(
            assignment_id,
            revenue_cents,
            req.post_link.as_deref(),
            &NewActivity {
                user_id: assignment.user_id,
                action_type: "assignment_completed",
                title: "任务已完成",
                detail: Some(&detail),
            },
        )
        .await?;

    tracing::info!(assignment_id, revenue_cents, "assignment completed");
    Ok(Json(CompleteAssignmentResult {
        assignment_id,
        status: AssignmentStatus::Completed,
        revenue_cents,
    }))
}

// --- Settlements ---

#[derive(Deserialize)]
struct SummaryQuery {
    status: Option<String>,
    keyword: Option<String>,
}

async fn settlement_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<settlement::SettlementOverview>, ApiError> {
    let status_filter = match query.status.as_deref() {
        Some(raw) => Some(
            SettlementStatus::from_str(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown settlement status: {raw}")))?,
        ),
        None => None,
    };

    let balances = state.db.blogger_balances().await?;
    let users: Vec<UserSettlementSummary> = balances
        .into_iter()
        .map(settlement::summarize)
        .filter(|s| status_filter.map_or(true, |f| s.settlement_status == f))
        .filter(|s| {
            query
                .keyword
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .map_or(true, |k| s.matches_keyword(k.trim()))
        })
        .collect();

    Ok(Json(settlement::build_overview(users)))
}

#[derive(Serialize)]
struct SettlementDetail {
    user: UserRecord,
    payout_info: Option<PayoutInfoRead>,
    summary: UserSettlementSummary,
    recent_completed_assignments: Vec<CompletedAssignmentRead>,
    recent_records: Vec<SettlementRecordRead>,
    recent_activities: Vec<ActivityRead>,
}

const RECENT_LIMIT: i64 = 10;

async fn settlement_detail(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<SettlementDetail>, ApiError> {
    let balance = state
        .db
        .blogger_balance(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("blogger not found"))?;
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("blogger not found"))?;

    Ok(Json(SettlementDetail {
        user,
        payout_info: state.db.get_payout_info(user_id).await?,
        summary: settlement::summarize(balance),
        recent_completed_assignments: state
            .db
            .recent_completed_assignments(user_id, RECENT_LIMIT)
            .await?,
        recent_records: state.db.recent_settlement_records(user_id, RECENT_LIMIT).await?,
        recent_activities: state.db.recent_activities(user_id, RECENT_LIMIT).await?,
    }))
}

#[derive(Deserialize)]
struct RecordRequest {
    amount_cents: i64,
    note: Option<String>,
    admin_id: Option<i64>,
}

async fn add_settlement_record(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<RecordRequest>,
) -> Result<(StatusCode, Json<SettlementRecordRead>), ApiError> {
    if req.amount_cents <= 0 {
        return Err(ApiError::unprocessable("amount_cents must be positive"));
    }
    if state.db.blogger_balance(user_id).await?.is_none() {
        return Err(ApiError::not_found("blogger not found"));
    }

    let detail = format!("金额 {} 分", req.amount_cents);
    let record = state
        .db
        .insert_settlement_record(
            user_id,
            req.amount_cents,
            req.note.as_deref(),
            req.admin_id,
            &NewActivity {
                user_id,
                action_type: "settlement_recorded",
                title: "结算已发放",
                detail: Some(&detail),
            },
        )
        .await?;

    tracing::info!(user_id, amount_cents = req.amount_cents, "settlement recorded");
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Deserialize)]
struct PayoutInfoRequest {
    method: String,
    #[serde(default)]
    account_name: String,
    #[serde(default)]
    account_no: String,
    note: Option<String>,
}

async fn upsert_payout_info(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(req): Json<PayoutInfoRequest>,
) -> Result<Json<PayoutInfoRead>, ApiError> {
    let method = PayoutMethod::from_str(&req.method)
        .ok_or_else(|| ApiError::bad_request(format!("unknown payout method: {}", req.method)))?;
    if state.db.get_user(user_id).await?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    state
        .db
        .upsert_payout_info(
            user_id,
            method,
            &req.account_name,
            &req.account_no,
            req.note.as_deref(),
        )
        .await?;
    let info = state
        .db
        .get_payout_info(user_id)
        .await?
        .ok_or_else(|| ApiError::internal("payout info vanished after upsert"))?;
    Ok(Json(info))
}

// --- Revenue policy ---

#[derive(Serialize)]
struct PlatformConfigRead {
    platform: String,
    #[serde(flatten)]
    config: RevenueConfig,
}

async fn list_platform_configs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PlatformConfigRead>>, ApiError> {
    let configs = state.db.list_platform_configs().await?;
    Ok(Json(
        configs
            .into_iter()
            .map(|(platform, config)| PlatformConfigRead { platform, config })
            .collect(),
    ))
}

async fn upsert_platform_config(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(config): Json<RevenueConfig>,
) -> Result<Json<PlatformConfigRead>, ApiError> {
    if platform != "default" && Platform::from_tag(&platform).is_none() {
        return Err(ApiError::bad_request(format!("unknown platform: {platform}")));
    }
    let key = Platform::from_tag(&platform)
        .map(|p| p.as_str().to_string())
        .unwrap_or(platform);

    state.db.upsert_platform_config(&key, &config).await?;
    Ok(Json(PlatformConfigRead {
        platform: key,
        config,
    }))
}
