//! HTTP handlers for teams, users, pull requests and statistics.
//!
//! Handlers only translate between JSON and the assignment engine. Failures
//! are rendered as `{"error": {"code", "message"}}`.

use std::sync::Arc;

use assigner_core::{AssignmentError, PullRequestId, Team, UserId};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::AppState;

/// A failure ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        let (status, code) = match &err {
            AssignmentError::DuplicateTeam(_) => (StatusCode::BAD_REQUEST, "TEAM_EXISTS"),
            AssignmentError::DuplicateRequest(_) => (StatusCode::CONFLICT, "PR_EXISTS"),
            AssignmentError::RequestClosed(_) => (StatusCode::CONFLICT, "PR_MERGED"),
            AssignmentError::ReviewerNotAssigned { .. } => (StatusCode::CONFLICT, "NOT_ASSIGNED"),
            AssignmentError::NoEligibleCandidate { .. } => (StatusCode::CONFLICT, "NO_CANDIDATE"),
            AssignmentError::EntityNotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AssignmentError::StoreFailure(e) => {
                error!("Store failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct SetIsActiveRequest {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: PullRequestId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: PullRequestId,
    pub old_user_id: UserId,
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::get_service_version(),
    }))
}

async fn create_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Team>, JsonRejection>,
) -> ApiResult {
    let Json(team) = payload?;
    let team = state.engine.directory().create_team(&team).await?;
    Ok((StatusCode::CREATED, Json(json!({ "team": team }))).into_response())
}

async fn get_team(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let team = state.engine.directory().get_team(&query.team_name).await?;
    Ok(Json(team).into_response())
}

async fn set_is_active(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let user = state
        .engine
        .directory()
        .set_is_active(&req.user_id, req.is_active)
        .await?;
    Ok(Json(json!({ "user": user })).into_response())
}

async fn get_user_reviews(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let (user, pull_requests) = state
        .engine
        .directory()
        .get_user_reviews(&query.user_id)
        .await?;
    Ok(Json(json!({
        "user_id": user.id,
        "pull_requests": pull_requests,
    }))
    .into_response())
}

async fn create_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let pr = state
        .engine
        .create_pull_request(req.pull_request_id, req.pull_request_name, req.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "pr": pr }))).into_response())
}

async fn merge_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergePullRequestRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let pr = state.engine.merge_pull_request(&req.pull_request_id).await?;
    Ok(Json(json!({ "pr": pr })).into_response())
}

async fn reassign_reviewer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let outcome = state
        .engine
        .reassign_reviewer(&req.pull_request_id, &req.old_user_id)
        .await?;
    Ok(Json(json!({
        "pr": outcome.pull_request,
        "replaced_by": outcome.replaced_by,
    }))
    .into_response())
}

async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state.stats.snapshot().await?;
    Ok(Json(stats).into_response())
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/team/add", post(create_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_is_active))
        .route("/users/getReview", get(get_user_reviews))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/stats", get(get_stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assigner_core::{EntityKind, RepositoryError};

    #[test]
    fn test_error_codes_and_statuses() {
        let cases = [
            (
                AssignmentError::DuplicateRequest(PullRequestId::from("pr1")),
                StatusCode::CONFLICT,
                "PR_EXISTS",
            ),
            (
                AssignmentError::DuplicateTeam("backend".to_string()),
                StatusCode::BAD_REQUEST,
                "TEAM_EXISTS",
            ),
            (
                AssignmentError::RequestClosed(PullRequestId::from("pr1")),
                StatusCode::CONFLICT,
                "PR_MERGED",
            ),
            (
                AssignmentError::not_found(EntityKind::User, "u1"),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                AssignmentError::StoreFailure(RepositoryError::storage("get", "disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }
}
