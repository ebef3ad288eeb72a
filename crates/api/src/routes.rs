use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use collector::{OrgSync, RawSyncReport, SyncReport};
use db::Repositories;
use prometheus::Encoder;
use serde_json::json;
use tracing::{info, instrument};

use crate::dto::{
    ActivityParams, CommitDto, IssueDto, OrganizationDto, PageDto, PullRequestDto, RepositoryDto,
    SyncRequest,
};
use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ApiState {
    pub repositories: Arc<dyn Repositories>,
    /// `None` when no GitHub credentials are configured; sync routes then
    /// answer 503.
    pub sync: Option<Arc<dyn OrgSync>>,
    pub metrics_path: &'static str,
}

impl ApiState {
    fn sync_handle(&self) -> ApiResult<&dyn OrgSync> {
        self.sync
            .as_deref()
            .ok_or_else(|| ApiError::Unavailable("GitHub sync is not configured".into()))
    }
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let metrics_path: &'static str = state.metrics_path;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/organizations", get(list_organizations))
        .route("/organizations/sync", post(sync_user_organizations))
        .route("/organizations/:login/repositories", get(list_repositories))
        .route("/organizations/stats", post(organization_stats))
        .route("/organizations/stats/raw", post(organization_stats_raw))
        .route("/commits", get(list_commits))
        .route("/pull-requests", get(list_pull_requests))
        .route("/issues", get(list_issues))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip(state))]
async fn list_organizations(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<Vec<OrganizationDto>>> {
    let rows = state.repositories.organizations().list().await?;
    Ok(Json(rows.into_iter().map(OrganizationDto::from).collect()))
}

#[instrument(skip(state))]
async fn list_repositories(
    State(state): State<Arc<ApiState>>,
    Path(login): Path<String>,
) -> ApiResult<Json<Vec<RepositoryDto>>> {
    let org = state
        .repositories
        .organizations()
        .get_by_login(&login)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("organization {} not found", login)))?;
    let rows = state.repositories.repos().list_by_organization(org.id).await?;
    Ok(Json(rows.into_iter().map(RepositoryDto::from).collect()))
}

#[instrument(skip(state))]
async fn sync_user_organizations(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<Vec<OrganizationDto>>> {
    let rows = state.sync_handle()?.sync_user_organizations().await?;
    info!(count = rows.len(), "organizations synced from credential");
    Ok(Json(rows.into_iter().map(OrganizationDto::from).collect()))
}

#[instrument(skip(state))]
async fn organization_stats(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SyncReport>> {
    let orgs = request.organizations()?;
    let report = state.sync_handle()?.sync_organizations(&orgs).await?;
    Ok(Json(report))
}

#[instrument(skip(state))]
async fn organization_stats_raw(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<RawSyncReport>> {
    let orgs = request.organizations()?;
    let report = state.sync_handle()?.sync_organizations_raw(&orgs).await?;
    Ok(Json(report))
}

#[instrument(skip(state))]
async fn list_commits(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<PageDto<CommitDto>>> {
    let query = params.into_query()?;
    let page = state.repositories.commits().list(&query).await?;
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
async fn list_pull_requests(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<PageDto<PullRequestDto>>> {
    let query = params.into_query()?;
    let page = state.repositories.pull_requests().list(&query).await?;
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
async fn list_issues(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<PageDto<IssueDto>>> {
    let query = params.into_query()?;
    let page = state.repositories.issues().list(&query).await?;
    Ok(Json(page.into()))
}

async fn metrics() -> ApiResult<impl IntoResponse> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let content_type = encoder.format_type().to_string();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        buffer,
    ))
}
