// 🌐 HTTP API - axum routes over the service context
// Recommendation, rule administration and management endpoints

use crate::aggregates::AggregateProvider;
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::rules::{DynamicRule, Recommendation};
use crate::service::ServiceContext;
use crate::store::RuleStat;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared application state
pub struct AppState<P> {
    ctx: Arc<ServiceContext<P>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        AppState {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct UserRecommendations {
    user_id: Uuid,
    recommendations: Vec<Recommendation>,
}

#[derive(Serialize)]
struct RuleStats {
    stats: Vec<RuleStat>,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match e.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run a blocking service call off the async executor
async fn blocking<P, T, F>(state: AppState<P>, f: F) -> Result<T, ApiError>
where
    P: AggregateProvider + 'static,
    T: Send + 'static,
    F: FnOnce(&ServiceContext<P>) -> ServiceResult<T> + Send + 'static,
{
    let ctx = state.ctx;
    tokio::task::spawn_blocking(move || f(&ctx))
        .await
        .map_err(|e| ServiceError::Unexpected(anyhow::anyhow!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /recommendation/:user_id
async fn recommend_for_user<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
    Path(raw_id): Path<String>,
) -> ApiResult<UserRecommendations> {
    let user_id = Uuid::parse_str(&raw_id)
        .map_err(|e| ApiError::bad_request(format!("invalid user id {:?}: {}", raw_id, e)))?;

    let recommendations = blocking(state, move |ctx| {
        ctx.recommendations.recommend_for_user(user_id)
    })
    .await?;

    Ok(Json(ApiResponse::ok(UserRecommendations {
        user_id,
        recommendations,
    })))
}

/// GET /recommendation/by-name/:user_name
async fn recommend_for_user_name<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
    Path(user_name): Path<String>,
) -> ApiResult<Vec<Recommendation>> {
    let recommendations = blocking(state, move |ctx| {
        ctx.recommendations.recommend_for_user_name(&user_name)
    })
    .await?;
    Ok(Json(ApiResponse::ok(recommendations)))
}

/// POST /rule - Validate and store a dynamic rule
async fn add_rule<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
    payload: Result<Json<DynamicRule>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<DynamicRule>>), ApiError> {
    let Json(rule) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let saved = blocking(state, move |ctx| ctx.rules.add_rule(rule)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(saved))))
}

/// GET /rule
async fn list_rules<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
) -> ApiResult<Vec<DynamicRule>> {
    let rules = blocking(state, |ctx| ctx.rules.list_rules()).await?;
    Ok(Json(ApiResponse::ok(rules)))
}

/// DELETE /rule/:id
async fn delete_rule<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
    Path(raw_id): Path<String>,
) -> ApiResult<i64> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid rule id {:?}", raw_id)))?;
    blocking(state, move |ctx| ctx.rules.delete_rule(id)).await?;
    Ok(Json(ApiResponse::ok(id)))
}

/// GET /rule/stats
async fn rule_stats<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
) -> ApiResult<RuleStats> {
    let stats = blocking(state, |ctx| ctx.rules.rule_stats()).await?;
    Ok(Json(ApiResponse::ok(RuleStats { stats })))
}

/// POST /management/clear-caches
async fn clear_caches<P: AggregateProvider + 'static>(
    State(state): State<AppState<P>>,
) -> ApiResult<&'static str> {
    blocking(state, |ctx| {
        ctx.clear_caches();
        Ok(())
    })
    .await?;
    Ok(Json(ApiResponse::ok("caches cleared")))
}

/// GET /management/info
async fn service_info() -> impl IntoResponse {
    Json(ApiResponse::ok(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router<P: AggregateProvider + 'static>(ctx: Arc<ServiceContext<P>>) -> Router {
    let state = AppState { ctx };

    Router::new()
        .route("/api/health", get(health_check))
        .route("/recommendation/:user_id", get(recommend_for_user::<P>))
        .route(
            "/recommendation/by-name/:user_name",
            get(recommend_for_user_name::<P>),
        )
        .route("/rule", post(add_rule::<P>).get(list_rules::<P>))
        .route("/rule/stats", get(rule_stats::<P>))
        .route("/rule/:id", delete(delete_rule::<P>))
        .route("/management/clear-caches", post(clear_caches::<P>))
        .route("/management/info", get(service_info))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRuleStats, InMemoryRuleStore};
    use crate::taxonomy::ProductType;
    use crate::test_support::FakeAggregates;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app(fake: FakeAggregates) -> (Router, Arc<ServiceContext<FakeAggregates>>) {
        let ctx = Arc::new(ServiceContext::new(
            fake,
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryRuleStats::new()),
        ));
        (router(ctx.clone()), ctx)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn debit_rule() -> Value {
        json!({
            "product_id": "prod-1",
            "product_name": "Debit Plus",
            "product_text": "For debit users",
            "rule": [{ "query": "USER_OF", "arguments": ["DEBIT"] }]
        })
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let (app, _) = test_app(FakeAggregates::new());

        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");

        let (status, body) = send(&app, "GET", "/management/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_rule_lifecycle_and_recommendation() {
        let user = Uuid::new_v4();
        let (app, _) = test_app(FakeAggregates::new().with_usage(user, ProductType::Debit));

        let (status, body) = send(&app, "POST", "/rule", Some(debit_rule())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, "GET", &format!("/recommendation/{}", user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user_id"], user.to_string());
        assert_eq!(body["data"]["recommendations"][0]["name"], "Debit Plus");

        let (_, body) = send(&app, "GET", "/rule/stats", None).await;
        assert_eq!(body["data"]["stats"], json!([{ "rule_id": id, "count": 1 }]));

        let (status, _) = send(&app, "DELETE", &format!("/rule/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "DELETE", &format!("/rule/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (_, body) = send(&app, "GET", "/rule", None).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_invalid_rule_is_bad_request() {
        let (app, _) = test_app(FakeAggregates::new());
        let rule = json!({
            "product_id": "p",
            "product_name": "Bad",
            "product_text": "t",
            "rule": [{ "query": "USER_OF", "arguments": ["GOLD"] }]
        });

        let (status, body) = send(&app, "POST", "/rule", Some(rule)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("USER_OF"));

        let (_, body) = send(&app, "GET", "/rule", None).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_path_ids() {
        let (app, _) = test_app(FakeAggregates::new());

        let (status, body) = send(&app, "GET", "/recommendation/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "DELETE", "/rule/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recommend_by_name() {
        let user = Uuid::new_v4();
        let (app, _) = test_app(FakeAggregates::new().with_user("jdoe", user));

        let (status, body) = send(&app, "GET", "/recommendation/by-name/jdoe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));

        let (status, _) = send(&app, "GET", "/recommendation/by-name/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_failure_is_server_error() {
        let user = Uuid::new_v4();
        let fake = FakeAggregates::new();
        fake.fail();
        let (app, _) = test_app(fake);

        let (status, body) = send(&app, "GET", &format!("/recommendation/{}", user), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_clear_caches_forces_reload() {
        let user = Uuid::new_v4();
        let (app, ctx) = test_app(FakeAggregates::new().with_usage(user, ProductType::Debit));
        send(&app, "POST", "/rule", Some(debit_rule())).await;

        send(&app, "GET", &format!("/recommendation/{}", user), None).await;
        assert!(ctx.cache.cached_entries() > 0);

        let (status, _) = send(&app, "POST", "/management/clear-caches", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ctx.cache.cached_entries(), 0);
    }
}
