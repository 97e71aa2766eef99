use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use subtle::ConstantTimeEq;

use crate::{
    application::{
        error::HttpError,
        invalidation::InvalidationService,
        stats::{HitMissCounters, StatsSnapshot},
    },
    config::Secret,
};

use super::middleware::{log_responses, set_request_context};

const SOURCE: &str = "infra::http::admin";

#[derive(Clone)]
pub struct AdminState {
    pub stats: Arc<HitMissCounters>,
    pub invalidation: InvalidationService,
    /// `None` leaves every admin route open.
    pub token: Option<Secret>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/stats", get(cache_stats))
        .route("/invalidate/{selector}", put(invalidate_selector))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn cache_stats(State(state): State<AdminState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn invalidate_selector(
    State(state): State<AdminState>,
    Path(selector): Path<String>,
) -> Response {
    match state.invalidation.invalidate(&selector).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn require_admin_token(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_ref() else {
        return next.run(request).await;
    };

    let authorized = extract_token(request.headers().get(AUTHORIZATION))
        .is_some_and(|token| token.as_bytes().ct_eq(expected.expose().as_bytes()).into());

    if !authorized {
        return HttpError::new(
            SOURCE,
            StatusCode::FORBIDDEN,
            "",
            "admin bearer token missing or mismatched",
        )
        .into_response();
    }

    next.run(request).await
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    raw.strip_prefix("Bearer ")
}
