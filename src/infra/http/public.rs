use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
        header::{CONTENT_TYPE, InvalidHeaderValue},
    },
    middleware,
    response::{IntoResponse, Response},
};
use tokio::task::JoinError;

use crate::application::{
    error::HttpError,
    retrieval::{RetrievalRequest, RetrievalService, Retrieved},
};

use super::{
    CACHE_STATUS_HEADER, SELECTOR_HEADER,
    middleware::{log_responses, set_request_context},
};

const SOURCE: &str = "infra::http::public";

#[derive(Clone)]
pub struct PublicState {
    pub retrieval: RetrievalService,
}

/// Every path on the public listener is an object lookup.
pub fn build_router(state: PublicState) -> Router {
    Router::new()
        .fallback(serve_object)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn serve_object(
    State(state): State<PublicState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = RetrievalRequest {
        method,
        selector: headers
            .get(SELECTOR_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned()),
        path: uri.path().to_string(),
    };

    // Detached so a client disconnect does not cancel store calls mid-flight.
    let service = state.retrieval.clone();
    let outcome = tokio::spawn(async move { service.retrieve(request).await }).await;

    match outcome {
        Ok(Ok(retrieved)) => match object_response(retrieved) {
            Ok(response) => response,
            Err(err) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
            .into_response(),
        },
        Ok(Err(err)) => HttpError::from(err).into_response(),
        Err(err) => join_failure(&err).into_response(),
    }
}

fn object_response(retrieved: Retrieved) -> Result<Response, InvalidHeaderValue> {
    let content_type = HeaderValue::from_str(&retrieved.entry.content_type)?;
    let cache_status = HeaderValue::from_static(retrieved.outcome.as_str());

    let mut response = Body::from(retrieved.entry.body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_STATUS_HEADER, cache_status);
    Ok(response)
}

fn join_failure(err: &JoinError) -> HttpError {
    HttpError::from_error(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        err,
    )
}
