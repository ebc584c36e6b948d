use axum::{
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    middleware,
    routing::post,
    Form, Json, Router,
};
use axum_macros::debug_handler;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::models::{VerdictRequest, VerdictResponse};
use crate::rate_limiter::{rate_limit, RateLimiter};
use crate::service::VerdictService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VerdictService>,
    pub limiter: RateLimiter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/user", post(handle_verdict))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The `username` field from a JSON or urlencoded body.
/// Unreadable bodies are treated the same as a missing username.
pub struct UsernamePayload(pub Option<String>);

impl<S> FromRequest<S> for UsernamePayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let body = if is_form {
            Form::<VerdictRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Json::<VerdictRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        };

        match body {
            Ok(body) => Ok(Self(body.username)),
            Err(reason) => {
                tracing::debug!("Unreadable verdict request body: {}", reason);
                Err(AppError::BadRequest)
            }
        }
    }
}

#[debug_handler]
async fn handle_verdict(
    State(state): State<AppState>,
    UsernamePayload(username): UsernamePayload,
) -> Result<Json<VerdictResponse>, AppError> {
    let verdict = state.service.verdict_for(username.as_deref()).await?;
    Ok(Json(verdict))
}
