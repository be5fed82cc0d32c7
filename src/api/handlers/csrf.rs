use crate::guard::{client_identifier, SecurityState};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CsrfToken {
    pub csrf_token: String,
}

#[utoipa::path(
    get,
    path = "/csrf",
    responses (
        (status = 200, description = "A fresh one-time CSRF token", body = CsrfToken),
        (status = 500, description = "Token generation failed")
    ),
    tag = "security",
)]
/// Issue a one-time token to embed in the next state-changing form.
pub async fn csrf(headers: HeaderMap, state: Extension<SecurityState>) -> impl IntoResponse {
    let client = client_identifier(&headers);

    match state.csrf().issue() {
        Ok(csrf_token) => {
            debug!(client = %client, "issued csrf token");
            (StatusCode::OK, Json(CsrfToken { csrf_token })).into_response()
        }
        Err(err) => {
            error!(client = %client, "failed to issue csrf token: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::guard::{SecurityConfig, TokenSource};
    use crate::store::ManualClock;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        routing::get,
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoEntropy;

    impl TokenSource for NoEntropy {
        fn generate(&self) -> anyhow::Result<String> {
            anyhow::bail!("entropy unavailable")
        }
    }

    fn app(state: SecurityState) -> Router {
        Router::new()
            .route("/csrf", get(csrf))
            .layer(Extension(state))
    }

    #[tokio::test]
    async fn issued_token_redeems_once() {
        let state = SecurityState::from_config(SecurityConfig::default()).unwrap();

        let response = app(state.clone())
            .oneshot(
                Request::get("/csrf")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let issued: CsrfToken = serde_json::from_slice(&body).unwrap();
        assert_eq!(issued.csrf_token.len(), 43);
        assert!(state.csrf().redeem(&issued.csrf_token));
        assert!(!state.csrf().redeem(&issued.csrf_token));
    }

    #[tokio::test]
    async fn generation_failure_is_a_server_error() {
        let state = SecurityState::new(
            SecurityConfig::default(),
            Arc::new(ManualClock::at_epoch()),
            Arc::new(NoEntropy),
        )
        .unwrap();

        let response = app(state.clone())
            .oneshot(Request::get("/csrf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.csrf().is_empty());
    }
}
