use crate::{guard::SecurityState, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

/// Live entry count of each store.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct StoreSizes {
    rate_limit: usize,
    lockout: usize,
    csrf: usize,
    password_reset: usize,
    users: usize,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    stores: StoreSizes,
}

#[utoipa::path(
    get,
    path = "/health",
    responses (
        (status = 200, description = "Service is running", body = Health)
    ),
    tag = "health",
)]
pub async fn health(method: Method, state: Extension<SecurityState>) -> impl IntoResponse {
    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stores: StoreSizes {
            rate_limit: state.rate_limiter().len(),
            lockout: state.lockout().len(),
            csrf: state.csrf().len(),
            password_reset: state.password_reset().len(),
            users: state.users().len(),
        },
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(0..7).unwrap_or_default();

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    (StatusCode::OK, headers, body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::guard::SecurityConfig;
    use axum::{body::to_bytes, http::Request, routing::options, Router};
    use tower::ServiceExt;

    fn app(state: SecurityState) -> Router {
        Router::new()
            .route("/health", options(health).get(health))
            .layer(Extension(state))
    }

    #[tokio::test]
    async fn reports_store_sizes() {
        let state = SecurityState::from_config(SecurityConfig::default()).unwrap();
        state.rate_limiter().check("192.0.2.1");
        state.csrf().issue().unwrap();
        state.csrf().issue().unwrap();

        let response = app(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let x_app = response.headers().get("X-App").unwrap().to_str().unwrap();
        assert!(x_app.starts_with(&format!(
            "{}:{}:",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: Health = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.name, env!("CARGO_PKG_NAME"));
        assert_eq!(
            health.stores,
            StoreSizes {
                rate_limit: 1,
                lockout: 0,
                csrf: 2,
                password_reset: 0,
                users: 0,
            }
        );
    }

    #[tokio::test]
    async fn options_has_no_body() {
        let state = SecurityState::from_config(SecurityConfig::default()).unwrap();
        let response = app(state)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-App"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
