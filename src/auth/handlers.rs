use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, MessageResponse, PublicUser, RegisterRequest, TokenResponse},
        extractors::{AuthUser, JsonBody},
        services::{current_user, login_user, register_user},
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    register_user(state.users.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created successfully".into(),
        }),
    ))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = login_user(state.users.as_ref(), &state.keys, payload).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, claims), fields(username = %claims.sub))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = current_user(state.users.as_ref(), &claims.sub).await?;
    Ok(Json(PublicUser::from(user)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, auth::repo::memory::MemoryUserRepo, state::AppState};

    use super::*;

    fn app() -> (Router, AppState) {
        let state = AppState::fake(Arc::new(MemoryUserRepo::default()));
        (build_app(state.clone()), state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.expect("router is infallible");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn register_login_flow() {
        let (app, state) = app();

        let (status, body) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "a@x.com", "password": "password123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User created successfully");

        let (status, body) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "b@x.com", "password": "x"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username or email already exists");

        let (status, body) = send(
            &app,
            post_json("/login", json!({"username": "alice", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token in body");
        let claims = state.keys.verify(token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);

        let (status, _) = send(
            &app,
            post_json("/login", json!({"username": "alice", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_email_differs_only_in_case() {
        let (app, _) = app();
        let (status, _) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "a@x.com", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "bob", "email": " A@X.com", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username or email already exists");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (app, _) = app();
        send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "a@x.com", "password": "password123"}),
            ),
        )
        .await;

        let unknown = send(
            &app,
            post_json("/login", json!({"username": "nobody", "password": "password123"})),
        )
        .await;
        let wrong = send(
            &app,
            post_json("/login", json!({"username": "alice", "password": "nope"})),
        )
        .await;
        assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, wrong);
        assert_eq!(wrong.1, json!({"message": "Authentication failed"}));
    }

    #[tokio::test]
    async fn invalid_username_is_rejected_with_message() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "al", "email": "a@x.com", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("between 3 and 20"));
    }

    #[tokio::test]
    async fn store_outage_returns_opaque_500() {
        let state = AppState::fake(Arc::new(MemoryUserRepo::failing()));
        let app = build_app(state);
        let (status, body) = send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "a@x.com", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"message": "Error registering user"}));

        let (status, body) = send(
            &app,
            post_json("/login", json!({"username": "alice", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"message": "Error logging in"}));
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_400() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            post_json("/register", json!({"username": "alice", "email": "a@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("password"));

        let truncated = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username": "alice", "pass"#))
            .unwrap();
        let (status, body) = send(&app, truncated).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let no_content_type = Request::builder()
            .method("POST")
            .uri("/register")
            .body(Body::from(
                json!({"username": "alice", "email": "a@x.com", "password": "pw"}).to_string(),
            ))
            .unwrap();
        let (status, body) = send(&app, no_content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let (app, state) = app();
        send(
            &app,
            post_json(
                "/register",
                json!({"username": "alice", "email": "A@x.com", "password": "password123"}),
            ),
        )
        .await;
        let (_, body) = send(
            &app,
            post_json("/login", json!({"username": "alice", "password": "password123"})),
        )
        .await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = send(&app, get_with_token("/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["role"], "user");
        assert_eq!(body["is_verified"], false);

        let (status, _) = send(&app, get_with_token("/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, get_with_token("/me", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");

        // valid signature, but the user is not in this store
        let ghost = state
            .keys
            .sign("ghost", crate::auth::repo_types::Role::User)
            .unwrap();
        let (status, body) = send(&app, get_with_token("/me", Some(&ghost))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "User not found");
    }
}
