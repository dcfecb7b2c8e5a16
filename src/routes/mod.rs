use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{
    append_set_cookies, clear_cookies, get_cookie, session_cookies, CookieOptions, SessionToken,
    TokenDecoder, TokenPair, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME,
};
use crate::config::Config;
use crate::error::ApiError;
use crate::http_client::{UpstreamClient, UpstreamResponse};
use crate::models::auth::{LoginRequest, SignupRequest};
use crate::models::resume::SharedResume;
use crate::models::user::UserProfile;
use crate::models::{validate, Envelope};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<UpstreamClient>,
    pub decoder: TokenDecoder,
    pub cookie_options: CookieOptions,
}

impl AppState {
    pub fn new(config: Arc<Config>, upstream: Arc<UpstreamClient>) -> Self {
        Self {
            decoder: TokenDecoder::new(&config.secret_key),
            cookie_options: CookieOptions {
                secure: config.secure_cookies(),
            },
            config,
            upstream,
        }
    }
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Proxy routes that forward the session token upstream
pub fn proxy_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/account", get(account_handler))
        .route(
            "/api/resume/shared/:shareable_link",
            get(shared_resume_handler),
        )
        .with_state(state)
}

/// Routes that write or clear the session cookies
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/session", post(set_session_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Resume Gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// Relay an upstream answer without touching the body
fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    if let Some(content_type) = upstream.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

fn empty(status: StatusCode) -> Response {
    (status, Body::empty()).into_response()
}

/// GET /api/account - Profile of the signed-in user
///
/// 401 without a token cookie (no upstream call), upstream body on success,
/// and an empty 500 for every other failure.
async fn account_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = get_cookie(&headers, ACCESS_COOKIE_NAME) else {
        tracing::debug!("Request to /api/account without access token cookie");
        return empty(StatusCode::UNAUTHORIZED);
    };

    tracing::info!(
        "Request to /api/account (token: {}...)",
        &token[..8.min(token.len())]
    );

    let upstream = match state.upstream.get_profile(&token).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!("Profile fetch failed: {}", e);
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if let Err(e) = validate::<Envelope<UserProfile>>(&upstream.body) {
        tracing::error!("Profile response rejected: {}", e);
        return empty(StatusCode::INTERNAL_SERVER_ERROR);
    }

    relay(upstream)
}

/// GET /api/resume/shared/{shareableLink} - Resume behind a shareable link
///
/// Works without a session; forwards the token when one is present.
async fn shared_resume_handler(
    State(state): State<AppState>,
    Path(shareable_link): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    tracing::info!("Request to /api/resume/shared/{}", shareable_link);

    let token = get_cookie(&headers, ACCESS_COOKIE_NAME);
    let upstream = state
        .upstream
        .get_shared_resume(&shareable_link, token.as_deref())
        .await?;

    validate::<Envelope<SharedResume>>(&upstream.body)?;

    Ok(relay(upstream))
}

/// Answer with the session facts and the cookies that store the session
fn session_response(state: &AppState, session: SessionToken) -> Result<Response, ApiError> {
    let cookies = session_cookies(&session, state.cookie_options, Utc::now())?;

    tracing::info!(
        user_id = session.user_id,
        expires_at = %session.expires_at.to_rfc3339(),
        "Session cookies written"
    );

    let mut response = Json(session.info()).into_response();
    append_set_cookies(response.headers_mut(), cookies);
    Ok(response)
}

/// POST /api/auth/session - Store a token pair obtained from the resume API
async fn set_session_handler(
    State(state): State<AppState>,
    Json(pair): Json<TokenPair>,
) -> Result<Response, ApiError> {
    let session = state.decoder.session_from_pair(pair)?;
    session_response(&state, session)
}

/// POST /api/auth/login - Sign in through the gateway
async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to /api/auth/login");

    let pair = state.upstream.login(&request).await?;
    let session = state.decoder.session_from_pair(pair)?;
    session_response(&state, session)
}

/// POST /api/auth/signup - Register through the gateway
async fn signup_handler(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    tracing::info!("Request to /api/auth/signup");

    let pair = state.upstream.register(&request).await?;
    let session = state.decoder.session_from_pair(pair)?;
    session_response(&state, session)
}

/// POST /api/auth/refresh - Rotate the session cookies
///
/// A rejected refresh token also clears the cookies, ending the session.
async fn refresh_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result: Result<Response, ApiError> = async {
        let refresh_token =
            get_cookie(&headers, REFRESH_COOKIE_NAME).ok_or(ApiError::MissingCredential)?;
        let pair = state.upstream.refresh(&refresh_token).await?;
        let session = state.decoder.session_from_pair(pair)?;
        session_response(&state, session)
    }
    .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            tracing::warn!(status = status.as_u16(), "Token refresh failed: {}", e);

            let mut response = e.into_response();
            if status == StatusCode::UNAUTHORIZED {
                append_set_cookies(response.headers_mut(), clear_cookies(state.cookie_options));
            }
            response
        }
    }
}

/// POST /api/auth/logout - End the session
///
/// The upstream invalidation is best effort; the cookies are always cleared.
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let access_token = get_cookie(&headers, ACCESS_COOKIE_NAME);
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME);

    if access_token.is_some() || refresh_token.is_some() {
        if let Err(e) = state
            .upstream
            .logout(access_token.as_deref(), refresh_token.as_deref())
            .await
        {
            tracing::warn!("Upstream logout failed, clearing session anyway: {}", e);
        }
    }

    let mut response = empty(StatusCode::NO_CONTENT);
    append_set_cookies(response.headers_mut(), clear_cookies(state.cookie_options));
    tracing::info!("Session cookies cleared");
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenPayload, TokenType};
    use crate::config::parse_base_url;
    use axum::http::Request;
    use chrono::Duration;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::util::ServiceExt;

    const SECRET: &str = "route-test-secret";

    fn create_test_state() -> AppState {
        // Port 9 refuses connections, so any accidental upstream call fails
        let api_endpoint = parse_base_url("http://127.0.0.1:9").unwrap();
        let config = Arc::new(Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            api_endpoint: api_endpoint.clone(),
            public_url: url::Url::parse("http://localhost:3000").unwrap(),
            secret_key: SECRET.to_string(),
            http_max_connections: 4,
            http_connect_timeout: 2,
            http_request_timeout: 2,
            log_level: "info".to_string(),
        });
        let upstream = Arc::new(UpstreamClient::new(api_endpoint, 4, 2, 2).unwrap());

        AppState::new(config, upstream)
    }

    fn create_test_app(state: AppState) -> Router {
        Router::new()
            .merge(health_routes())
            .merge(proxy_routes(state.clone()))
            .merge(session_routes(state))
    }

    fn sign(token_type: TokenType, ttl_secs: i64) -> String {
        let now = Utc::now();
        let claims = TokenPayload {
            user_id: 5,
            token_type,
            verify: "verified".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn body_bytes(response: Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_root_handler() {
        let value = root_handler().await.0;

        assert_eq!(value["status"], "ok");
        assert_eq!(value["message"], "Resume Gateway is running");
        assert_eq!(value["version"], VERSION);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let value = health_handler().await.0;

        assert_eq!(value["status"], "healthy");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_account_without_cookie_is_401_empty() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/account").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_account_with_unreachable_upstream_is_500_empty() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/account")
                    .header(header::COOKIE, "access_token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_set_session_writes_both_cookies() {
        let app = create_test_app(create_test_state());
        let pair = TokenPair {
            access_token: sign(TokenType::AccessToken, 900),
            refresh_token: sign(TokenType::RefreshToken, 86_400),
        };

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&pair).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with(&format!("access_token={};", pair.access_token)));
        assert!(cookies[1].starts_with(&format!("refresh_token={};", pair.refresh_token)));
        // Plain http origin: no Secure attribute
        assert!(cookies.iter().all(|c| !c.contains("Secure")));

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["user_id"], 5);
        assert!(body.get("access_token").is_none());
    }

    #[tokio::test]
    async fn test_set_session_rejects_refresh_token_as_access() {
        let app = create_test_app(create_test_state());
        let pair = TokenPair {
            access_token: sign(TokenType::RefreshToken, 900),
            refresh_token: sign(TokenType::RefreshToken, 900),
        };

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&pair).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_cookie_clears_session() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_logout_clears_cookies_when_upstream_is_down() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .header(header::COOKIE, "access_token=abc; refresh_token=def")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("access_token=;")));
        assert!(cookies.iter().any(|c| c.starts_with("refresh_token=;")));
    }
}
