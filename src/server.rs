//!
//! feedgate HTTP server
//! --------------------
//! Axum adapter in front of the identity core.
//!
//! Responsibilities:
//! - Signup and login endpoints backed by `users::UserService`.
//! - Gateway authorizer callback returning a decision document per call.
//! - Identity-gated user endpoints enforcing the same decision locally.
//! - Escalating fatal credential/signing failures to the process supervisor.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult, FatalError, UserError};
use crate::identity::{decide, forbid, CredentialManager, Decision, RequestAuthenticator, SigningSecret, TokenCodec, CONTEXT_USER_KEY};
use crate::store::{CredentialStore, MemoryCredentialStore, User};
use crate::users::UserService;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub authenticator: RequestAuthenticator,
    fatal_tx: UnboundedSender<FatalError>,
}

impl AppState {
    /// The receiver yields fatal errors raised while serving; the supervisor should stop on the first.
    pub fn new(
        secret: SigningSecret,
        store: Arc<dyn CredentialStore>,
    ) -> Result<(Self, UnboundedReceiver<FatalError>), FatalError> {
        let codec = TokenCodec::new(secret);
        let users = UserService::new(store, CredentialManager::new()?, codec.clone());
        let (fatal_tx, fatal_rx) = unbounded_channel();
        let state = Self {
            users: Arc::new(users),
            authenticator: RequestAuthenticator::new(codec),
            fatal_tx,
        };
        Ok((state, fatal_rx))
    }

    fn escalate(&self, err: &UserError) {
        if let UserError::Fatal(fatal) = err {
            error!(target: "feedgate", "fatal: {}", fatal);
            let _ = self.fatal_tx.send(fatal.clone());
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({"status": "error", "code": self.code_str(), "message": self.message()}));
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "feedgate ok" }))
        .route("/api/v0/users", post(signup))
        .route("/api/v0/users/auth/login", post(login))
        .route("/api/v0/users/me", get(me))
        .route("/api/v0/users/{email}", get(get_user))
        .route("/authorize", post(authorize))
        .with_state(state)
}

/// Load the secret, bind the configured port and serve until a fatal error is reported.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let secret = config.load_secret().context("signing secret provisioning failed")?;
    let (state, fatal_rx) = AppState::new(secret, Arc::new(MemoryCredentialStore::new()))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, router(state), fatal_rx).await
}

/// Serve `app`; a fatal error shuts the server down gracefully and is returned.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    mut fatal_rx: UnboundedReceiver<FatalError>,
) -> anyhow::Result<()> {
    let reported: Arc<Mutex<Option<FatalError>>> = Arc::new(Mutex::new(None));
    let slot = reported.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Some(e) = fatal_rx.recv().await {
                *slot.lock() = Some(e);
            }
        })
        .await?;
    let fatal = reported.lock().take();
    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct SignupResponse {
    token: String,
    user: User,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    auth: bool,
    token: String,
    user: User,
}

/// Gateway token-authorizer callback.
#[derive(Debug, Deserialize)]
struct AuthorizerRequest {
    #[serde(rename = "authorizationToken", default)]
    authorization_token: Option<String>,
    #[serde(rename = "methodArn")]
    method_arn: String,
}

fn validate_credentials(p: &CredentialsPayload) -> AppResult<()> {
    let email = p.email.trim();
    if email.is_empty() || !email.contains('@') || email.len() != p.email.len() {
        return Err(AppError::user("validation_error", "email is required and must be a valid address"));
    }
    if p.password.is_empty() {
        return Err(AppError::user("validation_error", "password is required"));
    }
    Ok(())
}

async fn run_user_op<T, F>(state: &AppState, op: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&UserService) -> Result<T, UserError> + Send + 'static,
{
    // Hashing is CPU-bound; keep it off the async workers.
    let users = state.users.clone();
    let res = tokio::task::spawn_blocking(move || op(users.as_ref()))
        .await
        .map_err(|e| {
            error!(target: "feedgate", "user op task failed: {}", e);
            AppError::internal("internal", "internal error")
        })?;
    res.map_err(|e| {
        state.escalate(&e);
        AppError::from(e)
    })
}

async fn signup(State(state): State<AppState>, Json(payload): Json<CredentialsPayload>) -> AppResult<Json<SignupResponse>> {
    validate_credentials(&payload)?;
    let CredentialsPayload { email, password } = payload;
    let (user, token) = run_user_op(&state, move |u| u.create(&email, &password)).await?;
    Ok(Json(SignupResponse { token, user }))
}

async fn login(State(state): State<AppState>, Json(payload): Json<CredentialsPayload>) -> AppResult<Json<LoginResponse>> {
    validate_credentials(&payload)?;
    let CredentialsPayload { email, password } = payload;
    let (user, token) = run_user_op(&state, move |u| u.login(&email, &password)).await?;
    Ok(Json(LoginResponse { auth: true, token, user }))
}

async fn authorize(State(state): State<AppState>, Json(req): Json<AuthorizerRequest>) -> Json<Decision> {
    let request_id = uuid::Uuid::new_v4();
    let outcome = state.authenticator.authenticate_header(req.authorization_token.as_deref());
    if let Err(e) = &outcome {
        debug!(target: "authz", %request_id, reason = e.code_str(), resource = %req.method_arn, "deny");
    }
    Json(decide(&outcome, &req.method_arn))
}

/// Authenticate the call and gate it on `resource`; returns the principal.
fn gate(state: &AppState, headers: &HeaderMap, resource: &str) -> AppResult<String> {
    let outcome = state.authenticator.authenticate_headers(headers);
    let decision = decide(&outcome, resource);
    if !decision.is_allowed() {
        if let Err(e) = outcome {
            debug!(target: "authz", reason = e.code_str(), resource, "deny");
            return Err(e.into());
        }
        return Err(AppError::auth("unauthorized", "Unauthorized"));
    }
    decision
        .context
        .get(CONTEXT_USER_KEY)
        .cloned()
        .ok_or_else(|| AppError::auth("unauthorized", "Unauthorized"))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let email = gate(&state, &headers, "GET /api/v0/users/me")?;
    Ok(Json(serde_json::json!({ "email": email })))
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> AppResult<Json<User>> {
    let resource = format!("GET /api/v0/users/{}", email);
    let principal = gate(&state, &headers, &resource)?;
    if principal != email {
        let d = forbid(&principal);
        debug!(target: "authz", principal = %d.principal_id, explicit_deny = d.explicit_deny, %resource, "deny");
        return Err(AppError::forbidden("forbidden", "Forbidden"));
    }
    let found = run_user_op(&state, move |u| u.get(&email)).await?;
    found.map(Json).ok_or_else(|| AppError::not_found("not_found", "user not found"))
}
