//! HTTP routes of the diet backend.
//!
//! - `GET /health`: health check (no auth)
//! - `GET /diets/{user_id}`: current remote record, 404 if none
//! - `PUT /diets/{user_id}`: overwrite the record; the response carries the
//!   server-assigned `updatedAt`

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use super::storage::{DietStorage, ServerStorageError};
use crate::models::DietRecord;
use crate::remote::RemoteDietRecord;

/// API key entry in the server config file
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ApiKeyFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Maps API keys to the user they belong to.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Loads keys from a YAML file. A missing or invalid file yields no keys.
    pub fn load(config_path: &FsPath) -> Self {
        let keys = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ApiKeyFile>(&contents) {
                Ok(file) => {
                    let store = Self::from_entries(
                        file.api_keys
                            .into_iter()
                            .map(|entry| (entry.key, entry.user_id)),
                    );
                    tracing::info!("Loaded {} API key(s)", store.keys.len());
                    store.keys
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                HashMap::new()
            }
        };

        Self { keys }
    }

    pub fn from_entries<K, U>(entries: impl IntoIterator<Item = (K, U)>) -> Self
    where
        K: Into<String>,
        U: Into<String>,
    {
        let keys = entries
            .into_iter()
            .map(|(key, user_id)| {
                (
                    key.into(),
                    AuthUser {
                        user_id: user_id.into(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    storage: Arc<DietStorage>,
    api_keys: Arc<ApiKeyStore>,
    /// Serializes writes so stamps stay strictly increasing per user.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(storage: DietStorage, api_keys: ApiKeyStore) -> Self {
        Self {
            storage: Arc::new(storage),
            api_keys: Arc::new(api_keys),
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ServerStorageError {
    fn into_response(self) -> Response {
        match self {
            ServerStorageError::InvalidUserId(_) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_user", self.to_string())
            }
            other => {
                tracing::error!("Storage failure: {}", other);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access diet storage",
                )
            }
        }
    }
}

async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            );
        }
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            );
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

fn authorize(user: &AuthUser, user_id: &str) -> Result<(), Response> {
    if user.user_id != user_id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not grant access to this user",
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_diet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Json<RemoteDietRecord>, Response> {
    authorize(&user, &user_id)?;

    match state.storage.load(&user_id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No diet record for {}", user_id),
        )),
        Err(e) => Err(e.into_response()),
    }
}

async fn put_diet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(record): Json<DietRecord>,
) -> Result<Json<RemoteDietRecord>, Response> {
    authorize(&user, &user_id)?;

    let _guard = state.write_lock.lock().await;
    let stored = state
        .storage
        .save(&user_id, record, Utc::now())
        .map_err(IntoResponse::into_response)?;

    tracing::info!(
        user_id = %user_id,
        updated_at = %stored.updated_at,
        "Stored diet record"
    );

    Ok(Json(stored))
}

/// Builds the backend router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/diets/{user_id}", get(get_diet).put(put_diet))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
