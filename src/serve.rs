//! HTTP front end for the key server.
//!
//! Endpoints:
//! - `GET /` ping.
//! - `POST /fps` a `fairplay-streaming-request` JSON document; the response
//!   is the matching `fairplay-streaming-response`.
use std::collections::HashMap;
use std::path::Path;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::credentials::CredentialsConfig;
use crate::error::{Error, Result};
use crate::json;
use crate::server::KeyServer;

/// Server configuration loaded from YAML.
///
/// ```yaml
/// credentials:
///   rsa_1024_key: credentials/key1024.pem
///   rsa_2048_key: credentials/key2048.pem
///   provisioning_data: credentials/provisioning.bin
/// users:
///   secret-key-1:
///     username: packager
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServeConfig {
    /// Key server credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Map of secret key to user. Empty means no authentication.
    #[serde(default)]
    pub users: HashMap<String, ServeUser>,
}

/// Per-user access configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServeUser {
    /// Optional display name used in logs.
    pub username: Option<String>,
}

impl ServeConfig {
    /// Parse a YAML document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Load a YAML file; credential paths are resolved against its directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&data)?;
        if let Some(base) = path.parent() {
            config.credentials = config.credentials.relative_to(base);
        }
        Ok(config)
    }
}

#[derive(Clone)]
struct ServeState {
    users: HashMap<String, ServeUser>,
    server: KeyServer,
}

/// Start the HTTP API.
pub async fn run(config: ServeConfig, server: KeyServer, host: &str, port: u16) -> Result<()> {
    if config.users.is_empty() {
        warn!("No users configured, authentication is disabled");
    }
    let state = ServeState {
        users: config.users,
        server,
    };

    let app = axum::Router::new()
        .route("/", get(ping))
        .route("/fps", post(create_ckc))
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Other(format!("Server bind error: {}", e)))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| Error::Other(format!("Server error: {}", e)))?;
    Ok(())
}

async fn ping() -> Response {
    json_response(
        StatusCode::OK,
        Json(json!({
            "status": 200,
            "message": "Pong!"
        })),
    )
}

async fn create_ckc(State(state): State<ServeState>, headers: HeaderMap, body: String) -> Response {
    let user = match authorize(&state.users, &headers) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let request_id = Uuid::new_v4();
    info!(
        "[{}] create-ckc request from {} ({} bytes)",
        request_id,
        user.as_deref().unwrap_or("anonymous"),
        body.len()
    );

    let server = state.server.clone();
    let processed = tokio::task::spawn_blocking(move || json::process_request(&server, &body)).await;

    match processed {
        Ok(response) => {
            debug!("[{}] {}", request_id, response);
            json_response(StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!("[{}] processing task failed: {}", request_id, e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": 500,
                    "message": e.to_string()
                })),
            )
        }
    }
}

/// Check the `X-Secret-Key` header. Returns the user name, if any.
fn authorize(
    users: &HashMap<String, ServeUser>,
    headers: &HeaderMap,
) -> std::result::Result<Option<String>, Response> {
    if users.is_empty() {
        return Ok(None);
    }

    let secret = match headers.get("X-Secret-Key").and_then(|v| v.to_str().ok()) {
        Some(secret) => secret,
        None => {
            return Err(json_response(
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "status": 401,
                    "message": "Secret Key is Empty."
                })),
            ))
        }
    };

    match users.get(secret) {
        Some(user) => Ok(Some(
            user.username.clone().unwrap_or_else(|| "unnamed user".to_string()),
        )),
        None => Err(json_response(
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": 401,
                "message": "Secret Key is Invalid, the Key is case-sensitive."
            })),
        )),
    }
}

fn json_response(status: StatusCode, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    *response.status_mut() = status;
    response.headers_mut().insert(
        "Server",
        HeaderValue::from_static(concat!("rsfairplay serve v", env!("CARGO_PKG_VERSION"))),
    );
    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    use super::{authorize, ServeConfig, ServeUser};

    fn users() -> HashMap<String, ServeUser> {
        let mut users = HashMap::new();
        users.insert(
            "s3cret".to_string(),
            ServeUser {
                username: Some("packager".to_string()),
            },
        );
        users
    }

    #[test]
    fn parse_config() {
        let config = ServeConfig::from_yaml(
            "credentials:\n  rsa_2048_key: keys/2048.pem\nusers:\n  s3cret:\n    username: packager\n",
        )
        .expect("config");
        assert!(config.credentials.rsa_1024_key.is_none());
        assert!(config.credentials.rsa_2048_key.is_some());
        assert_eq!(
            config.users["s3cret"].username.as_deref(),
            Some("packager")
        );
    }

    #[test]
    fn authorization() {
        let mut headers = HeaderMap::new();
        assert_eq!(authorize(&HashMap::new(), &headers).ok(), Some(None));

        let err = authorize(&users(), &headers).expect_err("missing key");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        headers.insert("X-Secret-Key", HeaderValue::from_static("S3CRET"));
        let err = authorize(&users(), &headers).expect_err("wrong key");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        headers.insert("X-Secret-Key", HeaderValue::from_static("s3cret"));
        assert_eq!(
            authorize(&users(), &headers).ok(),
            Some(Some("packager".to_string()))
        );
    }
}
