//! API Middleware
//!
//! Authentication and request logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::IpAddr;
use uuid::Uuid;

use crate::audit::sha256_hex;
use crate::config::ApiKeyConfig;
use crate::domain::OperationContext;
use crate::state::AppState;

/// API Key authentication result
#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

impl AuthenticatedApiKey {
    /// Check if this API key has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission || p == "admin")
    }
}

/// Request user from X-Request-User-Id header
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub user_id: Uuid,
}

/// Configured API keys, looked up by the SHA-256 of the presented key
#[derive(Debug, Clone, Default)]
pub struct ApiKeyRegistry {
    keys: HashMap<String, AuthenticatedApiKey>,
}

impl ApiKeyRegistry {
    pub fn from_config(configs: &[ApiKeyConfig]) -> Self {
        let keys = configs
            .iter()
            .map(|config| {
                let key = AuthenticatedApiKey {
                    id: key_id_from_hash(&config.key_hash),
                    name: config.name.clone(),
                    permissions: config.permissions.clone(),
                };
                (config.key_hash.clone(), key)
            })
            .collect();
        Self { keys }
    }

    /// Look up a raw key as sent in `X-API-Key`
    pub fn authenticate(&self, raw_key: &str) -> Option<&AuthenticatedApiKey> {
        self.keys.get(&sha256_hex(raw_key))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Stable key ID: the first 16 bytes of the key hash
fn key_id_from_hash(key_hash: &str) -> Uuid {
    hex::decode(key_hash)
        .ok()
        .and_then(|bytes| bytes.get(..16).and_then(|b| Uuid::from_slice(b).ok()))
        .unwrap_or_else(Uuid::nil)
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Extract and validate API key from X-API-Key header
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = match headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-API-Key header",
                "missing_api_key",
            ));
        }
    };

    let authenticated = match state.api_keys.authenticate(api_key) {
        Some(key) => key.clone(),
        None => {
            tracing::warn!("Rejected request with unknown API key");
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid API key", "invalid_api_key"));
        }
    };

    // Extract correlation ID or generate new one
    let correlation_id = headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_api_key(authenticated.id)
        .with_correlation_id(correlation_id)
        .with_client_ip(client_ip(&headers));

    // Endpoints that need the acting user check for the RequestUser extension
    if let Some(user_id_str) = headers.get("X-Request-User-Id").and_then(|v| v.to_str().ok()) {
        match Uuid::parse_str(user_id_str) {
            Ok(user_id) => {
                context = context.with_request_user(user_id);
                request.extensions_mut().insert(RequestUser { user_id });
            }
            Err(_) => {
                return Err(reject(
                    StatusCode::BAD_REQUEST,
                    "Invalid X-Request-User-Id header format",
                    "invalid_user_id",
                ));
            }
        }
    }

    request.extensions_mut().insert(authenticated);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Caller address as reported by the fronting proxy: the first
/// `X-Forwarded-For` hop, else `X-Real-IP`
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = headers.get("X-Real-IP").and_then(|v| v.to_str().ok());

    forwarded
        .or(real_ip)
        .and_then(|ip| ip.trim().parse().ok())
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .headers()
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            correlation_id = ?correlation_id,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-request-user-id", "user-123".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let user_id = masked.iter().find(|(k, _)| k == "x-request-user-id");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(user_id.unwrap().1, "user-123");
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", "198.51.100.9".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("198.51.100.9".parse().unwrap()));

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_registry_authenticates_by_hash() {
        let registry = ApiKeyRegistry::from_config(&[ApiKeyConfig {
            name: "backoffice".to_string(),
            key_hash: sha256_hex("s3cret"),
            permissions: vec!["admin".to_string()],
        }]);

        let key = registry.authenticate("s3cret").unwrap();
        assert_eq!(key.name, "backoffice");
        assert!(key.has_permission("audit:read"));
        assert_ne!(key.id, Uuid::nil());
        assert!(registry.authenticate("S3CRET").is_none());
    }

    #[test]
    fn test_permission_check() {
        let key = AuthenticatedApiKey {
            id: Uuid::new_v4(),
            name: "mobile".to_string(),
            permissions: vec!["cards".to_string()],
        };
        assert!(key.has_permission("cards"));
        assert!(!key.has_permission("admin"));
    }
}
