//! Operation Context
//!
//! Who is acting, through which API key, and at what instant. Every rule of
//! an operation (window rollover, limit upsert, spend checks) is evaluated
//! against `requested_at`, so one request never straddles a window boundary.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub api_key_id: Option<Uuid>,
    /// From `X-Request-User-Id`; card endpoints require it
    pub request_user_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub client_ip: Option<IpAddr>,
    pub requested_at: DateTime<Utc>,
}

impl OperationContext {
    /// Context stamped with the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Context pinned to a fixed instant
    pub fn at(requested_at: DateTime<Utc>) -> Self {
        Self {
            api_key_id: None,
            request_user_id: None,
            correlation_id: None,
            client_ip: None,
            requested_at,
        }
    }

    pub fn with_api_key(self, api_key_id: Uuid) -> Self {
        Self {
            api_key_id: Some(api_key_id),
            ..self
        }
    }

    pub fn with_request_user(self, user_id: Uuid) -> Self {
        Self {
            request_user_id: Some(user_id),
            ..self
        }
    }

    pub fn with_correlation_id(self, correlation_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..self
        }
    }

    pub fn with_client_ip(self, client_ip: Option<IpAddr>) -> Self {
        Self { client_ip, ..self }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_context_carries_caller() {
        let api_key_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        let context = OperationContext::new()
            .with_api_key(api_key_id)
            .with_request_user(user_id)
            .with_client_ip(Some(ip));

        assert_eq!(context.api_key_id, Some(api_key_id));
        assert_eq!(context.request_user_id, Some(user_id));
        assert_eq!(context.client_ip, Some(ip));
        assert!(context.correlation_id.is_none());
    }

    #[test]
    fn test_pinned_clock_survives_builders() {
        let at = Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap();
        let context = OperationContext::at(at)
            .with_correlation_id(Uuid::new_v4())
            .with_request_user(Uuid::new_v4());

        assert_eq!(context.requested_at, at);
    }
}
