//! API models for request and response payloads
//!
//! Session, attendance and correction payloads reuse the domain types
//! directly since they already serialize in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutoring::Money;
use tutoring::models::{CheckInCredential, CheckInMethod, SessionStatus};
use uuid::Uuid;

/// Success envelope wrapping every `/api` response body
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

/// Request to move a session to another status
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SessionStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Student check-in with a PIN or QR code
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub session_id: Uuid,
    pub method: CheckInMethod,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueShare {
    pub tutor_id: Uuid,
    pub revenue_share: f64,
}

/// Replacement revenue policy of a consortium
#[derive(Debug, Deserialize)]
pub struct RevenueSharesRequest {
    pub shares: Vec<RevenueShare>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinResponse {
    pub pin: String,
    pub expires_in: i64,
}

impl PinResponse {
    pub fn new(credential: &CheckInCredential, now: DateTime<Utc>) -> Self {
        Self {
            pin: credential.code.clone(),
            expires_in: credential.remaining_seconds(now),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub qr_code: String,
    pub expires_in: i64,
}

impl QrResponse {
    pub fn new(credential: &CheckInCredential, now: DateTime<Utc>) -> Self {
        Self {
            qr_code: credential.code.clone(),
            expires_in: credential.remaining_seconds(now),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAbsentResponse {
    pub marked_absent: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: Uuid,
    pub balance: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_missing_message() {
        let json = serde_json::to_value(ApiResponse::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 1 }));

        let json = serde_json::to_value(ApiResponse::with_message(1, "done")).unwrap();
        assert_eq!(json["message"], "done");
    }

    #[test]
    fn test_check_in_request_is_camel_case() {
        let request: CheckInRequest = serde_json::from_value(serde_json::json!({
            "sessionId": Uuid::nil(),
            "method": "pin",
            "code": "012345",
        }))
        .unwrap();

        assert_eq!(request.method, CheckInMethod::Pin);
        assert_eq!(request.code, "012345");
    }
}
