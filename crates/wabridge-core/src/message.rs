use serde::{Deserialize, Serialize};

use crate::event::{ConnectionState, UserInfo};

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    /// Pending pairing QR payload, if any.
    pub qr_code: Option<String>,
    pub state: ConnectionState,
    /// Linked account, once open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// Result of a send attempt. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some("Message sent successfully".to_string()),
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            message: None,
            message_id: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_format() {
        let status = ConnectionStatus {
            is_connected: false,
            qr_code: Some("2@abc".to_string()),
            state: ConnectionState::AwaitingPairing,
            user: None,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"isConnected": false, "qrCode": "2@abc", "state": "awaiting_pairing"})
        );
    }

    #[test]
    fn test_status_includes_user_when_open() {
        let status = ConnectionStatus {
            is_connected: true,
            qr_code: None,
            state: ConnectionState::Open,
            user: Some(UserInfo {
                id: "15551234567".to_string(),
                name: Some("Front Desk".to_string()),
            }),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["user"]["id"], "15551234567");
        assert_eq!(value["user"]["name"], "Front Desk");
    }

    #[test]
    fn test_outcome_sent_wire_format() {
        let value = serde_json::to_value(SendOutcome::sent("3EB0ABC")).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["messageId"], "3EB0ABC");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_outcome_failed_wire_format() {
        let value = serde_json::to_value(SendOutcome::failed("boom")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "boom"}));
    }
}
