/*!
 * Domain types for the delivery core
 *
 * Subscription -> Event -> Delivery -> AttemptLog (+ at most one DeadLetter)
 * is a strict ownership tree; nothing here holds a cross-pointer back up
 * the tree.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An endpoint a customer wishes to receive events at.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: String,
    pub url: String,
    pub secret: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// URL scheme must be http or https; secret must be at least 16 bytes.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.len() < 16 {
            return Err("secret must be at least 16 bytes".to_string());
        }
        match url::Url::parse(&self.url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
            Ok(parsed) => Err(format!("unsupported URL scheme: {}", parsed.scheme())),
            Err(e) => Err(format!("invalid URL: {e}")),
        }
    }
}

/// A single emission destined for exactly one subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a Delivery's current-state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Dead,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InFlight => "in_flight",
            DeliveryStatus::Succeeded => "succeeded",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Dead => "dead",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_flight" => Ok(DeliveryStatus::InFlight),
            "succeeded" => Ok(DeliveryStatus::Succeeded),
            "failed" => Ok(DeliveryStatus::Failed),
            "dead" => Ok(DeliveryStatus::Dead),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// The current delivery attempt state for an event (one row per event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub event_id: Uuid,
    pub attempt_number: i32,
    pub status: DeliveryStatus,
    pub last_request_headers: Option<serde_json::Value>,
    pub last_request_body: Option<Vec<u8>>,
    pub last_response_status: Option<i32>,
    pub last_response_body: Option<Vec<u8>>,
    pub last_response_latency_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Append-only historical record of a single delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttemptLog {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub attempt_number: i32,
    pub request_headers: serde_json::Value,
    pub request_body: Vec<u8>,
    pub response_status: Option<i32>,
    pub response_body: Option<Vec<u8>>,
    pub latency_ms: i32,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Marker that a Delivery has exhausted retries.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A due delivery as handed back by `Store::claim_due_deliveries`, bundled
/// with the parent subscription and the event payload the worker needs to
/// build and sign the outbound request.
#[derive(Debug, Clone)]
pub struct ClaimedDelivery {
    pub delivery: Delivery,
    pub subscription: Subscription,
    pub event_id: Uuid,
    pub event_payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_rejects_short_secret() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            customer_id: "cust_1".to_string(),
            url: "https://example.com/hook".to_string(),
            secret: "short".to_string(),
            active: true,
            created_at: Utc::now(),
        };
        assert!(sub.validate().is_err());
    }

    #[test]
    fn subscription_rejects_non_http_scheme() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            customer_id: "cust_1".to_string(),
            url: "ftp://example.com/hook".to_string(),
            secret: "0123456789abcdef".to_string(),
            active: true,
            created_at: Utc::now(),
        };
        assert!(sub.validate().is_err());
    }

    #[test]
    fn subscription_accepts_valid_https() {
        let sub = Subscription {
            id: Uuid::new_v4(),
            customer_id: "cust_1".to_string(),
            url: "https://example.com/hook".to_string(),
            secret: "0123456789abcdef".to_string(),
            active: true,
            created_at: Utc::now(),
        };
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn delivery_status_round_trips_through_str() {
        use std::str::FromStr;
        for s in ["pending", "in_flight", "succeeded", "failed", "dead"] {
            let status = DeliveryStatus::from_str(s).unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!(DeliveryStatus::from_str("bogus").is_err());
    }
}
