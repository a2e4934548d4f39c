/*!
 * Attempter
 *
 * Performs exactly one signed HTTP POST to a subscriber and classifies the
 * outcome. Never retries internally — that policy lives in the dispatcher.
 * Signing itself is the Signer's job; the Attempter just sends whatever
 * headers it is given.
 */

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const MAX_BODY_SNIPPET: usize = 4 * 1024;

/// Classification of a completed (or attempted) HTTP delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    PermanentFailure,
}

/// Full record of a single attempt, regardless of classification.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub outcome: AttemptOutcome,
    pub response_status: Option<u16>,
    pub response_body_snippet: Vec<u8>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

/// Shared, reusable HTTP client for delivery attempts.
pub struct Attempter {
    client: Client,
}

impl Attempter {
    pub fn new(attempt_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(attempt_timeout)
            .build()
            .map_err(anyhow::Error::from)?;

        Ok(Self { client })
    }

    /// Send one POST carrying `headers` and `body` to `url`, and classify
    /// the result. `headers` is whatever the Signer already produced —
    /// this function does not sign.
    ///
    /// `cancel` is raced against the in-flight request: if it fires first
    /// (process shutdown), the request is dropped and a retryable outcome
    /// is returned so the delivery stays eligible for the next attempt.
    pub async fn attempt(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &[u8],
        cancel: &CancellationToken,
    ) -> AttemptRecord {
        let start = Instant::now();

        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let result = tokio::select! {
            result = request.send() => result,
            _ = cancel.cancelled() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                warn!(latency_ms, "delivery attempt cancelled before completion");
                return AttemptRecord {
                    outcome: AttemptOutcome::RetryableFailure,
                    response_status: None,
                    response_body_snippet: Vec::new(),
                    latency_ms,
                    error_message: Some("attempt cancelled".to_string()),
                };
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status();
                let status_code = status.as_u16();

                let body_bytes = response.bytes().await.unwrap_or_default();
                let snippet: Vec<u8> = body_bytes
                    .iter()
                    .take(MAX_BODY_SNIPPET)
                    .copied()
                    .collect();

                let outcome = classify_status(status_code);

                if outcome == AttemptOutcome::Success {
                    debug!(status = status_code, latency_ms, "delivery succeeded");
                } else {
                    warn!(status = status_code, latency_ms, "delivery failed");
                }

                AttemptRecord {
                    outcome,
                    response_status: Some(status_code),
                    response_body_snippet: snippet,
                    latency_ms,
                    error_message: if status.is_success() {
                        None
                    } else {
                        Some(format!("HTTP {status_code}"))
                    },
                }
            }
            Err(e) => {
                warn!(error = %e, latency_ms, "delivery transport error");

                AttemptRecord {
                    outcome: AttemptOutcome::RetryableFailure,
                    response_status: None,
                    response_body_snippet: Vec::new(),
                    latency_ms,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}

/// Classify a response status code into success/retryable/permanent.
fn classify_status(status: u16) -> AttemptOutcome {
    match status {
        200..=299 => AttemptOutcome::Success,
        408 | 425 | 429 => AttemptOutcome::RetryableFailure,
        500..=599 => AttemptOutcome::RetryableFailure,
        400..=499 => AttemptOutcome::PermanentFailure,
        _ => AttemptOutcome::PermanentFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::sign_request;
    use mockito::Server;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    #[test]
    fn classify_status_matches_spec_table() {
        assert_eq!(classify_status(200), AttemptOutcome::Success);
        assert_eq!(classify_status(299), AttemptOutcome::Success);
        assert_eq!(classify_status(408), AttemptOutcome::RetryableFailure);
        assert_eq!(classify_status(425), AttemptOutcome::RetryableFailure);
        assert_eq!(classify_status(429), AttemptOutcome::RetryableFailure);
        assert_eq!(classify_status(500), AttemptOutcome::RetryableFailure);
        assert_eq!(classify_status(503), AttemptOutcome::RetryableFailure);
        assert_eq!(classify_status(400), AttemptOutcome::PermanentFailure);
        assert_eq!(classify_status(401), AttemptOutcome::PermanentFailure);
        assert_eq!(classify_status(404), AttemptOutcome::PermanentFailure);
    }

    #[tokio::test]
    async fn attempt_classifies_200_as_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let attempter = Attempter::new(Duration::from_secs(5)).unwrap();
        let body = br#"{"ok":1}"#;
        let headers = sign_request(body, "0123456789abcdef", Uuid::new_v4(), 1);
        let record = attempter
            .attempt(&format!("{}/hook", server.url()), &headers, body, &CancellationToken::new())
            .await;

        mock.assert_async().await;
        assert_eq!(record.outcome, AttemptOutcome::Success);
        assert_eq!(record.response_status, Some(200));
    }

    #[tokio::test]
    async fn attempt_classifies_503_as_retryable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(503)
            .create_async()
            .await;

        let attempter = Attempter::new(Duration::from_secs(5)).unwrap();
        let body = b"{}";
        let headers = sign_request(body, "0123456789abcdef", Uuid::new_v4(), 1);
        let record = attempter
            .attempt(&format!("{}/hook", server.url()), &headers, body, &CancellationToken::new())
            .await;

        assert_eq!(record.outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(record.response_status, Some(503));
    }

    #[tokio::test]
    async fn attempt_classifies_404_as_permanent() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(404)
            .create_async()
            .await;

        let attempter = Attempter::new(Duration::from_secs(5)).unwrap();
        let body = b"{}";
        let headers = sign_request(body, "0123456789abcdef", Uuid::new_v4(), 1);
        let record = attempter
            .attempt(&format!("{}/hook", server.url()), &headers, body, &CancellationToken::new())
            .await;

        assert_eq!(record.outcome, AttemptOutcome::PermanentFailure);
        assert_eq!(record.response_status, Some(404));
    }

    #[tokio::test]
    async fn attempt_against_unreachable_host_is_retryable() {
        let attempter = Attempter::new(Duration::from_millis(200)).unwrap();
        let body = b"{}";
        let headers = sign_request(body, "0123456789abcdef", Uuid::new_v4(), 1);
        let record = attempter
            .attempt("http://127.0.0.1:1", &headers, body, &CancellationToken::new())
            .await;

        assert_eq!(record.outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(record.response_status, None);
        assert!(record.error_message.is_some());
    }

    #[tokio::test]
    async fn attempt_cancelled_mid_flight_is_retryable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(200)
            .create_async()
            .await;

        let attempter = Attempter::new(Duration::from_secs(5)).unwrap();
        let body = b"{}";
        let headers = sign_request(body, "0123456789abcdef", Uuid::new_v4(), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let record = attempter
            .attempt(&format!("{}/hook", server.url()), &headers, body, &cancel)
            .await;

        assert_eq!(record.outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(record.response_status, None);
        assert_eq!(record.error_message.as_deref(), Some("attempt cancelled"));
    }
}
