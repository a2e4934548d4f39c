/*!
 * Dispatcher
 *
 * Polls the store for due deliveries, hands each to a bounded worker pool,
 * and applies the outcome back to the delivery state machine.
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::attempter::{AttemptOutcome, Attempter};
use crate::config::DeliveryConfig;
use crate::domain::{ClaimedDelivery, DeliveryStatus};
use crate::metrics;
use crate::scheduler::{self, SchedulerConfig};
use crate::signer::sign_request;
use crate::store::{CompletedAttempt, NewAttemptLog, Store};

pub struct Dispatcher {
    store: Store,
    attempter: Arc<Attempter>,
    scheduler_config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    batch_size: i64,
    drain_timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Store, attempter: Attempter, config: &DeliveryConfig) -> Self {
        Self {
            store,
            attempter: Arc::new(attempter),
            scheduler_config: config.scheduler_config(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            drain_timeout: config.drain_timeout,
        }
    }

    /// One-shot startup sweep reopening rows a crashed predecessor left
    /// `in_flight`. Call before `run`.
    pub async fn recover(&self) -> anyhow::Result<u64> {
        let reopened = self.store.reopen_stuck_in_flight(Utc::now()).await?;
        metrics::REOPENED_ON_STARTUP.set(reopened as i64);
        if reopened > 0 {
            warn!(reopened, "startup sweep reopened stuck in_flight deliveries");
        }
        Ok(reopened)
    }

    /// Run the poll loop until `shutdown` is cancelled, then drain
    /// in-flight workers for up to `drain_timeout` before returning.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tasks: JoinSet<()> = JoinSet::new();
        // Separate from `shutdown`: workers race their HTTP attempt and
        // CompleteAttempt transaction against this one, so in-flight work
        // gets the full drain_timeout grace period instead of being
        // cancelled the instant shutdown is requested.
        let force_cancel = CancellationToken::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("dispatcher received shutdown signal, stopping poll loop");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let claimed = match self
                .store
                .claim_due_deliveries(Utc::now(), self.batch_size, &shutdown)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "claim cycle failed, backing off");
                    tokio::time::sleep(self.poll_interval * 5).await;
                    continue;
                }
            };

            metrics::CLAIMED_BATCH_SIZE.set(claimed.len() as i64);
            if claimed.is_empty() {
                continue;
            }
            info!(count = claimed.len(), "claimed due deliveries");

            for item in claimed {
                let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let store = self.store.clone();
                let attempter = Arc::clone(&self.attempter);
                let scheduler_config = self.scheduler_config;
                let cancel = force_cancel.clone();

                tasks.spawn(async move {
                    metrics::WORKERS_IN_USE.inc();
                    process_one(&store, &attempter, &scheduler_config, item, &cancel).await;
                    metrics::WORKERS_IN_USE.dec();
                    drop(permit);
                });
            }

            // Reap finished workers without blocking the poll loop.
            while tasks.try_join_next().is_some() {}
        }

        let outstanding = tasks.len();
        if outstanding > 0 {
            info!(outstanding, "draining in-flight attempts before exit");
        }

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "drain timeout exceeded; force-cancelling remaining attempts"
            );
            // Unblocks any worker parked in its attempt/complete_attempt
            // select, then hard-aborts whatever is left (e.g. blocked on a
            // pool acquire outside that select). Their deliveries stay
            // in_flight for the next startup sweep.
            force_cancel.cancel();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

/// Execute one claimed delivery end to end and persist the outcome.
async fn process_one(
    store: &Store,
    attempter: &Attempter,
    scheduler_config: &SchedulerConfig,
    item: ClaimedDelivery,
    cancel: &CancellationToken,
) {
    let ClaimedDelivery {
        delivery,
        subscription,
        event_id,
        event_payload,
    } = item;

    let headers = sign_request(
        &event_payload,
        &subscription.secret,
        event_id,
        delivery.attempt_number,
    );
    let request_headers_json = json!(headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<std::collections::BTreeMap<_, _>>());

    let record = attempter
        .attempt(&subscription.url, &headers, &event_payload, cancel)
        .await;

    debug!(
        delivery_id = %delivery.id,
        attempt_number = delivery.attempt_number,
        outcome = ?record.outcome,
        "attempt completed"
    );

    metrics::DELIVERY_ATTEMPTS_TOTAL
        .with_label_values(&[outcome_label(&record.outcome)])
        .inc();
    metrics::DELIVERY_DURATION
        .with_label_values(&[outcome_label(&record.outcome)])
        .observe(record.latency_ms as f64 / 1000.0);
    if let Some(status) = record.response_status {
        metrics::HTTP_RESPONSES_TOTAL
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    let now = Utc::now();
    let success = record.outcome == AttemptOutcome::Success;

    let (new_status, new_attempt_number, next_retry_at, dead_letter_reason) = match record.outcome
    {
        AttemptOutcome::Success => (DeliveryStatus::Succeeded, delivery.attempt_number, None, None),
        AttemptOutcome::PermanentFailure => {
            let reason = format!(
                "permanent: {}",
                record
                    .response_status
                    .map(|s| s.to_string())
                    .or_else(|| record.error_message.clone())
                    .unwrap_or_else(|| "unknown".to_string())
            );
            (DeliveryStatus::Dead, delivery.attempt_number, None, Some(reason))
        }
        AttemptOutcome::RetryableFailure if delivery.attempt_number < scheduler_config.max_attempts => {
            let next_attempt = delivery.attempt_number + 1;
            let retry_at = scheduler::next_retry_at(delivery.attempt_number, scheduler_config, now);
            (DeliveryStatus::Failed, next_attempt, Some(retry_at), None)
        }
        AttemptOutcome::RetryableFailure => {
            let reason = format!(
                "exhausted after {} attempts: {}",
                delivery.attempt_number,
                record.error_message.clone().unwrap_or_else(|| "unknown".to_string())
            );
            (DeliveryStatus::Dead, delivery.attempt_number, None, Some(reason))
        }
    };

    if let Some(reason) = &dead_letter_reason {
        metrics::DEAD_LETTERS_TOTAL
            .with_label_values(&[if reason.starts_with("permanent") {
                "permanent"
            } else {
                "exhausted"
            }])
            .inc();
    }
    if matches!(new_status, DeliveryStatus::Failed) {
        metrics::RETRY_SCHEDULED_TOTAL
            .with_label_values(&[outcome_label(&record.outcome)])
            .inc();
    }

    let completed = CompletedAttempt {
        new_status,
        new_attempt_number,
        next_retry_at,
        last_response_status: record.response_status.map(|s| s as i32),
        last_response_body: Some(record.response_body_snippet.clone()),
        last_response_latency_ms: Some(record.latency_ms as i32),
        last_request_headers: request_headers_json.clone(),
        last_request_body: event_payload.clone(),
        attempt_log: NewAttemptLog {
            attempt_number: delivery.attempt_number,
            request_headers: request_headers_json,
            request_body: event_payload,
            response_status: record.response_status.map(|s| s as i32),
            response_body: Some(record.response_body_snippet),
            latency_ms: record.latency_ms as i32,
            success,
        },
        dead_letter_reason,
    };

    if let Err(e) = store.complete_attempt(delivery.id, completed, cancel).await {
        error!(delivery_id = %delivery.id, error = %e, "failed to persist attempt outcome");
    }
}

fn outcome_label(outcome: &AttemptOutcome) -> &'static str {
    match outcome {
        AttemptOutcome::Success => "success",
        AttemptOutcome::RetryableFailure => "retryable",
        AttemptOutcome::PermanentFailure => "permanent",
    }
}
