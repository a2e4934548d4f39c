/*!
 * Store
 *
 * All persistence for the delivery core lives behind this module: plain
 * CRUD for subscriptions, the atomic claim primitive deliveries/dispatchers
 * coordinate through, and the single transaction that applies an attempt's
 * outcome.
 */

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, Row};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    AttemptLog, ClaimedDelivery, DeadLetter, Delivery, DeliveryStatus, Event, Subscription,
};
use webhook_delivery_common::{Error, Result};

/// New delivery-state + attempt-log + optional dead-letter to persist
/// atomically in `Store::complete_attempt`.
pub struct CompletedAttempt {
    pub new_status: DeliveryStatus,
    pub new_attempt_number: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_response_status: Option<i32>,
    pub last_response_body: Option<Vec<u8>>,
    pub last_response_latency_ms: Option<i32>,
    pub last_request_headers: serde_json::Value,
    pub last_request_body: Vec<u8>,
    pub attempt_log: NewAttemptLog,
    pub dead_letter_reason: Option<String>,
}

pub struct NewAttemptLog {
    pub attempt_number: i32,
    pub request_headers: serde_json::Value,
    pub request_body: Vec<u8>,
    pub response_status: Option<i32>,
    pub response_body: Option<Vec<u8>>,
    pub latency_ms: i32,
    pub success: bool,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Subscriptions -----------------------------------------------

    pub async fn create_subscription(&self, sub: &Subscription) -> Result<()> {
        sub.validate().map_err(Error::Validation)?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, customer_id, url, secret, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(sub.id)
        .bind(&sub.customer_id)
        .bind(&sub.url)
        .bind(&sub.secret)
        .bind(sub.active)
        .bind(sub.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Subscription> {
        sqlx::query_as::<_, Subscription>(
            "SELECT id, customer_id, url, secret, active, created_at FROM subscriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("subscription {id}")))
    }

    pub async fn update_subscription(&self, sub: &Subscription) -> Result<()> {
        sub.validate().map_err(Error::Validation)?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET customer_id = $2, url = $3, secret = $4, active = $5
            WHERE id = $1
            "#,
        )
        .bind(sub.id)
        .bind(&sub.customer_id)
        .bind(&sub.url)
        .bind(&sub.secret)
        .bind(sub.active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("subscription {}", sub.id)));
        }
        Ok(())
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("subscription {id}")));
        }
        Ok(())
    }

    pub async fn list_subscriptions(&self, customer_id: Option<&str>) -> Result<Vec<Subscription>> {
        let rows = match customer_id {
            Some(cid) => {
                sqlx::query_as::<_, Subscription>(
                    "SELECT id, customer_id, url, secret, active, created_at FROM subscriptions \
                     WHERE customer_id = $1 ORDER BY created_at ASC",
                )
                .bind(cid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Subscription>(
                    "SELECT id, customer_id, url, secret, active, created_at FROM subscriptions \
                     ORDER BY created_at ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    // ---- Ingress -------------------------------------------------------

    /// Create the Event and its initial `pending` Delivery in one
    /// transaction.
    pub async fn create_event_with_initial_delivery(
        &self,
        event: &Event,
        delivery_id: Uuid,
    ) -> Result<Delivery> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO events (id, subscription_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.subscription_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        let created_at: DateTime<Utc> = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO deliveries (id, event_id, attempt_number, status, created_at, next_retry_at)
            VALUES ($1, $2, 1, 'pending', $3, NULL)
            "#,
        )
        .bind(delivery_id)
        .bind(event.id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Delivery {
            id: delivery_id,
            event_id: event.id,
            attempt_number: 1,
            status: DeliveryStatus::Pending,
            last_request_headers: None,
            last_request_body: None,
            last_response_status: None,
            last_response_body: None,
            last_response_latency_ms: None,
            created_at,
            next_retry_at: None,
        })
    }

    // ---- Claim / complete ----------------------------------------------

    /// Atomically claim up to `limit` due deliveries and flip them to
    /// `in_flight`. Safe under concurrent dispatchers via
    /// `FOR UPDATE SKIP LOCKED`.
    ///
    /// Races the claim transaction against `cancel`: if cancellation fires
    /// first, the in-progress transaction is dropped (rolled back) and an
    /// `Unavailable` error is returned so the caller's poll loop backs off.
    pub async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClaimedDelivery>> {
        tokio::select! {
            result = self.claim_due_deliveries_inner(now, limit) => result,
            _ = cancel.cancelled() => {
                warn!("claim cancelled before completion; transaction aborted");
                Err(Error::Unavailable("claim cancelled".to_string()))
            }
        }
    }

    async fn claim_due_deliveries_inner(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ClaimedDelivery>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Unavailable(format!("could not start claim transaction: {e}"))
        })?;

        let claimed_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            WITH due AS (
                SELECT d.id
                FROM deliveries d
                JOIN events e ON e.id = d.event_id
                JOIN subscriptions s ON s.id = e.subscription_id
                WHERE d.status IN ('pending', 'failed')
                  AND (d.next_retry_at IS NULL OR d.next_retry_at <= $1)
                  AND s.active = TRUE
                ORDER BY d.next_retry_at ASC NULLS FIRST
                LIMIT $2
                FOR UPDATE OF d SKIP LOCKED
            )
            UPDATE deliveries
            SET status = 'in_flight'
            WHERE id IN (SELECT id FROM due)
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::Unavailable(format!("claim query failed: {e}")))?;

        if claimed_ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT
                d.id AS delivery_id, d.event_id, d.attempt_number, d.status,
                d.last_request_headers, d.last_request_body,
                d.last_response_status, d.last_response_body, d.last_response_latency_ms,
                d.created_at, d.next_retry_at,
                s.id AS subscription_id, s.customer_id, s.url, s.secret, s.active,
                s.created_at AS subscription_created_at,
                e.payload AS event_payload
            FROM deliveries d
            JOIN events e ON e.id = d.event_id
            JOIN subscriptions s ON s.id = e.subscription_id
            WHERE d.id = ANY($1)
            "#,
        )
        .bind(&claimed_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::Unavailable(format!("claim fetch failed: {e}")))?;

        tx.commit().await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            let delivery = Delivery {
                id: row.try_get("delivery_id")?,
                event_id: row.try_get("event_id")?,
                attempt_number: row.try_get("attempt_number")?,
                status: status
                    .parse()
                    .map_err(|e: String| Error::Conflict(e))?,
                last_request_headers: row.try_get("last_request_headers")?,
                last_request_body: row.try_get("last_request_body")?,
                last_response_status: row.try_get("last_response_status")?,
                last_response_body: row.try_get("last_response_body")?,
                last_response_latency_ms: row.try_get("last_response_latency_ms")?,
                created_at: row.try_get("created_at")?,
                next_retry_at: row.try_get("next_retry_at")?,
            };
            let subscription = Subscription {
                id: row.try_get("subscription_id")?,
                customer_id: row.try_get("customer_id")?,
                url: row.try_get("url")?,
                secret: row.try_get("secret")?,
                active: row.try_get("active")?,
                created_at: row.try_get("subscription_created_at")?,
            };
            let event_payload: Vec<u8> = row.try_get("event_payload")?;
            let event_id: Uuid = delivery.event_id;

            out.push(ClaimedDelivery {
                delivery,
                subscription,
                event_id,
                event_payload,
            });
        }

        info!(claimed = out.len(), "claimed due deliveries");
        Ok(out)
    }

    /// Apply the outcome of one executed attempt: update the Delivery,
    /// insert the AttemptLog, and optionally insert a DeadLetter — all in
    /// one transaction.
    ///
    /// Races the transaction against `cancel`: if cancellation fires first,
    /// the transaction is dropped (rolled back) and the delivery stays
    /// `in_flight` for the next startup sweep to reclaim.
    pub async fn complete_attempt(
        &self,
        delivery_id: Uuid,
        completed: CompletedAttempt,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            result = self.complete_attempt_inner(delivery_id, completed) => result,
            _ = cancel.cancelled() => {
                warn!(delivery_id = %delivery_id, "complete_attempt cancelled before commit; transaction aborted");
                Err(Error::Unavailable(format!(
                    "complete_attempt cancelled for delivery {delivery_id}"
                )))
            }
        }
    }

    async fn complete_attempt_inner(
        &self,
        delivery_id: Uuid,
        completed: CompletedAttempt,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET attempt_number = $2,
                status = $3,
                next_retry_at = $4,
                last_request_headers = $5,
                last_request_body = $6,
                last_response_status = $7,
                last_response_body = $8,
                last_response_latency_ms = $9
            WHERE id = $1
            "#,
        )
        .bind(delivery_id)
        .bind(completed.new_attempt_number)
        .bind(completed.new_status.as_str())
        .bind(completed.next_retry_at)
        .bind(&completed.last_request_headers)
        .bind(&completed.last_request_body)
        .bind(completed.last_response_status)
        .bind(&completed.last_response_body)
        .bind(completed.last_response_latency_ms)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("delivery {delivery_id}")));
        }

        let log = &completed.attempt_log;
        let log_result = sqlx::query(
            r#"
            INSERT INTO attempt_logs
                (id, delivery_id, attempt_number, request_headers, request_body,
                 response_status, response_body, latency_ms, success, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery_id)
        .bind(log.attempt_number)
        .bind(&log.request_headers)
        .bind(&log.request_body)
        .bind(log.response_status)
        .bind(&log.response_body)
        .bind(log.latency_ms)
        .bind(log.success)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        if let Err(e) = log_result {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    error!(delivery_id = %delivery_id, "duplicate attempt log insert — invariant violation");
                    return Err(Error::Conflict(format!(
                        "attempt log already exists for delivery {delivery_id} attempt {}",
                        log.attempt_number
                    )));
                }
            }
            return Err(e.into());
        }

        if let Some(reason) = &completed.dead_letter_reason {
            sqlx::query(
                r#"
                INSERT INTO dead_letters (id, delivery_id, reason, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(delivery_id)
            .bind(reason)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ---- Reads -----------------------------------------------------------

    pub async fn get_delivery(&self, id: Uuid) -> Result<Delivery> {
        let row = sqlx::query(
            r#"
            SELECT id, event_id, attempt_number, status,
                   last_request_headers, last_request_body,
                   last_response_status, last_response_body, last_response_latency_ms,
                   created_at, next_retry_at
            FROM deliveries WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("delivery {id}")))?;

        let status: String = row.try_get("status")?;
        Ok(Delivery {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            attempt_number: row.try_get("attempt_number")?,
            status: status.parse().map_err(Error::Conflict)?,
            last_request_headers: row.try_get("last_request_headers")?,
            last_request_body: row.try_get("last_request_body")?,
            last_response_status: row.try_get("last_response_status")?,
            last_response_body: row.try_get("last_response_body")?,
            last_response_latency_ms: row.try_get("last_response_latency_ms")?,
            created_at: row.try_get("created_at")?,
            next_retry_at: row.try_get("next_retry_at")?,
        })
    }

    pub async fn get_delivery_by_event(&self, event_id: Uuid) -> Result<Delivery> {
        let row = sqlx::query(
            r#"
            SELECT id, event_id, attempt_number, status,
                   last_request_headers, last_request_body,
                   last_response_status, last_response_body, last_response_latency_ms,
                   created_at, next_retry_at
            FROM deliveries WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("delivery for event {event_id}")))?;

        let status: String = row.try_get("status")?;
        Ok(Delivery {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            attempt_number: row.try_get("attempt_number")?,
            status: status.parse().map_err(Error::Conflict)?,
            last_request_headers: row.try_get("last_request_headers")?,
            last_request_body: row.try_get("last_request_body")?,
            last_response_status: row.try_get("last_response_status")?,
            last_response_body: row.try_get("last_response_body")?,
            last_response_latency_ms: row.try_get("last_response_latency_ms")?,
            created_at: row.try_get("created_at")?,
            next_retry_at: row.try_get("next_retry_at")?,
        })
    }

    pub async fn get_attempt_logs(&self, delivery_id: Uuid) -> Result<Vec<AttemptLog>> {
        let logs = sqlx::query_as::<_, AttemptLog>(
            r#"
            SELECT id, delivery_id, attempt_number, request_headers, request_body,
                   response_status, response_body, latency_ms, success, created_at
            FROM attempt_logs
            WHERE delivery_id = $1
            ORDER BY attempt_number ASC
            "#,
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    pub async fn list_dead_letters(&self, limit: i64, offset: i64) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetter>(
            r#"
            SELECT id, delivery_id, reason, created_at
            FROM dead_letters
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_dead_letters(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ---- Recovery ----------------------------------------------------

    /// Startup sweep: revert any `in_flight` row left behind
    /// by a crashed dispatcher to `failed`, ready for immediate reclaim.
    pub async fn reopen_stuck_in_flight(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', next_retry_at = $1
            WHERE status = 'in_flight'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let reopened = result.rows_affected();
        if reopened > 0 {
            info!(reopened, "reopened stuck in_flight deliveries at startup");
        }
        Ok(reopened)
    }
}
