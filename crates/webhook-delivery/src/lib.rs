/*!
 * Webhook Delivery Service
 *
 * Claims due deliveries from Postgres and sends signed HTTP POSTs to
 * customer endpoints, retrying failures with capped exponential backoff
 * until they succeed or exhaust into a dead letter.
 *
 * ## Architecture
 *
 * ```text
 * Postgres                  Webhook Delivery              Customer Endpoint
 * ──────────               ─────────────────              ─────────────────
 * deliveries                     │
 *   (FOR UPDATE SKIP LOCKED) ───>│
 *                                ├─── POST /hook ───────────────────>│
 *                                │    X-Webhook-Signature: v1=hmac   │
 *                                │    X-Webhook-Event: <uuid>        │
 *                                │    X-Webhook-Attempt: <n>         │
 *                                │    X-Webhook-Timestamp: <unix>    │
 *                                │                                   │
 *                                │<─── 2xx / 4xx / 5xx ──────────────┤
 * ```
 *
 * ## Retry strategy
 *
 * Capped exponential backoff with jitter:
 * - `base_delay_ms = min(BASE_MS * 2^(n-1), MAX_DELAY_MS)`
 * - `delay_ms = base_delay_ms + uniform(0, base_delay_ms / 2)`
 *
 * A delivery is dead-lettered once it exceeds `MAX_ATTEMPTS`, or
 * immediately on a permanent (4xx, non-retryable) failure.
 *
 * ## Non-goals
 *
 * This crate does not own: the admin CRUD/auth surface, database
 * migrations, process supervision, exactly-once delivery, global
 * ordering across subscriptions, synchronous delivery confirmation, or
 * subscriber-side deduplication.
 */

pub mod attempter;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod health;
pub mod ingress;
pub mod metrics;
pub mod scheduler;
pub mod signer;
pub mod store;
