/*!
 * Ingress bridge
 *
 * The seam the (out-of-scope) admin HTTP surface calls to enqueue a new
 * event. Owns no transport code of its own — just validation plus the
 * atomic event+delivery write.
 */

use uuid::Uuid;
use webhook_delivery_common::{Error, Result};

use crate::domain::{Delivery, Event};
use crate::store::Store;

/// Validate the subscription and create the Event + its initial `pending`
/// Delivery in one transaction.
///
/// Returns `NotFound` if the subscription does not exist, `Gone` if it
/// exists but has been deactivated.
pub async fn create_event_with_initial_delivery(
    store: &Store,
    subscription_id: Uuid,
    event_type: String,
    payload: Vec<u8>,
) -> Result<Delivery> {
    let subscription = store.get_subscription(subscription_id).await?;

    if !subscription.active {
        return Err(Error::Gone(format!(
            "subscription {subscription_id} is deactivated"
        )));
    }

    let event = Event {
        id: Uuid::new_v4(),
        subscription_id,
        event_type,
        payload,
        created_at: chrono::Utc::now(),
    };

    store
        .create_event_with_initial_delivery(&event, Uuid::new_v4())
        .await
}

#[cfg(test)]
mod tests {
    // Exercising this bridge end-to-end needs a real Store backed by
    // Postgres (subscription lookup + transactional insert) — covered by
    // the `#[ignore]`-gated integration tests alongside the dispatcher.
}
