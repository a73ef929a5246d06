//! Fixtures for coordinator and workflow tests.

use std::sync::Arc;

use serde_json::json;

use tandem_persistence::backends::memory::MemoryDocumentStore;
use tandem_persistence::backends::objects::ObjectStoreAdapter;
use tandem_persistence::config::CoordinatorConfig;
use tandem_persistence::coordinator::TransactionCoordinator;
use tandem_persistence::core::{DocumentStore, ObjectAdapter};
use tandem_persistence::types::Document;
use tandem_persistence::workflows::{BookingRequest, SignupRequest};

/// The default bucket names.
pub const BUCKETS: [&str; 3] = ["avatars", "qr-codes", "tickets"];

/// A PNG signature, base64 encoded.
pub const PNG_BASE64: &str = "iVBORw0KGgo=";

pub fn objects() -> ObjectStoreAdapter {
    ObjectStoreAdapter::in_memory(&BUCKETS)
}

pub fn coordinator(
    objects: Arc<dyn ObjectAdapter>,
    documents: Arc<dyn DocumentStore>,
) -> TransactionCoordinator {
    TransactionCoordinator::new(CoordinatorConfig::default(), objects, documents)
        .expect("valid coordinator")
}

/// A coordinator over in-memory adapters, native or fallback.
pub fn memory_coordinator(
    native: bool,
) -> (TransactionCoordinator, ObjectStoreAdapter, MemoryDocumentStore) {
    let objects = objects();
    let documents = if native {
        MemoryDocumentStore::new()
    } else {
        MemoryDocumentStore::without_transactions()
    };
    let coordinator = coordinator(Arc::new(objects.clone()), Arc::new(documents.clone()));
    (coordinator, objects, documents)
}

pub async fn seed_user(store: &dyn DocumentStore, id: &str, email: &str) -> Document {
    store
        .create(
            "users",
            id,
            json!({ "userId": id, "email": email, "displayName": id }),
        )
        .await
        .expect("seed user")
}

/// Seeds an event with a `general` category at 25.00 and a `vip` category at
/// 120.50.
pub async fn seed_event(
    store: &dyn DocumentStore,
    id: &str,
    general_available: u32,
    vip_available: u32,
) -> Document {
    store
        .create(
            "events",
            id,
            json!({
                "name": format!("Event {}", id),
                "ticketCategories": [
                    { "name": "general", "price": "25.00", "capacity": 100, "available": general_available },
                    { "name": "vip", "price": "120.50", "capacity": 10, "available": vip_available }
                ]
            }),
        )
        .await
        .expect("seed event")
}

pub fn signup_request(user_id: &str, email: &str) -> SignupRequest {
    SignupRequest {
        user_id: Some(user_id.to_string()),
        email: Some(email.to_string()),
        display_name: Some(format!("User {}", user_id)),
        avatar: Some(PNG_BASE64.to_string()),
        qr_code: Some(PNG_BASE64.to_string()),
    }
}

pub fn booking_request(user_id: &str, event_id: &str, quantity: i64, payment_id: &str) -> BookingRequest {
    BookingRequest {
        user_id: Some(user_id.to_string()),
        event_id: Some(event_id.to_string()),
        ticket_type: Some("general".to_string()),
        quantity: Some(quantity),
        payment_id: Some(payment_id.to_string()),
        ticket_qr: Some(PNG_BASE64.to_string()),
    }
}

/// Reads the `available` count of an event's category.
pub async fn available(store: &dyn DocumentStore, event_id: &str, category: &str) -> u64 {
    let event = store
        .read("events", event_id)
        .await
        .expect("read event")
        .expect("event exists");
    event.data()["ticketCategories"]
        .as_array()
        .and_then(|cats| cats.iter().find(|c| c["name"] == category))
        .and_then(|c| c["available"].as_u64())
        .expect("category present")
}
