//! Signup and booking workflow tests, in both execution modes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tandem_persistence::backends::memory::MemoryDocumentStore;
use tandem_persistence::backends::objects::ObjectStoreAdapter;
use tandem_persistence::compensation::RollbackStatus;
use tandem_persistence::core::{DocumentStore, ObjectAdapter};
use tandem_persistence::error::ErrorKind;
use tandem_persistence::response::{ErrorCode, OperationResponse};
use tandem_persistence::workflows::{
    BookingRequest, BookingWorkflow, SignupRequest, SignupWorkflow,
};

use common::{
    FaultyDocuments, available, booking_request, coordinator, memory_coordinator, objects,
    seed_event, seed_user, signup_request,
};

// ============================================================================
// Signup
// ============================================================================

#[tokio::test]
async fn test_signup_creates_user_and_media() {
    for native in [true, false] {
        let (coordinator, objects, documents) = memory_coordinator(native);
        let signup = SignupWorkflow::new(coordinator);

        let outcome = signup
            .execute(&signup_request("u1", "ada@example.com"))
            .await
            .unwrap();

        let user = documents.read("users", "u1").await.unwrap().unwrap();
        assert_eq!(user.data()["email"], "ada@example.com");
        let avatar_key = outcome.avatar_key.unwrap();
        assert_eq!(user.data()["avatarKey"], avatar_key.as_str());
        assert!(objects.exists("avatars", &avatar_key).await.unwrap());
        assert!(
            objects
                .exists("qr-codes", &outcome.qr_code_key.unwrap())
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_repeated_signup_is_duplicate_email() {
    for native in [true, false] {
        let (coordinator, objects, documents) = memory_coordinator(native);
        let signup = SignupWorkflow::new(coordinator);
        let request = signup_request("u1", "ada@example.com");

        signup.execute(&request).await.unwrap();
        let failure = signup.execute(&request).await.unwrap_err();

        let response = OperationResponse::from(&failure);
        assert!(!response.success);
        assert_eq!(response.code, Some(ErrorCode::DuplicateEmail));
        assert_eq!(
            response.error.unwrap().conflicting_id.as_deref(),
            Some("u1")
        );
        let status = response.rollback_status.unwrap();
        assert_eq!(status.len(), 2);
        assert!(status.values().all(|s| *s == RollbackStatus::Success));

        assert_eq!(documents.count("users").await.unwrap(), 1);
        assert_eq!(objects.list("avatars", None).await.unwrap().len(), 1);
        assert_eq!(objects.list("qr-codes", None).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_taken_user_id_is_duplicate_user() {
    let (coordinator, _objects, _documents) = memory_coordinator(true);
    let signup = SignupWorkflow::new(coordinator);

    signup
        .execute(&signup_request("u1", "ada@example.com"))
        .await
        .unwrap();
    let failure = signup
        .execute(&signup_request("u1", "grace@example.com"))
        .await
        .unwrap_err();
    assert_eq!(failure.code, ErrorCode::DuplicateUser);
}

#[tokio::test]
async fn test_signup_validation_has_no_side_effects() {
    let (coordinator, objects, documents) = memory_coordinator(true);
    let signup = SignupWorkflow::new(coordinator);

    let request = SignupRequest {
        email: None,
        ..signup_request("u1", "ada@example.com")
    };
    let failure = signup.execute(&request).await.unwrap_err();
    assert_eq!(failure.code, ErrorCode::ValidationError);
    assert!(failure.failure.rollback.is_none());

    let response = OperationResponse::from(failure);
    assert_eq!(response.status_code(), 400);
    assert!(response.rollback_status.is_none());
    assert_eq!(documents.count("users").await.unwrap(), 0);
    assert!(objects.list("avatars", None).await.unwrap().is_empty());
}

// ============================================================================
// Booking
// ============================================================================

async fn seeded(native: bool) -> (BookingWorkflow, ObjectStoreAdapter, MemoryDocumentStore) {
    let (coordinator, objects, documents) = memory_coordinator(native);
    seed_user(&documents, "u1", "ada@example.com").await;
    seed_event(&documents, "e1", 5, 0).await;
    (BookingWorkflow::new(coordinator), objects, documents)
}

#[tokio::test]
async fn test_booking_reserves_and_records() {
    for native in [true, false] {
        let (booking, objects, documents) = seeded(native).await;

        let outcome = booking
            .execute(&booking_request("u1", "e1", 2, "pay-1"))
            .await
            .unwrap();

        assert_eq!(outcome.remaining, 3);
        assert_eq!(outcome.total_amount.to_string(), "50.00");
        assert_eq!(available(&documents, "e1", "general").await, 3);

        let order = documents
            .read("orders", &outcome.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.data()["quantity"], 2);
        assert_eq!(order.data()["transactionId"], outcome.payment_transaction_id.as_str());
        let payment = documents
            .read("transactions", &outcome.payment_transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.data()["paymentId"], "pay-1");
        assert!(
            objects
                .exists("tickets", &outcome.ticket_qr_key.unwrap())
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_repeated_payment_is_duplicate_payment() {
    for native in [true, false] {
        let (booking, objects, documents) = seeded(native).await;

        let first = booking
            .execute(&booking_request("u1", "e1", 1, "pay-1"))
            .await
            .unwrap();
        let failure = booking
            .execute(&booking_request("u1", "e1", 1, "pay-1"))
            .await
            .unwrap_err();

        assert_eq!(failure.code, ErrorCode::DuplicatePayment);
        let response = OperationResponse::from(&failure);
        assert_eq!(
            response.error.unwrap().conflicting_id,
            Some(first.payment_transaction_id)
        );
        assert_eq!(documents.count("orders").await.unwrap(), 1);
        assert_eq!(documents.count("transactions").await.unwrap(), 1);
        assert_eq!(available(&documents, "e1", "general").await, 4);
        assert_eq!(objects.list("tickets", None).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_inventory_failures() {
    for native in [true, false] {
        let (booking, objects, documents) = seeded(native).await;

        let failure = booking
            .execute(&booking_request("u1", "e1", 6, "pay-1"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, ErrorCode::InsufficientTickets);
        // The ticket QR upload was compensated
        let status = failure.failure.rollback.as_ref().unwrap().status_map();
        assert_eq!(status.len(), 1);
        assert!(objects.list("tickets", None).await.unwrap().is_empty());

        let request = BookingRequest {
            ticket_type: Some("vip".into()),
            ..booking_request("u1", "e1", 1, "pay-2")
        };
        let failure = booking.execute(&request).await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::InsufficientTickets);

        let request = BookingRequest {
            ticket_type: Some("balcony".into()),
            ..booking_request("u1", "e1", 1, "pay-3")
        };
        let failure = booking.execute(&request).await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::TicketTypeUnavailable);

        assert_eq!(documents.count("orders").await.unwrap(), 0);
        assert_eq!(available(&documents, "e1", "general").await, 5);
    }
}

#[tokio::test]
async fn test_extreme_price_fails_without_side_effects() {
    let (coordinator, objects, documents) = memory_coordinator(false);
    seed_user(&documents, "u1", "ada@example.com").await;
    documents
        .create(
            "events",
            "e2",
            serde_json::json!({
                "name": "Gala",
                "ticketCategories": [
                    { "name": "general", "price": "79228162514264337593543950335", "capacity": 10, "available": 10 }
                ]
            }),
        )
        .await
        .unwrap();
    let booking = BookingWorkflow::new(coordinator);

    let failure = booking
        .execute(&booking_request("u1", "e2", 2, "pay-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.code, ErrorCode::BookingError);
    assert!(failure.failure.rollback.as_ref().unwrap().is_complete());
    assert!(objects.list("tickets", None).await.unwrap().is_empty());
    assert_eq!(documents.count("orders").await.unwrap(), 0);
    assert_eq!(available(&documents, "e2", "general").await, 10);
}

#[tokio::test]
async fn test_missing_documents_and_bad_quantity() {
    let (booking, objects, _documents) = seeded(true).await;

    let failure = booking
        .execute(&booking_request("u9", "e1", 1, "pay-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.code, ErrorCode::NotFoundError);
    assert_eq!(OperationResponse::from(&failure).status_code(), 404);

    let failure = booking
        .execute(&booking_request("u1", "e9", 1, "pay-1"))
        .await
        .unwrap_err();
    assert_eq!(failure.code, ErrorCode::NotFoundError);

    for quantity in [0, 11] {
        let failure = booking
            .execute(&booking_request("u1", "e1", quantity, "pay-1"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, ErrorCode::InvalidQuantity);
        assert!(failure.failure.rollback.is_none());
    }

    assert!(objects.list("tickets", None).await.unwrap().is_empty());
}

/// Two bookings race for the last ticket; exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_for_last_ticket() {
    for native in [true, false] {
        let (coordinator, _objects, documents) = memory_coordinator(native);
        seed_user(&documents, "u1", "ada@example.com").await;
        seed_user(&documents, "u2", "grace@example.com").await;
        seed_event(&documents, "e1", 1, 0).await;
        let booking = BookingWorkflow::new(coordinator);

        let handles: Vec<_> = [("u1", "pay-1"), ("u2", "pay-2")]
            .into_iter()
            .map(|(user, payment)| {
                let booking = booking.clone();
                let request = booking_request(user, "e1", 1, payment);
                tokio::spawn(async move { booking.execute(&request).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(failure) => assert!(
                    matches!(
                        failure.code,
                        ErrorCode::ConflictError | ErrorCode::InsufficientTickets
                    ),
                    "unexpected code {}",
                    failure.code
                ),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(available(&documents, "e1", "general").await, 0);
        assert_eq!(documents.count("orders").await.unwrap(), 1);
        assert_eq!(documents.count("transactions").await.unwrap(), 1);
    }
}

// ============================================================================
// Time-to-live
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_booking_expires_and_compensates() {
    let documents = Arc::new(FaultyDocuments::new(MemoryDocumentStore::new()));
    let objects = objects();
    seed_user(documents.inner(), "u1", "ada@example.com").await;
    seed_event(documents.inner(), "e1", 5, 0).await;
    let booking = BookingWorkflow::new(coordinator(Arc::new(objects.clone()), documents.clone()));

    // Reads outlast the default three-minute time-to-live
    documents.slow_reads(Duration::from_secs(600));
    let failure = booking
        .execute(&booking_request("u1", "e1", 1, "pay-1"))
        .await
        .unwrap_err();

    assert_eq!(failure.code, ErrorCode::BookingError);
    assert_eq!(failure.failure.kind(), ErrorKind::Timeout);
    assert!(failure.failure.rollback.unwrap().is_complete());
    assert!(objects.list("tickets", None).await.unwrap().is_empty());
    assert_eq!(documents.inner().count("orders").await.unwrap(), 0);
}
