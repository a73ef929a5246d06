//! Ticket booking.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coordinator::{TransactionContext, TransactionCoordinator};
use crate::error::{
    BackendError, DuplicateError, ResourceError, StorageError, StorageResult, TransactionResult,
    ValidationError,
};
use crate::response::ErrorCode;
use crate::types::{
    Document, DocumentWrite, ExecutionMode, TicketInventory, TransactionId, UniquenessConstraint,
};

use super::{
    CodeMap, EVENTS, ORDERS, TRANSACTIONS, USERS, WorkflowFailure, decode_upload, required,
};

const CODES: CodeMap = CodeMap {
    generic: ErrorCode::BookingError,
    duplicate: duplicate_code,
};

fn duplicate_code(dup: &DuplicateError) -> ErrorCode {
    if dup.scope == TRANSACTIONS {
        ErrorCode::DuplicatePayment
    } else {
        ErrorCode::ConflictError
    }
}

/// Inbound booking request.
///
/// `ticketQr` is an optional base64 payload stored with the order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub user_id: Option<String>,
    pub event_id: Option<String>,
    pub ticket_type: Option<String>,
    pub quantity: Option<i64>,
    pub payment_id: Option<String>,
    pub ticket_qr: Option<String>,
}

/// Result of a committed booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingOutcome {
    pub order_id: String,
    /// Id of the payment transaction document.
    pub payment_transaction_id: String,
    pub user_id: String,
    pub event_id: String,
    pub ticket_type: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    /// Tickets of this type left after the booking.
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_qr_key: Option<String>,
    pub transaction_id: TransactionId,
    pub mode: ExecutionMode,
}

#[derive(Debug)]
struct ValidBooking {
    user_id: String,
    event_id: String,
    ticket_type: String,
    quantity: u32,
    payment_id: String,
    ticket_qr: Option<Vec<u8>>,
}

impl BookingRequest {
    fn validate(&self, max_quantity: u32) -> StorageResult<ValidBooking> {
        let user_id = required("userId", self.user_id.as_deref())?;
        let event_id = required("eventId", self.event_id.as_deref())?;
        let ticket_type = required("ticketType", self.ticket_type.as_deref())?;
        let payment_id = required("paymentId", self.payment_id.as_deref())?;

        let requested = self.quantity.ok_or_else(|| ValidationError::MissingRequiredField {
            field: "quantity".to_string(),
        })?;
        let quantity = match u32::try_from(requested) {
            Ok(q) if (1..=max_quantity).contains(&q) => q,
            _ => {
                return Err(ValidationError::InvalidQuantity {
                    requested,
                    max: max_quantity,
                }
                .into());
            }
        };

        Ok(ValidBooking {
            user_id,
            event_id,
            ticket_type,
            quantity,
            payment_id,
            ticket_qr: decode_upload("ticketQr", self.ticket_qr.as_deref())?,
        })
    }
}

/// Books tickets for an event.
///
/// The event is read inside the context and its inventory update is guarded
/// by the version that was read, so of two bookings racing for the last
/// tickets only one commits. The payment id is unique across payment
/// transactions; a repeated payment fails with `DUPLICATE_PAYMENT` naming the
/// existing transaction.
#[derive(Debug, Clone)]
pub struct BookingWorkflow {
    coordinator: TransactionCoordinator,
}

impl BookingWorkflow {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn execute(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingOutcome, WorkflowFailure> {
        let booking = request
            .validate(self.coordinator.config().max_tickets_per_booking)
            .map_err(|e| CODES.reject(e))?;
        let mut ctx = self
            .coordinator
            .begin(None)
            .await
            .map_err(|e| CODES.reject(e))?;

        let remaining = ctx.remaining();
        let result = match tokio::time::timeout(remaining, self.run(&mut ctx, &booking)).await {
            Ok(result) => result,
            Err(_) => Err(self.coordinator.expire(&mut ctx).await),
        };
        result.map_err(|f| CODES.fail(f))
    }

    async fn run(
        &self,
        ctx: &mut TransactionContext,
        booking: &ValidBooking,
    ) -> TransactionResult<BookingOutcome> {
        let order_id = Uuid::new_v4().to_string();
        let payment_transaction_id = Uuid::new_v4().to_string();

        let mut ticket_qr_key = None;
        if let Some(bytes) = &booking.ticket_qr {
            let key = format!("orders/{}/ticket-qr", order_id);
            let bucket = &self.coordinator.config().buckets.tickets;
            self.coordinator
                .upload(ctx, bucket, &key, bytes.clone())
                .await?;
            ticket_qr_key = Some(key);
        }

        self.require(ctx, USERS, &booking.user_id).await?;
        let event = self.require(ctx, EVENTS, &booking.event_id).await?;

        let mut inventory = match TicketInventory::from_event(event.data()) {
            Ok(inventory) => inventory,
            Err(e) => return Err(self.coordinator.abort(ctx, e).await),
        };
        let (unit_price, remaining) =
            match inventory.reserve(&booking.event_id, &booking.ticket_type, booking.quantity) {
                Ok(category) => (category.price, category.available),
                Err(e) => return Err(self.coordinator.abort(ctx, e.into()).await),
            };
        let updated_event = match inventory.write_to(event.data()) {
            Ok(data) => data,
            Err(e) => return Err(self.coordinator.abort(ctx, e).await),
        };
        let total_amount = match checked_total(unit_price, booking.quantity) {
            Ok(total) => total,
            Err(e) => return Err(self.coordinator.abort(ctx, e).await),
        };
        let now = Utc::now().to_rfc3339();

        let payment = json!({
            "transactionId": payment_transaction_id,
            "paymentId": booking.payment_id,
            "userId": booking.user_id,
            "orderId": order_id,
            "amount": total_amount,
            "status": "completed",
            "createdAt": now,
        });
        self.coordinator
            .stage(
                ctx,
                DocumentWrite::create(TRANSACTIONS, &payment_transaction_id, payment)
                    .with_constraint(UniquenessConstraint::field(
                        TRANSACTIONS,
                        "paymentId",
                        &booking.payment_id,
                    )),
            )
            .await?;

        let order = json!({
            "orderId": order_id,
            "userId": booking.user_id,
            "eventId": booking.event_id,
            "ticketType": booking.ticket_type,
            "quantity": booking.quantity,
            "unitPrice": unit_price,
            "totalAmount": total_amount,
            "paymentId": booking.payment_id,
            "transactionId": payment_transaction_id,
            "ticketQrKey": ticket_qr_key,
            "status": "confirmed",
            "createdAt": now,
        });
        self.coordinator
            .stage(ctx, DocumentWrite::create(ORDERS, &order_id, order))
            .await?;

        self.coordinator
            .stage(
                ctx,
                DocumentWrite::update(EVENTS, &booking.event_id, updated_event)
                    .expecting_version(event.version()),
            )
            .await?;
        debug!(
            transaction_id = %ctx.id(),
            order_id = %order_id,
            event_id = %booking.event_id,
            "Booking staged"
        );

        let receipt = self.coordinator.commit(ctx).await?;
        info!(
            transaction_id = %receipt.transaction_id,
            order_id = %order_id,
            event_id = %booking.event_id,
            quantity = booking.quantity,
            "Booking committed"
        );

        Ok(BookingOutcome {
            order_id,
            payment_transaction_id,
            user_id: booking.user_id.clone(),
            event_id: booking.event_id.clone(),
            ticket_type: booking.ticket_type.clone(),
            quantity: booking.quantity,
            unit_price,
            total_amount,
            remaining,
            ticket_qr_key,
            transaction_id: receipt.transaction_id,
            mode: receipt.mode,
        })
    }

    /// Reads a document that must exist, aborting the context otherwise.
    async fn require(
        &self,
        ctx: &mut TransactionContext,
        collection: &str,
        id: &str,
    ) -> TransactionResult<Document> {
        match self.coordinator.read(ctx, collection, id).await? {
            Some(doc) => Ok(doc),
            None => {
                let missing = ResourceError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                };
                Err(self.coordinator.abort(ctx, missing.into()).await)
            }
        }
    }
}

/// Price times quantity, failing instead of overflowing on an extreme price.
fn checked_total(unit_price: Decimal, quantity: u32) -> StorageResult<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| {
            StorageError::Backend(BackendError::SerializationError {
                message: format!(
                    "total amount overflows for {} tickets at {}",
                    quantity, unit_price
                ),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i64) -> BookingRequest {
        BookingRequest {
            user_id: Some("u1".into()),
            event_id: Some("e1".into()),
            ticket_type: Some("general".into()),
            quantity: Some(quantity),
            payment_id: Some("pay-1".into()),
            ticket_qr: None,
        }
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(request(1).validate(10).unwrap().quantity, 1);
        assert_eq!(request(10).validate(10).unwrap().quantity, 10);

        for bad in [0, -3, 11, i64::MAX] {
            let err = request(bad).validate(10).unwrap_err();
            assert!(
                matches!(
                    err,
                    StorageError::Validation(ValidationError::InvalidQuantity { requested, max: 10 })
                        if requested == bad
                ),
                "quantity {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_quantity_is_a_validation_error() {
        let req = BookingRequest {
            quantity: None,
            ..request(1)
        };
        assert!(matches!(
            req.validate(10),
            Err(StorageError::Validation(ValidationError::MissingRequiredField { .. }))
        ));
    }

    #[test]
    fn test_total_amount_overflow_is_an_error() {
        let price: Decimal = "25.00".parse().unwrap();
        assert_eq!(checked_total(price, 2).unwrap().to_string(), "50.00");
        assert!(matches!(
            checked_total(Decimal::MAX, 2),
            Err(StorageError::Backend(BackendError::SerializationError { .. }))
        ));
    }

    #[test]
    fn test_duplicate_payment_code() {
        let dup = DuplicateError {
            scope: TRANSACTIONS.into(),
            field: "paymentId".into(),
            value: "pay-1".into(),
            existing_id: "t0".into(),
        };
        assert_eq!(duplicate_code(&dup), ErrorCode::DuplicatePayment);
    }
}
