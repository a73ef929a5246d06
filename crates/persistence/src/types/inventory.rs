//! Ticket inventory records.
//!
//! Each event stores its ticket categories as a list of structured records
//! under the `ticketCategories` field. They are decoded here and nowhere else.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackendError, InventoryError, StorageError, StorageResult};

/// Field of an event document holding its categories.
pub const TICKET_CATEGORIES_FIELD: &str = "ticketCategories";

/// One ticket category of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCategory {
    /// Category name, matched against the requested ticket type.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Total tickets ever offered.
    pub capacity: u32,
    /// Tickets still for sale.
    pub available: u32,
}

/// The ticket categories of one event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketInventory {
    categories: Vec<TicketCategory>,
}

impl TicketInventory {
    /// Creates an inventory from categories.
    pub fn new(categories: Vec<TicketCategory>) -> Self {
        Self { categories }
    }

    /// Decodes the categories of an event payload.
    ///
    /// A missing field decodes to an empty inventory.
    pub fn from_event(event: &Value) -> StorageResult<Self> {
        match event.get(TICKET_CATEGORIES_FIELD) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(raw) => {
                let categories: Vec<TicketCategory> = serde_json::from_value(raw.clone())
                    .map_err(|e| {
                        StorageError::Backend(BackendError::SerializationError {
                            message: format!("invalid {}: {}", TICKET_CATEGORIES_FIELD, e),
                        })
                    })?;
                Ok(Self { categories })
            }
        }
    }

    /// Returns a copy of `event` with these categories written back.
    pub fn write_to(&self, event: &Value) -> StorageResult<Value> {
        let mut updated = event.clone();
        let encoded = serde_json::to_value(&self.categories)?;
        match updated.as_object_mut() {
            Some(obj) => {
                obj.insert(TICKET_CATEGORIES_FIELD.to_string(), encoded);
                Ok(updated)
            }
            None => Err(StorageError::Backend(BackendError::SerializationError {
                message: "event payload is not an object".to_string(),
            })),
        }
    }

    /// Returns the category with the given name.
    pub fn category(&self, name: &str) -> Option<&TicketCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Returns all categories.
    pub fn categories(&self) -> &[TicketCategory] {
        &self.categories
    }

    /// Takes `quantity` tickets from a category and returns its updated state.
    pub fn reserve(
        &mut self,
        event_id: &str,
        ticket_type: &str,
        quantity: u32,
    ) -> Result<&TicketCategory, InventoryError> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.name == ticket_type)
            .ok_or_else(|| InventoryError::TicketTypeUnavailable {
                event_id: event_id.to_string(),
                ticket_type: ticket_type.to_string(),
            })?;

        if category.available < quantity {
            return Err(InventoryError::InsufficientTickets {
                event_id: event_id.to_string(),
                ticket_type: ticket_type.to_string(),
                requested: quantity,
                available: category.available,
            });
        }

        category.available -= quantity;
        Ok(category)
    }
}
