//! Order event model
//!
//! The [`Order`] carries all information necessary for processing in a single
//! message (event-carried state transfer): customer data, line items, an
//! inventory snapshot, monetary totals and event metadata. Consumers never
//! have to query another service to act on it.

use serde::{Deserialize, Serialize};

use super::error::{ValidationError, ValidationErrorKind, ValidationResult};
use super::validation::{validate_amount, validate_email, validate_required};

/// Customer information embedded in every order message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Unique identifier of the customer
    #[serde(default)]
    pub customer_id: String,

    /// Full name of the customer
    #[serde(default)]
    pub name: String,

    /// Email address, optionally empty
    #[serde(default)]
    pub email: String,

    /// Phone number
    #[serde(default)]
    pub phone: String,

    /// Physical address
    #[serde(default)]
    pub address: String,

    /// Loyalty level (e.g. "silver", "gold")
    #[serde(default)]
    pub loyalty_level: String,
}

impl CustomerInfo {
    /// Check that the customer information is valid
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required(&self.customer_id, "customer_id")?;
        validate_required(&self.name, "name")?;
        validate_email(&self.email, "email")?;
        Ok(())
    }
}

/// Inventory state for an item at the time of the order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryStatus {
    /// Identifier of the item in stock
    #[serde(default)]
    pub item_id: String,

    /// Name of the item
    #[serde(default)]
    pub item_name: String,

    /// Quantity available before the order
    #[serde(default)]
    pub available_qty: i64,

    /// Quantity reserved by this order
    #[serde(default)]
    pub reserved_qty: i64,

    /// Unit price
    #[serde(default)]
    pub unit_price: f64,

    /// Availability indicator
    #[serde(default)]
    pub in_stock: bool,

    /// Origin warehouse
    #[serde(default)]
    pub warehouse: String,
}

/// An individual line item within an order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderItem {
    /// Unique identifier of the item
    #[serde(default)]
    pub item_id: String,

    /// Name of the item
    #[serde(default)]
    pub item_name: String,

    /// Ordered quantity
    #[serde(default)]
    pub quantity: i64,

    /// Unit price
    #[serde(default)]
    pub unit_price: f64,

    /// Total price for this item (quantity * unit price)
    #[serde(default)]
    pub total_price: f64,
}

impl OrderItem {
    /// Check that the line item is internally consistent
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required(&self.item_id, "item_id")?;
        validate_required(&self.item_name, "item_name")?;
        if self.quantity <= 0 {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidQuantity,
                "quantity",
            ));
        }
        if self.unit_price <= 0.0 {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidUnitPrice,
                "unit_price",
            ));
        }
        let expected_total = self.quantity as f64 * self.unit_price;
        validate_amount(expected_total, self.total_price, "total_price")?;
        Ok(())
    }
}

/// Technical and contextual metadata for the order event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderMetadata {
    /// Event creation timestamp (RFC3339)
    #[serde(default)]
    pub timestamp: String,

    /// Data schema version
    #[serde(default)]
    pub version: String,

    /// Event type (e.g. "order.created")
    #[serde(default)]
    pub event_type: String,

    /// Event source (e.g. "producer-service")
    #[serde(default)]
    pub source: String,

    /// Correlation identifier for distributed tracing
    #[serde(default)]
    pub correlation_id: String,
}

/// A complete customer order event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier of the order (UUID)
    #[serde(default)]
    pub order_id: String,

    /// Incremental sequence number
    #[serde(default)]
    pub sequence: i64,

    /// Status of the order (e.g. "pending")
    #[serde(default)]
    pub status: String,

    /// Customer information, denormalized into the event
    #[serde(default)]
    pub customer_info: CustomerInfo,

    /// Order line items
    #[serde(default)]
    pub items: Vec<OrderItem>,

    /// Inventory snapshot at the time of the order
    #[serde(default)]
    pub inventory: InventoryStatus,

    /// Sum of item totals
    #[serde(default)]
    pub subtotal: f64,

    /// Tax amount
    #[serde(default)]
    pub tax: f64,

    /// Shipping fee
    #[serde(default)]
    pub shipping_fee: f64,

    /// Total amount
    #[serde(default)]
    pub total: f64,

    /// Currency code (e.g. "EUR")
    #[serde(default)]
    pub currency: String,

    /// Payment method used
    #[serde(default)]
    pub payment_method: String,

    /// Optional delivery notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_notes: Option<String>,

    /// Event metadata
    #[serde(default)]
    pub metadata: OrderMetadata,
}

impl Order {
    /// Check that the order is valid: required fields present, at least one
    /// consistent line item, and amounts that add up within tolerance.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required(&self.order_id, "order_id")?;
        if self.sequence <= 0 {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidSequence,
                "sequence",
            ));
        }
        validate_required(&self.status, "status")?;

        self.customer_info.validate()?;

        if self.items.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::NoItems, "items"));
        }

        let mut calculated_subtotal = 0.0;
        for (i, item) in self.items.iter().enumerate() {
            item.validate().map_err(|e| {
                ValidationError::with_context(e.kind, e.field, format!("item {}", i + 1))
            })?;
            calculated_subtotal += item.total_price;
        }

        validate_amount(calculated_subtotal, self.subtotal, "subtotal")?;

        if self.tax < 0.0 {
            return Err(ValidationError::new(ValidationErrorKind::NegativeTax, "tax"));
        }

        let expected_total = self.subtotal + self.tax + self.shipping_fee;
        validate_amount(expected_total, self.total, "total")?;

        Ok(())
    }

    /// Returns true if validation succeeds
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Builder for creating test orders
#[cfg(test)]
pub struct OrderBuilder {
    order: Order,
}

#[cfg(test)]
impl OrderBuilder {
    pub fn new() -> Self {
        let item = OrderItem {
            item_id: "item-espresso".to_string(),
            item_name: "espresso".to_string(),
            quantity: 2,
            unit_price: 2.50,
            total_price: 5.00,
        };
        Self {
            order: Order {
                order_id: uuid::Uuid::new_v4().to_string(),
                sequence: 1,
                status: "pending".to_string(),
                customer_info: CustomerInfo {
                    customer_id: "client01".to_string(),
                    name: "Client client01".to_string(),
                    email: "client01@example.com".to_string(),
                    ..CustomerInfo::default()
                },
                items: vec![item],
                subtotal: 5.00,
                tax: 1.00,
                shipping_fee: 2.50,
                total: 8.50,
                currency: "EUR".to_string(),
                payment_method: "credit_card".to_string(),
                metadata: OrderMetadata {
                    timestamp: "2024-01-01T00:00:00Z".to_string(),
                    version: "1.1".to_string(),
                    event_type: "order.created".to_string(),
                    source: "test".to_string(),
                    correlation_id: uuid::Uuid::new_v4().to_string(),
                },
                ..Order::default()
            },
        }
    }

    pub fn sequence(mut self, sequence: i64) -> Self {
        self.order.sequence = sequence;
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.order.customer_info.email = email.to_string();
        self
    }

    pub fn subtotal(mut self, subtotal: f64) -> Self {
        self.order.subtotal = subtotal;
        self
    }

    pub fn total(mut self, total: f64) -> Self {
        self.order.total = total;
        self
    }

    pub fn tax(mut self, tax: f64) -> Self {
        self.order.tax = tax;
        self
    }

    pub fn items(mut self, items: Vec<OrderItem>) -> Self {
        self.order.items = items;
        self
    }

    pub fn build(self) -> Order {
        self.order
    }
}
