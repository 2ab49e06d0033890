//! Order generation and publishing
//!
//! The producer synthesizes complete order events from a fixed set of
//! templates and publishes one every configured interval. Each event carries
//! the full business state (customer, items, inventory snapshot, totals) so
//! consumers never need to call back.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::kafka::OrderPublisher;
use crate::models::{CustomerInfo, InventoryStatus, Order, OrderItem, OrderMetadata};

/// Tax rate applied to every generated order
pub const DEFAULT_TAX_RATE: f64 = 0.20;

/// Flat shipping fee
pub const DEFAULT_SHIPPING_FEE: f64 = 2.50;

/// Currency of generated orders
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Payment method of generated orders
pub const DEFAULT_PAYMENT_METHOD: &str = "credit_card";

/// Warehouse tag stamped into the inventory snapshot
pub const DEFAULT_WAREHOUSE: &str = "PARIS-01";

/// Stock level the inventory snapshot is computed from
const INITIAL_STOCK: i64 = 100;

/// A template for generating test orders
#[derive(Debug, Clone)]
pub struct OrderTemplate {
    pub user: &'static str,
    pub item: &'static str,
    pub quantity: i64,
    pub price: f64,
}

/// Built-in order templates, rotated per message
pub const DEFAULT_TEMPLATES: [OrderTemplate; 10] = [
    OrderTemplate { user: "client01", item: "espresso", quantity: 2, price: 2.50 },
    OrderTemplate { user: "client02", item: "cappuccino", quantity: 3, price: 3.20 },
    OrderTemplate { user: "client03", item: "latte", quantity: 4, price: 3.50 },
    OrderTemplate { user: "client04", item: "macchiato", quantity: 5, price: 3.00 },
    OrderTemplate { user: "client05", item: "flat white", quantity: 6, price: 3.30 },
    OrderTemplate { user: "client06", item: "mocha", quantity: 7, price: 4.00 },
    OrderTemplate { user: "client07", item: "americano", quantity: 8, price: 2.80 },
    OrderTemplate { user: "client08", item: "chai latte", quantity: 9, price: 3.80 },
    OrderTemplate { user: "client09", item: "matcha", quantity: 10, price: 4.50 },
    OrderTemplate { user: "client10", item: "strawberry smoothie", quantity: 11, price: 5.50 },
];

/// Generates complete, valid order events from templates
pub struct OrderGenerator {
    templates: Vec<OrderTemplate>,
    sequence: i64,
}

impl OrderGenerator {
    pub fn new() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES.to_vec(),
            sequence: 1,
        }
    }

    /// Build the next order, rotating through the templates so that the
    /// first message uses template 0
    pub fn next_order(&mut self) -> Order {
        let index = ((self.sequence - 1) % self.templates.len() as i64) as usize;
        let order = self.generate(&self.templates[index].clone(), self.sequence);
        self.sequence += 1;
        order
    }

    /// Current sequence number (the one the next order will carry)
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Build one complete order from a template and a sequence number
    pub fn generate(&self, template: &OrderTemplate, sequence: i64) -> Order {
        let item_total = template.quantity as f64 * template.price;
        let tax = item_total * DEFAULT_TAX_RATE;
        let total = item_total + tax + DEFAULT_SHIPPING_FEE;

        let available_qty = INITIAL_STOCK - template.quantity;
        let in_stock = available_qty >= 0;

        let item_id = format!("item-{}", template.item);
        let address = format!("{} Rue de la Paix, 75000 Paris", sequence);

        Order {
            order_id: Uuid::new_v4().to_string(),
            sequence,
            status: "pending".to_string(),
            customer_info: CustomerInfo {
                customer_id: template.user.to_string(),
                name: format!("Client {}", template.user),
                email: format!("{}@example.com", template.user),
                phone: "+33 6 00 00 00 00".to_string(),
                address: address.clone(),
                loyalty_level: "silver".to_string(),
            },
            items: vec![OrderItem {
                item_id: item_id.clone(),
                item_name: template.item.to_string(),
                quantity: template.quantity,
                unit_price: template.price,
                total_price: item_total,
            }],
            inventory: InventoryStatus {
                item_id,
                item_name: template.item.to_string(),
                available_qty,
                reserved_qty: template.quantity,
                unit_price: template.price,
                in_stock,
                warehouse: DEFAULT_WAREHOUSE.to_string(),
            },
            subtotal: item_total,
            tax,
            shipping_fee: DEFAULT_SHIPPING_FEE,
            total,
            currency: DEFAULT_CURRENCY.to_string(),
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            delivery_notes: Some(format!("Deliver to {}", address)),
            metadata: OrderMetadata {
                timestamp: chrono::Utc::now()
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                version: "1.1".to_string(),
                event_type: "order.created".to_string(),
                source: "producer-service".to_string(),
                correlation_id: Uuid::new_v4().to_string(),
            },
        }
    }
}

impl Default for OrderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// The producer service: generation loop plus Kafka publishing
pub struct OrderProducer {
    publisher: OrderPublisher,
    generator: OrderGenerator,
    interval: Duration,
    flush_timeout: Duration,
}

impl OrderProducer {
    /// Connect the underlying publisher. Must be called from within a tokio
    /// runtime.
    pub fn connect(config: &Config) -> Result<Self> {
        let publisher = OrderPublisher::connect(&config.kafka.broker, &config.kafka.topic)?;
        Ok(Self {
            publisher,
            generator: OrderGenerator::new(),
            interval: config.producer.interval(),
            flush_timeout: config.producer.flush_timeout(),
        })
    }

    /// Produce one order per interval until the token fires
    pub async fn run(&mut self, cancel: &CancellationToken) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Producer running");

        while !cancel.is_cancelled() {
            let order = self.generator.next_order();
            if let Err(e) = self.publisher.publish(&order) {
                tracing::error!(error = %e, sequence = order.sequence, "Failed to publish order");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Stopping order production");
    }

    /// Flush pending deliveries and report the final counters
    pub fn close(&self) {
        let remaining = self.publisher.flush(self.flush_timeout);
        let stats = self.publisher.stats();
        if remaining > 0 {
            tracing::warn!(remaining, "Some orders could not be delivered before shutdown");
        }
        tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Producer closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_order_is_valid() {
        let generator = OrderGenerator::new();
        for template in DEFAULT_TEMPLATES.iter() {
            let order = generator.generate(template, 1);
            assert!(order.validate().is_ok(), "template {:?}", template.item);
        }
    }

    #[test]
    fn test_financials() {
        let generator = OrderGenerator::new();
        let template = &DEFAULT_TEMPLATES[0]; // 2 x 2.50
        let order = generator.generate(template, 5);

        assert_eq!(order.subtotal, 5.00);
        assert!((order.tax - 1.00).abs() < 1e-9);
        assert_eq!(order.shipping_fee, DEFAULT_SHIPPING_FEE);
        assert!((order.total - 8.50).abs() < 1e-9);
        assert_eq!(order.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn test_inventory_snapshot() {
        let generator = OrderGenerator::new();
        let order = generator.generate(&DEFAULT_TEMPLATES[9], 1); // quantity 11
        assert_eq!(order.inventory.available_qty, 89);
        assert_eq!(order.inventory.reserved_qty, 11);
        assert!(order.inventory.in_stock);
        assert_eq!(order.inventory.warehouse, DEFAULT_WAREHOUSE);
    }

    #[test]
    fn test_template_rotation_starts_at_first_template() {
        let mut generator = OrderGenerator::new();

        let first = generator.next_order();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.items[0].item_name, "espresso");

        let second = generator.next_order();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.items[0].item_name, "cappuccino");
    }

    #[test]
    fn test_template_rotation_wraps() {
        let mut generator = OrderGenerator::new();
        for _ in 0..DEFAULT_TEMPLATES.len() {
            generator.next_order();
        }
        // sequence 11 wraps back to the first template
        let order = generator.next_order();
        assert_eq!(order.sequence, 11);
        assert_eq!(order.items[0].item_name, "espresso");
    }

    #[test]
    fn test_metadata() {
        let generator = OrderGenerator::new();
        let order = generator.generate(&DEFAULT_TEMPLATES[2], 3);
        assert_eq!(order.metadata.version, "1.1");
        assert_eq!(order.metadata.event_type, "order.created");
        assert_eq!(order.metadata.source, "producer-service");
        assert!(uuid::Uuid::parse_str(&order.metadata.correlation_id).is_ok());
        assert!(uuid::Uuid::parse_str(&order.order_id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&order.metadata.timestamp).is_ok());
    }

    #[test]
    fn test_orders_get_unique_ids() {
        let mut generator = OrderGenerator::new();
        let a = generator.next_order();
        let b = generator.next_order();
        assert_ne!(a.order_id, b.order_id);
        assert_ne!(a.metadata.correlation_id, b.metadata.correlation_id);
    }
}
