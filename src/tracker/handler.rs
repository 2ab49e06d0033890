//! Order handler dispatched by the consumer runtime

use async_trait::async_trait;

use crate::models::Order;
use crate::retry::RetryError;

/// Business handler invoked for every successfully deserialized order.
///
/// Implementations classify their failures: transient errors are retried by
/// the runtime, permanent errors go straight to the dead letter queue.
#[async_trait]
pub trait OrderHandler: Send + Sync {
    async fn handle(&self, order: &Order) -> Result<(), RetryError>;
}

/// Reference handler: validates the order and renders a human-readable
/// summary on stdout. A validation failure is permanent; there is no point
/// retrying a malformed order.
pub struct ConsoleHandler;

#[async_trait]
impl OrderHandler for ConsoleHandler {
    async fn handle(&self, order: &Order) -> Result<(), RetryError> {
        order
            .validate()
            .map_err(|e| RetryError::permanent(crate::error::Error::from(e)))?;

        display_order(order);
        Ok(())
    }
}

/// Print the formatted order details to the console
fn display_order(order: &Order) {
    let rule = "=".repeat(80);
    println!("\n{}", rule);
    println!("ORDER RECEIVED #{} (ID: {})", order.sequence, order.order_id);
    println!("{}", "-".repeat(80));
    println!(
        "Customer: {} ({})",
        order.customer_info.name, order.customer_info.customer_id
    );
    println!(
        "Status: {} | Total: {:.2} {}",
        order.status, order.total, order.currency
    );
    println!("Items:");
    for item in &order.items {
        println!(
            "  - {} (x{}) @ {:.2} {}",
            item.item_name, item.quantity, item.unit_price, order.currency
        );
    }
    println!("{}", rule);
}
