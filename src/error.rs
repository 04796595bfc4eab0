use crate::order::{ActorRole, OrderStatus};

#[derive(thiserror::Error, Debug)]
pub enum NegotiationError {
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("cart discount {0} not found")]
    DiscountNotFound(String),
    #[error("line {0} does not exist on this order")]
    LineNotFound(u32),
    #[error("cannot {action} while the order is {status}")]
    InvalidTransition {
        status: OrderStatus,
        action: &'static str,
    },
    #[error("invalid cart discount: {0}")]
    InvalidDiscount(String),
    #[error("invalid line adjustment: {0}")]
    InvalidAdjustment(String),
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),
    #[error("{role} actors are not permitted to {action}")]
    UnauthorizedActor {
        role: ActorRole,
        action: &'static str,
    },
    #[error("a quotation needs at least one line item before it can be sent")]
    EmptyOrder,
    #[error("order {0} was modified by another writer")]
    ConcurrentModification(String),
    #[error("internal encoding failure: {0}")]
    Internal(String),
}
