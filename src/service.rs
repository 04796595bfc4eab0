//! Service layer API for quotation workflow operations
use crate::discount::{self, CartDiscountInput, LineAdjustmentInput};
use crate::error::NegotiationError;
use crate::machine::{self, NegotiationAction};
use crate::order::{Actor, ActorRole, NewLineItem, Order};
use crate::revision::RevisionDelta;
use crate::utils;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

pub struct QuotationService {
    instance: Arc<sled::Db>,
    // in future we could add a config for per-tenant negotiation limits
}

impl QuotationService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// Load an order from the database
    fn load_order(&self, order_id: &str) -> anyhow::Result<Order> {
        let bytes = self
            .instance
            .get(order_id.as_bytes())?
            .ok_or_else(|| NegotiationError::OrderNotFound(order_id.to_string()))?;
        let order: Order = minicbor::decode(bytes.as_ref())?;

        debug!(order_id, status = %order.status, "order loaded");
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> anyhow::Result<Order> {
        self.load_order(order_id)
    }

    /// Seed a new draft order with its initial line items. The commerce
    /// front-end owns drafts; this exists so the negotiation engine can be
    /// exercised end to end without it.
    pub fn create_draft(
        &self,
        actor: &Actor,
        items: Vec<NewLineItem>,
        shipping_cost: Decimal,
    ) -> anyhow::Result<Order> {
        if actor.role != ActorRole::Sales {
            return Err(NegotiationError::UnauthorizedActor {
                role: actor.role,
                action: "create a draft",
            }
            .into());
        }

        let order_id = utils::new_uuid_to_bech32("order_")?;
        let mut order = Order::draft(order_id).with_shipping_cost(shipping_cost);
        for item in items {
            order.add_item(item)?;
        }

        let bytes = minicbor::to_vec(&order)?;
        // a fresh uuid7 key never collides; refuse to clobber if it somehow does
        self.instance
            .compare_and_swap(order.order_id.as_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| NegotiationError::ConcurrentModification(order.order_id.clone()))?;

        info!(order_id = %order.order_id, lines = order.items.len(), "draft order created");
        Ok(order)
    }

    /// Send the quotation to the customer (sales only; order must be draft)
    pub fn send_quotation(
        &self,
        order_id: &str,
        actor: &Actor,
        message: Option<String>,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        self.apply(current, actor, NegotiationAction::Send { message })
    }

    /// Accept an open quotation (customer only)
    pub fn accept_quotation(&self, order_id: &str, actor: &Actor) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        self.apply(current, actor, NegotiationAction::Accept)
    }

    /// Reject an open quotation with an optional reason (customer only)
    pub fn reject_quotation(
        &self,
        order_id: &str,
        actor: &Actor,
        reason: Option<String>,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        self.apply(current, actor, NegotiationAction::Reject { reason })
    }

    /// Open a new negotiation round against the quotation. Sales actors
    /// revise, customers counter; the actor role picks the arm.
    pub fn create_revision(
        &self,
        order_id: &str,
        actor: &Actor,
        delta: RevisionDelta,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        let action = match actor.role {
            ActorRole::Sales => NegotiationAction::Revise { delta },
            ActorRole::Customer => NegotiationAction::Counter { delta },
        };
        self.apply(current, actor, action)
    }

    /// Add a cart-level discount to an order still in the draft phase
    pub fn add_cart_discount(
        &self,
        order_id: &str,
        actor: &Actor,
        input: CartDiscountInput,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        let mut next = current.clone();
        discount::add_cart_discount(&mut next, actor, input)?;
        self.commit(&current, next)
    }

    /// Remove a cart-level discount by id
    pub fn remove_cart_discount(
        &self,
        order_id: &str,
        discount_id: &str,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        let mut next = current.clone();
        discount::remove_cart_discount(&mut next, discount_id)?;
        self.commit(&current, next)
    }

    /// Apply a single line adjustment to an order still in the draft phase
    pub fn apply_line_adjustment(
        &self,
        order_id: &str,
        actor: &Actor,
        input: LineAdjustmentInput,
    ) -> anyhow::Result<Order> {
        let current = self.load_order(order_id)?;
        let mut next = current.clone();
        discount::apply_line_adjustment(&mut next, actor, input)?;
        self.commit(&current, next)
    }

    /// Run one negotiation action against the order as the caller read it.
    ///
    /// The commit compares against the bytes of that read: a caller holding
    /// a stale order loses the swap and gets `ConcurrentModification`, never
    /// a silent merge of two negotiation states.
    pub fn apply(
        &self,
        current: Order,
        actor: &Actor,
        action: NegotiationAction,
    ) -> anyhow::Result<Order> {
        let next = machine::apply_action(&current, actor, action)?;
        self.commit(&current, next)
    }

    fn commit(&self, read: &Order, next: Order) -> anyhow::Result<Order> {
        let old = minicbor::to_vec(read)?;
        let new = minicbor::to_vec(&next)?;

        // snapshot first: it is content-addressed, so an orphan left by a
        // losing writer is harmless and a re-insert is idempotent
        let (snapshot_hash, snapshot_cbor) = next.snapshot_items()?;
        self.instance
            .insert(snapshot_hash.as_bytes(), snapshot_cbor)?;

        self.instance
            .compare_and_swap(next.order_id.as_bytes(), Some(old), Some(new))?
            .map_err(|_| NegotiationError::ConcurrentModification(next.order_id.clone()))?;

        info!(
            order_id = %next.order_id,
            status = %next.status,
            revisions = next.revisions.len(),
            total = %next.order_total,
            "order committed"
        );
        Ok(next)
    }
}
