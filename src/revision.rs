//! Append-only ledger of negotiation rounds
//!
//! A revision is written once, as the terminal step of a negotiation action,
//! and never edited afterwards. Replaying every revision's deltas against the
//! original draft item set reconstructs the current order.

use crate::discount::{CartDiscount, CartDiscountInput, LineAdjustment, LineAdjustmentInput};
use crate::error::NegotiationError;
use crate::order::{Actor, ActorRole, NewLineItem, Order, TimeStamp};
use crate::utils;
use chrono::Utc;

/// Reference to a line that entered or left the order during a round. The
/// quantity is the one observed at that moment, so the ledger alone can
/// rebuild the item set.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineRef {
    #[n(0)]
    pub line_number: u32,
    #[n(1)]
    pub sku: String,
    #[n(2)]
    pub quantity: u32,
}

/// A quantity change observed between two snapshots of the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct QtyChange {
    #[n(0)]
    pub line_number: u32,
    #[n(1)]
    pub old_qty: u32,
    #[n(2)]
    pub new_qty: u32,
}

/// Requested quantity change inside a [`RevisionDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QtyChangeRequest {
    pub line_number: u32,
    pub new_qty: u32,
}

/// Everything one negotiation round may propose. Empty lists mean "no change
/// of that kind"; an all-empty delta is a legal round that only carries
/// notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionDelta {
    pub cart_discounts_added: Vec<CartDiscountInput>,
    pub line_adjustments_added: Vec<LineAdjustmentInput>,
    pub items_added: Vec<NewLineItem>,
    pub items_removed: Vec<u32>,
    pub items_qty_changed: Vec<QtyChangeRequest>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
}

impl RevisionDelta {
    pub fn is_empty(&self) -> bool {
        self.cart_discounts_added.is_empty()
            && self.line_adjustments_added.is_empty()
            && self.items_added.is_empty()
            && self.items_removed.is_empty()
            && self.items_qty_changed.is_empty()
    }
}

/// One immutable negotiation round.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Revision {
    #[n(0)]
    pub revision_id: String,
    #[n(1)]
    pub created_by: String,
    #[n(2)]
    pub created_by_name: String,
    #[n(3)]
    pub actor_role: ActorRole,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
    #[n(5)]
    pub cart_discounts_added: Vec<CartDiscount>,
    #[n(6)]
    pub line_adjustments_added: Vec<LineAdjustment>,
    #[n(7)]
    pub items_added: Vec<LineRef>,
    #[n(8)]
    pub items_removed: Vec<LineRef>,
    #[n(9)]
    pub items_qty_changed: Vec<QtyChange>,
    #[n(10)]
    pub notes: Option<String>,
    #[n(11)]
    pub internal_notes: Option<String>,
    /// Content address of the item set after this round, as stored by the
    /// service layer.
    #[n(12)]
    pub snapshot_hash: String,
}

impl Revision {
    /// Internal notes are a sales-side surface; customers never see them.
    pub fn internal_notes_for(&self, role: ActorRole) -> Option<&str> {
        match role {
            ActorRole::Sales => self.internal_notes.as_deref(),
            ActorRole::Customer => None,
        }
    }
}

/// The stamped records a round actually applied, handed over by the state
/// machine so the ledger carries the same ids and timestamps the order does.
#[derive(Debug, Clone, Default)]
pub struct AppliedChanges {
    pub cart_discounts: Vec<CartDiscount>,
    pub line_adjustments: Vec<LineAdjustment>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
}

/// Diff two snapshots of an order and append the resulting revision.
///
/// A line's identity is its (line_number, sku) pair, not the number alone:
/// removing the highest line frees its number for the next addition, and a
/// substitution that lands on a reused number must show up as one removal
/// plus one addition, not as a silent in-place swap. Quantity changes come
/// from lines present in both snapshots. Existing revisions are never
/// touched.
pub fn record_revision(
    before: &Order,
    after: &mut Order,
    actor: &Actor,
    changes: AppliedChanges,
) -> Result<(), NegotiationError> {
    let present_in = |order: &Order, line_number: u32, sku: &str| {
        order
            .items
            .iter()
            .any(|i| i.line_number == line_number && i.sku == sku)
    };

    let items_added = after
        .items
        .iter()
        .filter(|item| !present_in(before, item.line_number, &item.sku))
        .map(|item| LineRef {
            line_number: item.line_number,
            sku: item.sku.clone(),
            quantity: item.quantity,
        })
        .collect();

    let items_removed = before
        .items
        .iter()
        .filter(|item| !present_in(after, item.line_number, &item.sku))
        .map(|item| LineRef {
            line_number: item.line_number,
            sku: item.sku.clone(),
            quantity: item.quantity,
        })
        .collect();

    let items_qty_changed = after
        .items
        .iter()
        .filter_map(|item| {
            before
                .items
                .iter()
                .find(|prev| prev.line_number == item.line_number && prev.sku == item.sku)
                .filter(|prev| prev.quantity != item.quantity)
                .map(|prev| QtyChange {
                    line_number: item.line_number,
                    old_qty: prev.quantity,
                    new_qty: item.quantity,
                })
        })
        .collect();

    let (snapshot_hash, _) = after.snapshot_items()?;

    let revision = Revision {
        revision_id: utils::new_uuid_to_bech32("rev_")
            .map_err(|e| NegotiationError::Internal(e.to_string()))?,
        created_by: actor.actor_id.clone(),
        created_by_name: actor.actor_name.clone(),
        actor_role: actor.role,
        created_at: TimeStamp::new(),
        cart_discounts_added: changes.cart_discounts,
        line_adjustments_added: changes.line_adjustments,
        items_added,
        items_removed,
        items_qty_changed,
        notes: changes.notes,
        internal_notes: changes.internal_notes,
        snapshot_hash,
    };

    after.revisions.push(revision);
    Ok(())
}
