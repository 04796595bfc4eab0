//! Quotation lifecycle state machine
//!
//! The single entry point is [`apply_action`]: a pure function from the
//! order as read plus one action to the next order. Dispatch is exhaustive
//! over (status, action), so every pair either has a defined transition or
//! fails as `InvalidTransition`. The input order is never mutated; a failed
//! action leaves nothing half-updated.

use crate::calc;
use crate::discount;
use crate::error::NegotiationError;
use crate::order::{Actor, ActorRole, Order, OrderStatus};
use crate::revision::{self, AppliedChanges, RevisionDelta};

/// One negotiation action. Revise and counter are symmetric: both carry a
/// full delta, and only the acting role separates them. Real wholesale
/// negotiation is a back-and-forth, not a propose/approve split.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationAction {
    Send { message: Option<String> },
    Accept,
    Reject { reason: Option<String> },
    Revise { delta: RevisionDelta },
    Counter { delta: RevisionDelta },
}

impl NegotiationAction {
    pub fn name(&self) -> &'static str {
        match self {
            NegotiationAction::Send { .. } => "send",
            NegotiationAction::Accept => "accept",
            NegotiationAction::Reject { .. } => "reject",
            NegotiationAction::Revise { .. } => "revise",
            NegotiationAction::Counter { .. } => "counter",
        }
    }
}

/// Apply one action to the order, returning the next order or a structured
/// failure. Role gates run inside each legal arm; anything else is an
/// illegal (status, action) pair.
pub fn apply_action(
    order: &Order,
    actor: &Actor,
    action: NegotiationAction,
) -> Result<Order, NegotiationError> {
    match (order.status, action) {
        (
            OrderStatus::Draft | OrderStatus::PendingQuotation,
            NegotiationAction::Send { message },
        ) => send(order, actor, message),
        (OrderStatus::QuotationSent, NegotiationAction::Accept) => accept(order, actor),
        (OrderStatus::QuotationSent, NegotiationAction::Reject { reason }) => {
            reject(order, actor, reason)
        }
        (OrderStatus::QuotationSent, NegotiationAction::Revise { delta }) => {
            negotiate_round(order, actor, ActorRole::Sales, "revise", delta)
        }
        (OrderStatus::QuotationSent, NegotiationAction::Counter { delta }) => {
            negotiate_round(order, actor, ActorRole::Customer, "counter", delta)
        }
        (status, action) => Err(NegotiationError::InvalidTransition {
            status,
            action: action.name(),
        }),
    }
}

fn send(
    order: &Order,
    actor: &Actor,
    message: Option<String>,
) -> Result<Order, NegotiationError> {
    if actor.role != ActorRole::Sales {
        return Err(NegotiationError::UnauthorizedActor {
            role: actor.role,
            action: "send",
        });
    }
    if order.items.is_empty() {
        return Err(NegotiationError::EmptyOrder);
    }

    let mut next = order.clone();
    calc::recompute_totals(&mut next);

    if next.revisions.is_empty() {
        // round one diffs against an empty draft so a replay of the ledger
        // rebuilds the order from nothing
        let mut baseline = order.clone();
        baseline.items.clear();
        baseline.cart_discounts.clear();

        let changes = AppliedChanges {
            cart_discounts: next.cart_discounts.clone(),
            line_adjustments: vec![],
            notes: message,
            internal_notes: None,
        };
        revision::record_revision(&baseline, &mut next, actor, changes)?;
    }

    next.status = OrderStatus::QuotationSent;
    Ok(next)
}

fn accept(order: &Order, actor: &Actor) -> Result<Order, NegotiationError> {
    if actor.role != ActorRole::Customer {
        return Err(NegotiationError::UnauthorizedActor {
            role: actor.role,
            action: "accept",
        });
    }

    let mut next = order.clone();
    next.status = OrderStatus::Accepted;
    Ok(next)
}

fn reject(
    order: &Order,
    actor: &Actor,
    reason: Option<String>,
) -> Result<Order, NegotiationError> {
    if actor.role != ActorRole::Customer {
        return Err(NegotiationError::UnauthorizedActor {
            role: actor.role,
            action: "reject",
        });
    }

    let mut next = order.clone();
    next.rejection_reason = reason;
    next.status = OrderStatus::Rejected;
    Ok(next)
}

/// A revise (sales) or counter (customer) round: apply the delta, recompute,
/// and close with exactly one revision. Removals run first so an adjustment
/// aimed at a line the same delta removes fails as `LineNotFound` instead of
/// resurrecting it.
fn negotiate_round(
    order: &Order,
    actor: &Actor,
    required_role: ActorRole,
    action: &'static str,
    delta: RevisionDelta,
) -> Result<Order, NegotiationError> {
    if actor.role != required_role {
        return Err(NegotiationError::UnauthorizedActor {
            role: actor.role,
            action,
        });
    }

    let mut next = order.clone();

    for line_number in &delta.items_removed {
        next.remove_line(*line_number)?;
    }
    for change in &delta.items_qty_changed {
        next.set_quantity(change.line_number, change.new_qty)?;
    }
    for input in delta.items_added {
        next.add_item(input)?;
    }

    let mut line_adjustments = Vec::with_capacity(delta.line_adjustments_added.len());
    for input in delta.line_adjustments_added {
        line_adjustments.push(discount::push_line_adjustment(&mut next, actor, input)?);
    }
    let mut cart_discounts = Vec::with_capacity(delta.cart_discounts_added.len());
    for input in delta.cart_discounts_added {
        cart_discounts.push(discount::push_cart_discount(&mut next, actor, input)?);
    }

    calc::recompute_totals(&mut next);

    let changes = AppliedChanges {
        cart_discounts,
        line_adjustments,
        notes: delta.notes,
        internal_notes: delta.internal_notes,
    };
    revision::record_revision(order, &mut next, actor, changes)?;

    // a fresh round awaiting the other side's response
    next.status = OrderStatus::QuotationSent;
    Ok(next)
}
