//! Cart-level discounts and line-level adjustments
//!
//! Every successful mutation here recomputes the order totals before
//! returning, so the derived figures never lag a discount change.

use crate::calc;
use crate::error::NegotiationError;
use crate::order::{Actor, Order, TimeStamp};
use crate::utils;
use chrono::Utc;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum DiscountKind {
    #[n(0)]
    Percentage,
    #[n(1)]
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum AdjustmentKind {
    #[n(0)]
    PriceOverride,
    #[n(1)]
    DiscountPercentage,
    #[n(2)]
    DiscountFixed,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::PriceOverride => "price_override",
            AdjustmentKind::DiscountPercentage => "discount_percentage",
            AdjustmentKind::DiscountFixed => "discount_fixed",
        }
    }
}

/// The closed set of business reasons a discount or adjustment may carry.
/// Both the manager and the revision ledger consume this enum; free-form
/// reason strings from callers are rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum AdjustmentReason {
    #[n(0)]
    Loyalty,
    #[n(1)]
    Volume,
    #[n(2)]
    Promotion,
    #[n(3)]
    PriceMatch,
    #[n(4)]
    Negotiation,
    #[n(5)]
    Clearance,
    #[n(6)]
    Goodwill,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Loyalty => "loyalty",
            AdjustmentReason::Volume => "volume",
            AdjustmentReason::Promotion => "promotion",
            AdjustmentReason::PriceMatch => "price_match",
            AdjustmentReason::Negotiation => "negotiation",
            AdjustmentReason::Clearance => "clearance",
            AdjustmentReason::Goodwill => "goodwill",
        }
    }
}

/// A discount applied to the order as a whole.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CartDiscount {
    #[n(0)]
    pub discount_id: String,
    #[n(1)]
    pub kind: DiscountKind,
    #[cbor(n(2), with = "crate::order::dec")]
    pub value: Decimal,
    #[n(3)]
    pub reason: AdjustmentReason,
    #[n(4)]
    pub description: Option<String>,
    #[n(5)]
    pub applied_by: String,
    #[n(6)]
    pub applied_at: TimeStamp<Utc>,
}

/// A price override or discount applied to one line during a revision.
/// `original_value` is captured from the line at apply time, never taken
/// from the caller.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineAdjustment {
    #[n(0)]
    pub adjustment_id: String,
    #[n(1)]
    pub line_number: u32,
    #[n(2)]
    pub kind: AdjustmentKind,
    #[cbor(n(3), with = "crate::order::dec")]
    pub original_value: Decimal,
    #[cbor(n(4), with = "crate::order::dec")]
    pub new_value: Decimal,
    #[n(5)]
    pub reason: AdjustmentReason,
    #[n(6)]
    pub description: Option<String>,
    #[n(7)]
    pub applied_by: String,
    #[n(8)]
    pub applied_at: TimeStamp<Utc>,
}

/// Caller payload for a cart discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartDiscountInput {
    pub kind: DiscountKind,
    pub value: Decimal,
    pub reason: AdjustmentReason,
    pub description: Option<String>,
}

impl CartDiscountInput {
    pub fn percentage(value: Decimal, reason: AdjustmentReason) -> Self {
        Self {
            kind: DiscountKind::Percentage,
            value,
            reason,
            description: None,
        }
    }
    pub fn fixed(value: Decimal, reason: AdjustmentReason) -> Self {
        Self {
            kind: DiscountKind::Fixed,
            value,
            reason,
            description: None,
        }
    }
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Caller payload for a line adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAdjustmentInput {
    pub line_number: u32,
    pub kind: AdjustmentKind,
    pub new_value: Decimal,
    pub reason: AdjustmentReason,
    pub description: Option<String>,
}

fn validate_cart_discount(input: &CartDiscountInput) -> Result<(), NegotiationError> {
    if input.value <= Decimal::ZERO {
        return Err(NegotiationError::InvalidDiscount(
            "value must be greater than zero".into(),
        ));
    }
    if input.kind == DiscountKind::Percentage && input.value > Decimal::ONE_HUNDRED {
        return Err(NegotiationError::InvalidDiscount(
            "percentage must not exceed 100".into(),
        ));
    }
    Ok(())
}

fn validate_line_adjustment(input: &LineAdjustmentInput) -> Result<(), NegotiationError> {
    match input.kind {
        AdjustmentKind::PriceOverride => {
            if input.new_value.is_sign_negative() {
                return Err(NegotiationError::InvalidAdjustment(
                    "override price must not be negative".into(),
                ));
            }
        }
        AdjustmentKind::DiscountPercentage => {
            if input.new_value <= Decimal::ZERO || input.new_value > Decimal::ONE_HUNDRED {
                return Err(NegotiationError::InvalidAdjustment(
                    "percentage must be between 0 and 100".into(),
                ));
            }
        }
        AdjustmentKind::DiscountFixed => {
            if input.new_value <= Decimal::ZERO {
                return Err(NegotiationError::InvalidAdjustment(
                    "fixed discount must be greater than zero".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Add a cart discount to an order that still permits direct financial
/// mutation. During a negotiation round discounts travel inside the
/// revision delta instead and the state machine supplies the gate.
pub fn add_cart_discount(
    order: &mut Order,
    actor: &Actor,
    input: CartDiscountInput,
) -> Result<CartDiscount, NegotiationError> {
    if !order.status.allows_financial_mutation() {
        return Err(NegotiationError::InvalidDiscount(format!(
            "order is {} and cannot take a cart discount outside a revision",
            order.status
        )));
    }
    push_cart_discount(order, actor, input)
}

/// Remove a cart discount by id and recompute.
pub fn remove_cart_discount(
    order: &mut Order,
    discount_id: &str,
) -> Result<CartDiscount, NegotiationError> {
    if !order.status.allows_financial_mutation() {
        return Err(NegotiationError::InvalidDiscount(format!(
            "order is {} and cannot drop a cart discount outside a revision",
            order.status
        )));
    }
    let idx = order
        .cart_discounts
        .iter()
        .position(|d| d.discount_id == discount_id)
        .ok_or_else(|| NegotiationError::DiscountNotFound(discount_id.to_string()))?;

    let removed = order.cart_discounts.remove(idx);
    calc::recompute_totals(order);
    Ok(removed)
}

/// Apply a line adjustment on an order that still permits direct financial
/// mutation; the revision path uses [`push_line_adjustment`].
pub fn apply_line_adjustment(
    order: &mut Order,
    actor: &Actor,
    input: LineAdjustmentInput,
) -> Result<LineAdjustment, NegotiationError> {
    if !order.status.allows_financial_mutation() {
        return Err(NegotiationError::InvalidAdjustment(format!(
            "order is {} and cannot take a line adjustment outside a revision",
            order.status
        )));
    }
    push_line_adjustment(order, actor, input)
}

/// Validate, stamp and append a cart discount, then recompute. Status gating
/// is the caller's concern: the state machine has already checked the
/// transition when this runs inside a revision.
pub(crate) fn push_cart_discount(
    order: &mut Order,
    actor: &Actor,
    input: CartDiscountInput,
) -> Result<CartDiscount, NegotiationError> {
    validate_cart_discount(&input)?;

    let discount = CartDiscount {
        discount_id: utils::new_uuid_to_bech32("disc_")
            .map_err(|e| NegotiationError::Internal(e.to_string()))?,
        kind: input.kind,
        value: input.value,
        reason: input.reason,
        description: input.description,
        applied_by: actor.actor_id.clone(),
        applied_at: TimeStamp::new(),
    };

    order.cart_discounts.push(discount.clone());
    calc::recompute_totals(order);
    Ok(discount)
}

/// Validate a line adjustment, capture the original value from the line,
/// mutate the unit price and recompute.
pub(crate) fn push_line_adjustment(
    order: &mut Order,
    actor: &Actor,
    input: LineAdjustmentInput,
) -> Result<LineAdjustment, NegotiationError> {
    validate_line_adjustment(&input)?;

    let item = order
        .line_mut(input.line_number)
        .ok_or(NegotiationError::LineNotFound(input.line_number))?;

    // capture before any mutation: unit price for overrides, the effective
    // discount percentage for the discount kinds
    let original_value = match input.kind {
        AdjustmentKind::PriceOverride => item.unit_price,
        AdjustmentKind::DiscountPercentage | AdjustmentKind::DiscountFixed => {
            item.effective_discount_pct()
        }
    };

    item.unit_price = match input.kind {
        AdjustmentKind::PriceOverride => input.new_value,
        AdjustmentKind::DiscountPercentage => calc::round2(
            item.list_price * (Decimal::ONE_HUNDRED - input.new_value) / Decimal::ONE_HUNDRED,
        ),
        // fixed discounts come off the list price, floored at zero
        AdjustmentKind::DiscountFixed => {
            calc::round2((item.list_price - input.new_value).max(Decimal::ZERO))
        }
    };

    let adjustment = LineAdjustment {
        adjustment_id: utils::new_uuid_to_bech32("adj_")
            .map_err(|e| NegotiationError::Internal(e.to_string()))?,
        line_number: input.line_number,
        kind: input.kind,
        original_value,
        new_value: input.new_value,
        reason: input.reason,
        description: input.description,
        applied_by: actor.actor_id.clone(),
        applied_at: TimeStamp::new(),
    };

    item.discounts.push(adjustment.clone());
    calc::recompute_totals(order);
    Ok(adjustment)
}
