//! Pure money computation: per-line figures and order-level totals
//!
//! Everything in this module is deterministic and side-effect free. Each
//! derived field is rounded independently, half-up to two decimal places,
//! matching currency-minor-unit semantics. Validation of the inputs is the
//! adjustment manager's job, not the calculator's.

use crate::discount::{CartDiscount, DiscountKind};
use crate::order::Order;
use rust_decimal::{Decimal, RoundingStrategy};

/// Half-up rounding to two decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derived figures for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFigures {
    pub line_gross: Decimal,
    pub line_net: Decimal,
    pub line_vat: Decimal,
    pub line_total: Decimal,
}

/// Compute gross/net/VAT/total for one line. Each derived field is rounded
/// independently; VAT and the line total build on the already-rounded net,
/// so the figures a customer sees always add up.
pub fn compute_line(
    quantity: u32,
    list_price: Decimal,
    unit_price: Decimal,
    vat_rate: Decimal,
) -> LineFigures {
    let qty = Decimal::from(quantity);
    let line_gross = round2(qty * list_price);
    let line_net = round2(qty * unit_price);
    let line_vat = round2(line_net * vat_rate / Decimal::ONE_HUNDRED);
    let line_total = round2(line_net + line_vat);

    LineFigures {
        line_gross,
        line_net,
        line_vat,
        line_total,
    }
}

/// Monetary effect of the cart discounts against the summed line net.
///
/// Percentage discounts are computed on the undiscounted base (no compounding
/// between cart discounts); fixed discounts are taken as-is. The combined
/// effect stays unrounded here and is capped so the net never goes negative.
pub fn cart_discount_effect(base_net: Decimal, discounts: &[CartDiscount]) -> Decimal {
    let mut effect = Decimal::ZERO;
    for discount in discounts {
        effect += match discount.kind {
            DiscountKind::Percentage => base_net * discount.value / Decimal::ONE_HUNDRED,
            DiscountKind::Fixed => discount.value,
        };
    }

    effect.min(base_net).max(Decimal::ZERO)
}

/// Recompute every derived figure on the order, lines first, then the fold.
///
/// The cart-discount effect is subtracted from the summed line net and
/// rounded once at the aggregate, not per line, so multi-line orders do not
/// accumulate rounding drift. The discount total is derived from the
/// gross/net gap plus the cart effect, never summed from discount records.
pub fn recompute_totals(order: &mut Order) {
    for item in &mut order.items {
        let figures = compute_line(item.quantity, item.list_price, item.unit_price, item.vat_rate);
        item.line_gross = figures.line_gross;
        item.line_net = figures.line_net;
        item.line_vat = figures.line_vat;
        item.line_total = figures.line_total;
    }

    if order.items.is_empty() {
        order.subtotal_gross = Decimal::ZERO;
        order.subtotal_net = Decimal::ZERO;
        order.total_vat = Decimal::ZERO;
        order.total_discount = Decimal::ZERO;
        order.order_total = Decimal::ZERO;
        return;
    }

    let gross_sum: Decimal = order.items.iter().map(|i| i.line_gross).sum();
    let net_sum: Decimal = order.items.iter().map(|i| i.line_net).sum();
    let vat_sum: Decimal = order.items.iter().map(|i| i.line_vat).sum();

    let cart_effect = cart_discount_effect(net_sum, &order.cart_discounts);

    order.subtotal_gross = round2(gross_sum);
    order.subtotal_net = round2(net_sum - cart_effect);
    order.total_vat = round2(vat_sum);
    order.total_discount = round2(gross_sum - net_sum + cart_effect);
    order.order_total = round2(order.subtotal_net + order.total_vat + order.shipping_cost);
}
