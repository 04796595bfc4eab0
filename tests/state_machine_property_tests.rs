//! Property-based tests for the quotation state machine and revision ledger
//!
//! These use proptest to drive randomized negotiation histories through
//! `apply_action` and check the invariants that must hold for every one of
//! them: one revision per round, stable terminal states, totals that never
//! drift from the fold of the lines, and a ledger that replays back to the
//! exact item set.
//!
//! What these tests DON'T cover (deliberately):
//!
//! - Persistence and the compare-and-swap commit (integration scenarios)
//! - Discount/adjustment validation details (smoke unit tests)

use proptest::prelude::*;
use quote_negotiation::calc;
use quote_negotiation::error::NegotiationError;
use quote_negotiation::machine::{self, NegotiationAction};
use quote_negotiation::order::{Actor, NewLineItem, Order, OrderStatus};
use quote_negotiation::revision::{QtyChangeRequest, Revision, RevisionDelta};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn sales() -> Actor {
    Actor::sales("user_mira", "Mira")
}

fn customer() -> Actor {
    Actor::customer("user_otto", "Otto")
}

// PROPERTY TEST STRATEGIES

/// Strategy for a valid line item payload
fn item_strategy() -> impl Strategy<Value = NewLineItem> {
    (
        "[A-Z]{2}-[0-9]{3}",
        1u32..=50,
        1i64..=50_000,
        1i64..=50_000,
        0u32..=25,
    )
        .prop_map(|(sku, qty, list_cents, unit_cents, vat)| {
            NewLineItem::new(
                sku,
                qty,
                Decimal::new(list_cents, 2),
                Decimal::new(unit_cents, 2),
                Decimal::from(vat),
            )
        })
}

/// One thing a negotiation round may do to the item set
#[derive(Debug, Clone)]
enum RoundOp {
    BumpFirst(u32),
    Add(NewLineItem),
    RemoveLast,
}

fn round_op_strategy() -> impl Strategy<Value = RoundOp> {
    prop_oneof![
        (1u32..=99).prop_map(RoundOp::BumpFirst),
        item_strategy().prop_map(RoundOp::Add),
        Just(RoundOp::RemoveLast),
    ]
}

fn round_ops_strategy() -> impl Strategy<Value = Vec<RoundOp>> {
    prop::collection::vec(round_op_strategy(), 0..=8)
}

fn quoted_order(items: Vec<NewLineItem>) -> Order {
    let mut order = Order::draft("order_proptest".to_string());
    for item in items {
        order.add_item(item).unwrap();
    }
    machine::apply_action(&order, &sales(), NegotiationAction::Send { message: None }).unwrap()
}

/// Turn an abstract op into a concrete delta against the current order.
/// Ops that have no target left degrade to an empty delta, which is still a
/// legal (notes-only) round.
fn delta_for(op: &RoundOp, order: &Order) -> RevisionDelta {
    match op {
        RoundOp::BumpFirst(qty) => match order.items.first() {
            Some(first) => RevisionDelta {
                items_qty_changed: vec![QtyChangeRequest {
                    line_number: first.line_number,
                    new_qty: *qty,
                }],
                ..Default::default()
            },
            None => RevisionDelta::default(),
        },
        RoundOp::Add(item) => RevisionDelta {
            items_added: vec![item.clone()],
            ..Default::default()
        },
        RoundOp::RemoveLast => match order.items.last() {
            Some(last) => RevisionDelta {
                items_removed: vec![last.line_number],
                ..Default::default()
            },
            None => RevisionDelta::default(),
        },
    }
}

/// Run the ops as alternating revise/counter rounds, sales first.
fn run_rounds(mut order: Order, ops: &[RoundOp]) -> Order {
    for (i, op) in ops.iter().enumerate() {
        let delta = delta_for(op, &order);
        let (actor, action) = if i % 2 == 0 {
            (sales(), NegotiationAction::Revise { delta })
        } else {
            (customer(), NegotiationAction::Counter { delta })
        };
        order = machine::apply_action(&order, &actor, action).unwrap();
    }
    order
}

/// Replay the ledger from nothing, in the engine's order of application:
/// removals, then adds, then quantity changes.
fn replay_items(revisions: &[Revision]) -> BTreeMap<u32, (String, u32)> {
    let mut replayed = BTreeMap::new();
    for revision in revisions {
        for removed in &revision.items_removed {
            replayed.remove(&removed.line_number);
        }
        for added in &revision.items_added {
            replayed.insert(added.line_number, (added.sku.clone(), added.quantity));
        }
        for change in &revision.items_qty_changed {
            if let Some(entry) = replayed.get_mut(&change.line_number) {
                entry.1 = change.new_qty;
            }
        }
    }
    replayed
}

// PROPERTY TESTS
proptest! {
    /// Property: the first send records exactly one revision, and that
    /// revision carries the whole draft as additions
    #[test]
    fn prop_send_records_the_initial_round(
        items in prop::collection::vec(item_strategy(), 1..=6)
    ) {
        let count = items.len();
        let order = quoted_order(items);

        prop_assert_eq!(order.status, OrderStatus::QuotationSent);
        prop_assert_eq!(order.revisions.len(), 1);
        prop_assert_eq!(order.revisions[0].items_added.len(), count);
        prop_assert!(order.revisions[0].items_removed.is_empty());
    }

    /// Property: every revise/counter round appends exactly one revision
    /// and leaves the order awaiting the other side
    #[test]
    fn prop_each_round_appends_exactly_one_revision(
        items in prop::collection::vec(item_strategy(), 1..=4),
        ops in round_ops_strategy(),
    ) {
        let mut order = quoted_order(items);

        for (i, op) in ops.iter().enumerate() {
            let delta = delta_for(op, &order);
            let (actor, action) = if i % 2 == 0 {
                (sales(), NegotiationAction::Revise { delta })
            } else {
                (customer(), NegotiationAction::Counter { delta })
            };
            order = machine::apply_action(&order, &actor, action).unwrap();

            prop_assert_eq!(order.status, OrderStatus::QuotationSent);
            prop_assert_eq!(order.revisions.len(), i + 2); // send is round one
        }
    }

    /// Property: after any negotiation history, replaying the ledger
    /// reconstructs the current item set exactly
    #[test]
    fn prop_ledger_replays_to_the_item_set(
        items in prop::collection::vec(item_strategy(), 1..=4),
        ops in round_ops_strategy(),
    ) {
        let order = run_rounds(quoted_order(items), &ops);

        let current: BTreeMap<u32, (String, u32)> = order
            .items
            .iter()
            .map(|i| (i.line_number, (i.sku.clone(), i.quantity)))
            .collect();

        prop_assert_eq!(replay_items(&order.revisions), current);
    }

    /// Property: the derived totals never drift - recomputing the fold on
    /// any reachable order changes nothing
    #[test]
    fn prop_totals_never_drift(
        items in prop::collection::vec(item_strategy(), 1..=4),
        ops in round_ops_strategy(),
    ) {
        let order = run_rounds(quoted_order(items), &ops);

        let mut check = order.clone();
        calc::recompute_totals(&mut check);

        prop_assert_eq!(check, order);
    }

    /// Property: a decided quotation is terminal - nothing moves it again
    #[test]
    fn prop_decided_orders_are_stable(
        items in prop::collection::vec(item_strategy(), 1..=4),
        ops in round_ops_strategy(),
        accepts in any::<bool>(),
    ) {
        let order = run_rounds(quoted_order(items), &ops);

        let decision = if accepts {
            NegotiationAction::Accept
        } else {
            NegotiationAction::Reject { reason: None }
        };
        let order = machine::apply_action(&order, &customer(), decision).unwrap();
        let rounds = order.revisions.len();

        prop_assert!(order.status.is_terminal());

        for action in [
            NegotiationAction::Send { message: None },
            NegotiationAction::Accept,
            NegotiationAction::Reject { reason: None },
            NegotiationAction::Revise { delta: RevisionDelta::default() },
            NegotiationAction::Counter { delta: RevisionDelta::default() },
        ] {
            let result = machine::apply_action(&order, &customer(), action);
            let is_invalid_transition =
                matches!(result, Err(NegotiationError::InvalidTransition { .. }));
            prop_assert!(is_invalid_transition);
        }

        // and the ledger was not touched by any of the refusals
        prop_assert_eq!(order.revisions.len(), rounds);
    }
}
