//! Property tests for the pure invariants of the balance projector and the
//! fulfillment state machines.

use proptest::prelude::*;

use stockledger_api::entities::purchase_order::PurchaseOrderStatus;
use stockledger_api::services::balances::recompute_available;
use stockledger_api::services::purchase_orders::status_after_receipt;

proptest! {
    /// available_qty is exactly max(0, on_hand - reserved), for any inputs.
    #[test]
    fn available_matches_definition(on_hand in -10_000i32..10_000, reserved in -10_000i32..10_000) {
        let available = recompute_available(on_hand, reserved);
        prop_assert_eq!(available, (on_hand - reserved).max(0));
        prop_assert!(available >= 0);
    }

    /// With non-negative reserved stock, available never exceeds on-hand.
    #[test]
    fn available_never_exceeds_on_hand(on_hand in 0i32..10_000, reserved in 0i32..10_000) {
        prop_assert!(recompute_available(on_hand, reserved) <= on_hand);
    }

    /// An order closes exactly when every line is fully received.
    #[test]
    fn order_closes_iff_every_line_full(
        lines in proptest::collection::vec((1i32..1000).prop_flat_map(|qty| {
            (Just(qty), 0i32..=qty)
        }), 1..8)
    ) {
        let status = status_after_receipt(&lines);
        let all_full = lines.iter().all(|(qty, received)| received >= qty);
        if all_full {
            prop_assert_eq!(status, PurchaseOrderStatus::Closed);
        } else {
            prop_assert_eq!(status, PurchaseOrderStatus::PartiallyReceived);
        }
    }

    /// Replaying any accepted sequence of movements yields the balance the
    /// engine reports: the fold is a left fold over signed quantities, and
    /// an OUT is only accepted while covered. This mirrors the engine's
    /// acceptance rule on its pure core.
    #[test]
    fn accepted_movements_never_drive_on_hand_negative(
        quantities in proptest::collection::vec((any::<bool>(), 1i32..100), 0..64)
    ) {
        let mut on_hand = 0i32;
        let mut accepted_fold = 0i32;
        for (is_in, quantity) in quantities {
            if is_in {
                on_hand += quantity;
                accepted_fold += quantity;
            } else if on_hand >= quantity {
                on_hand -= quantity;
                accepted_fold -= quantity;
            }
            prop_assert!(on_hand >= 0);
            prop_assert_eq!(on_hand, accepted_fold);
        }
    }
}
