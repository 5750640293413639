//! Stock ledger engine.
//!
//! Computes how a product's on-hand quantity changes for a movement request and
//! produces the immutable movement record describing that change. Nothing here
//! touches the database: the caller persists the product and the returned
//! [`PendingMovement`] together (see `services::stock`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid movement type: {0:?}")]
    InvalidMovementType(String),
    #[error("moving {requested} on {on_hand} exceeds the largest storable quantity")]
    QuantityOverflow { on_hand: i32, requested: i32 },
}

/// Movement type as stored in `stock_movements.movement_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub const ALL: [MovementType; 3] = [MovementType::In, MovementType::Out, MovementType::Adjustment];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(LedgerError::InvalidMovementType(other.to_string())),
        }
    }
}

/// What the caller wants to happen to on-hand stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "snake_case")]
pub enum MovementKind {
    /// Receive stock; the magnitude of the value is added.
    In(i32),
    /// Issue stock; the magnitude is removed, clamped at zero.
    Out(i32),
    /// Count correction to an absolute on-hand value.
    SetAbsolute(i32),
    /// Count correction by a signed delta, clamped at zero.
    AdjustBy(i32),
}

impl MovementKind {
    /// Interprets the string-typed `(movement_type, quantity)` pair submitted by
    /// forms. `adjustment` carries an absolute target.
    pub fn parse(movement_type: &str, quantity: i32) -> Result<Self, LedgerError> {
        Ok(match movement_type.parse::<MovementType>()? {
            MovementType::In => MovementKind::In(quantity),
            MovementType::Out => MovementKind::Out(quantity),
            MovementType::Adjustment => MovementKind::SetAbsolute(quantity),
        })
    }

    pub fn movement_type(&self) -> MovementType {
        match self {
            MovementKind::In(_) => MovementType::In,
            MovementKind::Out(_) => MovementType::Out,
            MovementKind::SetAbsolute(_) | MovementKind::AdjustBy(_) => MovementType::Adjustment,
        }
    }

    /// The raw caller-supplied value, before any transformation.
    pub fn requested(&self) -> i32 {
        match *self {
            MovementKind::In(q)
            | MovementKind::Out(q)
            | MovementKind::SetAbsolute(q)
            | MovementKind::AdjustBy(q) => q,
        }
    }
}

/// Anything that carries an on-hand quantity the ledger may move.
pub trait Stocked {
    fn stock_id(&self) -> Uuid;
    fn on_hand(&self) -> i32;
    fn set_on_hand(&mut self, quantity: i32, at: DateTime<Utc>);
}

/// A movement computed by the engine and not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Magnitude for `in`/`out`, signed delta for `adjustment`.
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// String-typed entry point used at the form boundary.
///
/// Fails with [`LedgerError::InvalidMovementType`] before touching `product`.
/// Overflow fails the same way, see [`apply_at`].
pub fn apply_movement<P: Stocked + ?Sized>(
    product: &mut P,
    movement_type: &str,
    quantity: i32,
    notes: Option<String>,
    reference: Option<String>,
) -> Result<PendingMovement, LedgerError> {
    let kind = MovementKind::parse(movement_type, quantity)?;
    apply(product, kind, notes, reference)
}

pub fn apply<P: Stocked + ?Sized>(
    product: &mut P,
    kind: MovementKind,
    notes: Option<String>,
    reference: Option<String>,
) -> Result<PendingMovement, LedgerError> {
    apply_at(product, kind, notes, reference, Utc::now())
}

/// Same as [`apply`] with an explicit clock.
///
/// A movement whose exact result does not fit in an `i32` is refused with
/// [`LedgerError::QuantityOverflow`] and leaves `product` untouched, so every
/// `in` satisfies `new == previous + quantity`.
pub fn apply_at<P: Stocked + ?Sized>(
    product: &mut P,
    kind: MovementKind,
    notes: Option<String>,
    reference: Option<String>,
    at: DateTime<Utc>,
) -> Result<PendingMovement, LedgerError> {
    let previous_quantity = product.on_hand();
    let overflow = || LedgerError::QuantityOverflow {
        on_hand: previous_quantity,
        requested: kind.requested(),
    };

    let (new_quantity, recorded) = match kind {
        MovementKind::In(q) => {
            let magnitude = q.checked_abs().ok_or_else(overflow)?;
            (previous_quantity.checked_add(magnitude).ok_or_else(overflow)?, magnitude)
        }
        MovementKind::Out(q) => {
            let magnitude = q.checked_abs().ok_or_else(overflow)?;
            (previous_quantity.saturating_sub(magnitude).max(0), magnitude)
        }
        MovementKind::SetAbsolute(target) => {
            let target = target.max(0);
            (target, target.checked_sub(previous_quantity).ok_or_else(overflow)?)
        }
        MovementKind::AdjustBy(delta) => {
            let target = previous_quantity.checked_add(delta).ok_or_else(overflow)?.max(0);
            (target, target.checked_sub(previous_quantity).ok_or_else(overflow)?)
        }
    };

    product.set_on_hand(new_quantity, at);

    Ok(PendingMovement {
        id: Uuid::now_v7(),
        product_id: product.stock_id(),
        movement_type: kind.movement_type(),
        quantity: recorded,
        previous_quantity,
        new_quantity,
        notes: notes.filter(|n| !n.trim().is_empty()),
        reference: reference.filter(|r| !r.trim().is_empty()),
        created_at: at,
    })
}

/// The before/after snapshot every ledger row carries.
pub trait LedgerEntry {
    fn previous_quantity(&self) -> i32;
    fn new_quantity(&self) -> i32;
}

impl LedgerEntry for PendingMovement {
    fn previous_quantity(&self) -> i32 {
        self.previous_quantity
    }

    fn new_quantity(&self) -> i32 {
        self.new_quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryBreak {
    #[error("movement #{index} starts at {found}, previous movement ended at {expected}")]
    Gap { index: usize, expected: i32, found: i32 },
    #[error("history ends at {ledger} but the product holds {on_hand}")]
    Drift { ledger: i32, on_hand: i32 },
}

/// Replays movements in chronological order and checks that each one starts
/// where the previous one ended and that the last one matches `on_hand`.
pub fn verify_history<E: LedgerEntry>(entries: &[E], on_hand: i32) -> Result<(), HistoryBreak> {
    for (index, pair) in entries.windows(2).enumerate() {
        let expected = pair[0].new_quantity();
        let found = pair[1].previous_quantity();
        if expected != found {
            return Err(HistoryBreak::Gap { index: index + 1, expected, found });
        }
    }

    match entries.last() {
        Some(last) if last.new_quantity() != on_hand => Err(HistoryBreak::Drift {
            ledger: last.new_quantity(),
            on_hand,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Bin {
        id: Uuid,
        quantity: i32,
        touched: Option<DateTime<Utc>>,
    }

    impl Bin {
        fn with(quantity: i32) -> Self {
            Self { id: Uuid::new_v4(), quantity, touched: None }
        }
    }

    impl Stocked for Bin {
        fn stock_id(&self) -> Uuid {
            self.id
        }

        fn on_hand(&self) -> i32 {
            self.quantity
        }

        fn set_on_hand(&mut self, quantity: i32, at: DateTime<Utc>) {
            self.quantity = quantity;
            self.touched = Some(at);
        }
    }

    #[test]
    fn receiving_adds_to_stock() {
        let mut bin = Bin::with(5);
        let m = apply_movement(&mut bin, "in", 3, None, None).unwrap();
        assert_eq!((m.previous_quantity, m.new_quantity, m.quantity), (5, 8, 3));
        assert_eq!(m.movement_type, MovementType::In);
        assert_eq!(bin.quantity, 8);
        assert_eq!(m.product_id, bin.id);
    }

    #[test]
    fn issuing_more_than_on_hand_clamps_to_zero() {
        let mut bin = Bin::with(5);
        let m = apply_movement(&mut bin, "out", 10, None, None).unwrap();
        assert_eq!((m.previous_quantity, m.new_quantity, m.quantity), (5, 0, 10));
        assert_eq!(bin.quantity, 0);
    }

    #[test]
    fn adjustment_stores_signed_delta() {
        let mut bin = Bin::with(20);
        let m = apply_movement(&mut bin, "adjustment", 15, Some("cycle count".into()), None).unwrap();
        assert_eq!((m.previous_quantity, m.new_quantity, m.quantity), (20, 15, -5));
        assert_eq!(m.movement_type, MovementType::Adjustment);
        assert_eq!(m.notes.as_deref(), Some("cycle count"));
    }

    #[test]
    fn unknown_type_leaves_product_untouched() {
        let mut bin = Bin::with(7);
        let err = apply_movement(&mut bin, "return", 2, None, None).unwrap_err();
        assert_eq!(err, LedgerError::InvalidMovementType("return".into()));
        assert_eq!(bin.quantity, 7);
        assert!(bin.touched.is_none());
    }

    #[test]
    fn repeated_adjustment_records_zero_delta() {
        let mut bin = Bin::with(3);
        let first = apply_movement(&mut bin, "adjustment", 12, None, None).unwrap();
        let second = apply_movement(&mut bin, "adjustment", 12, None, None).unwrap();
        assert_eq!((first.new_quantity, first.quantity), (12, 9));
        assert_eq!((second.new_quantity, second.quantity), (12, 0));
    }

    #[test]
    fn negative_magnitudes_are_taken_absolute() {
        let mut bin = Bin::with(4);
        let m = apply(&mut bin, MovementKind::In(-6), None, None).unwrap();
        assert_eq!((m.new_quantity, m.quantity), (10, 6));
        let m = apply(&mut bin, MovementKind::Out(-3), None, None).unwrap();
        assert_eq!((m.new_quantity, m.quantity), (7, 3));
    }

    #[test]
    fn negative_absolute_target_clamps_to_zero() {
        let mut bin = Bin::with(4);
        let m = apply(&mut bin, MovementKind::SetAbsolute(-2), None, None).unwrap();
        assert_eq!((m.new_quantity, m.quantity), (0, -4));
    }

    #[test]
    fn adjust_by_records_applied_delta() {
        let mut bin = Bin::with(4);
        let m = apply(&mut bin, MovementKind::AdjustBy(-10), None, None).unwrap();
        assert_eq!(m.movement_type, MovementType::Adjustment);
        assert_eq!((m.new_quantity, m.quantity), (0, -4));
        let m = apply(&mut bin, MovementKind::AdjustBy(6), None, None).unwrap();
        assert_eq!((m.previous_quantity, m.new_quantity, m.quantity), (0, 6, 6));
    }

    #[test]
    fn receiving_past_i32_max_is_refused() {
        let mut bin = Bin::with(10);
        let err = apply(&mut bin, MovementKind::In(i32::MAX), None, None).unwrap_err();
        assert_eq!(err, LedgerError::QuantityOverflow { on_hand: 10, requested: i32::MAX });
        assert_eq!(bin.quantity, 10);
        assert!(bin.touched.is_none());

        let err = apply(&mut bin, MovementKind::In(i32::MIN), None, None).unwrap_err();
        assert!(matches!(err, LedgerError::QuantityOverflow { .. }));
        let err = apply(&mut bin, MovementKind::AdjustBy(i32::MAX), None, None).unwrap_err();
        assert!(matches!(err, LedgerError::QuantityOverflow { .. }));
        assert_eq!(bin.quantity, 10);
    }

    #[test]
    fn receiving_up_to_i32_max_is_exact() {
        let mut bin = Bin::with(10);
        let m = apply(&mut bin, MovementKind::In(i32::MAX - 10), None, None).unwrap();
        assert_eq!(m.new_quantity, i32::MAX);
        assert_eq!(i64::from(m.new_quantity), i64::from(m.previous_quantity) + i64::from(m.quantity));
    }

    #[test]
    fn large_issue_clamps_without_overflow() {
        let mut bin = Bin::with(3);
        let m = apply(&mut bin, MovementKind::Out(i32::MAX), None, None).unwrap();
        assert_eq!((m.new_quantity, m.quantity), (0, i32::MAX));
    }

    #[test]
    fn blank_annotations_are_dropped() {
        let mut bin = Bin::with(1);
        let m = apply(&mut bin, MovementKind::In(1), Some("  ".into()), Some("PO-7".into())).unwrap();
        assert_eq!(m.notes, None);
        assert_eq!(m.reference.as_deref(), Some("PO-7"));
    }

    #[test]
    fn clock_is_stamped_on_product_and_movement() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let mut bin = Bin::with(1);
        let m = apply_at(&mut bin, MovementKind::In(1), None, None, at).unwrap();
        assert_eq!(m.created_at, at);
        assert_eq!(bin.touched, Some(at));
    }

    #[test]
    fn movement_type_round_trips_through_strings() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert!("IN".parse::<MovementType>().is_err());
    }

    #[test]
    fn history_chain_is_verified() {
        let mut bin = Bin::with(0);
        let log = vec![
            apply(&mut bin, MovementKind::In(10), None, None).unwrap(),
            apply(&mut bin, MovementKind::Out(4), None, None).unwrap(),
            apply(&mut bin, MovementKind::SetAbsolute(9), None, None).unwrap(),
        ];
        assert_eq!(verify_history(&log, bin.quantity), Ok(()));
        assert_eq!(
            verify_history(&log, 3),
            Err(HistoryBreak::Drift { ledger: 9, on_hand: 3 })
        );

        let mut broken = log.clone();
        broken[2].previous_quantity = 5;
        assert_eq!(
            verify_history(&broken, bin.quantity),
            Err(HistoryBreak::Gap { index: 2, expected: 6, found: 5 })
        );
    }

    #[test]
    fn empty_history_is_consistent() {
        assert_eq!(verify_history::<PendingMovement>(&[], 12), Ok(()));
    }

    fn any_kind() -> impl Strategy<Value = MovementKind> {
        prop_oneof![
            (1..10_000i32).prop_map(MovementKind::In),
            (1..10_000i32).prop_map(MovementKind::Out),
            (0..10_000i32).prop_map(MovementKind::SetAbsolute),
            (-10_000..10_000i32).prop_map(MovementKind::AdjustBy),
        ]
    }

    proptest! {
        #[test]
        fn receipts_add_exactly(start in 0..100_000i32, q in 1..100_000i32) {
            let mut bin = Bin::with(start);
            let m = apply_movement(&mut bin, "in", q, None, None).unwrap();
            prop_assert_eq!(m.new_quantity, start + q);
            prop_assert_eq!(m.quantity, q);
        }

        #[test]
        fn issues_clamp_at_zero(start in 0..100_000i32, q in 1..100_000i32) {
            let mut bin = Bin::with(start);
            let m = apply_movement(&mut bin, "out", q, None, None).unwrap();
            prop_assert_eq!(m.new_quantity, (start - q).max(0));
            prop_assert_eq!(m.quantity, q);
            if start < q {
                prop_assert_eq!(m.new_quantity, 0);
            }
        }

        #[test]
        fn adjustments_land_on_target(start in 0..100_000i32, target in 0..100_000i32) {
            let mut bin = Bin::with(start);
            let m = apply_movement(&mut bin, "adjustment", target, None, None).unwrap();
            prop_assert_eq!(m.new_quantity, target);
            prop_assert_eq!(m.quantity, target - start);
        }

        #[test]
        fn sequences_never_go_negative_and_chain(start in 0..1_000i32, kinds in prop::collection::vec(any_kind(), 1..40)) {
            let mut bin = Bin::with(start);
            let mut log = Vec::new();
            for kind in kinds {
                let before = bin.quantity;
                let m = apply(&mut bin, kind, None, None).unwrap();
                prop_assert_eq!(m.previous_quantity, before);
                prop_assert!(m.new_quantity >= 0);
                prop_assert_eq!(m.new_quantity, bin.quantity);
                log.push(m);
            }
            prop_assert_eq!(verify_history(&log, bin.quantity), Ok(()));
        }
    }
}
