//! Stock lot ledger: receipts, corrections, blocking and the quantity
//! invariant under mixed and concurrent operations.

mod common;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use comptoir_core::{AllocationPolicy, LotStatus, Money, MovementType, OversellPolicy};
use comptoir_engine::{EngineError, ErrorKind, ReceiptRequest, SaleRequest, StockReference};

use common::*;

// =============================================================================
// Receipts
// =============================================================================

#[tokio::test]
async fn test_receive_creates_lot_with_entry_movement() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;

    let mut request = ReceiptRequest::new(&rice.id, 12, 60_000);
    request.expiry_at = Some(Utc::now() + Duration::days(180));
    request.customs_ref = Some("DEC-2024-0042".to_string());
    let lot = engine.ledger().receive(request, &cashier()).await.unwrap();

    assert!(lot.lot_number.starts_with('L'));
    assert_eq!(lot.initial_quantity, 12);
    assert_eq!(lot.current_quantity, 12);
    assert_eq!(lot.status, LotStatus::Available);
    assert_eq!(lot.customs_ref.as_deref(), Some("DEC-2024-0042"));

    let movements = engine.ledger().movements_for_lot(&lot.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Entry);
    assert_eq!(movements[0].previous_quantity, 0);
    assert_eq!(movements[0].new_quantity, 12);

    let second = receive(&engine, &rice.id, 3).await;
    assert_ne!(second.lot_number, lot.lot_number);
    assert_eq!(engine.ledger().current_stock(&rice.id).await.unwrap(), 15);
    assert_eq!(engine.ledger().lots_for_product(&rice.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_receive_for_unknown_product_fails() {
    let engine = engine().await;
    let err = engine
        .ledger()
        .receive(ReceiptRequest::new("no-such-product", 1, 100), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_shipment_spreads_landed_costs() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let oil = product(&engine, "OIL", Money::from_major(500), 0).await;

    let lots = engine
        .ledger()
        .receive_shipment(
            vec![ReceiptRequest::new(&rice.id, 10, 1_000), ReceiptRequest::new(&oil.id, 5, 2_000)],
            Money::from_cents(1_001),
            &cashier(),
        )
        .await
        .unwrap();

    assert_eq!(lots.len(), 2);
    assert!(lots[0].unit_cost_cents > 1_000);
    assert!(lots[1].unit_cost_cents > 2_000);
    assert_ne!(lots[0].lot_number, lots[1].lot_number);

    let err = engine
        .ledger()
        .receive_shipment(vec![], Money::zero(), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// =============================================================================
// Allocation Policy
// =============================================================================

#[tokio::test]
async fn test_fefo_prefers_nearest_expiry() {
    let engine = engine_with(config_with(AllocationPolicy::Fefo, OversellPolicy::AllowBackorder)).await;
    let milk = product(&engine, "MILK", Money::from_major(250), 0).await;

    let mut old_long = ReceiptRequest::new(&milk.id, 5, 100);
    old_long.received_at = Some(Utc::now() - Duration::days(10));
    old_long.expiry_at = Some(Utc::now() + Duration::days(60));
    let old_long = engine.ledger().receive(old_long, &cashier()).await.unwrap();

    let mut new_short = ReceiptRequest::new(&milk.id, 5, 100);
    new_short.received_at = Some(Utc::now() - Duration::days(1));
    new_short.expiry_at = Some(Utc::now() + Duration::days(5));
    let new_short = engine.ledger().receive(new_short, &cashier()).await.unwrap();

    let session = open_session(&engine, "REG-1", Money::zero()).await;
    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&milk.id, 2), &cashier())
        .await
        .unwrap();

    assert_eq!(outcome.lines[0].lot_id.as_deref(), Some(new_short.id.as_str()));
    assert_eq!(lot_quantity(&engine, &new_short.id).await, 3);
    assert_eq!(lot_quantity(&engine, &old_long.id).await, 5);
}

#[tokio::test]
async fn test_standalone_allocate_reports_shortfall() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 3).await;

    let plan = engine
        .ledger()
        .allocate(&rice.id, 5, StockReference::adjustment(), &cashier())
        .await
        .unwrap();
    assert_eq!(plan.allocated, 3);
    assert_eq!(plan.shortfall, 2);
    assert_eq!(lot_quantity(&engine, &lot.id).await, 0);

    let movement = engine
        .ledger()
        .release(&lot.id, 3, StockReference::adjustment(), &cashier())
        .await
        .unwrap();
    assert_eq!(movement.movement_type, MovementType::Return);
    assert_eq!(movement.new_quantity, 3);

    let err = engine
        .ledger()
        .release(&lot.id, 1, StockReference::adjustment(), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .ledger()
        .release("no-such-lot", 1, StockReference::adjustment(), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LotNotFound(_)));
}

// =============================================================================
// Corrections
// =============================================================================

#[tokio::test]
async fn test_adjust_lot_within_bounds() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 5).await;

    let movements = engine
        .ledger()
        .adjust(&rice.id, Some(&lot.id), -2, "count correction", &cashier())
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Adjustment);
    assert_eq!(movements[0].previous_quantity, 5);
    assert_eq!(movements[0].new_quantity, 3);
    assert_eq!(movements[0].reason.as_deref(), Some("count correction"));

    engine
        .ledger()
        .adjust(&rice.id, Some(&lot.id), 2, "found", &cashier())
        .await
        .unwrap();
    assert_eq!(lot_quantity(&engine, &lot.id).await, 5);

    let err = engine
        .ledger()
        .adjust(&rice.id, Some(&lot.id), 1, "above initial", &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .ledger()
        .adjust(&rice.id, Some(&lot.id), -6, "below zero", &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    let err = engine
        .ledger()
        .adjust(&rice.id, Some("no-such-lot"), 1, "typo", &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LotNotFound(_)));

    assert_eq!(lot_quantity(&engine, &lot.id).await, 5);
}

#[tokio::test]
async fn test_adjust_product_without_lot() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let older = receive_at(&engine, &rice.id, 2, Utc::now() - Duration::days(5)).await;
    let newer = receive_at(&engine, &rice.id, 4, Utc::now() - Duration::days(1)).await;

    // Positive: a new lot for the found units
    let movements = engine
        .ledger()
        .adjust(&rice.id, None, 3, "found in backroom", &cashier())
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].new_quantity, 3);
    assert_eq!(engine.ledger().lots_for_product(&rice.id).await.unwrap().len(), 3);
    assert_eq!(engine.ledger().current_stock(&rice.id).await.unwrap(), 9);

    // Negative: consumed oldest first
    let movements = engine
        .ledger()
        .adjust(&rice.id, None, -3, "inventory count", &cashier())
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(lot_quantity(&engine, &older.id).await, 0);
    assert_eq!(lot_quantity(&engine, &newer.id).await, 3);

    // More than on hand: nothing changes
    let err = engine
        .ledger()
        .adjust(&rice.id, None, -7, "shrinkage", &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { requested: 7, available: 6, .. }));
    assert_eq!(engine.ledger().current_stock(&rice.id).await.unwrap(), 6);
    assert_eq!(engine.db().activity().count_kind("stock_adjusted").await.unwrap(), 3);
}

#[tokio::test]
async fn test_write_off() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 5).await;

    let movement = engine
        .ledger()
        .write_off(&lot.id, 2, "torn bags", &cashier())
        .await
        .unwrap();
    assert_eq!(movement.movement_type, MovementType::Waste);
    assert_eq!(movement.quantity, -2);
    assert_eq!(lot_quantity(&engine, &lot.id).await, 3);

    let err = engine
        .ledger()
        .write_off(&lot.id, 4, "flood", &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    let err = engine
        .ledger()
        .write_off("no-such-lot", 1, "flood", &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LotNotFound(_)));
}

// =============================================================================
// Blocking
// =============================================================================

#[tokio::test]
async fn test_blocked_lot_is_not_sold_or_counted() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    engine.ledger().block_lot(&lot.id, &supervisor()).await.unwrap();
    assert_eq!(engine.ledger().get_lot(&lot.id).await.unwrap().status, LotStatus::Blocked);
    assert_eq!(engine.ledger().current_stock(&rice.id).await.unwrap(), 0);

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap();
    assert_eq!(outcome.lines[0].allocated_quantity, 0);
    assert_eq!(lot_quantity(&engine, &lot.id).await, 5);

    // Quarantined goods can still be destroyed
    engine.ledger().write_off(&lot.id, 1, "recall", &supervisor()).await.unwrap();
    assert_eq!(engine.ledger().get_lot(&lot.id).await.unwrap().status, LotStatus::Blocked);

    engine.ledger().unblock_lot(&lot.id, &supervisor()).await.unwrap();
    let lot = engine.ledger().get_lot(&lot.id).await.unwrap();
    assert_eq!(lot.status, LotStatus::Available);
    assert_eq!(engine.ledger().current_stock(&rice.id).await.unwrap(), 4);

    let err = engine.ledger().block_lot("no-such-lot", &supervisor()).await.unwrap_err();
    assert!(matches!(err, EngineError::LotNotFound(_)));
}

#[tokio::test]
async fn test_low_stock_lists_products_at_threshold() {
    let engine = engine().await;
    let stocked = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let empty = product(&engine, "OIL", Money::from_major(500), 0).await;
    receive(&engine, &stocked.id, 5).await;

    let low = engine.ledger().low_stock().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].product_id, empty.id);
    assert_eq!(low[0].current_stock, 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sales_never_oversell_a_lot() {
    let (engine, _dir) = file_engine(5).await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 20).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let request = SaleRequest::new(&session.id, "XOF").line(&rice.id, 3);
        handles.push(tokio::spawn(async move {
            engine.settlement().create_sale(request, &cashier()).await
        }));
    }

    let mut allocated = 0;
    let mut short = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        allocated += outcome.lines[0].allocated_quantity;
        short += outcome.shortfalls.iter().map(|s| s.shortfall).sum::<i64>();
    }

    assert_eq!(allocated, 20);
    assert_eq!(short, 10);
    let lot = engine.ledger().get_lot(&lot.id).await.unwrap();
    assert_eq!(lot.current_quantity, 0);
    assert_eq!(lot.status, LotStatus::Depleted);
}

// =============================================================================
// Quantity Invariant
// =============================================================================

#[derive(Debug, Clone)]
enum LotOp {
    Allocate(i64),
    Release(i64),
    Adjust(i64),
    WriteOff(i64),
}

fn lot_op() -> impl Strategy<Value = LotOp> {
    prop_oneof![
        (1i64..6).prop_map(LotOp::Allocate),
        (1i64..6).prop_map(LotOp::Release),
        (-5i64..6).prop_filter("non-zero delta", |d| *d != 0).prop_map(LotOp::Adjust),
        (1i64..6).prop_map(LotOp::WriteOff),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_lot_quantity_stays_within_bounds(initial in 1i64..10, ops in prop::collection::vec(lot_op(), 1..15)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let engine = engine().await;
            let rice = product(&engine, "RICE", Money::from_major(100), 0).await;
            let lot = receive(&engine, &rice.id, initial).await;
            let actor = cashier();
            let ledger = engine.ledger();
            let mut expected = initial;

            for op in ops {
                match op {
                    LotOp::Allocate(q) => {
                        let plan = ledger.allocate(&rice.id, q, StockReference::adjustment(), &actor).await.unwrap();
                        assert_eq!(plan.allocated, q.min(expected));
                        expected -= plan.allocated;
                    }
                    LotOp::Release(q) => {
                        let result = ledger.release(&lot.id, q, StockReference::adjustment(), &actor).await;
                        if expected + q <= initial {
                            result.unwrap();
                            expected += q;
                        } else {
                            assert!(result.is_err());
                        }
                    }
                    LotOp::Adjust(delta) => {
                        let result = ledger.adjust(&rice.id, Some(&lot.id), delta, "count", &actor).await;
                        if (0..=initial).contains(&(expected + delta)) {
                            result.unwrap();
                            expected += delta;
                        } else {
                            assert!(result.is_err());
                        }
                    }
                    LotOp::WriteOff(q) => {
                        let result = ledger.write_off(&lot.id, q, "damaged", &actor).await;
                        if q <= expected {
                            result.unwrap();
                            expected -= q;
                        } else {
                            assert!(result.is_err());
                        }
                    }
                }

                let current = ledger.get_lot(&lot.id).await.unwrap();
                assert!(current.current_quantity >= 0);
                assert!(current.current_quantity <= current.initial_quantity);
                assert_eq!(current.current_quantity, expected);
                assert_eq!(current.status, LotStatus::for_quantity(expected));
            }
        });
    }
}
