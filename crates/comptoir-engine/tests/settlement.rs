//! Sale settlement scenarios.

mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use comptoir_core::currency::revert_with_rate;
use comptoir_core::{
    AllocationPolicy, LotStatus, Money, OversellPolicy, PaymentMethod, PaymentStatus, SaleStatus, ValidationError,
};
use comptoir_db::NewProduct;
use comptoir_engine::{EngineError, ErrorKind, GatewayOutcome, PaymentRequest, SaleRequest};

use common::*;

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_cash_sale_with_vat_completes() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    let lot = receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::from_major(10_000)).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::cash(Money::from_major(2360).cents())),
            &cashier(),
        )
        .await
        .unwrap();

    let sale = &outcome.sale;
    assert_eq!(sale.subtotal_cents, Money::from_major(2000).cents());
    assert_eq!(sale.tax_cents, Money::from_major(360).cents());
    assert_eq!(sale.total_base(), Money::from_major(2360));
    assert_eq!(sale.status, SaleStatus::Completed);
    assert!(sale.completed_at.is_some());
    assert_eq!(sale.exchange_rate_to_base, dec!(1));

    assert!(!outcome.has_shortfall());
    assert_eq!(outcome.balance_due_base(), Money::zero());
    assert_eq!(outcome.change_due_base(), Money::zero());
    assert_eq!(outcome.lines[0].lot_id.as_deref(), Some(lot.id.as_str()));
    assert_eq!(outcome.lines[0].allocated_quantity, 2);

    assert_eq!(lot_quantity(&engine, &lot.id).await, 3);
}

#[tokio::test]
async fn test_sale_is_persisted_with_details_and_activity() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 1)
                .payment(PaymentRequest::cash(Money::from_major(1180).cents())),
            &cashier(),
        )
        .await
        .unwrap();

    let details = engine.settlement().get_sale(&outcome.sale.id).await.unwrap();
    assert_eq!(details.sale.id, outcome.sale.id);
    assert_eq!(details.sale.ticket_number, outcome.sale.ticket_number);
    assert_eq!(details.sale.status, SaleStatus::Completed);
    assert_eq!(details.sale.total_base_cents, outcome.sale.total_base_cents);
    assert_eq!(details.lines.len(), 1);
    assert_eq!(details.allocations.len(), 1);
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].status, PaymentStatus::Completed);

    let activity = engine.db().activity();
    assert_eq!(activity.count_kind("sale_created").await.unwrap(), 1);
    assert_eq!(activity.count_kind("payment_recorded").await.unwrap(), 1);
    assert_eq!(activity.count_kind("sale_completed").await.unwrap(), 1);
}

#[tokio::test]
async fn test_ticket_numbers_are_unique() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(100), 0).await;
    receive(&engine, &rice.id, 10).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let first = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap();
    let second = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap();

    assert_ne!(first.sale.ticket_number, second.sale.ticket_number);
    assert!(first.sale.ticket_number.starts_with('T'));
    assert!(first.sale.ticket_number < second.sale.ticket_number);
}

#[tokio::test]
async fn test_line_spans_lots_oldest_first() {
    let engine = engine().await;
    let oil = product(&engine, "OIL", Money::from_major(500), 0).await;
    let newer = receive_at(&engine, &oil.id, 5, Utc::now() - Duration::days(1)).await;
    let older = receive_at(&engine, &oil.id, 2, Utc::now() - Duration::days(10)).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&oil.id, 4), &cashier())
        .await
        .unwrap();

    assert_eq!(outcome.lines[0].lot_id.as_deref(), Some(older.id.as_str()));
    assert_eq!(outcome.allocations.len(), 2);
    assert_eq!(outcome.allocations[0].lot_id, older.id);
    assert_eq!(outcome.allocations[0].quantity, 2);
    assert_eq!(outcome.allocations[1].lot_id, newer.id);
    assert_eq!(outcome.allocations[1].quantity, 2);

    let older = engine.ledger().get_lot(&older.id).await.unwrap();
    assert_eq!(older.current_quantity, 0);
    assert_eq!(older.status, LotStatus::Depleted);
    assert_eq!(lot_quantity(&engine, &newer.id).await, 3);
}

#[tokio::test]
async fn test_discounts_reduce_total() {
    let engine = engine().await;
    let soap = product(&engine, "SOAP", Money::from_major(1000), 1800).await;
    receive(&engine, &soap.id, 10).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .discounted_line(&soap.id, 2, Money::from_major(200).cents())
                .discount(Money::from_major(100).cents()),
            &cashier(),
        )
        .await
        .unwrap();

    // line 2000 - 200 = 1800, tax 324, sale discount 100
    let sale = &outcome.sale;
    assert_eq!(sale.subtotal_cents, Money::from_major(1800).cents());
    assert_eq!(sale.tax_cents, Money::from_major(324).cents());
    assert_eq!(sale.discount_cents, Money::from_major(100).cents());
    assert_eq!(sale.total_cents, Money::from_major(2024).cents());
    assert_eq!(sale.status, SaleStatus::Pending);
}

// =============================================================================
// Shortfall
// =============================================================================

#[tokio::test]
async fn test_shortfall_is_reported_under_backorder_policy() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    let lot = receive(&engine, &rice.id, 1).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::cash(Money::from_major(2360).cents())),
            &cashier(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.shortfalls.len(), 1);
    let shortfall = &outcome.shortfalls[0];
    assert_eq!(shortfall.line_no, 1);
    assert_eq!(shortfall.requested, 2);
    assert_eq!(shortfall.allocated, 1);
    assert_eq!(shortfall.shortfall, 1);
    assert_eq!(outcome.lines[0].allocated_quantity, 1);
    assert_eq!(outcome.sale.status, SaleStatus::Completed);

    let lot = engine.ledger().get_lot(&lot.id).await.unwrap();
    assert_eq!(lot.current_quantity, 0);
    assert_eq!(lot.status, LotStatus::Depleted);
}

#[tokio::test]
async fn test_line_without_stock_is_recorded_unallocated() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 3), &cashier())
        .await
        .unwrap();

    assert_eq!(outcome.lines[0].lot_id, None);
    assert_eq!(outcome.lines[0].allocated_quantity, 0);
    assert!(outcome.allocations.is_empty());
    assert_eq!(outcome.shortfalls[0].shortfall, 3);
}

#[tokio::test]
async fn test_reject_policy_rolls_back_whole_sale() {
    let engine = engine_with(config_with(AllocationPolicy::Fifo, OversellPolicy::Reject)).await;
    let soap = product(&engine, "SOAP", Money::from_major(500), 0).await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let soap_lot = receive(&engine, &soap.id, 5).await;
    let rice_lot = receive(&engine, &rice.id, 1).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF").line(&soap.id, 2).line(&rice.id, 2),
            &cashier(),
        )
        .await
        .unwrap_err();

    match &err {
        EngineError::InsufficientStock {
            subject,
            requested,
            available,
        } => {
            assert_eq!(subject, &rice.id);
            assert_eq!(*requested, 2);
            assert_eq!(*available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // The first line's allocation went down with the transaction
    assert_eq!(lot_quantity(&engine, &soap_lot.id).await, 5);
    assert_eq!(lot_quantity(&engine, &rice_lot.id).await, 1);
    assert_eq!(engine.db().activity().count_kind("sale_created").await.unwrap(), 0);
    assert_eq!(engine.ledger().movements_for_lot(&soap_lot.id).await.unwrap().len(), 1);
}

// =============================================================================
// Currencies
// =============================================================================

#[tokio::test]
async fn test_foreign_currency_sale_round_trips_to_base() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "EUR").line(&rice.id, 1), &cashier())
        .await
        .unwrap();

    let sale = &outcome.sale;
    assert_eq!(sale.currency_code, "EUR");
    assert_eq!(sale.exchange_rate_to_base, dec!(655.957));
    // 1000.00 XOF / 655.957 = 1.5244… → 1.52 EUR
    assert_eq!(outcome.lines[0].unit_price_cents, 152);
    assert_eq!(sale.total_cents, 152);
    // 1.52 × 655.957 = 997.0546… → 997.05 XOF
    assert_eq!(sale.total_base_cents, 99_705);

    let back = revert_with_rate(sale.total_base(), sale.exchange_rate_to_base).unwrap();
    assert!((back.cents() - sale.total_cents).abs() <= 1);
}

#[tokio::test]
async fn test_sale_price_in_own_currency_is_preferred() {
    let engine = engine().await;
    let coffee = engine
        .db()
        .products()
        .create(&NewProduct {
            sku: "COFFEE".to_string(),
            name: "Coffee".to_string(),
            tax_rate_bps: 0,
            min_stock: 0,
            max_stock: None,
            prices: vec![("XOF".to_string(), 175_000), ("EUR".to_string(), 275)],
        })
        .await
        .unwrap();
    receive(&engine, &coffee.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "EUR").line(&coffee.id, 2), &cashier())
        .await
        .unwrap();

    assert_eq!(outcome.lines[0].unit_price_cents, 275);
    assert_eq!(outcome.sale.total_cents, 550);
}

#[tokio::test]
async fn test_payment_in_other_currency_records_change() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::cash(360).in_currency("EUR")),
            &cashier(),
        )
        .await
        .unwrap();

    // 3.60 EUR × 655.957 = 2361.4452 → 2361.45 XOF against 2360.00 due
    let payment = &outcome.payments[0];
    assert_eq!(payment.currency_code, "EUR");
    assert_eq!(payment.exchange_rate, dec!(655.957));
    assert_eq!(payment.amount_base_cents, 236_145);
    assert_eq!(payment.change_base_cents, 145);
    assert_eq!(outcome.change_due_base(), Money::from_cents(145));
    assert_eq!(outcome.sale.status, SaleStatus::Completed);
}

#[tokio::test]
async fn test_unknown_currency_is_rejected() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "GBP").line(&rice.id, 1), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownCurrency(ref code) if code == "GBP"));

    engine.set_currency("EUR", "Euro", dec!(655.957), false).await.unwrap();
    let err = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "EUR").line(&rice.id, 1), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownCurrency(_)));
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_sale_without_lines_is_rejected() {
    let engine = engine().await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF"), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::NoLines)));
}

#[tokio::test]
async fn test_sale_on_closed_or_missing_session_is_rejected() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;
    engine
        .sessions()
        .close_session(&session.id, Money::zero(), &cashier())
        .await
        .unwrap();

    let err = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionInvalid { .. }));
    assert_eq!(err.kind(), ErrorKind::State);

    let err = engine
        .settlement()
        .create_sale(SaleRequest::new("no-such-session", "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_failure_on_later_line_leaves_stock_untouched() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    let lot = receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF").line(&rice.id, 2).line("no-such-product", 1),
            &cashier(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(lot_quantity(&engine, &lot.id).await, 5);
    assert_eq!(engine.ledger().movements_for_lot(&lot.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_product_without_price_is_rejected() {
    let engine = engine().await;
    let unpriced = engine
        .db()
        .products()
        .create(&NewProduct {
            sku: "FREE".to_string(),
            name: "Unpriced".to_string(),
            tax_rate_bps: 0,
            min_stock: 0,
            max_stock: None,
            prices: vec![],
        })
        .await
        .unwrap();
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&unpriced.id, 1), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoPrice { .. }));
}

#[tokio::test]
async fn test_oversized_discount_is_rejected() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(100), 0).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF").discounted_line(&rice.id, 1, Money::from_major(101).cents()),
            &cashier(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::DiscountTooLarge { .. })));

    let err = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 1)
                .discount(Money::from_major(150).cents()),
            &cashier(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::DiscountTooLarge { .. })));
}

#[tokio::test]
async fn test_cash_cannot_await_gateway() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(100), 0).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 1)
                .payment(PaymentRequest::cash(10_000).awaiting_gateway("TX-1")),
            &cashier(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// =============================================================================
// Partial Payments
// =============================================================================

#[tokio::test]
async fn test_partial_payment_then_add_payment_completes() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::new(PaymentMethod::Card, Money::from_major(1000).cents())),
            &cashier(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.sale.status, SaleStatus::Pending);
    assert_eq!(outcome.balance_due_base(), Money::from_major(1360));

    let added = engine
        .settlement()
        .add_payment(&outcome.sale.id, PaymentRequest::cash(Money::from_major(2000).cents()), &cashier())
        .await
        .unwrap();

    assert_eq!(added.sale.status, SaleStatus::Completed);
    assert_eq!(added.payment.change_base_cents, Money::from_major(640).cents());
    assert_eq!(added.settlement.change_due_base, Money::from_major(640));
    assert!(added.settlement.is_settled());

    let err = engine
        .settlement()
        .add_payment(&outcome.sale.id, PaymentRequest::cash(100), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SaleNotPending { status: SaleStatus::Completed, .. }));
}

#[tokio::test]
async fn test_add_payment_needs_open_session() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(SaleRequest::new(&session.id, "XOF").line(&rice.id, 1), &cashier())
        .await
        .unwrap();
    engine
        .sessions()
        .close_session(&session.id, Money::zero(), &cashier())
        .await
        .unwrap();

    let err = engine
        .settlement()
        .add_payment(&outcome.sale.id, PaymentRequest::cash(100_000), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionInvalid { .. }));

    let err = engine
        .settlement()
        .add_payment("no-such-sale", PaymentRequest::cash(100_000), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Gateway Payments
// =============================================================================

#[tokio::test]
async fn test_gateway_payment_completes_sale_on_confirmation() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF").line(&rice.id, 2).payment(
                PaymentRequest::new(PaymentMethod::MobileMoney, Money::from_major(2360).cents())
                    .awaiting_gateway("MM-0001"),
            ),
            &cashier(),
        )
        .await
        .unwrap();

    let payment = &outcome.payments[0];
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.reference.as_deref(), Some("MM-0001"));
    assert_eq!(outcome.sale.status, SaleStatus::Pending);
    assert_eq!(outcome.amount_paid_base(), Money::zero());

    let confirmed = engine
        .settlement()
        .confirm_gateway_payment(&payment.id, GatewayOutcome::Completed, &cashier())
        .await
        .unwrap();
    assert_eq!(confirmed.payment.status, PaymentStatus::Completed);
    assert_eq!(confirmed.sale.status, SaleStatus::Completed);

    let err = engine
        .settlement()
        .confirm_gateway_payment(&payment.id, GatewayOutcome::Completed, &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PaymentNotPending { status: PaymentStatus::Completed, .. }));
}

#[tokio::test]
async fn test_failed_gateway_payment_leaves_sale_pending() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let outcome = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 1)
                .payment(PaymentRequest::new(PaymentMethod::Card, 100_000).awaiting_gateway("TPE-42")),
            &cashier(),
        )
        .await
        .unwrap();

    let failed = engine
        .settlement()
        .confirm_gateway_payment(&outcome.payments[0].id, GatewayOutcome::Failed, &cashier())
        .await
        .unwrap();
    assert_eq!(failed.payment.status, PaymentStatus::Failed);
    assert_eq!(failed.sale.status, SaleStatus::Pending);
    assert_eq!(failed.settlement.balance_due_base, Money::from_major(1000));

    let err = engine
        .settlement()
        .confirm_gateway_payment("no-such-payment", GatewayOutcome::Completed, &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Currencies
// =============================================================================

#[tokio::test]
async fn test_base_currency_is_pinned_and_rates_positive() {
    let engine = engine().await;

    let err = engine.set_currency("XOF", "Franc CFA", dec!(2), true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = engine.set_currency("XOF", "Franc CFA", dec!(1), false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = engine.set_currency("USD", "Dollar", dec!(0), true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    engine.set_currency("USD", "Dollar", dec!(600), true).await.unwrap();
    let codes: Vec<String> = engine
        .active_currencies()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.code)
        .collect();
    assert!(codes.contains(&"USD".to_string()));

    let fx = engine.converter().await.unwrap();
    assert_eq!(fx.convert_to_base(Money::from_major(10), "USD").unwrap(), Money::from_major(6000));
}
