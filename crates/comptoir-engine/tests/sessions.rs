//! Cash session lifecycle and reconciliation.

mod common;

use comptoir_core::{Money, PaymentMethod, SessionStatus};
use comptoir_engine::{EngineError, ErrorKind, PaymentRequest, SaleRequest};

use common::*;

#[tokio::test]
async fn test_second_open_session_on_register_conflicts() {
    let engine = engine().await;
    let first = open_session(&engine, "REG-R", Money::from_major(10_000)).await;
    assert_eq!(first.status, SessionStatus::Open);
    assert_eq!(first.operator_id, "cashier-1");

    let err = engine
        .sessions()
        .open_session("REG-R", Money::from_major(5_000), &supervisor())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RegisterAlreadyOpen { ref register_id } if register_id == "REG-R"));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Other registers are independent
    open_session(&engine, "REG-S", Money::zero()).await;

    let current = engine.sessions().current_session("REG-R").await.unwrap().unwrap();
    assert_eq!(current.id, first.id);
}

#[tokio::test]
async fn test_register_reopens_after_close() {
    let engine = engine().await;
    let first = open_session(&engine, "REG-1", Money::zero()).await;
    engine
        .sessions()
        .close_session(&first.id, Money::zero(), &cashier())
        .await
        .unwrap();
    assert!(engine.sessions().current_session("REG-1").await.unwrap().is_none());

    let second = open_session(&engine, "REG-1", Money::zero()).await;
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn test_close_computes_expected_cash_and_variance() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 1800).await;
    receive(&engine, &rice.id, 5).await;
    let session = open_session(&engine, "REG-1", Money::from_major(10_000)).await;

    engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::cash(Money::from_major(2360).cents())),
            &cashier(),
        )
        .await
        .unwrap();

    let closed = engine
        .sessions()
        .close_session(&session.id, Money::from_major(12_000), &cashier())
        .await
        .unwrap();

    assert_eq!(closed.status, SessionStatus::Closed);
    assert_eq!(closed.expected_cash_cents, Some(Money::from_major(12_360).cents()));
    assert_eq!(closed.closing_cash_cents, Some(Money::from_major(12_000).cents()));
    assert_eq!(closed.variance_cents, Some(Money::from_major(-360).cents()));
    assert!(closed.closed_at.is_some());
}

#[tokio::test]
async fn test_expected_cash_ignores_card_and_nets_change() {
    let engine = engine().await;
    let rice = product(&engine, "RICE", Money::from_major(1000), 0).await;
    receive(&engine, &rice.id, 10).await;
    let session = open_session(&engine, "REG-1", Money::from_major(5_000)).await;

    // Card only
    engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 1)
                .payment(PaymentRequest::new(PaymentMethod::Card, Money::from_major(1000).cents())),
            &cashier(),
        )
        .await
        .unwrap();

    // 5000 tendered for 2000, 3000 handed back
    let sale = engine
        .settlement()
        .create_sale(
            SaleRequest::new(&session.id, "XOF")
                .line(&rice.id, 2)
                .payment(PaymentRequest::cash(Money::from_major(5000).cents())),
            &cashier(),
        )
        .await
        .unwrap();
    assert_eq!(sale.payments[0].change_base_cents, Money::from_major(3000).cents());

    let closed = engine
        .sessions()
        .close_session(&session.id, Money::from_major(7_000), &cashier())
        .await
        .unwrap();
    assert_eq!(closed.expected_cash_cents, Some(Money::from_major(7_000).cents()));
    assert_eq!(closed.variance_cents, Some(0));
}

#[tokio::test]
async fn test_session_transitions_are_one_way() {
    let engine = engine().await;
    let session = open_session(&engine, "REG-1", Money::zero()).await;

    let err = engine
        .sessions()
        .validate_session(&session.id, &supervisor())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotClosed { status: SessionStatus::Open, .. }));

    engine
        .sessions()
        .close_session(&session.id, Money::zero(), &cashier())
        .await
        .unwrap();

    let err = engine
        .sessions()
        .close_session(&session.id, Money::zero(), &cashier())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotOpen { status: SessionStatus::Closed, .. }));
    assert_eq!(err.kind(), ErrorKind::State);

    let validated = engine
        .sessions()
        .validate_session(&session.id, &supervisor())
        .await
        .unwrap();
    assert_eq!(validated.status, SessionStatus::Validated);
    assert_eq!(validated.validated_by.as_deref(), Some("supervisor-1"));

    let err = engine
        .sessions()
        .validate_session(&session.id, &supervisor())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotClosed { status: SessionStatus::Validated, .. }));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let engine = engine().await;

    let err = engine
        .sessions()
        .close_session("no-such-session", Money::zero(), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.sessions().get_session("no-such-session").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_negative_opening_cash_is_rejected() {
    let engine = engine().await;
    let err = engine
        .sessions()
        .open_session("REG-1", Money::from_cents(-1), &cashier())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_leave_one_open_session() {
    let (engine, _dir) = file_engine(5).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let actor = comptoir_core::Actor::new(format!("cashier-{i}"), "cashier");
            engine.sessions().open_session("REG-RACE", Money::zero(), &actor).await
        }));
    }

    let mut opened = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(EngineError::RegisterAlreadyOpen { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(opened, 1);
    assert!(engine.sessions().current_session("REG-RACE").await.unwrap().is_some());
}
