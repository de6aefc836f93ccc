//! # Sale Cancellation Handler
//!
//! Reverses a pending or completed sale in one transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cancel(sale, reason)                                                   │
//! │                                                                         │
//! │  1. UPDATE sales → cancelled        only from pending / completed       │
//! │  2. every SaleLineAllocation        → release onto its own lot          │
//! │                                       + return movement                 │
//! │  3. completed / pending payments    → refunded                          │
//! │  4. SaleCancelled activity          reason + actor                      │
//! │  5. COMMIT                                                              │
//! │                                                                         │
//! │  A failure at any step leaves the sale, its lots and its payments       │
//! │  exactly as they were.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use comptoir_core::validation::{validate_reason, validate_required};
use comptoir_core::{ActivityEntry, ActivityEvent, Actor, Sale, SaleStatus, StockMovement, ValidationError};
use comptoir_db::{ActivityRepository, Database, SaleRepository};

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::ledger::{release_in, StockReference};
use crate::retry::{run_with_retry, RetryPolicy};

/// Result of [`SaleCancellationHandler::cancel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub sale: Sale,
    /// Units put back on lots, across all lines.
    pub units_returned: i64,
    pub payments_refunded: usize,
    /// One return movement per released allocation.
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Clone)]
pub struct SaleCancellationHandler {
    db: Database,
    retry: RetryPolicy,
}

impl SaleCancellationHandler {
    pub fn new(db: Database, retry: RetryPolicy) -> Self {
        SaleCancellationHandler { db, retry }
    }

    /// Cancels a sale, returning its stock and refunding its payments.
    ///
    /// ## Errors
    /// - `NotFound` if the sale does not exist
    /// - `AlreadyCancelled` if it was cancelled before
    /// - `SaleNotCancellable` if it was refunded
    /// - `LotCapacityExceeded` if a lot was refilled past what the sale took
    pub async fn cancel(&self, sale_id: &str, reason: &str, actor: &Actor) -> EngineResult<CancellationOutcome> {
        validate_required("sale_id", sale_id)?;
        validate_reason(reason)?;

        let result = run_with_retry(&self.retry, "cancel_sale", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let Some(sale) = SaleRepository::mark_cancelled(&mut tx, sale_id, reason, now).await? else {
                return Err(match SaleRepository::find(&mut tx, sale_id).await? {
                    None => EngineError::not_found("Sale", sale_id),
                    Some(s) if s.status == SaleStatus::Cancelled => EngineError::AlreadyCancelled(s.id),
                    Some(s) => EngineError::SaleNotCancellable {
                        sale_id: s.id,
                        status: s.status,
                    },
                });
            };

            let reference = StockReference::sale(&sale.id);
            let allocations = SaleRepository::allocations_for(&mut tx, &sale.id).await?;
            let mut movements = Vec::with_capacity(allocations.len());
            for allocation in &allocations {
                let movement = release_in(&mut tx, &allocation.lot_id, allocation.quantity, &reference, &actor.id, now)
                    .await
                    .map_err(|err| match err {
                        EngineError::Validation(ValidationError::OutOfRange { max, .. }) => {
                            EngineError::LotCapacityExceeded {
                                lot_id: allocation.lot_id.clone(),
                                quantity: allocation.quantity,
                                room: max,
                            }
                        }
                        other => other,
                    })?;
                movements.push(movement);
            }
            let units_returned = allocations.iter().map(|a| a.quantity).sum();

            let payments_refunded = SaleRepository::refund_payments(&mut tx, &sale.id, now).await? as usize;

            let entry = ActivityEntry::from(ActivityEvent::SaleCancelled {
                sale_id: sale.id.clone(),
                reason: reason.to_string(),
                units_returned,
                payments_refunded,
            })
            .with("ticket_number", sale.ticket_number.as_str());
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            tx.commit().await?;
            Ok(CancellationOutcome {
                sale,
                units_returned,
                payments_refunded,
                movements,
            })
        })
        .await;

        match &result {
            Ok(outcome) => info!(
                sale_id = %sale_id,
                units_returned = outcome.units_returned,
                payments_refunded = outcome.payments_refunded,
                cancelled_by = %actor.id,
                "Sale cancelled"
            ),
            Err(err) if err.kind() == ErrorKind::Fatal => {
                error!(sale_id = %sale_id, error = %err, "Cancellation rolled back")
            }
            Err(_) => {}
        }
        result
    }
}
