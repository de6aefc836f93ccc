//! # Stock Lot Ledger
//!
//! Owns inventory quantities. Every quantity change is a compare-and-swap
//! on one lot plus one appended movement, inside the caller's transaction.
//!
//! ## Allocation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate(product, 7)        policy = FIFO                              │
//! │                                                                         │
//! │  allocatable lots          plan                  writes                 │
//! │  ─────────────────         ──────────────        ─────────────────────  │
//! │  L000001  3 (Jan)    ──►   L000001 × 3    ──►    take 3  + sale mvt     │
//! │  L000002  2 (Feb)    ──►   L000002 × 2    ──►    take 2  + sale mvt     │
//! │  L000003  blocked          (skipped)                                    │
//! │                            shortfall = 2   ──►   reported, not thrown   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale allocation and cancellation release run on the transaction owned by
//! the settlement engine and the cancellation handler; the ledger's own
//! operations (receive, adjust, write-off, block) open theirs.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use comptoir_core::allocation::{apportion_landed_costs, plan_allocation, LotCandidate, ReceiptLine};
use comptoir_core::validation::{validate_quantity, validate_reason, validate_required};
use comptoir_core::{
    ActivityEntry, ActivityEvent, Actor, AllocationPlan, AllocationPolicy, LotStatus, Money, MovementType,
    ReferenceType, StockLot, StockMovement, ValidationError,
};
use comptoir_db::{
    sequence, ActivityRepository, Database, LotRepository, LowStockRow, MovementRepository, ProductRepository,
    QuantityChange,
};

use crate::error::{EngineError, EngineResult};
use crate::retry::{run_with_retry, RetryPolicy};

// =============================================================================
// Requests
// =============================================================================

/// The business document a movement is recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockReference {
    pub kind: ReferenceType,
    pub id: Option<String>,
}

impl StockReference {
    pub fn sale(sale_id: impl Into<String>) -> Self {
        StockReference {
            kind: ReferenceType::Sale,
            id: Some(sale_id.into()),
        }
    }

    pub fn receipt(receipt_id: impl Into<String>) -> Self {
        StockReference {
            kind: ReferenceType::Receipt,
            id: Some(receipt_id.into()),
        }
    }

    pub fn adjustment() -> Self {
        StockReference {
            kind: ReferenceType::Adjustment,
            id: None,
        }
    }

    pub fn write_off() -> Self {
        StockReference {
            kind: ReferenceType::WriteOff,
            id: None,
        }
    }
}

/// One received line of goods.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Purchase price per unit, before landed costs.
    pub unit_cost_cents: i64,
    /// Defaults to now.
    pub received_at: Option<DateTime<Utc>>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub customs_ref: Option<String>,
}

impl ReceiptRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_cost_cents: i64) -> Self {
        ReceiptRequest {
            product_id: product_id.into(),
            quantity,
            unit_cost_cents,
            received_at: None,
            expiry_at: None,
            customs_ref: None,
        }
    }

    fn validate(&self) -> EngineResult<()> {
        validate_required("product_id", &self.product_id)?;
        validate_quantity(self.quantity)?;
        if self.unit_cost_cents < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "unit_cost".to_string(),
            }
            .into());
        }
        if let Some(customs_ref) = &self.customs_ref {
            validate_required("customs_ref", customs_ref)?;
        }
        Ok(())
    }
}

// =============================================================================
// Transaction-scoped Operations
// =============================================================================

fn movement_for(
    change: &QuantityChange,
    lot_id: &str,
    movement_type: MovementType,
    reference: &StockReference,
    reason: Option<&str>,
    actor_id: &str,
    now: DateTime<Utc>,
) -> StockMovement {
    StockMovement {
        id: Uuid::new_v4().to_string(),
        product_id: change.product_id.clone(),
        lot_id: lot_id.to_string(),
        movement_type,
        quantity: change.new - change.previous,
        previous_quantity: change.previous,
        new_quantity: change.new,
        reference_type: reference.kind,
        reference_id: reference.id.clone(),
        reason: reason.map(str::to_string),
        actor_id: actor_id.to_string(),
        occurred_at: now,
    }
}

/// Takes `quantity` units of a product from its lots in policy order.
///
/// Never fails for lack of stock: the plan reports the shortfall. A lot
/// that no longer holds what was planned means another writer got in
/// between, which is reported as transient so the caller retries.
pub(crate) async fn allocate_in(
    conn: &mut SqliteConnection,
    policy: AllocationPolicy,
    product_id: &str,
    quantity: i64,
    reference: &StockReference,
    actor_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<AllocationPlan> {
    let lots = LotRepository::allocatable(&mut *conn, product_id).await?;
    let candidates = lots.iter().map(LotCandidate::from).collect();
    let plan = plan_allocation(policy, candidates, quantity);

    for pick in &plan.picks {
        let change = LotRepository::take(&mut *conn, &pick.lot_id, pick.quantity, now)
            .await?
            .ok_or_else(|| EngineError::Transient(format!("lot {} changed during allocation", pick.lot_id)))?;

        let movement = movement_for(&change, &pick.lot_id, MovementType::Sale, reference, None, actor_id, now);
        MovementRepository::append(&mut *conn, &movement).await?;
    }

    if plan.shortfall > 0 {
        warn!(
            product_id = %product_id,
            requested = quantity,
            allocated = plan.allocated,
            shortfall = plan.shortfall,
            "Allocation short of stock"
        );
    } else {
        debug!(product_id = %product_id, quantity, lots = plan.picks.len(), "Allocated");
    }

    Ok(plan)
}

/// Puts `quantity` units back on a lot and records a return movement.
pub(crate) async fn release_in(
    conn: &mut SqliteConnection,
    lot_id: &str,
    quantity: i64,
    reference: &StockReference,
    actor_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<StockMovement> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let Some(change) = LotRepository::apply_delta(&mut *conn, lot_id, quantity, now).await? else {
        return Err(match LotRepository::find(&mut *conn, lot_id).await? {
            None => EngineError::LotNotFound(lot_id.to_string()),
            Some(lot) => ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: lot.initial_quantity - lot.current_quantity,
            }
            .into(),
        });
    };

    let movement = movement_for(&change, lot_id, MovementType::Return, reference, None, actor_id, now);
    MovementRepository::append(&mut *conn, &movement).await?;

    debug!(lot_id = %lot_id, quantity, new_quantity = change.new, "Released");
    Ok(movement)
}

/// Creates a lot from a receipt line with its landed unit cost.
async fn receive_in(
    conn: &mut SqliteConnection,
    request: &ReceiptRequest,
    unit_cost: Money,
    reference: &StockReference,
    actor: &Actor,
    now: DateTime<Utc>,
) -> EngineResult<StockLot> {
    let lot_number = sequence::next_lot_number(&mut *conn).await?;

    if ProductRepository::find(&mut *conn, &request.product_id).await?.is_none() {
        return Err(EngineError::not_found("Product", &request.product_id));
    }

    let lot = StockLot {
        id: Uuid::new_v4().to_string(),
        lot_number,
        product_id: request.product_id.clone(),
        initial_quantity: request.quantity,
        current_quantity: request.quantity,
        unit_cost_cents: unit_cost.cents(),
        received_at: request.received_at.unwrap_or(now),
        expiry_at: request.expiry_at,
        customs_ref: request.customs_ref.clone(),
        status: LotStatus::Available,
        created_at: now,
        updated_at: now,
    };
    LotRepository::insert(&mut *conn, &lot).await?;

    let change = QuantityChange {
        product_id: lot.product_id.clone(),
        previous: 0,
        new: lot.current_quantity,
    };
    let movement = movement_for(&change, &lot.id, MovementType::Entry, reference, None, &actor.id, now);
    MovementRepository::append(&mut *conn, &movement).await?;

    let mut entry = ActivityEntry::from(ActivityEvent::StockReceived {
        lot_id: lot.id.clone(),
        product_id: lot.product_id.clone(),
        quantity: lot.initial_quantity,
    });
    if let Some(receipt_id) = &reference.id {
        entry = entry.with("receipt_id", receipt_id.as_str());
    }
    ActivityRepository::append(&mut *conn, &entry, &actor.id).await?;

    Ok(lot)
}

// =============================================================================
// Stock Lot Ledger
// =============================================================================

/// Inventory ledger over stock lots.
///
/// ## Usage
/// ```rust,ignore
/// let lot = engine.ledger().receive(ReceiptRequest::new(&product.id, 5, 60_000), &actor).await?;
/// engine.ledger().write_off(&lot.id, 1, "broken bag", &actor).await?;
/// assert_eq!(engine.ledger().current_stock(&product.id).await?, 4);
/// ```
#[derive(Debug, Clone)]
pub struct StockLotLedger {
    db: Database,
    policy: AllocationPolicy,
    retry: RetryPolicy,
}

impl StockLotLedger {
    pub fn new(db: Database, policy: AllocationPolicy, retry: RetryPolicy) -> Self {
        StockLotLedger { db, policy, retry }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates stock outside a sale, in its own transaction.
    ///
    /// Sales allocate inside their own transaction; this entry point serves
    /// callers that reserve stock against another document.
    pub async fn allocate(
        &self,
        product_id: &str,
        quantity: i64,
        reference: StockReference,
        actor: &Actor,
    ) -> EngineResult<AllocationPlan> {
        validate_required("product_id", product_id)?;
        validate_quantity(quantity)?;

        let reference = &reference;
        run_with_retry(&self.retry, "allocate", move || {
            self.allocate_once(product_id, quantity, reference, actor)
        })
        .await
    }

    async fn allocate_once(
        &self,
        product_id: &str,
        quantity: i64,
        reference: &StockReference,
        actor: &Actor,
    ) -> EngineResult<AllocationPlan> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if !ProductRepository::touch(&mut tx, product_id, now).await? {
            return Err(EngineError::not_found("Product", product_id));
        }
        let plan = allocate_in(&mut tx, self.policy, product_id, quantity, reference, &actor.id, now).await?;

        tx.commit().await?;
        Ok(plan)
    }

    /// Returns `quantity` units to a lot.
    pub async fn release(
        &self,
        lot_id: &str,
        quantity: i64,
        reference: StockReference,
        actor: &Actor,
    ) -> EngineResult<StockMovement> {
        validate_required("lot_id", lot_id)?;
        validate_quantity(quantity)?;

        let reference = &reference;
        run_with_retry(&self.retry, "release", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;
            let movement = release_in(&mut tx, lot_id, quantity, reference, &actor.id, now).await?;
            tx.commit().await?;
            Ok(movement)
        })
        .await
    }

    // =========================================================================
    // Receipts
    // =========================================================================

    /// Goods receipt: one new lot and its entry movement.
    pub async fn receive(&self, request: ReceiptRequest, actor: &Actor) -> EngineResult<StockLot> {
        request.validate()?;

        let request = &request;
        let lot = run_with_retry(&self.retry, "receive", move || async move {
            let now = Utc::now();
            let reference = StockReference::receipt(Uuid::new_v4().to_string());
            let mut tx = self.db.begin().await?;
            let lot = receive_in(
                &mut tx,
                request,
                Money::from_cents(request.unit_cost_cents),
                &reference,
                actor,
                now,
            )
            .await?;
            tx.commit().await?;
            Ok(lot)
        })
        .await?;

        info!(lot_id = %lot.id, lot_number = %lot.lot_number, quantity = lot.initial_quantity, "Stock received");
        Ok(lot)
    }

    /// Receives a shipment, spreading `extra_cost` (freight, customs) over
    /// the lines pro-rata to their purchase value.
    ///
    /// All lots are created in one transaction under one receipt id.
    pub async fn receive_shipment(
        &self,
        lines: Vec<ReceiptRequest>,
        extra_cost: Money,
        actor: &Actor,
    ) -> EngineResult<Vec<StockLot>> {
        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt lines".to_string(),
            }
            .into());
        }
        if extra_cost.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "extra_cost".to_string(),
            }
            .into());
        }
        for line in &lines {
            line.validate()?;
        }

        let receipt_lines: Vec<ReceiptLine> = lines
            .iter()
            .map(|l| ReceiptLine {
                quantity: l.quantity,
                unit_cost: Money::from_cents(l.unit_cost_cents),
            })
            .collect();
        let landed = apportion_landed_costs(&receipt_lines, extra_cost);

        let lines = &lines;
        let landed = &landed;
        let lots = run_with_retry(&self.retry, "receive_shipment", move || async move {
            let now = Utc::now();
            let reference = StockReference::receipt(Uuid::new_v4().to_string());
            let mut tx = self.db.begin().await?;

            let mut lots = Vec::with_capacity(lines.len());
            for (line, cost) in lines.iter().zip(landed) {
                lots.push(receive_in(&mut tx, line, cost.landed_unit_cost, &reference, actor, now).await?);
            }

            tx.commit().await?;
            Ok(lots)
        })
        .await?;

        info!(lots = lots.len(), extra_cost = %extra_cost, "Shipment received");
        Ok(lots)
    }

    // =========================================================================
    // Corrections
    // =========================================================================

    /// Manual stock correction.
    ///
    /// ## Behaviour
    /// ```text
    /// with lot      delta applied to that lot, 0 ≤ new ≤ initial
    /// no lot, +n    new lot of n units (manual stock entry)
    /// no lot, −n    taken from lots in allocation order, all or nothing
    /// ```
    /// Every touched lot gets an `adjustment` movement.
    pub async fn adjust(
        &self,
        product_id: &str,
        lot_id: Option<&str>,
        delta: i64,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<Vec<StockMovement>> {
        validate_required("product_id", product_id)?;
        validate_quantity(delta.saturating_abs())?;
        validate_reason(reason)?;

        let movements = run_with_retry(&self.retry, "adjust", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let movements = match lot_id {
                Some(lot_id) => vec![Self::adjust_lot(&mut tx, product_id, lot_id, delta, reason, actor, now).await?],
                None => self.adjust_product(&mut tx, product_id, delta, reason, actor, now).await?,
            };

            for movement in &movements {
                let entry = ActivityEntry::from(ActivityEvent::StockAdjusted {
                    product_id: movement.product_id.clone(),
                    lot_id: movement.lot_id.clone(),
                    delta: movement.quantity,
                    reason: reason.to_string(),
                });
                ActivityRepository::append(&mut tx, &entry, &actor.id).await?;
            }

            tx.commit().await?;
            Ok(movements)
        })
        .await?;

        info!(product_id = %product_id, delta, lots = movements.len(), "Stock adjusted");
        Ok(movements)
    }

    async fn adjust_lot(
        conn: &mut SqliteConnection,
        product_id: &str,
        lot_id: &str,
        delta: i64,
        reason: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> EngineResult<StockMovement> {
        let Some(change) = LotRepository::apply_delta(&mut *conn, lot_id, delta, now).await? else {
            let lot = LotRepository::find(&mut *conn, lot_id)
                .await?
                .ok_or_else(|| EngineError::LotNotFound(lot_id.to_string()))?;
            return Err(if delta < 0 {
                EngineError::InsufficientStock {
                    subject: lot_id.to_string(),
                    requested: -delta,
                    available: lot.current_quantity,
                }
            } else {
                ValidationError::OutOfRange {
                    field: "delta".to_string(),
                    min: -lot.current_quantity,
                    max: lot.initial_quantity - lot.current_quantity,
                }
                .into()
            });
        };

        if change.product_id != product_id {
            // dropping the transaction undoes the update
            return Err(ValidationError::InvalidFormat {
                field: "lot_id".to_string(),
                reason: format!("lot {lot_id} belongs to another product"),
            }
            .into());
        }

        let movement = movement_for(
            &change,
            lot_id,
            MovementType::Adjustment,
            &StockReference::adjustment(),
            Some(reason),
            &actor.id,
            now,
        );
        MovementRepository::append(&mut *conn, &movement).await?;
        Ok(movement)
    }

    async fn adjust_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
        reason: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<StockMovement>> {
        if !ProductRepository::touch(&mut *conn, product_id, now).await? {
            return Err(EngineError::not_found("Product", product_id));
        }
        let reference = StockReference::adjustment();

        if delta > 0 {
            let lot = StockLot {
                id: Uuid::new_v4().to_string(),
                lot_number: sequence::next_lot_number(&mut *conn).await?,
                product_id: product_id.to_string(),
                initial_quantity: delta,
                current_quantity: delta,
                unit_cost_cents: 0,
                received_at: now,
                expiry_at: None,
                customs_ref: None,
                status: LotStatus::Available,
                created_at: now,
                updated_at: now,
            };
            LotRepository::insert(&mut *conn, &lot).await?;

            let change = QuantityChange {
                product_id: product_id.to_string(),
                previous: 0,
                new: delta,
            };
            let movement = movement_for(
                &change,
                &lot.id,
                MovementType::Adjustment,
                &reference,
                Some(reason),
                &actor.id,
                now,
            );
            MovementRepository::append(&mut *conn, &movement).await?;
            return Ok(vec![movement]);
        }

        let wanted = -delta;
        let lots = LotRepository::allocatable(&mut *conn, product_id).await?;
        let plan = plan_allocation(self.policy, lots.iter().map(LotCandidate::from).collect(), wanted);
        if !plan.is_complete() {
            return Err(EngineError::InsufficientStock {
                subject: product_id.to_string(),
                requested: wanted,
                available: plan.allocated,
            });
        }

        let mut movements = Vec::with_capacity(plan.picks.len());
        for pick in &plan.picks {
            let change = LotRepository::take(&mut *conn, &pick.lot_id, pick.quantity, now)
                .await?
                .ok_or_else(|| EngineError::Transient(format!("lot {} changed during adjustment", pick.lot_id)))?;
            let movement = movement_for(
                &change,
                &pick.lot_id,
                MovementType::Adjustment,
                &reference,
                Some(reason),
                &actor.id,
                now,
            );
            MovementRepository::append(&mut *conn, &movement).await?;
            movements.push(movement);
        }
        Ok(movements)
    }

    /// Writes off damaged, expired or missing units of one lot.
    ///
    /// Works on blocked lots too: quarantined goods are usually the ones
    /// being destroyed.
    pub async fn write_off(&self, lot_id: &str, quantity: i64, reason: &str, actor: &Actor) -> EngineResult<StockMovement> {
        validate_required("lot_id", lot_id)?;
        validate_quantity(quantity)?;
        validate_reason(reason)?;

        let movement = run_with_retry(&self.retry, "write_off", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let Some(change) = LotRepository::apply_delta(&mut tx, lot_id, -quantity, now).await? else {
                let lot = LotRepository::find(&mut tx, lot_id)
                    .await?
                    .ok_or_else(|| EngineError::LotNotFound(lot_id.to_string()))?;
                return Err(EngineError::InsufficientStock {
                    subject: lot_id.to_string(),
                    requested: quantity,
                    available: lot.current_quantity,
                });
            };

            let movement = movement_for(
                &change,
                lot_id,
                MovementType::Waste,
                &StockReference::write_off(),
                Some(reason),
                &actor.id,
                now,
            );
            MovementRepository::append(&mut tx, &movement).await?;

            let entry = ActivityEntry::from(ActivityEvent::StockWrittenOff {
                lot_id: lot_id.to_string(),
                quantity,
                reason: reason.to_string(),
            });
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            tx.commit().await?;
            Ok(movement)
        })
        .await?;

        info!(lot_id = %lot_id, quantity, "Stock written off");
        Ok(movement)
    }

    // =========================================================================
    // Blocking
    // =========================================================================

    /// Excludes a lot from allocation and stock on hand. Idempotent.
    pub async fn block_lot(&self, lot_id: &str, actor: &Actor) -> EngineResult<()> {
        self.set_blocked(lot_id, true, actor).await
    }

    /// Makes a blocked lot allocatable again.
    pub async fn unblock_lot(&self, lot_id: &str, actor: &Actor) -> EngineResult<()> {
        self.set_blocked(lot_id, false, actor).await
    }

    async fn set_blocked(&self, lot_id: &str, blocked: bool, actor: &Actor) -> EngineResult<()> {
        validate_required("lot_id", lot_id)?;
        let operation = if blocked { "block_lot" } else { "unblock_lot" };

        run_with_retry(&self.retry, operation, move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let found = if blocked {
                LotRepository::block(&mut tx, lot_id, now).await?
            } else {
                LotRepository::unblock(&mut tx, lot_id, now).await?
            };
            if !found {
                return Err(EngineError::LotNotFound(lot_id.to_string()));
            }

            let event = if blocked {
                ActivityEvent::LotBlocked {
                    lot_id: lot_id.to_string(),
                }
            } else {
                ActivityEvent::LotUnblocked {
                    lot_id: lot_id.to_string(),
                }
            };
            ActivityRepository::append(&mut tx, &event.into(), &actor.id).await?;

            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(lot_id = %lot_id, blocked, "Lot status changed");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Units on hand over non-blocked lots.
    pub async fn current_stock(&self, product_id: &str) -> EngineResult<i64> {
        Ok(self.db.lots().current_stock(product_id).await?)
    }

    pub async fn get_lot(&self, lot_id: &str) -> EngineResult<StockLot> {
        self.db
            .lots()
            .get(lot_id)
            .await?
            .ok_or_else(|| EngineError::LotNotFound(lot_id.to_string()))
    }

    pub async fn lots_for_product(&self, product_id: &str) -> EngineResult<Vec<StockLot>> {
        Ok(self.db.lots().for_product(product_id).await?)
    }

    pub async fn movements_for_lot(&self, lot_id: &str) -> EngineResult<Vec<StockMovement>> {
        Ok(self.db.lots().movements_for_lot(lot_id).await?)
    }

    /// Active products at or below their low-stock threshold.
    pub async fn low_stock(&self) -> EngineResult<Vec<LowStockRow>> {
        Ok(self.db.products().low_stock().await?)
    }
}
