//! # Sale Settlement Engine
//!
//! Records sales: session check, pricing, stock allocation, totals and
//! payments, all in one transaction.
//!
//! ## create_sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ONE TRANSACTION PER SALE                             │
//! │                                                                         │
//! │  1. reserve ticket number          (first write, takes the lock)        │
//! │  2. session must be OPEN           else SessionInvalid                  │
//! │  3. snapshot active rates          rate of the sale currency kept       │
//! │  4. per line, in submitted order:                                       │
//! │       price  → product price in sale currency, or base price converted │
//! │       tax    → line_total × rate, half-up                               │
//! │       stock  → ledger allocation, shortfall reported or rejected        │
//! │  5. totals   → subtotal − discount + tax, converted to base             │
//! │  6. INSERT sale (pending), lines, lot allocations                       │
//! │  7. payments → each converted at its own currency's rate                │
//! │  8. Σ completed ≥ total_base  ⇒  completed                              │
//! │  9. activity log, COMMIT                                                │
//! │                                                                         │
//! │  Any error on the way: ROLLBACK, nothing of the sale remains.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Card and mobile money payments flagged `awaiting_gateway` are stored
//! pending; the gateway callback lands later through
//! [`SaleSettlementEngine::confirm_gateway_payment`], in its own transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use comptoir_core::pricing::{compute_totals, price_line, LineInput, PricedLine};
use comptoir_core::settlement::change_for_tender;
use comptoir_core::validation::{
    validate_currency_code, validate_line_count, validate_payment_amount, validate_quantity, validate_required,
};
use comptoir_core::{
    ActivityEntry, ActivityEvent, Actor, AllocationPolicy, CurrencyConverter, Money, OversellPolicy, Payment,
    PaymentMethod, PaymentStatus, Sale, SaleLine, SaleLineAllocation, SaleStatus, SessionStatus, Settlement,
    ValidationError,
};
use comptoir_db::{
    sequence, ActivityRepository, CurrencyRepository, Database, ProductRepository, SaleDetails, SaleRepository,
    SessionRepository,
};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{allocate_in, StockReference};
use crate::retry::{run_with_retry, RetryPolicy};

// =============================================================================
// Requests
// =============================================================================

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Line discount in the sale currency.
    #[serde(default)]
    pub discount_cents: i64,
}

/// One tender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Defaults to the sale currency.
    #[serde(default)]
    pub currency_code: Option<String>,
    /// Terminal or gateway reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Recorded pending until the gateway confirms it.
    #[serde(default)]
    pub awaiting_gateway: bool,
}

impl PaymentRequest {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        PaymentRequest {
            method,
            amount_cents,
            currency_code: None,
            reference: None,
            awaiting_gateway: false,
        }
    }

    pub fn cash(amount_cents: i64) -> Self {
        PaymentRequest::new(PaymentMethod::Cash, amount_cents)
    }

    pub fn in_currency(mut self, code: impl Into<String>) -> Self {
        self.currency_code = Some(code.into());
        self
    }

    /// Marks the payment as waiting for a gateway callback.
    pub fn awaiting_gateway(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self.awaiting_gateway = true;
        self
    }

    fn validate(&self) -> EngineResult<()> {
        validate_payment_amount(self.amount_cents)?;
        if let Some(code) = &self.currency_code {
            validate_currency_code(code)?;
        }
        if self.awaiting_gateway && self.method.is_cash() {
            return Err(ValidationError::InvalidFormat {
                field: "payment".to_string(),
                reason: "cash payments cannot await a gateway".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// A sale to record.
///
/// ## Example
/// ```rust,ignore
/// let request = SaleRequest::new(&session.id, "XOF")
///     .line(&rice.id, 2)
///     .payment(PaymentRequest::cash(236_000));
/// let outcome = engine.settlement().create_sale(request, &cashier).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub session_id: String,
    pub currency_code: String,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub payments: Vec<PaymentRequest>,
    /// Sale-level discount in the sale currency.
    #[serde(default)]
    pub discount_cents: i64,
}

impl SaleRequest {
    pub fn new(session_id: impl Into<String>, currency_code: impl Into<String>) -> Self {
        SaleRequest {
            session_id: session_id.into(),
            currency_code: currency_code.into(),
            lines: Vec::new(),
            payments: Vec::new(),
            discount_cents: 0,
        }
    }

    pub fn line(self, product_id: impl Into<String>, quantity: i64) -> Self {
        self.discounted_line(product_id, quantity, 0)
    }

    pub fn discounted_line(mut self, product_id: impl Into<String>, quantity: i64, discount_cents: i64) -> Self {
        self.lines.push(LineRequest {
            product_id: product_id.into(),
            quantity,
            discount_cents,
        });
        self
    }

    pub fn payment(mut self, payment: PaymentRequest) -> Self {
        self.payments.push(payment);
        self
    }

    pub fn discount(mut self, discount_cents: i64) -> Self {
        self.discount_cents = discount_cents;
        self
    }

    fn validate(&self) -> EngineResult<()> {
        validate_required("session_id", &self.session_id)?;
        validate_currency_code(&self.currency_code)?;
        validate_line_count(self.lines.len())?;
        for line in &self.lines {
            validate_required("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
        }
        for payment in &self.payments {
            payment.validate()?;
        }
        Ok(())
    }
}

/// What a payment gateway reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Completed,
    Failed,
}

impl GatewayOutcome {
    fn status(self) -> PaymentStatus {
        match self {
            GatewayOutcome::Completed => PaymentStatus::Completed,
            GatewayOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// A line that could not be fully allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineShortfall {
    pub line_no: i64,
    pub product_id: String,
    pub requested: i64,
    pub allocated: i64,
    pub shortfall: i64,
}

/// Result of [`SaleSettlementEngine::create_sale`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleOutcome {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    pub allocations: Vec<SaleLineAllocation>,
    pub payments: Vec<Payment>,
    /// Empty when every line was fully allocated.
    pub shortfalls: Vec<LineShortfall>,
    pub settlement: Settlement,
}

impl SaleOutcome {
    pub fn amount_paid_base(&self) -> Money {
        self.settlement.amount_paid_base
    }

    pub fn balance_due_base(&self) -> Money {
        self.settlement.balance_due_base
    }

    pub fn change_due_base(&self) -> Money {
        self.settlement.change_due_base
    }

    pub fn has_shortfall(&self) -> bool {
        !self.shortfalls.is_empty()
    }
}

/// Result of adding or confirming a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub sale: Sale,
    pub payment: Payment,
    pub settlement: Settlement,
}

// =============================================================================
// Settlement Engine
// =============================================================================

/// Records sales and their payments.
#[derive(Debug, Clone)]
pub struct SaleSettlementEngine {
    db: Database,
    base_currency: String,
    allocation: AllocationPolicy,
    oversell: OversellPolicy,
    retry: RetryPolicy,
}

impl SaleSettlementEngine {
    pub fn new(
        db: Database,
        base_currency: impl Into<String>,
        allocation: AllocationPolicy,
        oversell: OversellPolicy,
        retry: RetryPolicy,
    ) -> Self {
        SaleSettlementEngine {
            db,
            base_currency: base_currency.into(),
            allocation,
            oversell,
            retry,
        }
    }

    pub fn oversell_policy(&self) -> OversellPolicy {
        self.oversell
    }

    /// Records a sale.
    ///
    /// ## Errors
    /// - `Validation` for empty lines, bad quantities or discounts
    /// - `NotFound` / `SessionInvalid` when the session is unknown or not open
    /// - `UnknownCurrency` for a sale or payment currency without an active rate
    /// - `NoPrice` when a product has neither a sale-currency nor a base price
    /// - `InsufficientStock` under the reject oversell policy
    pub async fn create_sale(&self, request: SaleRequest, actor: &Actor) -> EngineResult<SaleOutcome> {
        request.validate()?;

        let request = &request;
        let outcome = run_with_retry(&self.retry, "create_sale", move || self.create_sale_once(request, actor)).await?;

        info!(
            sale_id = %outcome.sale.id,
            ticket_number = %outcome.sale.ticket_number,
            status = %outcome.sale.status,
            total_base = %outcome.sale.total_base(),
            shortfall_lines = outcome.shortfalls.len(),
            "Sale recorded"
        );
        Ok(outcome)
    }

    async fn create_sale_once(&self, request: &SaleRequest, actor: &Actor) -> EngineResult<SaleOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let ticket_number = sequence::next_ticket_number(&mut tx, now).await?;

        let session = SessionRepository::find(&mut tx, &request.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CashSession", &request.session_id))?;
        if session.status != SessionStatus::Open {
            return Err(EngineError::SessionInvalid {
                session_id: session.id,
                status: session.status,
            });
        }

        let converter = self.load_converter(&mut tx).await?;
        let currency = request.currency_code.as_str();
        let sale_rate = converter.rate(currency)?;

        let sale_id = Uuid::new_v4().to_string();
        let reference = StockReference::sale(&sale_id);

        let mut priced: Vec<PricedLine> = Vec::with_capacity(request.lines.len());
        let mut lines = Vec::with_capacity(request.lines.len());
        let mut allocations = Vec::new();
        let mut shortfalls = Vec::new();

        for (index, line) in request.lines.iter().enumerate() {
            let line_no = index as i64 + 1;

            let product = ProductRepository::find(&mut tx, &line.product_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Product", &line.product_id))?;
            if !product.is_active {
                return Err(EngineError::ProductInactive(product.id));
            }

            let unit_price = match product.price_in(currency) {
                Some(price) => price,
                None => match product.price_in(converter.base_code()) {
                    Some(base_price) => converter.convert_from_base(base_price, currency)?,
                    None => {
                        return Err(EngineError::NoPrice {
                            product_id: product.id,
                            currency: currency.to_string(),
                        })
                    }
                },
            };

            let priced_line = price_line(LineInput {
                unit_price,
                quantity: line.quantity,
                discount: Money::from_cents(line.discount_cents),
                tax_rate: product.tax_rate(),
            })?;

            let plan = allocate_in(
                &mut tx,
                self.allocation,
                &product.id,
                line.quantity,
                &reference,
                &actor.id,
                now,
            )
            .await?;

            if plan.shortfall > 0 {
                if self.oversell == OversellPolicy::Reject {
                    return Err(EngineError::InsufficientStock {
                        subject: product.id,
                        requested: line.quantity,
                        available: plan.allocated,
                    });
                }
                shortfalls.push(LineShortfall {
                    line_no,
                    product_id: product.id.clone(),
                    requested: line.quantity,
                    allocated: plan.allocated,
                    shortfall: plan.shortfall,
                });
            }

            let line_id = Uuid::new_v4().to_string();
            allocations.extend(plan.picks.iter().map(|pick| SaleLineAllocation {
                id: Uuid::new_v4().to_string(),
                line_id: line_id.clone(),
                lot_id: pick.lot_id.clone(),
                quantity: pick.quantity,
            }));
            lines.push(SaleLine {
                id: line_id,
                sale_id: sale_id.clone(),
                line_no,
                product_id: product.id,
                lot_id: plan.first_lot().map(str::to_string),
                quantity: line.quantity,
                allocated_quantity: plan.allocated,
                unit_price_cents: priced_line.unit_price.cents(),
                discount_cents: priced_line.discount.cents(),
                tax_rate_bps: priced_line.tax_rate.bps(),
                tax_cents: priced_line.tax.cents(),
                line_total_cents: priced_line.line_total.cents(),
                created_at: now,
            });
            priced.push(priced_line);
        }

        let totals = compute_totals(&priced, Money::from_cents(request.discount_cents))?;
        let total_base = converter.convert_to_base(totals.total, currency)?;

        let mut sale = Sale {
            id: sale_id,
            ticket_number,
            session_id: session.id,
            currency_code: currency.to_string(),
            exchange_rate_to_base: sale_rate,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            total_base_cents: total_base.cents(),
            status: SaleStatus::Pending,
            cashier_id: actor.id.clone(),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
        };

        SaleRepository::insert(&mut tx, &sale).await?;
        for line in &lines {
            SaleRepository::insert_line(&mut tx, line).await?;
        }
        for allocation in &allocations {
            SaleRepository::insert_allocation(&mut tx, allocation).await?;
        }

        let mut payments = Vec::with_capacity(request.payments.len());
        let mut paid_before = Money::zero();
        for tender in &request.payments {
            let payment = record_payment(&mut tx, &converter, &sale, tender, paid_before, actor, now).await?;
            if payment.status == PaymentStatus::Completed {
                paid_before += payment.amount_base();
            }
            payments.push(payment);
        }

        let settlement = Settlement::from_payments(sale.total_base(), &payments);
        if settlement.is_settled() {
            complete_sale(&mut tx, &mut sale, &settlement, actor, now).await?;
        }

        let shortfall_units = shortfalls.iter().map(|s| s.shortfall).sum();
        let entry = ActivityEntry::from(ActivityEvent::SaleCreated {
            sale_id: sale.id.clone(),
            ticket_number: sale.ticket_number.clone(),
            status: sale.status,
            total_base_cents: sale.total_base_cents,
            shortfall_units,
        })
        .with("currency", sale.currency_code.as_str())
        .with("rate", sale.exchange_rate_to_base.to_string());
        ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

        tx.commit().await?;

        if !shortfalls.is_empty() {
            warn!(sale_id = %sale.id, units = shortfall_units, "Sale recorded with backordered units");
        }

        Ok(SaleOutcome {
            sale,
            lines,
            allocations,
            payments,
            shortfalls,
            settlement,
        })
    }

    /// Adds a payment to a pending sale whose session is still open.
    pub async fn add_payment(&self, sale_id: &str, tender: PaymentRequest, actor: &Actor) -> EngineResult<PaymentOutcome> {
        validate_required("sale_id", sale_id)?;
        tender.validate()?;

        let tender = &tender;
        let outcome = run_with_retry(&self.retry, "add_payment", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let Some(mut sale) = SaleRepository::touch_pending(&mut tx, sale_id, now).await? else {
                return Err(match SaleRepository::find(&mut tx, sale_id).await? {
                    None => EngineError::not_found("Sale", sale_id),
                    Some(sale) => EngineError::SaleNotPending {
                        sale_id: sale.id,
                        status: sale.status,
                    },
                });
            };

            let session = SessionRepository::find(&mut tx, &sale.session_id)
                .await?
                .ok_or_else(|| EngineError::not_found("CashSession", &sale.session_id))?;
            if session.status != SessionStatus::Open {
                return Err(EngineError::SessionInvalid {
                    session_id: session.id,
                    status: session.status,
                });
            }

            let converter = self.load_converter(&mut tx).await?;
            let existing = SaleRepository::payments_for(&mut tx, sale_id).await?;
            let paid_before = Settlement::from_payments(sale.total_base(), &existing).amount_paid_base;

            let payment = record_payment(&mut tx, &converter, &sale, tender, paid_before, actor, now).await?;

            let settlement =
                Settlement::from_payments(sale.total_base(), existing.iter().chain(std::iter::once(&payment)));
            if settlement.is_settled() {
                complete_sale(&mut tx, &mut sale, &settlement, actor, now).await?;
            }

            tx.commit().await?;
            Ok(PaymentOutcome {
                sale,
                payment,
                settlement,
            })
        })
        .await?;

        info!(
            sale_id = %sale_id,
            payment_id = %outcome.payment.id,
            status = %outcome.sale.status,
            balance_due = %outcome.settlement.balance_due_base,
            "Payment added"
        );
        Ok(outcome)
    }

    /// Applies a gateway callback to a pending payment.
    ///
    /// Runs after the sale transaction has long committed. A completed
    /// payment that covers the balance completes a still-pending sale.
    pub async fn confirm_gateway_payment(
        &self,
        payment_id: &str,
        result: GatewayOutcome,
        actor: &Actor,
    ) -> EngineResult<PaymentOutcome> {
        validate_required("payment_id", payment_id)?;

        let outcome = run_with_retry(&self.retry, "confirm_gateway_payment", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let Some(payment) = SaleRepository::settle_pending_payment(&mut tx, payment_id, result.status(), now).await?
            else {
                return Err(match SaleRepository::find_payment(&mut tx, payment_id).await? {
                    None => EngineError::not_found("Payment", payment_id),
                    Some(p) => EngineError::PaymentNotPending {
                        payment_id: p.id,
                        status: p.status,
                    },
                });
            };

            let mut sale = SaleRepository::find(&mut tx, &payment.sale_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Sale", &payment.sale_id))?;

            let entry = ActivityEntry::from(ActivityEvent::PaymentConfirmed {
                sale_id: sale.id.clone(),
                payment_id: payment.id.clone(),
                status: payment.status,
            });
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            let payments = SaleRepository::payments_for(&mut tx, &sale.id).await?;
            let settlement = Settlement::from_payments(sale.total_base(), &payments);
            if sale.status == SaleStatus::Pending && settlement.is_settled() {
                complete_sale(&mut tx, &mut sale, &settlement, actor, now).await?;
            }

            tx.commit().await?;
            Ok(PaymentOutcome {
                sale,
                payment,
                settlement,
            })
        })
        .await?;

        info!(
            payment_id = %payment_id,
            payment_status = %outcome.payment.status,
            sale_status = %outcome.sale.status,
            "Gateway payment confirmed"
        );
        Ok(outcome)
    }

    /// A sale with its lines, allocations and payments.
    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<SaleDetails> {
        self.db
            .sales()
            .details(sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))
    }

    /// Snapshot of the active rate table on the caller's connection.
    async fn load_converter(&self, conn: &mut SqliteConnection) -> EngineResult<CurrencyConverter> {
        let currencies = CurrencyRepository::active(conn).await?;
        Ok(CurrencyConverter::new(self.base_currency.as_str(), &currencies)?)
    }
}

// =============================================================================
// Shared Steps
// =============================================================================

/// Converts, stores and logs one tender against `sale`.
///
/// `paid_before` is the completed base amount already on the sale; only a
/// cash tender that crosses the balance records change.
async fn record_payment(
    conn: &mut SqliteConnection,
    converter: &CurrencyConverter,
    sale: &Sale,
    tender: &PaymentRequest,
    paid_before: Money,
    actor: &Actor,
    now: DateTime<Utc>,
) -> EngineResult<Payment> {
    let currency = tender.currency_code.as_deref().unwrap_or(&sale.currency_code);
    let rate = converter.rate(currency)?;
    let amount_base = converter.convert_to_base(Money::from_cents(tender.amount_cents), currency)?;

    let status = if tender.awaiting_gateway {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Completed
    };
    let change = match status {
        PaymentStatus::Completed => change_for_tender(tender.method, sale.total_base(), paid_before, amount_base),
        _ => Money::zero(),
    };

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        sale_id: sale.id.clone(),
        session_id: sale.session_id.clone(),
        method: tender.method,
        amount_cents: tender.amount_cents,
        currency_code: currency.to_string(),
        exchange_rate: rate,
        amount_base_cents: amount_base.cents(),
        change_base_cents: change.cents(),
        status,
        reference: tender.reference.clone(),
        created_at: now,
        updated_at: now,
    };
    SaleRepository::insert_payment(&mut *conn, &payment).await?;

    let entry = ActivityEntry::from(ActivityEvent::PaymentRecorded {
        sale_id: sale.id.clone(),
        payment_id: payment.id.clone(),
        method: payment.method,
        amount_base_cents: payment.amount_base_cents,
        status: payment.status,
    });
    ActivityRepository::append(&mut *conn, &entry, &actor.id).await?;

    debug!(
        sale_id = %sale.id,
        method = payment.method.as_str(),
        amount_base = %amount_base,
        change = %change,
        status = %payment.status,
        "Payment recorded"
    );
    Ok(payment)
}

/// Pending → completed, in memory and in the store.
async fn complete_sale(
    conn: &mut SqliteConnection,
    sale: &mut Sale,
    settlement: &Settlement,
    actor: &Actor,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    if !SaleRepository::mark_completed(&mut *conn, &sale.id, now).await? {
        return Err(EngineError::SaleNotPending {
            sale_id: sale.id.clone(),
            status: sale.status,
        });
    }
    sale.status = SaleStatus::Completed;
    sale.completed_at = Some(now);
    sale.updated_at = now;

    let entry = ActivityEntry::from(ActivityEvent::SaleCompleted {
        sale_id: sale.id.clone(),
        amount_paid_base_cents: settlement.amount_paid_base.cents(),
    });
    ActivityRepository::append(&mut *conn, &entry, &actor.id).await?;
    Ok(())
}
