//! # Lot Allocation Planning
//!
//! Decides which lots satisfy a stock request, without touching storage.
//! The ledger in comptoir-engine executes the plan with compare-and-swap
//! updates inside the sale transaction.
//!
//! ## Policies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AllocationPolicy::Fifo   received_at ASC, then lot creation order      │
//! │  AllocationPolicy::Fefo   expiry_at ASC (no expiry last), received_at   │
//! │                                                                         │
//! │  request 5 units, lots (FIFO order):                                    │
//! │     L1: 2 ──► take 2                                                    │
//! │     L2: 1 ──► take 1                                                    │
//! │     L3: 0     (never offered: depleted)                                 │
//! │     L4: 9 ──► take 2                                                    │
//! │  plan = [(L1,2), (L2,1), (L4,2)], shortfall = 0                         │
//! │                                                                         │
//! │  OversellPolicy::AllowBackorder   shortfall reported, sale proceeds     │
//! │  OversellPolicy::Reject           shortfall aborts the whole sale       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::money::Money;
use crate::types::StockLot;

// =============================================================================
// Policies
// =============================================================================

/// Order in which lots are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Oldest receipt first.
    #[default]
    Fifo,
    /// Nearest expiry first.
    Fefo,
}

impl FromStr for AllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(AllocationPolicy::Fifo),
            "fefo" => Ok(AllocationPolicy::Fefo),
            other => Err(format!("unknown allocation policy '{other}'")),
        }
    }
}

/// What happens when a line cannot be fully allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversellPolicy {
    /// Record the sale; the unallocated quantity is reported as shortfall.
    #[default]
    AllowBackorder,
    /// Fail the sale with InsufficientStock.
    Reject,
}

impl FromStr for OversellPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow_backorder" | "backorder" => Ok(OversellPolicy::AllowBackorder),
            "reject" => Ok(OversellPolicy::Reject),
            other => Err(format!("unknown oversell policy '{other}'")),
        }
    }
}

// =============================================================================
// Candidates and Plans
// =============================================================================

/// The subset of a lot that allocation cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotCandidate {
    pub lot_id: String,
    pub available: i64,
    pub received_at: DateTime<Utc>,
    pub expiry_at: Option<DateTime<Utc>>,
    /// Tie breaker when receipt dates are equal.
    pub created_at: DateTime<Utc>,
}

impl From<&StockLot> for LotCandidate {
    fn from(lot: &StockLot) -> Self {
        LotCandidate {
            lot_id: lot.id.clone(),
            available: lot.current_quantity,
            received_at: lot.received_at,
            expiry_at: lot.expiry_at,
            created_at: lot.created_at,
        }
    }
}

/// One step of a plan: take `quantity` from `lot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotPick {
    pub lot_id: String,
    pub quantity: i64,
}

/// Result of planning an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub picks: Vec<LotPick>,
    pub allocated: i64,
    pub shortfall: i64,
}

impl AllocationPlan {
    /// First lot the plan draws from.
    pub fn first_lot(&self) -> Option<&str> {
        self.picks.first().map(|p| p.lot_id.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}

/// Compares two candidates under `policy`.
pub fn compare_candidates(policy: AllocationPolicy, a: &LotCandidate, b: &LotCandidate) -> Ordering {
    let by_receipt = a
        .received_at
        .cmp(&b.received_at)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.lot_id.cmp(&b.lot_id));

    match policy {
        AllocationPolicy::Fifo => by_receipt,
        AllocationPolicy::Fefo => match (a.expiry_at, b.expiry_at) {
            (Some(x), Some(y)) => x.cmp(&y).then(by_receipt),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_receipt,
        },
    }
}

/// Sorts candidates in consumption order.
pub fn order_candidates(policy: AllocationPolicy, candidates: &mut [LotCandidate]) {
    candidates.sort_by(|a, b| compare_candidates(policy, a, b));
}

/// Plans the allocation of `requested` units across `candidates`.
///
/// Candidates with nothing available are skipped. Never allocates more than
/// a candidate holds, so executing the plan cannot drive a lot negative.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use comptoir_core::allocation::{plan_allocation, AllocationPolicy, LotCandidate};
///
/// let now = Utc::now();
/// let lots = vec![LotCandidate {
///     lot_id: "L1".into(),
///     available: 1,
///     received_at: now,
///     expiry_at: None,
///     created_at: now,
/// }];
/// let plan = plan_allocation(AllocationPolicy::Fifo, lots, 2);
/// assert_eq!(plan.allocated, 1);
/// assert_eq!(plan.shortfall, 1);
/// ```
pub fn plan_allocation(
    policy: AllocationPolicy,
    mut candidates: Vec<LotCandidate>,
    requested: i64,
) -> AllocationPlan {
    order_candidates(policy, &mut candidates);

    let mut remaining = requested.max(0);
    let mut picks = Vec::new();

    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        if candidate.available <= 0 {
            continue;
        }
        let take = candidate.available.min(remaining);
        picks.push(LotPick {
            lot_id: candidate.lot_id,
            quantity: take,
        });
        remaining -= take;
    }

    AllocationPlan {
        allocated: requested.max(0) - remaining,
        shortfall: remaining,
        picks,
    }
}

// =============================================================================
// Landed Costs
// =============================================================================

/// One line of a goods receipt, before landed costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptLine {
    pub quantity: i64,
    pub unit_cost: Money,
}

/// A receipt line after approach and customs costs are spread over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandedLine {
    pub quantity: i64,
    /// Share of the extra cost carried by the whole line.
    pub apportioned: Money,
    /// Purchase unit cost plus the per-unit share, rounded half-up.
    pub landed_unit_cost: Money,
}

/// Spreads `extra_cost` over `lines` pro-rata to their purchase value.
///
/// The shares always sum to `extra_cost` exactly; the rounding remainder
/// lands on the largest line.
pub fn apportion_landed_costs(lines: &[ReceiptLine], extra_cost: Money) -> Vec<LandedLine> {
    let weights: Vec<i64> = lines
        .iter()
        .map(|l| l.unit_cost.cents().saturating_mul(l.quantity))
        .collect();
    let shares = extra_cost.allocate_pro_rata(&weights);

    lines
        .iter()
        .zip(shares)
        .map(|(line, share)| {
            let per_unit = if line.quantity > 0 {
                // half-up integer division of the line share over its units
                let q = line.quantity as i128;
                let s = share.cents() as i128;
                Money::from_cents(((2 * s + q) / (2 * q)) as i64)
            } else {
                Money::zero()
            };
            LandedLine {
                quantity: line.quantity,
                apportioned: share,
                landed_unit_cost: line.unit_cost + per_unit,
            }
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
