//! # Activity Events
//!
//! Typed audit trail entries, written to the activity log in the same
//! transaction as the change they describe.
//!
//! ```text
//! ActivityEntry
//! ├── event: ActivityEvent      known kinds, typed fields
//! └── extensions: BTreeMap      free-form key/value for integrations
//! ```
//!
//! Events serialize as JSON with a `kind` tag:
//! `{"kind":"sale_cancelled","sale_id":"…","reason":"customer changed mind"}`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{PaymentMethod, PaymentStatus, SaleStatus};

/// Known activity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEvent {
    SaleCreated {
        sale_id: String,
        ticket_number: String,
        status: SaleStatus,
        total_base_cents: i64,
        shortfall_units: i64,
    },
    PaymentRecorded {
        sale_id: String,
        payment_id: String,
        method: PaymentMethod,
        amount_base_cents: i64,
        status: PaymentStatus,
    },
    PaymentConfirmed {
        sale_id: String,
        payment_id: String,
        status: PaymentStatus,
    },
    SaleCompleted {
        sale_id: String,
        amount_paid_base_cents: i64,
    },
    SaleCancelled {
        sale_id: String,
        reason: String,
        units_returned: i64,
        payments_refunded: usize,
    },
    StockReceived {
        lot_id: String,
        product_id: String,
        quantity: i64,
    },
    StockAdjusted {
        product_id: String,
        lot_id: String,
        delta: i64,
        reason: String,
    },
    StockWrittenOff {
        lot_id: String,
        quantity: i64,
        reason: String,
    },
    LotBlocked {
        lot_id: String,
    },
    LotUnblocked {
        lot_id: String,
    },
    SessionOpened {
        session_id: String,
        register_id: String,
        opening_cash_cents: i64,
    },
    SessionClosed {
        session_id: String,
        expected_cash_cents: i64,
        variance_cents: i64,
    },
    SessionValidated {
        session_id: String,
    },
}

impl ActivityEvent {
    /// Stable snake_case name, matches the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::SaleCreated { .. } => "sale_created",
            ActivityEvent::PaymentRecorded { .. } => "payment_recorded",
            ActivityEvent::PaymentConfirmed { .. } => "payment_confirmed",
            ActivityEvent::SaleCompleted { .. } => "sale_completed",
            ActivityEvent::SaleCancelled { .. } => "sale_cancelled",
            ActivityEvent::StockReceived { .. } => "stock_received",
            ActivityEvent::StockAdjusted { .. } => "stock_adjusted",
            ActivityEvent::StockWrittenOff { .. } => "stock_written_off",
            ActivityEvent::LotBlocked { .. } => "lot_blocked",
            ActivityEvent::LotUnblocked { .. } => "lot_unblocked",
            ActivityEvent::SessionOpened { .. } => "session_opened",
            ActivityEvent::SessionClosed { .. } => "session_closed",
            ActivityEvent::SessionValidated { .. } => "session_validated",
        }
    }

    /// Entity type and id the event is about.
    pub fn subject(&self) -> (&'static str, &str) {
        match self {
            ActivityEvent::SaleCreated { sale_id, .. }
            | ActivityEvent::SaleCompleted { sale_id, .. }
            | ActivityEvent::SaleCancelled { sale_id, .. } => ("sale", sale_id.as_str()),
            ActivityEvent::PaymentRecorded { payment_id, .. }
            | ActivityEvent::PaymentConfirmed { payment_id, .. } => ("payment", payment_id.as_str()),
            ActivityEvent::StockReceived { lot_id, .. }
            | ActivityEvent::StockAdjusted { lot_id, .. }
            | ActivityEvent::StockWrittenOff { lot_id, .. }
            | ActivityEvent::LotBlocked { lot_id }
            | ActivityEvent::LotUnblocked { lot_id } => ("stock_lot", lot_id.as_str()),
            ActivityEvent::SessionOpened { session_id, .. }
            | ActivityEvent::SessionClosed { session_id, .. }
            | ActivityEvent::SessionValidated { session_id } => ("cash_session", session_id.as_str()),
        }
    }
}

/// An event plus its extension map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub event: ActivityEvent,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl ActivityEntry {
    pub fn new(event: ActivityEvent) -> Self {
        ActivityEntry {
            event,
            extensions: BTreeMap::new(),
        }
    }

    /// Adds an extension key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

impl From<ActivityEvent> for ActivityEntry {
    fn from(event: ActivityEvent) -> Self {
        ActivityEntry::new(event)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
