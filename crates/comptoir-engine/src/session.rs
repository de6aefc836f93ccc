//! # Cash Session Service
//!
//! Opens, closes and validates cash sessions.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open_session        close_session           validate_session          │
//! │  ─────────────► OPEN ───────────────► CLOSED ──────────────► VALIDATED  │
//! │                  │                      │                               │
//! │                  │ sales + payments     │ expected = opening + net cash │
//! │                  │ accepted             │ variance = closing − expected │
//! │                                                                         │
//! │  One OPEN session per register: a partial unique index on               │
//! │  cash_sessions(register_id) WHERE status = 'open' settles races.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use comptoir_core::session::Reconciliation;
use comptoir_core::validation::{validate_cash_count, validate_required};
use comptoir_core::{ActivityEntry, ActivityEvent, Actor, CashSession, Money, SessionStatus};
use comptoir_db::{ActivityRepository, Database, DbError, SessionRepository};

use crate::error::{EngineError, EngineResult};
use crate::retry::{run_with_retry, RetryPolicy};

/// Cash session lifecycle.
#[derive(Debug, Clone)]
pub struct CashSessionService {
    db: Database,
    retry: RetryPolicy,
}

impl CashSessionService {
    pub fn new(db: Database, retry: RetryPolicy) -> Self {
        CashSessionService { db, retry }
    }

    /// Opens a session on a register for the calling operator.
    ///
    /// ## Errors
    /// - `RegisterAlreadyOpen` if the register has an open session, including
    ///   one opened concurrently
    pub async fn open_session(&self, register_id: &str, opening_cash: Money, actor: &Actor) -> EngineResult<CashSession> {
        validate_required("register_id", register_id)?;
        validate_cash_count("opening_cash", opening_cash.cents())?;

        let session = run_with_retry(&self.retry, "open_session", move || async move {
            let now = Utc::now();
            let session = CashSession {
                id: Uuid::new_v4().to_string(),
                register_id: register_id.to_string(),
                operator_id: actor.id.clone(),
                opening_cash_cents: opening_cash.cents(),
                closing_cash_cents: None,
                expected_cash_cents: None,
                variance_cents: None,
                status: SessionStatus::Open,
                opened_at: now,
                closed_at: None,
                validated_at: None,
                validated_by: None,
            };

            let mut tx = self.db.begin().await?;
            SessionRepository::insert(&mut tx, &session).await.map_err(|e| {
                if e.is_unique_on("cash_sessions.register_id") {
                    EngineError::RegisterAlreadyOpen {
                        register_id: register_id.to_string(),
                    }
                } else {
                    EngineError::from(e)
                }
            })?;

            let entry = ActivityEntry::from(ActivityEvent::SessionOpened {
                session_id: session.id.clone(),
                register_id: session.register_id.clone(),
                opening_cash_cents: session.opening_cash_cents,
            });
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            tx.commit().await?;
            Ok(session)
        })
        .await?;

        info!(session_id = %session.id, register_id = %register_id, opening = %opening_cash, "Session opened");
        Ok(session)
    }

    /// Closes an open session and freezes its cash figures.
    ///
    /// Only completed cash payments count, each net of the change handed
    /// back. Stock is not touched.
    pub async fn close_session(&self, session_id: &str, closing_cash: Money, actor: &Actor) -> EngineResult<CashSession> {
        validate_required("session_id", session_id)?;
        validate_cash_count("closing_cash", closing_cash.cents())?;

        let (session, reconciliation) = run_with_retry(&self.retry, "close_session", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            let Some(opening) = SessionRepository::mark_closed(&mut tx, session_id, closing_cash.cents(), now).await?
            else {
                return Err(match SessionRepository::find(&mut tx, session_id).await? {
                    None => EngineError::not_found("CashSession", session_id),
                    Some(s) => EngineError::SessionNotOpen {
                        session_id: session_id.to_string(),
                        status: s.status,
                    },
                });
            };

            let net_cash = SessionRepository::net_cash_per_payment(&mut tx, session_id).await?;
            let reconciliation = Reconciliation::compute(
                Money::from_cents(opening),
                net_cash.into_iter().map(Money::from_cents),
                closing_cash,
            );
            SessionRepository::record_reconciliation(
                &mut tx,
                session_id,
                reconciliation.expected.cents(),
                reconciliation.variance.cents(),
            )
            .await?;

            let entry = ActivityEntry::from(ActivityEvent::SessionClosed {
                session_id: session_id.to_string(),
                expected_cash_cents: reconciliation.expected.cents(),
                variance_cents: reconciliation.variance.cents(),
            });
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            let session = SessionRepository::find(&mut tx, session_id)
                .await?
                .ok_or_else(|| DbError::not_found("CashSession", session_id))?;

            tx.commit().await?;
            Ok((session, reconciliation))
        })
        .await?;

        info!(
            session_id = %session_id,
            expected = %reconciliation.expected,
            closing = %reconciliation.closing,
            variance = %reconciliation.variance,
            "Session closed"
        );
        Ok(session)
    }

    /// Supervisor sign-off on a closed session.
    pub async fn validate_session(&self, session_id: &str, actor: &Actor) -> EngineResult<CashSession> {
        validate_required("session_id", session_id)?;

        let session = run_with_retry(&self.retry, "validate_session", move || async move {
            let now = Utc::now();
            let mut tx = self.db.begin().await?;

            if !SessionRepository::mark_validated(&mut tx, session_id, &actor.id, now).await? {
                return Err(match SessionRepository::find(&mut tx, session_id).await? {
                    None => EngineError::not_found("CashSession", session_id),
                    Some(s) => EngineError::SessionNotClosed {
                        session_id: session_id.to_string(),
                        status: s.status,
                    },
                });
            }

            let entry = ActivityEntry::from(ActivityEvent::SessionValidated {
                session_id: session_id.to_string(),
            });
            ActivityRepository::append(&mut tx, &entry, &actor.id).await?;

            let session = SessionRepository::find(&mut tx, session_id)
                .await?
                .ok_or_else(|| DbError::not_found("CashSession", session_id))?;

            tx.commit().await?;
            Ok(session)
        })
        .await?;

        info!(session_id = %session_id, validated_by = %actor.id, "Session validated");
        Ok(session)
    }

    /// The open session of a register, if any.
    pub async fn current_session(&self, register_id: &str) -> EngineResult<Option<CashSession>> {
        Ok(self.db.sessions().current_for_register(register_id).await?)
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<CashSession> {
        self.db
            .sessions()
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CashSession", session_id))
    }
}
