//! Wiring of the engines around one set of repositories

use std::sync::Arc;

use uuid::Uuid;

use crate::attendance::AttendanceEngine;
use crate::clock::Clock;
use crate::credentials::CredentialStore;
use crate::error::TutoringResult;
use crate::events::Outbox;
use crate::lifecycle::SessionLifecycle;
use crate::money::Money;
use crate::repository::Repositories;
use crate::settlement::{SettlementEngine, SettlementPolicy};
use crate::sweep::AttendanceSweep;

/// Every engine, sharing one store, outbox and clock
#[derive(Clone)]
pub struct TutoringService {
    repos: Repositories,
    lifecycle: SessionLifecycle,
    attendance: AttendanceEngine,
    sweep: AttendanceSweep,
}

impl TutoringService {
    pub fn new(
        repos: Repositories,
        credentials: Arc<dyn CredentialStore>,
        outbox: Arc<dyn Outbox>,
        clock: Arc<dyn Clock>,
        policy: SettlementPolicy,
    ) -> Self {
        let settlement =
            SettlementEngine::new(repos.clone(), outbox.clone(), clock.clone(), policy);
        let lifecycle =
            SessionLifecycle::new(repos.clone(), settlement, outbox.clone(), clock.clone());
        let attendance = AttendanceEngine::new(
            repos.clone(),
            lifecycle.clone(),
            credentials,
            outbox,
            clock.clone(),
        );
        let sweep = AttendanceSweep::new(repos.clone(), lifecycle.clone(), attendance.clone(), clock);

        Self {
            repos,
            lifecycle,
            attendance,
            sweep,
        }
    }

    pub fn sessions(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn attendance(&self) -> &AttendanceEngine {
        &self.attendance
    }

    pub fn settlement(&self) -> &SettlementEngine {
        self.lifecycle.settlement()
    }

    pub fn sweep(&self) -> &AttendanceSweep {
        &self.sweep
    }

    pub async fn wallet_balance(&self, user_id: Uuid) -> TutoringResult<Money> {
        self.repos.wallets.balance(user_id).await
    }
}
