//! Payment holds, post-session settlement and cancellation refunds
//!
//! Every student's hold is resolved on its own: the status change and the
//! wallet credits it causes are applied as one unit by the store, but one
//! student's failure never rolls back another student's settlement.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{TutoringError, TutoringResult};
use crate::events::{DomainEvent, Outbox, publish_or_log};
use crate::models::{
    AttendanceStatus, ConsortiumMember, LedgerCredit, Session, SessionStatus, Transaction,
    TransactionStatus,
};
use crate::money::Money;
use crate::repository::Repositories;

/// Tolerance when checking that revenue shares add up to 100
const SHARE_SUM_TOLERANCE: f64 = 0.01;

/// Refund owed on cancellation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundTier {
    pub amount: Money,
    pub percentage: f64,
}

/// Refund for cancelling a session `scheduled_start - cancel_time` ahead:
/// more than 24h → 100%, more than 2h → 50%, otherwise nothing.
pub fn refund_tier(
    price: Money,
    scheduled_start: DateTime<Utc>,
    cancel_time: DateTime<Utc>,
) -> RefundTier {
    let hours_until = (scheduled_start - cancel_time).num_seconds() as f64 / 3600.0;

    let percentage = if hours_until > 24.0 {
        1.0
    } else if hours_until > 2.0 {
        0.5
    } else {
        0.0
    };

    RefundTier {
        amount: price.percentage(percentage),
        percentage,
    }
}

/// Revenue shares must be positive percentages that sum to 100
pub fn validate_revenue_shares(members: &[ConsortiumMember]) -> TutoringResult<()> {
    if members.is_empty() {
        return Err(TutoringError::validation(
            "A consortium needs at least one member",
        ));
    }

    if let Some(member) = members
        .iter()
        .find(|m| !(m.revenue_share > 0.0 && m.revenue_share <= 100.0))
    {
        return Err(TutoringError::validation(format!(
            "Revenue share of tutor {} must be in (0, 100], got {}",
            member.tutor_id, member.revenue_share
        )));
    }

    let mut tutors: Vec<Uuid> = members.iter().map(|m| m.tutor_id).collect();
    tutors.sort();
    tutors.dedup();
    if tutors.len() != members.len() {
        return Err(TutoringError::validation(
            "A tutor can only appear once in a revenue policy",
        ));
    }

    let total: f64 = members.iter().map(|m| m.revenue_share).sum();
    if (total - 100.0).abs() > SHARE_SUM_TOLERANCE {
        return Err(TutoringError::validation(format!(
            "Revenue shares must sum to 100, got {}",
            total
        )));
    }

    Ok(())
}

/// Split `amount` across consortium members by revenue share.
///
/// Each share is rounded down to the cent; leftover cents go to the member
/// with the largest share. Shares are not re-validated here.
pub fn split_revenue(amount: Money, members: &[ConsortiumMember]) -> Vec<(Uuid, Money)> {
    let mut split: Vec<(Uuid, Money)> = members
        .iter()
        .map(|m| {
            let basis_points = (m.revenue_share * 100.0).round() as i128;
            let cents = amount.cents() as i128 * basis_points / 10_000;
            (m.tutor_id, Money::from_cents(cents as i64))
        })
        .collect();

    let distributed: Money = split.iter().map(|(_, share)| *share).sum();
    let remainder = amount - distributed;
    if !remainder.is_zero() {
        if let Some(largest) = members
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.revenue_share.total_cmp(&b.revenue_share))
            .map(|(index, _)| index)
        {
            split[largest].1 = split[largest].1 + remainder;
        }
    }

    split
}

/// Tunable settlement parameters
#[derive(Debug, Clone, Copy)]
pub struct SettlementPolicy {
    /// Share of each hold kept by the platform on successful sessions
    pub platform_commission: f64,
    /// Share of the charge refunded to absent students
    pub absent_refund_rate: f64,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            platform_commission: 0.15,
            absent_refund_rate: 0.85,
        }
    }
}

/// A payout to the tutor or a consortium member
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub transaction_id: Uuid,
    pub student_id: Uuid,
    pub recipient_id: Uuid,
    pub amount: Money,
}

/// A refund to a student
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub transaction_id: Uuid,
    pub student_id: Uuid,
    pub amount: Money,
}

/// Outcome of settling one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub session_id: Uuid,
    pub payouts: Vec<Payout>,
    pub refunds: Vec<Refund>,
    /// Students whose hold could not be settled
    pub failed_students: Vec<Uuid>,
}

#[derive(Clone)]
pub struct SettlementEngine {
    repos: Repositories,
    outbox: Arc<dyn Outbox>,
    clock: Arc<dyn Clock>,
    policy: SettlementPolicy,
}

impl SettlementEngine {
    pub fn new(
        repos: Repositories,
        outbox: Arc<dyn Outbox>,
        clock: Arc<dyn Clock>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            repos,
            outbox,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Refund owed if the session were cancelled now
    pub fn refund_tier(&self, session: &Session) -> RefundTier {
        refund_tier(session.price, session.scheduled_start, self.clock.now())
    }

    /// Charge a student for a session and keep the money on hold
    pub async fn place_hold(&self, session_id: Uuid, student_id: Uuid) -> TutoringResult<Transaction> {
        let session = self
            .repos
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| TutoringError::not_found("Session", session_id))?;

        if !session.status.is_committed() {
            return Err(TutoringError::validation(format!(
                "Cannot pay for a {} session",
                session.status
            )));
        }

        if !self
            .repos
            .classes
            .is_active_member(session.class_id, student_id)
            .await?
        {
            return Err(TutoringError::forbidden(
                "Only active class members can pay for this session",
            ));
        }

        let now = self.clock.now();
        let commission = session.price.percentage(self.policy.platform_commission);
        let hold = Transaction {
            id: Uuid::new_v4(),
            session_id,
            student_id,
            amount: session.price,
            net_amount: session.price - commission,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.repos
            .transactions
            .place_hold(&hold, &format!("Payment hold for session {}", session_id))
            .await?;

        info!(
            %session_id,
            %student_id,
            transaction_id = %hold.id,
            amount = %hold.amount,
            "Payment hold placed"
        );

        Ok(hold)
    }

    /// Reconcile every pending hold of the session against attendance
    pub async fn settle(&self, session_id: Uuid) -> TutoringResult<SettlementReport> {
        let session = self
            .repos
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| TutoringError::not_found("Session", session_id))?;

        let payees = self.payees(&session).await?;
        let attendance: HashMap<Uuid, AttendanceStatus> = self
            .repos
            .attendance
            .list_for_session(session_id)
            .await?
            .into_iter()
            .map(|row| (row.student_id, row.status))
            .collect();
        let holds = self.repos.transactions.pending_for_session(session_id).await?;

        let mut report = SettlementReport {
            session_id,
            ..Default::default()
        };
        let attempted = holds.len();

        for hold in holds {
            // A paying student without an attendance row left the class before it ran
            let attended = attendance
                .get(&hold.student_id)
                .is_some_and(|status| status.attended());
            if !attendance.contains_key(&hold.student_id) {
                warn!(
                    %session_id,
                    student_id = %hold.student_id,
                    "No attendance recorded for a paying student, refunding as absent"
                );
            }

            let result = if attended {
                self.release(&hold, &payees, &mut report).await
            } else {
                self.refund_absent(&hold, &mut report).await
            };

            if let Err(e) = result {
                error!(
                    %session_id,
                    student_id = %hold.student_id,
                    transaction_id = %hold.id,
                    error = %e,
                    "Failed to settle payment hold"
                );
                report.failed_students.push(hold.student_id);
            }
        }

        info!(
            %session_id,
            payouts = report.payouts.len(),
            refunds = report.refunds.len(),
            failed = report.failed_students.len(),
            "Session settled"
        );

        if !report.failed_students.is_empty() {
            return Err(TutoringError::Settlement {
                session_id,
                failed: report.failed_students.len(),
                attempted,
            });
        }

        Ok(report)
    }

    /// Refund every pending hold of a cancelled session at `percentage`
    pub async fn refund_cancellation(
        &self,
        session: &Session,
        percentage: f64,
    ) -> TutoringResult<Vec<Refund>> {
        if session.status != SessionStatus::Cancelled {
            return Err(TutoringError::validation(
                "Only cancelled sessions can be refunded",
            ));
        }

        let holds = self.repos.transactions.pending_for_session(session.id).await?;
        let mut refunds = Vec::with_capacity(holds.len());

        for hold in holds {
            let amount = hold.amount.percentage(percentage);
            let credits = if amount.is_zero() {
                Vec::new()
            } else {
                vec![LedgerCredit {
                    user_id: hold.student_id,
                    amount,
                    memo: format!("Cancellation refund for session {}", session.id),
                }]
            };

            if !self
                .repos
                .transactions
                .resolve(hold.id, TransactionStatus::Refunded, &credits, self.clock.now())
                .await?
            {
                warn!(transaction_id = %hold.id, "Payment hold already resolved, skipping refund");
                continue;
            }

            info!(
                session_id = %session.id,
                student_id = %hold.student_id,
                amount = %amount,
                "Cancellation refund issued"
            );
            publish_or_log(
                self.outbox.as_ref(),
                DomainEvent::PaymentRefunded {
                    session_id: session.id,
                    student_id: hold.student_id,
                    amount,
                },
            );
            refunds.push(Refund {
                transaction_id: hold.id,
                student_id: hold.student_id,
                amount,
            });
        }

        Ok(refunds)
    }

    /// Replace a consortium's revenue policy. Only members may change it.
    pub async fn set_revenue_shares(
        &self,
        consortium_id: Uuid,
        caller: Uuid,
        shares: Vec<(Uuid, f64)>,
    ) -> TutoringResult<Vec<ConsortiumMember>> {
        let consortium = self
            .repos
            .tutors
            .find_consortium(consortium_id)
            .await?
            .ok_or_else(|| TutoringError::not_found("Consortium", consortium_id))?;

        let current = self.repos.tutors.consortium_members(consortium.id).await?;
        if !current.iter().any(|m| m.tutor_id == caller) {
            return Err(TutoringError::forbidden(
                "Only consortium members can change the revenue policy",
            ));
        }

        let members: Vec<ConsortiumMember> = shares
            .into_iter()
            .map(|(tutor_id, revenue_share)| ConsortiumMember {
                consortium_id,
                tutor_id,
                revenue_share,
            })
            .collect();
        validate_revenue_shares(&members)?;

        self.repos
            .tutors
            .replace_consortium_members(consortium_id, &members)
            .await?;

        info!(%consortium_id, members = members.len(), "Revenue policy updated");
        Ok(members)
    }

    /// Who gets paid for an attended session, with their weights
    async fn payees(&self, session: &Session) -> TutoringResult<Payees> {
        if let Some(consortium_id) = session.consortium_id {
            let members = self.repos.tutors.consortium_members(consortium_id).await?;
            if members.is_empty() {
                return Err(TutoringError::validation(format!(
                    "Consortium {} has no members to pay",
                    consortium_id
                )));
            }
            return Ok(Payees::Consortium(members));
        }

        session.tutor_id.map(Payees::Tutor).ok_or_else(|| {
            TutoringError::validation(format!("Session {} has no tutor to pay", session.id))
        })
    }

    async fn release(
        &self,
        hold: &Transaction,
        payees: &Payees,
        report: &mut SettlementReport,
    ) -> TutoringResult<()> {
        let shares = match payees {
            Payees::Tutor(tutor_id) => vec![(*tutor_id, hold.net_amount)],
            Payees::Consortium(members) => split_revenue(hold.net_amount, members),
        };

        let memo = format!(
            "Session {} payment from student {}",
            hold.session_id, hold.student_id
        );
        let credits: Vec<LedgerCredit> = shares
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(user_id, amount)| LedgerCredit {
                user_id: *user_id,
                amount: *amount,
                memo: memo.clone(),
            })
            .collect();

        if !self
            .repos
            .transactions
            .resolve(hold.id, TransactionStatus::Completed, &credits, self.clock.now())
            .await?
        {
            warn!(transaction_id = %hold.id, "Payment hold already resolved, skipping payout");
            return Ok(());
        }

        for credit in credits {
            info!(
                session_id = %hold.session_id,
                student_id = %hold.student_id,
                recipient = %credit.user_id,
                amount = %credit.amount,
                "Payment released"
            );
            publish_or_log(
                self.outbox.as_ref(),
                DomainEvent::PaymentReleased {
                    session_id: hold.session_id,
                    recipient_id: credit.user_id,
                    amount: credit.amount,
                },
            );
            report.payouts.push(Payout {
                transaction_id: hold.id,
                student_id: hold.student_id,
                recipient_id: credit.user_id,
                amount: credit.amount,
            });
        }

        Ok(())
    }

    async fn refund_absent(
        &self,
        hold: &Transaction,
        report: &mut SettlementReport,
    ) -> TutoringResult<()> {
        let amount = hold.amount.percentage(self.policy.absent_refund_rate);
        let credits = [LedgerCredit {
            user_id: hold.student_id,
            amount,
            memo: format!("Absence refund for session {}", hold.session_id),
        }];

        if !self
            .repos
            .transactions
            .resolve(hold.id, TransactionStatus::Refunded, &credits, self.clock.now())
            .await?
        {
            warn!(transaction_id = %hold.id, "Payment hold already resolved, skipping refund");
            return Ok(());
        }

        info!(
            session_id = %hold.session_id,
            student_id = %hold.student_id,
            amount = %amount,
            retained = %(hold.amount - amount),
            "Absent student refunded"
        );
        publish_or_log(
            self.outbox.as_ref(),
            DomainEvent::PaymentRefunded {
                session_id: hold.session_id,
                student_id: hold.student_id,
                amount,
            },
        );
        report.refunds.push(Refund {
            transaction_id: hold.id,
            student_id: hold.student_id,
            amount,
        });

        Ok(())
    }
}

enum Payees {
    Tutor(Uuid),
    Consortium(Vec<ConsortiumMember>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn hundred() -> Money {
        Money::from_cents(10_000)
    }

    fn member(share: f64) -> ConsortiumMember {
        ConsortiumMember {
            consortium_id: Uuid::nil(),
            tutor_id: Uuid::new_v4(),
            revenue_share: share,
        }
    }

    #[test]
    fn full_refund_more_than_a_day_ahead() {
        let tier = refund_tier(hundred(), now() + Duration::hours(48), now());
        assert_eq!(tier.amount, hundred());
        assert_eq!(tier.percentage, 1.0);
    }

    #[test]
    fn half_refund_within_a_day() {
        let tier = refund_tier(hundred(), now() + Duration::hours(12), now());
        assert_eq!(tier.amount, Money::from_cents(5_000));
        assert_eq!(tier.percentage, 0.5);
    }

    #[test]
    fn no_refund_within_two_hours() {
        let tier = refund_tier(hundred(), now() + Duration::hours(1), now());
        assert_eq!(tier.amount, Money::ZERO);
        assert_eq!(tier.percentage, 0.0);
    }

    #[test]
    fn tier_boundaries_are_exclusive_above() {
        assert_eq!(
            refund_tier(hundred(), now() + Duration::hours(24), now()).percentage,
            0.5
        );
        assert_eq!(
            refund_tier(hundred(), now() + Duration::hours(24) + Duration::seconds(1), now())
                .percentage,
            1.0
        );
        assert_eq!(
            refund_tier(hundred(), now() + Duration::hours(2), now()).percentage,
            0.0
        );
        assert_eq!(
            refund_tier(hundred(), now() - Duration::hours(1), now()).percentage,
            0.0
        );
    }

    #[test]
    fn refund_amount_rounds_to_cents() {
        let tier = refund_tier(Money::from_cents(3_333), now() + Duration::hours(5), now());
        assert_eq!(tier.amount, Money::from_cents(1_667));
    }

    #[test]
    fn split_gives_remainder_to_largest_share() {
        let members = vec![member(50.0), member(30.0), member(20.0)];
        let split = split_revenue(Money::from_cents(1_001), &members);

        assert_eq!(split[0].1, Money::from_cents(501));
        assert_eq!(split[1].1, Money::from_cents(300));
        assert_eq!(split[2].1, Money::from_cents(200));
        let total: Money = split.iter().map(|(_, m)| *m).sum();
        assert_eq!(total, Money::from_cents(1_001));
    }

    #[test]
    fn split_handles_amounts_near_the_cent_limit() {
        let amount = Money::from_cents(i64::MAX / 100);
        let split = split_revenue(amount, &[member(60.0), member(40.0)]);

        let forty_percent = (i64::MAX / 100) as i128 * 4_000 / 10_000;
        assert_eq!(split[1].1, Money::from_cents(forty_percent as i64));
        let total: Money = split.iter().map(|(_, m)| *m).sum();
        assert_eq!(total, amount);
    }

    #[test]
    fn revenue_policy_validation() {
        assert!(validate_revenue_shares(&[member(60.0), member(40.0)]).is_ok());
        assert!(validate_revenue_shares(&[member(33.33), member(33.33), member(33.34)]).is_ok());
        assert!(validate_revenue_shares(&[]).is_err());
        assert!(validate_revenue_shares(&[member(60.0), member(30.0)]).is_err());
        assert!(validate_revenue_shares(&[member(100.0), member(0.0)]).is_err());

        let twice = member(50.0);
        assert!(validate_revenue_shares(&[twice.clone(), twice]).is_err());
    }
}
