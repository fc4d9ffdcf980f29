//! Payment holds and wallets
//!
//! Wallet balances never go negative; the balance check and the debit are a
//! single conditional UPDATE.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction as DbTransaction, postgres::PgRow};
use tutoring::models::{LedgerCredit, Transaction, TransactionStatus};
use tutoring::repository::{TransactionRepository, WalletRepository};
use tutoring::{Money, TutoringError, TutoringResult};
use uuid::Uuid;

use super::{PgStore, corrupt, store_error};

const TRANSACTION_COLUMNS: &str =
    "id, session_id, student_id, amount_cents, net_amount_cents, status, created_at, updated_at";

fn transaction_from_row(row: &PgRow) -> TutoringResult<Transaction> {
    let status: String = row.get("status");
    Ok(Transaction {
        id: row.get("id"),
        session_id: row.get("session_id"),
        student_id: row.get("student_id"),
        amount: Money::from_cents(row.get("amount_cents")),
        net_amount: Money::from_cents(row.get("net_amount_cents")),
        status: status.parse().map_err(|e| corrupt("transactions.status", e))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn append_ledger(
    tx: &mut DbTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: Money,
    memo: &str,
) -> TutoringResult<()> {
    sqlx::query("INSERT INTO wallet_ledger (user_id, amount_cents, memo) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(amount.cents())
        .bind(memo)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
    Ok(())
}

#[async_trait]
impl TransactionRepository for PgStore {
    async fn place_hold(&self, hold: &Transaction, memo: &str) -> TutoringResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let debited = sqlx::query(
            r#"
            UPDATE wallets SET balance_cents = balance_cents - $2
            WHERE user_id = $1 AND balance_cents >= $2
            "#,
        )
        .bind(hold.student_id)
        .bind(hold.amount.cents())
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if debited.rows_affected() == 0 {
            return Err(TutoringError::conflict(format!(
                "Insufficient wallet balance for a payment of {}",
                hold.amount
            )));
        }

        append_ledger(&mut tx, hold.student_id, Money::ZERO - hold.amount, memo).await?;

        // The partial unique index rejects a second PENDING hold for the pair
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, session_id, student_id, amount_cents, net_amount_cents, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(hold.id)
        .bind(hold.session_id)
        .bind(hold.student_id)
        .bind(hold.amount.cents())
        .bind(hold.net_amount.cents())
        .bind(hold.status.as_str())
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match store_error(e) {
            TutoringError::Conflict(_) => {
                TutoringError::conflict("A payment for this session is already pending")
            }
            other => other,
        })?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn pending_for_session(&self, session_id: Uuid) -> TutoringResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE session_id = $1 AND status = 'PENDING'
            ORDER BY created_at
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn completed_with_pending_holds(&self) -> TutoringResult<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT DISTINCT t.session_id FROM transactions t
            JOIN sessions s ON s.id = t.session_id
            WHERE t.status = 'PENDING' AND s.status = 'COMPLETED'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn pending_for_student(
        &self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> TutoringResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE session_id = $1 AND student_id = $2 AND status = 'PENDING'
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn resolve(
        &self,
        hold_id: Uuid,
        to: TransactionStatus,
        credits: &[LedgerCredit],
        at: DateTime<Utc>,
    ) -> TutoringResult<bool> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let moved = sqlx::query(
            r#"
            UPDATE transactions SET status = $2, updated_at = $3
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(hold_id)
        .bind(to.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if moved.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE id = $1)")
                    .bind(hold_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(store_error)?;
            if !exists {
                return Err(TutoringError::not_found("Transaction", hold_id));
            }
            return Ok(false);
        }

        for credit in credits {
            sqlx::query(
                r#"
                INSERT INTO wallets (user_id, balance_cents) VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE
                SET balance_cents = wallets.balance_cents + EXCLUDED.balance_cents
                "#,
            )
            .bind(credit.user_id)
            .bind(credit.amount.cents())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            append_ledger(&mut tx, credit.user_id, credit.amount, &credit.memo).await?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }
}

#[async_trait]
impl WalletRepository for PgStore {
    async fn balance(&self, user_id: Uuid) -> TutoringResult<Money> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        Ok(Money::from_cents(cents.unwrap_or_default()))
    }
}
