// src/db/deals_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::deals::{
        Beneficiary, Deal, DealShare, PaymentMethod, SettlementStep, ShareCreate, ShareUpdate,
    },
};

// Termos financeiros capturados no fechamento. O motor não valida a
// consistência entre eles; são registro do que foi combinado.
#[derive(Debug, Clone, Default)]
pub struct FinancialTerms {
    pub property_value: Option<Decimal>,
    pub cash_value: Option<Decimal>,
    pub fgts_value: Option<Decimal>,
    pub financing_value: Option<Decimal>,
    pub credit_letter_value: Option<Decimal>,
    pub installments_value: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct DealsRepository {
    pool: PgPool,
}

impl DealsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    // FOR UPDATE: serializa escritores concorrentes no mesmo negócio.
    // Toda operação do motor começa por aqui, dentro da transação.
    pub async fn find_deal_for_update<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
    ) -> Result<Option<Deal>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1 FOR UPDATE")
            .bind(deal_id)
            .fetch_optional(executor)
            .await?;

        Ok(deal)
    }

    pub async fn find_shares_by_deal<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
    ) -> Result<Vec<DealShare>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let shares = sqlx::query_as::<_, DealShare>(
            "SELECT * FROM deal_shares WHERE deal_id = $1 ORDER BY created_at",
        )
        .bind(deal_id)
        .fetch_all(executor)
        .await?;

        Ok(shares)
    }

    // Leitura sem lock: serve só para descobrir o deal_id da comissão.
    // O lock vem depois, sempre na ordem negócio -> comissão.
    pub async fn find_share<'e, E>(
        &self,
        executor: E,
        share_id: Uuid,
    ) -> Result<Option<DealShare>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let share = sqlx::query_as::<_, DealShare>("SELECT * FROM deal_shares WHERE id = $1")
            .bind(share_id)
            .fetch_optional(executor)
            .await?;

        Ok(share)
    }

    pub async fn find_share_for_update<'e, E>(
        &self,
        executor: E,
        share_id: Uuid,
    ) -> Result<Option<DealShare>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let share =
            sqlx::query_as::<_, DealShare>("SELECT * FROM deal_shares WHERE id = $1 FOR UPDATE")
                .bind(share_id)
                .fetch_optional(executor)
                .await?;

        Ok(share)
    }

    // =========================================================================
    //  FECHAMENTO
    // =========================================================================

    // O COALESCE garante o closed_at idempotente: refechar um negócio já
    // fechado não mexe no relógio.
    pub async fn apply_closing<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        payment_method: PaymentMethod,
        current_step: SettlementStep,
        commission_amount: Decimal,
        terms: &FinancialTerms,
        updated_by: Uuid,
    ) -> Result<Deal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET status = 'CLOSED',
                payment_method = $2,
                current_step = $3,
                commission_amount = $4,
                property_value = $5,
                cash_value = $6,
                fgts_value = $7,
                financing_value = $8,
                credit_letter_value = $9,
                installments_value = $10,
                notes = COALESCE($11, notes),
                closed_at = COALESCE(closed_at, NOW()),
                finalized_at = NULL,
                updated_by = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(payment_method)
        .bind(current_step)
        .bind(commission_amount)
        .bind(terms.property_value)
        .bind(terms.cash_value)
        .bind(terms.fgts_value)
        .bind(terms.financing_value)
        .bind(terms.credit_letter_value)
        .bind(terms.installments_value)
        .bind(terms.notes.as_deref())
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

        Ok(deal)
    }

    // =========================================================================
    //  COMISSÕES
    // =========================================================================

    pub async fn insert_share<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        company_id: Uuid,
        share: &ShareCreate,
    ) -> Result<DealShare, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let (user_id, is_company) = match share.beneficiary {
            Beneficiary::User(user_id) => (Some(user_id), false),
            Beneficiary::Company => (None, true),
        };

        let row = sqlx::query_as::<_, DealShare>(
            r#"
            INSERT INTO deal_shares (
                deal_id, company_id, user_id, is_company,
                amount, received, is_paid, paid_at, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(company_id)
        .bind(user_id)
        .bind(is_company)
        .bind(share.amount)
        .bind(share.received)
        .bind(share.is_paid)
        .bind(share.paid_at)
        .bind(share.notes.as_deref())
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn update_share<'e, E>(
        &self,
        executor: E,
        update: &ShareUpdate,
    ) -> Result<DealShare, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, DealShare>(
            r#"
            UPDATE deal_shares
            SET amount = $2,
                received = $3,
                is_paid = $4,
                paid_at = $5,
                notes = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(update.id)
        .bind(update.amount)
        .bind(update.received)
        .bind(update.is_paid)
        .bind(update.paid_at)
        .bind(update.notes.as_deref())
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn patch_share<'e, E>(
        &self,
        executor: E,
        share_id: Uuid,
        amount: Decimal,
        received: Decimal,
        is_paid: bool,
        paid_at: Option<DateTime<Utc>>,
        notes: Option<&str>,
    ) -> Result<DealShare, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, DealShare>(
            r#"
            UPDATE deal_shares
            SET amount = $2,
                received = $3,
                is_paid = $4,
                paid_at = $5,
                notes = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(share_id)
        .bind(amount)
        .bind(received)
        .bind(is_paid)
        .bind(paid_at)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    pub async fn delete_share<'e, E>(&self, executor: E, share_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM deal_shares WHERE id = $1")
            .bind(share_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn delete_shares_by_deal<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM deal_shares WHERE deal_id = $1")
            .bind(deal_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    //  ETAPAS
    // =========================================================================

    pub async fn set_current_step<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        step: SettlementStep,
        updated_by: Uuid,
    ) -> Result<Deal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET current_step = $2, updated_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(step)
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

        Ok(deal)
    }

    pub async fn finish_deal<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        updated_by: Uuid,
    ) -> Result<Deal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET status = 'FINISHED',
                finalized_at = COALESCE(finalized_at, NOW()),
                updated_by = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

        Ok(deal)
    }

    // Desfaz só a finalização; a etapa atual fica onde estava
    pub async fn reopen_finished<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        updated_by: Uuid,
    ) -> Result<Deal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET status = 'CLOSED',
                finalized_at = NULL,
                updated_by = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

        Ok(deal)
    }

    // Desfazer do fechamento inteiro: o negócio volta à prospecção.
    // Quem apaga as comissões antes é o serviço (política de revert).
    pub async fn revert_to_open<'e, E>(
        &self,
        executor: E,
        deal_id: Uuid,
        updated_by: Uuid,
    ) -> Result<Deal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deal = sqlx::query_as::<_, Deal>(
            r#"
            UPDATE deals
            SET status = 'POTENTIAL_CLIENTS',
                commission_amount = NULL,
                current_step = NULL,
                closed_at = NULL,
                finalized_at = NULL,
                updated_by = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(deal_id)
        .bind(updated_by)
        .fetch_one(executor)
        .await?;

        Ok(deal)
    }
}
