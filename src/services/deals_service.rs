// src/services/deals_service.rs
//
// Orquestra as quatro operações públicas do motor de fechamento. Cada uma
// roda em uma única transação: ou tudo entra, ou nada entra. O negócio é
// carregado com FOR UPDATE, então dois escritores no mesmo negócio se
// enfileiram em vez de se atropelar.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{DealsRepository, RbacRepository, UserRepository, deals_repo::FinancialTerms},
    models::{
        auth::User,
        deals::{Deal, DealShare, DealWithShares, PaymentMethod},
    },
    services::{
        commission::{SplitInput, reconcile_shares, round_money, validate_splits},
        workflow::{
            FullRevertPolicy, StepAction, StepOutcome, guard_full_revert, plan_transition,
            workflow_for,
        },
    },
};

// Slugs de permissão: "own" para negócios do próprio corretor,
// ":all" para negócios de qualquer um da imobiliária.
pub const PERM_DEAL_CLOSE: &str = "deals:close";
pub const PERM_DEAL_CLOSE_ALL: &str = "deals:close:all";
pub const PERM_DEAL_UPDATE: &str = "deals:update";
pub const PERM_DEAL_UPDATE_ALL: &str = "deals:update:all";

// Entrada do fechamento, já desserializada pelo handler
#[derive(Debug, Clone)]
pub struct CloseDealInput {
    pub payment_method: Option<PaymentMethod>,
    pub commission_amount: Option<Decimal>,
    pub terms: FinancialTerms,
    pub splits: Vec<SplitInput>,
}

// Patch parcial de uma única comissão. Não revalida contra o total do
// negócio: operação de garantia menor, distinta da reconciliação em lote.
#[derive(Debug, Clone, Default)]
pub struct SharePatch {
    pub amount: Option<Decimal>,
    pub received: Option<Decimal>,
    pub is_paid: Option<bool>,
    // Dois níveis: `None` não mexe, `Some(None)` limpa as observações
    pub notes: Option<Option<String>>,
}

#[derive(Clone)]
pub struct DealsService {
    deals_repo: DealsRepository,
    user_repo: UserRepository,
    rbac_repo: RbacRepository,
    pool: PgPool,
    revert_policy: FullRevertPolicy,
}

impl DealsService {
    pub fn new(
        deals_repo: DealsRepository,
        user_repo: UserRepository,
        rbac_repo: RbacRepository,
        pool: PgPool,
        revert_policy: FullRevertPolicy,
    ) -> Self {
        Self {
            deals_repo,
            user_repo,
            rbac_repo,
            pool,
            revert_policy,
        }
    }

    // Dono do negócio passa com a permissão "own" OU a ":all"; qualquer
    // outro da imobiliária só com a ":all". Negócio de outra imobiliária
    // é reportado como inexistente.
    async fn ensure_deal_permission(
        &self,
        conn: &mut PgConnection,
        actor: &User,
        deal: &Deal,
        own_slug: &str,
        all_slug: &str,
    ) -> Result<(), AppError> {
        if deal.company_id != actor.company_id {
            return Err(AppError::DealNotFound);
        }

        if deal.created_by == actor.id {
            if self
                .rbac_repo
                .user_has_permission(&mut *conn, actor.id, own_slug)
                .await?
            {
                return Ok(());
            }
        }

        if self
            .rbac_repo
            .user_has_permission(&mut *conn, actor.id, all_slug)
            .await?
        {
            return Ok(());
        }

        Err(AppError::PermissionDenied)
    }

    // =========================================================================
    //  FECHAMENTO
    // =========================================================================

    /// Fecha o negócio: valida a divisão de comissão, reconcilia com as
    /// comissões existentes, grava os termos financeiros e muda o status
    /// para CLOSED. Tudo na mesma transação.
    pub async fn close_deal(
        &self,
        deal_id: Uuid,
        input: CloseDealInput,
        actor_id: Uuid,
    ) -> Result<DealWithShares, AppError> {
        let mut tx = self.pool.begin().await?;

        let actor = self
            .user_repo
            .find_user(&mut *tx, actor_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let deal = self
            .deals_repo
            .find_deal_for_update(&mut *tx, deal_id)
            .await?
            .ok_or(AppError::DealNotFound)?;

        self.ensure_deal_permission(&mut *tx, &actor, &deal, PERM_DEAL_CLOSE, PERM_DEAL_CLOSE_ALL)
            .await?;

        // Forma de pagamento: a do payload, senão a que o negócio já tinha
        let payment_method = input
            .payment_method
            .or(deal.payment_method)
            .ok_or(AppError::InvalidPaymentMethod)?;
        let steps = workflow_for(payment_method);

        // Primeira vez fechando: começa na primeira etapa do fluxo.
        // Refechamento preserva a etapa em que o negócio já estava.
        let current_step = deal.current_step.unwrap_or(steps[0]);

        let commission_amount = input
            .commission_amount
            .filter(|c| c.is_sign_positive() && !c.is_zero())
            .map(round_money)
            .ok_or(AppError::InvalidCommissionAmount)?;

        let member_ids: HashSet<Uuid> = self
            .user_repo
            .company_member_ids(&mut *tx, actor.company_id)
            .await?
            .into_iter()
            .collect();

        let proposed = validate_splits(commission_amount, &input.splits, &member_ids)?;

        let existing = self.deals_repo.find_shares_by_deal(&mut *tx, deal_id).await?;
        let plan = reconcile_shares(proposed, &existing, Utc::now())?;

        let deal = self
            .deals_repo
            .apply_closing(
                &mut *tx,
                deal_id,
                payment_method,
                current_step,
                commission_amount,
                &input.terms,
                actor.id,
            )
            .await?;

        for create in &plan.create {
            self.deals_repo
                .insert_share(&mut *tx, deal_id, deal.company_id, create)
                .await?;
        }
        for update in &plan.update {
            self.deals_repo.update_share(&mut *tx, update).await?;
        }
        for share_id in &plan.delete {
            self.deals_repo.delete_share(&mut *tx, *share_id).await?;
        }

        let shares = self.deals_repo.find_shares_by_deal(&mut *tx, deal_id).await?;

        tx.commit().await?;

        tracing::info!(
            "Negócio {} fechado: comissão {} dividida em {} cota(s)",
            deal_id,
            commission_amount,
            shares.len()
        );

        Ok(DealWithShares { deal, shares })
    }

    // =========================================================================
    //  ETAPAS
    // =========================================================================

    /// Avança ou recua o negócio no fluxo de pós-venda. As pontas do fluxo
    /// viram FINISHED (para frente) ou desfazem o fechamento (para trás).
    pub async fn update_step(
        &self,
        deal_id: Uuid,
        action: StepAction,
        actor_id: Uuid,
    ) -> Result<Deal, AppError> {
        let mut tx = self.pool.begin().await?;

        let actor = self
            .user_repo
            .find_user(&mut *tx, actor_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let deal = self
            .deals_repo
            .find_deal_for_update(&mut *tx, deal_id)
            .await?
            .ok_or(AppError::DealNotFound)?;

        self.ensure_deal_permission(&mut *tx, &actor, &deal, PERM_DEAL_UPDATE, PERM_DEAL_UPDATE_ALL)
            .await?;

        let current_step = deal.current_step.ok_or(AppError::MissingCurrentStep)?;
        let payment_method = deal.payment_method.ok_or(AppError::InvalidPaymentMethod)?;

        let outcome = plan_transition(
            deal.status,
            current_step,
            workflow_for(payment_method),
            action,
        )?;

        let deal = match outcome {
            StepOutcome::Step(step) => {
                self.deals_repo
                    .set_current_step(&mut *tx, deal_id, step, actor.id)
                    .await?
            }
            StepOutcome::Finish => {
                tracing::info!("Negócio {} concluiu a última etapa", deal_id);
                self.deals_repo.finish_deal(&mut *tx, deal_id, actor.id).await?
            }
            StepOutcome::ReopenFinished => {
                self.deals_repo
                    .reopen_finished(&mut *tx, deal_id, actor.id)
                    .await?
            }
            StepOutcome::FullRevert => {
                let shares = self.deals_repo.find_shares_by_deal(&mut *tx, deal_id).await?;
                guard_full_revert(self.revert_policy, &shares)?;

                let wiped = self
                    .deals_repo
                    .delete_shares_by_deal(&mut *tx, deal_id)
                    .await?;
                tracing::info!(
                    "Negócio {} desfez o fechamento ({} comissão(ões) removida(s))",
                    deal_id,
                    wiped
                );

                self.deals_repo.revert_to_open(&mut *tx, deal_id, actor.id).await?
            }
        };

        tx.commit().await?;

        Ok(deal)
    }

    // =========================================================================
    //  COMISSÃO AVULSA
    // =========================================================================

    /// Edita uma única comissão. Pagar carimba `paid_at`; despagar limpa.
    /// Não confere o somatório contra o total do negócio.
    pub async fn update_share(
        &self,
        share_id: Uuid,
        patch: SharePatch,
        actor_id: Uuid,
    ) -> Result<DealShare, AppError> {
        let mut tx = self.pool.begin().await?;

        let actor = self
            .user_repo
            .find_user(&mut *tx, actor_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        // Mesma ordem de lock do fechamento (negócio, depois comissão),
        // senão dois escritores no mesmo negócio podem se travar em AB-BA.
        // A primeira leitura é sem lock, só para achar o negócio.
        let share = self
            .deals_repo
            .find_share(&mut *tx, share_id)
            .await?
            .ok_or(AppError::ShareNotFound)?;

        let deal = self
            .deals_repo
            .find_deal_for_update(&mut *tx, share.deal_id)
            .await?
            .ok_or(AppError::DealNotFound)?;

        // Relê já com o negócio travado; pode ter sumido no intervalo
        let share = self
            .deals_repo
            .find_share_for_update(&mut *tx, share_id)
            .await?
            .ok_or(AppError::ShareNotFound)?;

        self.ensure_deal_permission(&mut *tx, &actor, &deal, PERM_DEAL_UPDATE, PERM_DEAL_UPDATE_ALL)
            .await?;

        let is_paid = patch.is_paid.unwrap_or(share.is_paid);
        let paid_at = match (share.is_paid, is_paid) {
            (false, true) => Some(Utc::now()),
            (true, false) => None,
            _ => share.paid_at,
        };

        let amount = patch.amount.map(round_money).unwrap_or(share.amount);
        let received = patch.received.map(round_money).unwrap_or(share.received);
        let notes = patch.notes.unwrap_or(share.notes);

        let share = self
            .deals_repo
            .patch_share(
                &mut *tx,
                share_id,
                amount,
                received,
                is_paid,
                paid_at,
                notes.as_deref(),
            )
            .await?;

        tx.commit().await?;

        Ok(share)
    }

    /// Apaga todas as comissões do negócio e o reabre. Recusa se qualquer
    /// uma já estiver paga — dinheiro pago não some em limpeza.
    pub async fn delete_all_shares(&self, deal_id: Uuid, actor_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let actor = self
            .user_repo
            .find_user(&mut *tx, actor_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let deal = self
            .deals_repo
            .find_deal_for_update(&mut *tx, deal_id)
            .await?
            .ok_or(AppError::DealNotFound)?;

        self.ensure_deal_permission(&mut *tx, &actor, &deal, PERM_DEAL_UPDATE, PERM_DEAL_UPDATE_ALL)
            .await?;

        let shares = self.deals_repo.find_shares_by_deal(&mut *tx, deal_id).await?;
        if shares.iter().any(|s| s.is_paid) {
            return Err(AppError::PaidShareProtected);
        }

        self.deals_repo.delete_shares_by_deal(&mut *tx, deal_id).await?;
        self.deals_repo.revert_to_open(&mut *tx, deal_id, actor.id).await?;

        tx.commit().await?;

        Ok(())
    }
}
