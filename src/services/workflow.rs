// src/services/workflow.rs
//
// Fluxo de pós-venda: cada forma de pagamento tem uma sequência fixa de
// etapas. A máquina de transição é pura; o DealsService persiste o resultado.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    common::error::AppError,
    models::deals::{DealShare, DealStatus, PaymentMethod, SettlementStep},
};

use SettlementStep::*;

// Tabela imutável: forma de pagamento -> etapas em ordem.
// Não é editável pelo usuário; mudar o fluxo é mudança de código.
pub fn workflow_for(method: PaymentMethod) -> &'static [SettlementStep] {
    match method {
        PaymentMethod::Cash => &[ContractSigning, Itbi, NotarySigning, Registration],
        PaymentMethod::Financing => &[
            ContractSigning,
            BankApproval,
            Itbi,
            NotarySigning,
            Registration,
            FundsRelease,
        ],
        PaymentMethod::CreditLetter => &[
            ContractSigning,
            CreditApproval,
            Itbi,
            NotarySigning,
            Registration,
            FundsRelease,
        ],
    }
}

// Ação de transição. Duas variantes em vez de string solta: "ação inválida"
// deixa de existir como erro de runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub enum StepAction {
    #[serde(rename = "next")]
    Advance,
    #[serde(rename = "back")]
    Retreat,
}

// O que a máquina decidiu; quem aplica é o serviço.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Anda (ou volta) para outra etapa do fluxo
    Step(SettlementStep),
    /// Venceu a última etapa: o negócio vira FINISHED
    Finish,
    /// Desfaz só a finalização: FINISHED volta a CLOSED, etapa intacta
    ReopenFinished,
    /// Voltou para antes da primeira etapa: desfazer o fechamento inteiro
    FullRevert,
}

// Política para o FullRevert: o comportamento herdado apaga todas as
// comissões, pagas inclusive. A alternativa bloqueia se houver paga.
// Fica nomeado e configurável até o produto bater o martelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullRevertPolicy {
    #[default]
    WipeAll,
    BlockIfPaid,
}

impl FullRevertPolicy {
    pub fn from_env_value(value: &str) -> Self {
        match value {
            "block_if_paid" => Self::BlockIfPaid,
            _ => Self::WipeAll,
        }
    }
}

/// Decide se o desfazer do fechamento pode apagar as comissões do negócio.
/// `WipeAll` sempre deixa passar; `BlockIfPaid` recusa se houver paga.
pub fn guard_full_revert(
    policy: FullRevertPolicy,
    shares: &[DealShare],
) -> Result<(), AppError> {
    if policy == FullRevertPolicy::BlockIfPaid && shares.iter().any(|s| s.is_paid) {
        return Err(AppError::PaidShareProtected);
    }

    Ok(())
}

/// Calcula a próxima transição de um negócio fechado.
///
/// O fluxo é linear: sem pulos, só um passo por chamada. As duas pontas são
/// especiais: `Advance` além da última etapa finaliza; `Retreat` antes da
/// primeira desfaz o fechamento. `Retreat` em um negócio FINISHED desfaz
/// apenas a finalização.
pub fn plan_transition(
    status: DealStatus,
    current: SettlementStep,
    steps: &'static [SettlementStep],
    action: StepAction,
) -> Result<StepOutcome, AppError> {
    if status == DealStatus::Finished && action == StepAction::Retreat {
        return Ok(StepOutcome::ReopenFinished);
    }

    let index = steps
        .iter()
        .position(|step| *step == current)
        .ok_or(AppError::StepOutsideWorkflow)?;

    let outcome = match action {
        StepAction::Advance => match steps.get(index + 1) {
            Some(next) => StepOutcome::Step(*next),
            None => StepOutcome::Finish,
        },
        StepAction::Retreat => match index.checked_sub(1) {
            Some(prev) => StepOutcome::Step(steps[prev]),
            None => StepOutcome::FullRevert,
        },
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avancar_ate_o_fim_sempre_finaliza() {
        for method in [
            PaymentMethod::Cash,
            PaymentMethod::Financing,
            PaymentMethod::CreditLetter,
        ] {
            let steps = workflow_for(method);
            let mut current = steps[0];

            for esperado in &steps[1..] {
                let outcome =
                    plan_transition(DealStatus::Closed, current, steps, StepAction::Advance)
                        .unwrap();
                assert_eq!(outcome, StepOutcome::Step(*esperado));
                current = *esperado;
            }

            // Passou da última etapa: finaliza
            let outcome =
                plan_transition(DealStatus::Closed, current, steps, StepAction::Advance).unwrap();
            assert_eq!(outcome, StepOutcome::Finish);
        }
    }

    #[test]
    fn voltar_de_finished_reabre_na_mesma_etapa() {
        let steps = workflow_for(PaymentMethod::Cash);
        let ultima = *steps.last().unwrap();

        let outcome =
            plan_transition(DealStatus::Finished, ultima, steps, StepAction::Retreat).unwrap();
        assert_eq!(outcome, StepOutcome::ReopenFinished);
    }

    #[test]
    fn voltar_da_primeira_etapa_desfaz_o_fechamento() {
        let steps = workflow_for(PaymentMethod::Financing);

        let outcome =
            plan_transition(DealStatus::Closed, steps[0], steps, StepAction::Retreat).unwrap();
        assert_eq!(outcome, StepOutcome::FullRevert);
    }

    #[test]
    fn voltar_no_meio_recua_uma_etapa() {
        let steps = workflow_for(PaymentMethod::Cash);

        let outcome = plan_transition(
            DealStatus::Closed,
            SettlementStep::NotarySigning,
            steps,
            StepAction::Retreat,
        )
        .unwrap();
        assert_eq!(outcome, StepOutcome::Step(SettlementStep::Itbi));
    }

    #[test]
    fn etapa_fora_do_fluxo_e_erro_de_integridade() {
        // BankApproval não existe no fluxo à vista
        let steps = workflow_for(PaymentMethod::Cash);

        let err = plan_transition(
            DealStatus::Closed,
            SettlementStep::BankApproval,
            steps,
            StepAction::Advance,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::StepOutsideWorkflow));
    }

    #[test]
    fn acao_desserializa_de_next_e_back() {
        let next: StepAction = serde_json::from_str("\"next\"").unwrap();
        let back: StepAction = serde_json::from_str("\"back\"").unwrap();
        assert_eq!(next, StepAction::Advance);
        assert_eq!(back, StepAction::Retreat);

        assert!(serde_json::from_str::<StepAction>("\"sideways\"").is_err());
    }

    fn share_paga(is_paid: bool) -> DealShare {
        use chrono::Utc;
        use rust_decimal_macros::dec;
        use uuid::Uuid;

        let now = Utc::now();
        DealShare {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            is_company: false,
            amount: dec!(600.00),
            received: if is_paid { dec!(600.00) } else { dec!(0) },
            is_paid,
            paid_at: is_paid.then_some(now),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn wipe_all_desfaz_mesmo_com_comissao_paga() {
        let shares = vec![share_paga(true), share_paga(false)];
        assert!(guard_full_revert(FullRevertPolicy::WipeAll, &shares).is_ok());
    }

    #[test]
    fn block_if_paid_recusa_com_comissao_paga() {
        let shares = vec![share_paga(false), share_paga(true)];

        let err = guard_full_revert(FullRevertPolicy::BlockIfPaid, &shares).unwrap_err();
        assert!(matches!(err, AppError::PaidShareProtected));
    }

    #[test]
    fn block_if_paid_deixa_passar_sem_paga() {
        let shares = vec![share_paga(false)];
        assert!(guard_full_revert(FullRevertPolicy::BlockIfPaid, &shares).is_ok());
    }

    #[test]
    fn politica_de_revert_vem_do_env() {
        assert_eq!(
            FullRevertPolicy::from_env_value("block_if_paid"),
            FullRevertPolicy::BlockIfPaid
        );
        assert_eq!(
            FullRevertPolicy::from_env_value("wipe_all"),
            FullRevertPolicy::WipeAll
        );
    }
}
