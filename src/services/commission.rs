// src/services/commission.rs
//
// O coração financeiro do fechamento: valida a divisão de comissão proposta
// e reconcilia com as comissões já gravadas do negócio. Tudo aqui é puro
// (sem banco); o DealsService aplica o plano dentro da transação.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::deals::{Beneficiary, DealShare, ShareCreate, ShareUpdate},
};

// Arredondamento de dinheiro: 2 casas, metade para cima
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// --- ENTRADA (como chega do payload de fechamento) ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SplitInput {
    // Exatamente um: corretor OU a imobiliária
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub is_company: bool,

    // Exatamente um modo para o lote todo: porcentagem OU valor
    #[schema(example = "60.00")]
    pub percentage: Option<Decimal>,
    #[schema(example = "9000.00")]
    pub amount: Option<Decimal>,

    #[serde(default)]
    pub is_paid: bool,
    pub received: Option<Decimal>,
    pub notes: Option<String>,
}

// --- SAÍDA NORMALIZADA (pronta para reconciliar) ---

#[derive(Debug, Clone, PartialEq)]
pub struct ProposedShare {
    pub beneficiary: Beneficiary,
    pub amount: Decimal,
    pub received: Decimal,
    pub is_paid: bool,
    pub notes: Option<String>,
}

/// Valida a divisão de comissão de um fechamento e a normaliza em valores
/// absolutos de 2 casas decimais.
///
/// Regras:
/// - um único modo (porcentagem XOR valor) para o lote inteiro;
/// - porcentagens somam 100,00; valores somam o total da comissão;
/// - cada beneficiário aparece no máximo uma vez;
/// - todo `user_id` precisa pertencer à imobiliária de quem fecha;
/// - cotas que arredondam para 0,00 são descartadas (não viram linha).
pub fn validate_splits(
    commission_total: Decimal,
    splits: &[SplitInput],
    company_members: &HashSet<Uuid>,
) -> Result<Vec<ProposedShare>, AppError> {
    let uses_percentage = splits.iter().any(|s| s.percentage.is_some());
    let uses_amount = splits.iter().any(|s| s.amount.is_some());

    if uses_percentage && uses_amount {
        return Err(AppError::MixedSplitModes);
    }

    let mut seen: HashSet<Beneficiary> = HashSet::new();
    let mut proposed = Vec::with_capacity(splits.len());

    for split in splits {
        let beneficiary = match (split.user_id, split.is_company) {
            (Some(user_id), false) => {
                if !company_members.contains(&user_id) {
                    return Err(AppError::BeneficiaryOutsideCompany);
                }
                Beneficiary::User(user_id)
            }
            (None, true) => Beneficiary::Company,
            // Nenhum beneficiário, ou os dois ao mesmo tempo
            _ => return Err(AppError::BeneficiaryOutsideCompany),
        };

        if !seen.insert(beneficiary) {
            return Err(AppError::DuplicateBeneficiary);
        }

        // Cota negativa não existe: 150% + (-50%) somaria 100 e passaria
        let amount = if uses_percentage {
            let pct = split.percentage.ok_or(AppError::MixedSplitModes)?;
            if pct < Decimal::ZERO {
                return Err(AppError::NegativeSplit);
            }
            round_money(commission_total * pct / Decimal::ONE_HUNDRED)
        } else {
            let value = split.amount.ok_or(AppError::MixedSplitModes)?;
            if value < Decimal::ZERO {
                return Err(AppError::NegativeSplit);
            }
            round_money(value)
        };

        // Cota zerada não vira comissão
        if amount.is_zero() {
            continue;
        }

        let received = split.received.unwrap_or(Decimal::ZERO);
        if received < Decimal::ZERO {
            return Err(AppError::NegativeSplit);
        }

        proposed.push(ProposedShare {
            beneficiary,
            amount,
            received,
            is_paid: split.is_paid,
            notes: split.notes.clone(),
        });
    }

    // Conferência do somatório no modo original (antes do descarte de zeros)
    if uses_percentage {
        let total_pct: Decimal = splits.iter().filter_map(|s| s.percentage).sum();
        if round_money(total_pct) != Decimal::ONE_HUNDRED {
            return Err(AppError::SplitSumMismatch);
        }
    } else {
        let total_amount: Decimal = splits.iter().filter_map(|s| s.amount).sum();
        if round_money(total_amount) != round_money(commission_total) {
            return Err(AppError::SplitSumMismatch);
        }
    }

    Ok(proposed)
}

// --- PLANO DE RECONCILIAÇÃO ---

#[derive(Debug, Default)]
pub struct SharePlan {
    pub create: Vec<ShareCreate>,
    pub update: Vec<ShareUpdate>,
    pub delete: Vec<Uuid>,
}

/// Compara a divisão proposta com as comissões já gravadas e produz o plano
/// de escrita (criar / atualizar / excluir).
///
/// Proteção de pagas: quem já está `is_paid` nunca sai pelo caminho da
/// reconciliação — sobrou sem par na proposta, a operação inteira falha.
/// Despagar (`is_paid` true -> false) zera o `received` e limpa `paid_at`.
pub fn reconcile_shares(
    proposed: Vec<ProposedShare>,
    existing: &[DealShare],
    now: DateTime<Utc>,
) -> Result<SharePlan, AppError> {
    let mut by_beneficiary: HashMap<Beneficiary, &DealShare> = HashMap::new();
    for share in existing {
        // Duas linhas para o mesmo beneficiário é corrupção de dados
        if by_beneficiary.insert(share.beneficiary(), share).is_some() {
            return Err(AppError::DuplicateBeneficiary);
        }
    }

    let mut plan = SharePlan::default();

    for share in proposed {
        match by_beneficiary.remove(&share.beneficiary) {
            Some(current) => {
                let (received, paid_at) = match (current.is_paid, share.is_paid) {
                    // Despagou: o que tinha entrado volta a zero
                    (true, false) => (Decimal::ZERO, None),
                    // Pagou agora: carimba o momento
                    (false, true) => (share.received, Some(now)),
                    _ => (share.received, current.paid_at),
                };

                plan.update.push(ShareUpdate {
                    id: current.id,
                    amount: share.amount,
                    received,
                    is_paid: share.is_paid,
                    paid_at,
                    notes: share.notes,
                });
            }
            None => {
                let paid_at = share.is_paid.then_some(now);
                plan.create.push(ShareCreate {
                    beneficiary: share.beneficiary,
                    amount: share.amount,
                    received: share.received,
                    is_paid: share.is_paid,
                    paid_at,
                    notes: share.notes,
                });
            }
        }
    }

    // Quem sobrou não está mais na divisão: só pode sair se ainda não foi pago
    for leftover in by_beneficiary.into_values() {
        if leftover.is_paid {
            return Err(AppError::PaidShareProtected);
        }
        plan.delete.push(leftover.id);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn members(ids: &[Uuid]) -> HashSet<Uuid> {
        ids.iter().copied().collect()
    }

    fn pct_split(user_id: Option<Uuid>, is_company: bool, pct: Decimal) -> SplitInput {
        SplitInput {
            user_id,
            is_company,
            percentage: Some(pct),
            amount: None,
            is_paid: false,
            received: None,
            notes: None,
        }
    }

    fn amount_split(user_id: Option<Uuid>, is_company: bool, amount: Decimal) -> SplitInput {
        SplitInput {
            user_id,
            is_company,
            percentage: None,
            amount: Some(amount),
            is_paid: false,
            received: None,
            notes: None,
        }
    }

    fn existing_share(
        user_id: Option<Uuid>,
        amount: Decimal,
        is_paid: bool,
        received: Decimal,
    ) -> DealShare {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        DealShare {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            user_id,
            is_company: user_id.is_none(),
            amount,
            received,
            is_paid,
            paid_at: is_paid.then_some(now),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn porcentagem_60_40_de_1000() {
        let corretor = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(corretor), false, dec!(60)),
            pct_split(None, true, dec!(40)),
        ];

        let shares = validate_splits(dec!(1000.00), &splits, &members(&[corretor])).unwrap();

        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].beneficiary, Beneficiary::User(corretor));
        assert_eq!(shares[0].amount, dec!(600.00));
        assert_eq!(shares[1].beneficiary, Beneficiary::Company);
        assert_eq!(shares[1].amount, dec!(400.00));
    }

    #[test]
    fn porcentagem_que_nao_soma_100_falha() {
        let corretor = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(corretor), false, dec!(60)),
            pct_split(None, true, dec!(30)),
        ];

        let err = validate_splits(dec!(1000), &splits, &members(&[corretor])).unwrap_err();
        assert!(matches!(err, AppError::SplitSumMismatch));
    }

    #[test]
    fn valores_que_nao_somam_o_total_falham() {
        let corretor = Uuid::new_v4();
        let splits = vec![
            amount_split(Some(corretor), false, dec!(600)),
            amount_split(None, true, dec!(350)),
        ];

        let err = validate_splits(dec!(1000.00), &splits, &members(&[corretor])).unwrap_err();
        assert!(matches!(err, AppError::SplitSumMismatch));
    }

    #[test]
    fn misturar_porcentagem_e_valor_falha() {
        let corretor = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(corretor), false, dec!(60)),
            amount_split(None, true, dec!(400)),
        ];

        let err = validate_splits(dec!(1000), &splits, &members(&[corretor])).unwrap_err();
        assert!(matches!(err, AppError::MixedSplitModes));
    }

    #[test]
    fn split_sem_modo_nenhum_falha() {
        let corretor = Uuid::new_v4();
        let mut split = pct_split(Some(corretor), false, dec!(100));
        split.percentage = None;

        let err = validate_splits(dec!(1000), &[split], &members(&[corretor])).unwrap_err();
        assert!(matches!(err, AppError::MixedSplitModes));
    }

    #[test]
    fn cota_zerada_e_descartada_mas_soma_confere() {
        let a = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(a), false, dec!(100)),
            pct_split(None, true, dec!(0)),
        ];

        let shares = validate_splits(dec!(1000), &splits, &members(&[a])).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].amount, dec!(1000.00));
    }

    #[test]
    fn centavos_nao_derivam_no_calculo_percentual() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(a), false, dec!(33.33)),
            pct_split(Some(b), false, dec!(66.67)),
        ];

        let shares = validate_splits(dec!(1000.00), &splits, &members(&[a, b])).unwrap();
        assert_eq!(shares[0].amount, dec!(333.30));
        assert_eq!(shares[1].amount, dec!(666.70));
    }

    #[test]
    fn porcentagem_negativa_falha_mesmo_somando_100() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(a), false, dec!(150)),
            pct_split(Some(b), false, dec!(-50)),
        ];

        let err = validate_splits(dec!(1000.00), &splits, &members(&[a, b])).unwrap_err();
        assert!(matches!(err, AppError::NegativeSplit));
    }

    #[test]
    fn valor_negativo_falha_mesmo_somando_o_total() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let splits = vec![
            amount_split(Some(a), false, dec!(1500)),
            amount_split(Some(b), false, dec!(-500)),
        ];

        let err = validate_splits(dec!(1000.00), &splits, &members(&[a, b])).unwrap_err();
        assert!(matches!(err, AppError::NegativeSplit));
    }

    #[test]
    fn recebido_negativo_falha() {
        let a = Uuid::new_v4();
        let mut split = pct_split(Some(a), false, dec!(100));
        split.received = Some(dec!(-10));

        let err = validate_splits(dec!(1000), &[split], &members(&[a])).unwrap_err();
        assert!(matches!(err, AppError::NegativeSplit));
    }

    #[test]
    fn beneficiario_de_outra_imobiliaria_falha() {
        let de_fora = Uuid::new_v4();
        let splits = vec![pct_split(Some(de_fora), false, dec!(100))];

        let err = validate_splits(dec!(1000), &splits, &members(&[])).unwrap_err();
        assert!(matches!(err, AppError::BeneficiaryOutsideCompany));
    }

    #[test]
    fn beneficiario_duplicado_falha() {
        let corretor = Uuid::new_v4();
        let splits = vec![
            pct_split(Some(corretor), false, dec!(50)),
            pct_split(Some(corretor), false, dec!(50)),
        ];

        let err = validate_splits(dec!(1000), &splits, &members(&[corretor])).unwrap_err();
        assert!(matches!(err, AppError::DuplicateBeneficiary));
    }

    #[test]
    fn imobiliaria_duplicada_falha() {
        let splits = vec![
            amount_split(None, true, dec!(500)),
            amount_split(None, true, dec!(500)),
        ];

        let err = validate_splits(dec!(1000), &splits, &members(&[])).unwrap_err();
        assert!(matches!(err, AppError::DuplicateBeneficiary));
    }

    // --- Reconciliação ---

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 15, 9, 30, 0).unwrap()
    }

    fn proposed(beneficiary: Beneficiary, amount: Decimal, is_paid: bool) -> ProposedShare {
        ProposedShare {
            beneficiary,
            amount,
            received: Decimal::ZERO,
            is_paid,
            notes: None,
        }
    }

    #[test]
    fn cria_atualiza_e_exclui_no_mesmo_plano() {
        let fica = Uuid::new_v4();
        let sai = Uuid::new_v4();
        let entra = Uuid::new_v4();

        let existing = vec![
            existing_share(Some(fica), dec!(500), false, dec!(0)),
            existing_share(Some(sai), dec!(500), false, dec!(0)),
        ];
        let plan = reconcile_shares(
            vec![
                proposed(Beneficiary::User(fica), dec!(700), false),
                proposed(Beneficiary::User(entra), dec!(300), false),
            ],
            &existing,
            now(),
        )
        .unwrap();

        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].beneficiary, Beneficiary::User(entra));
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.update[0].id, existing[0].id);
        assert_eq!(plan.update[0].amount, dec!(700));
        assert_eq!(plan.delete, vec![existing[1].id]);
    }

    #[test]
    fn sobra_paga_bloqueia_a_operacao_inteira() {
        let pago = Uuid::new_v4();
        let existing = vec![existing_share(Some(pago), dec!(600), true, dec!(600))];

        // A nova divisão omite o beneficiário que já recebeu
        let err = reconcile_shares(
            vec![proposed(Beneficiary::Company, dec!(1000), false)],
            &existing,
            now(),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::PaidShareProtected));
    }

    #[test]
    fn despagar_zera_o_recebido_e_limpa_paid_at() {
        let corretor = Uuid::new_v4();
        let existing = vec![existing_share(Some(corretor), dec!(600), true, dec!(600))];

        let mut nova = proposed(Beneficiary::User(corretor), dec!(600), false);
        nova.received = dec!(600);

        let plan = reconcile_shares(vec![nova], &existing, now()).unwrap();

        assert_eq!(plan.update.len(), 1);
        assert!(!plan.update[0].is_paid);
        assert_eq!(plan.update[0].received, dec!(0));
        assert_eq!(plan.update[0].paid_at, None);
    }

    #[test]
    fn pagar_na_reconciliacao_carimba_paid_at() {
        let corretor = Uuid::new_v4();
        let existing = vec![existing_share(Some(corretor), dec!(600), false, dec!(0))];

        let mut nova = proposed(Beneficiary::User(corretor), dec!(600), true);
        nova.received = dec!(600);

        let plan = reconcile_shares(vec![nova], &existing, now()).unwrap();

        assert!(plan.update[0].is_paid);
        assert_eq!(plan.update[0].paid_at, Some(now()));
        assert_eq!(plan.update[0].received, dec!(600));
    }

    #[test]
    fn quem_segue_pago_mantem_o_paid_at_original() {
        let corretor = Uuid::new_v4();
        let existing = vec![existing_share(Some(corretor), dec!(600), true, dec!(600))];
        let original = existing[0].paid_at;

        let mut nova = proposed(Beneficiary::User(corretor), dec!(650), true);
        nova.received = dec!(600);

        let plan = reconcile_shares(vec![nova], &existing, now()).unwrap();
        assert_eq!(plan.update[0].paid_at, original);
    }

    #[test]
    fn nova_comissao_ja_paga_nasce_com_paid_at() {
        let corretor = Uuid::new_v4();
        let plan = reconcile_shares(
            vec![proposed(Beneficiary::User(corretor), dec!(600), true)],
            &[],
            now(),
        )
        .unwrap();

        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].paid_at, Some(now()));
    }

    #[test]
    fn duplicata_no_banco_e_erro_de_integridade() {
        let corretor = Uuid::new_v4();
        let existing = vec![
            existing_share(Some(corretor), dec!(300), false, dec!(0)),
            existing_share(Some(corretor), dec!(300), false, dec!(0)),
        ];

        let err = reconcile_shares(vec![], &existing, now()).unwrap_err();
        assert!(matches!(err, AppError::DuplicateBeneficiary));
    }
}
