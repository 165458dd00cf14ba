// src/models/deals.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- ENUMS (Mapeando o Postgres) ---

// Mapeia o CREATE TYPE deal_status do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "deal_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    PotentialClients, // Em prospecção
    OldClients,       // Carteira antiga
    Closed,           // Fechado (dentro do fluxo de etapas)
    Finished,         // Concluído (última etapa vencida)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,         // À vista
    Financing,    // Financiamento bancário
    CreditLetter, // Carta de crédito / consórcio
}

// Etapas do pós-venda. Cada forma de pagamento usa um subconjunto ordenado
// (ver services::workflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "settlement_step", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStep {
    ContractSigning,
    BankApproval,
    CreditApproval,
    Itbi,
    NotarySigning,
    Registration,
    FundsRelease,
}

// --- NEGÓCIO ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,

    #[schema(ignore)]
    pub company_id: Uuid,

    pub client_id: Option<Uuid>,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,

    pub status: DealStatus,

    // Fixa depois do fechamento; define o fluxo de etapas
    pub payment_method: Option<PaymentMethod>,

    // Não-nula apenas enquanto o negócio está CLOSED/FINISHED
    pub current_step: Option<SettlementStep>,

    #[schema(example = "15000.00")]
    pub commission_amount: Option<Decimal>,

    // Campos financeiros capturados no fechamento (não validados entre si)
    #[schema(example = "350000.00")]
    pub property_value: Option<Decimal>,
    pub cash_value: Option<Decimal>,
    pub fgts_value: Option<Decimal>,
    pub financing_value: Option<Decimal>,
    pub credit_letter_value: Option<Decimal>,
    pub installments_value: Option<Decimal>,

    pub notes: Option<String>,

    pub closed_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- COMISSÃO (Uma linha por beneficiário) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealShare {
    pub id: Uuid,
    pub deal_id: Uuid,

    #[schema(ignore)]
    pub company_id: Uuid,

    // Exatamente um dos dois: corretor (user_id) OU a própria imobiliária
    pub user_id: Option<Uuid>,
    pub is_company: bool,

    #[schema(example = "9000.00")]
    pub amount: Decimal,

    // Quanto já entrou de fato
    #[schema(example = "0.00")]
    pub received: Decimal,

    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Identidade do beneficiário, usada como chave na reconciliação
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Beneficiary {
    User(Uuid),
    Company,
}

impl DealShare {
    pub fn beneficiary(&self) -> Beneficiary {
        match self.user_id {
            Some(user_id) => Beneficiary::User(user_id),
            None => Beneficiary::Company,
        }
    }
}

// Linhas de escrita decididas pela reconciliação (services::commission);
// o repositório só executa.

#[derive(Debug, Clone)]
pub struct ShareCreate {
    pub beneficiary: Beneficiary,
    pub amount: Decimal,
    pub received: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShareUpdate {
    pub id: Uuid,
    pub amount: Decimal,
    pub received: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

// Resposta do fechamento: o negócio + o conjunto final de comissões
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealWithShares {
    #[serde(flatten)]
    pub deal: Deal,
    pub shares: Vec<DealShare>,
}
