// src/handlers/deals.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    db::deals_repo::FinancialTerms,
    middleware::auth::AuthenticatedUser,
    models::deals::PaymentMethod,
    services::{
        commission::SplitInput,
        deals_service::{CloseDealInput, SharePatch},
        workflow::StepAction,
    },
};

// =============================================================================
//  1. FECHAMENTO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseDealPayload {
    #[schema(example = "FINANCING")]
    pub payment_method: Option<PaymentMethod>,

    #[schema(example = "15000.00")]
    pub commission_amount: Option<Decimal>,

    // Termos financeiros: registrados como vieram, sem validação cruzada
    #[schema(example = "350000.00")]
    pub property_value: Option<Decimal>,
    pub cash_value: Option<Decimal>,
    pub fgts_value: Option<Decimal>,
    pub financing_value: Option<Decimal>,
    pub credit_letter_value: Option<Decimal>,
    pub installments_value: Option<Decimal>,

    pub notes: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    pub splits: Vec<SplitInput>,
}

// POST /api/deals/{deal_id}/close
#[utoipa::path(
    post,
    path = "/api/deals/{deal_id}/close",
    tag = "Deals",
    request_body = CloseDealPayload,
    responses(
        (status = 200, description = "Negócio fechado com as comissões reconciliadas"),
        (status = 400, description = "Comissão ou forma de pagamento inválida"),
        (status = 409, description = "Divisão exclui comissão já paga"),
        (status = 422, description = "Divisão de comissão inválida")
    ),
    params(
        ("deal_id" = Uuid, Path, description = "ID do Negócio")
    ),
    security(("api_jwt" = []))
)]
pub async fn close_deal(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<CloseDealPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let input = CloseDealInput {
        payment_method: payload.payment_method,
        commission_amount: payload.commission_amount,
        terms: FinancialTerms {
            property_value: payload.property_value,
            cash_value: payload.cash_value,
            fgts_value: payload.fgts_value,
            financing_value: payload.financing_value,
            credit_letter_value: payload.credit_letter_value,
            installments_value: payload.installments_value,
            notes: payload.notes,
        },
        splits: payload.splits,
    };

    let result = app_state
        .deals_service
        .close_deal(deal_id, input, user.0.id)
        .await?;

    Ok((StatusCode::OK, Json(result)))
}

// =============================================================================
//  2. ETAPAS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStepPayload {
    // "next" avança; "back" recua. Qualquer outro valor nem desserializa.
    #[schema(example = "next")]
    pub action: StepAction,
}

// POST /api/deals/{deal_id}/step
#[utoipa::path(
    post,
    path = "/api/deals/{deal_id}/step",
    tag = "Deals",
    request_body = UpdateStepPayload,
    responses(
        (status = 200, description = "Negócio movido no fluxo de pós-venda"),
        (status = 400, description = "Negócio sem etapa atual")
    ),
    params(
        ("deal_id" = Uuid, Path, description = "ID do Negócio")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_step(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<UpdateStepPayload>,
) -> Result<impl IntoResponse, AppError> {
    let deal = app_state
        .deals_service
        .update_step(deal_id, payload.action, user.0.id)
        .await?;

    Ok((StatusCode::OK, Json(deal)))
}

// =============================================================================
//  3. COMISSÃO AVULSA
// =============================================================================

// Campo ausente no JSON não mexe; `"notes": null` limpa de verdade
fn nullable_notes<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSharePayload {
    pub amount: Option<Decimal>,
    pub received: Option<Decimal>,
    pub is_paid: Option<bool>,
    #[serde(default, deserialize_with = "nullable_notes")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
}

// PATCH /api/deals/shares/{share_id}
#[utoipa::path(
    patch,
    path = "/api/deals/shares/{share_id}",
    tag = "Deals",
    request_body = UpdateSharePayload,
    responses(
        (status = 200, description = "Comissão atualizada"),
        (status = 404, description = "Comissão não encontrada")
    ),
    params(
        ("share_id" = Uuid, Path, description = "ID da Comissão")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_share(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(share_id): Path<Uuid>,
    Json(payload): Json<UpdateSharePayload>,
) -> Result<impl IntoResponse, AppError> {
    let patch = SharePatch {
        amount: payload.amount,
        received: payload.received,
        is_paid: payload.is_paid,
        notes: payload.notes,
    };

    let share = app_state
        .deals_service
        .update_share(share_id, patch, user.0.id)
        .await?;

    Ok((StatusCode::OK, Json(share)))
}

// DELETE /api/deals/{deal_id}/shares
#[utoipa::path(
    delete,
    path = "/api/deals/{deal_id}/shares",
    tag = "Deals",
    responses(
        (status = 204, description = "Comissões removidas e negócio reaberto"),
        (status = 409, description = "Há comissão já paga")
    ),
    params(
        ("deal_id" = Uuid, Path, description = "ID do Negócio")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_all_shares(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(deal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .deals_service
        .delete_all_shares(deal_id, user.0.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
