// src/common/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Toda falha do motor de fechamento aborta a transação inteira; aqui só
// decidimos como ela chega ao cliente HTTP.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Você não tem permissão para realizar esta ação")]
    PermissionDenied,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Negócio não encontrado")]
    DealNotFound,

    #[error("Comissão não encontrada")]
    ShareNotFound,

    // --- Fechamento / divisão de comissão ---
    #[error("Forma de pagamento inválida ou ausente")]
    InvalidPaymentMethod,

    #[error("O valor da comissão deve ser informado e positivo")]
    InvalidCommissionAmount,

    #[error("Não é permitido misturar porcentagem e valor na divisão")]
    MixedSplitModes,

    #[error("O somatório não está correto")]
    SplitSumMismatch,

    #[error("A divisão de comissão não aceita valores negativos")]
    NegativeSplit,

    #[error("Beneficiário duplicado na divisão de comissão")]
    DuplicateBeneficiary,

    #[error("Beneficiário não pertence à imobiliária")]
    BeneficiaryOutsideCompany,

    // --- Etapas do pós-venda ---
    #[error("O negócio não possui etapa atual")]
    MissingCurrentStep,

    #[error("A etapa atual não pertence ao fluxo da forma de pagamento")]
    StepOutsideWorkflow,

    // --- Invariante financeira ---
    #[error("Impossível excluir comissão já paga")]
    PaidShareProtected,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, self.to_string()),

            AppError::UserNotFound | AppError::DealNotFound | AppError::ShareNotFound => {
                (StatusCode::NOT_FOUND, self.to_string())
            }

            AppError::InvalidPaymentMethod
            | AppError::InvalidCommissionAmount
            | AppError::MissingCurrentStep
            | AppError::StepOutsideWorkflow => (StatusCode::BAD_REQUEST, self.to_string()),

            AppError::MixedSplitModes
            | AppError::SplitSumMismatch
            | AppError::NegativeSplit
            | AppError::DuplicateBeneficiary
            | AppError::BeneficiaryOutsideCompany => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            AppError::PaidShareProtected => (StatusCode::CONFLICT, self.to_string()),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
