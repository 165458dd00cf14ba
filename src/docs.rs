// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Deals ---
        handlers::deals::close_deal,
        handlers::deals::update_step,
        handlers::deals::update_share,
        handlers::deals::delete_all_shares,
    ),
    components(
        schemas(
            models::deals::Deal,
            models::deals::DealShare,
            models::deals::DealWithShares,
            models::deals::DealStatus,
            models::deals::PaymentMethod,
            models::deals::SettlementStep,
            handlers::deals::CloseDealPayload,
            handlers::deals::UpdateStepPayload,
            handlers::deals::UpdateSharePayload,
            services::commission::SplitInput,
            services::workflow::StepAction,
        )
    ),
    tags(
        (name = "Deals", description = "Fechamento de negócios e divisão de comissões")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn with_security() -> utoipa::openapi::OpenApi {
        let mut doc = <Self as OpenApi>::openapi();
        if let Some(components) = doc.components.as_mut() {
            components.add_security_scheme(
                "api_jwt",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
        doc
    }
}
