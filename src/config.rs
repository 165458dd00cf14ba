// src/config.rs

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{env, time::Duration};

use crate::{
    db::{DealsRepository, RbacRepository, UserRepository},
    services::{auth::AuthService, deals_service::DealsService, workflow::FullRevertPolicy},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub deals_service: DealsService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");

        // O que fazer com comissões pagas quando um negócio volta para antes
        // da primeira etapa. "wipe_all" reproduz o comportamento herdado.
        let revert_policy = FullRevertPolicy::from_env_value(
            env::var("FULL_REVERT_POLICY").unwrap_or_default().as_str(),
        );

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let user_repo = UserRepository::new(db_pool.clone());
        let rbac_repo = RbacRepository::new(db_pool.clone());
        let deals_repo = DealsRepository::new(db_pool.clone());

        let auth_service = AuthService::new(user_repo.clone(), jwt_secret);
        let deals_service = DealsService::new(
            deals_repo,
            user_repo,
            rbac_repo,
            db_pool.clone(),
            revert_policy,
        );

        Ok(Self {
            db_pool,
            auth_service,
            deals_service,
        })
    }
}
