// src/db/rbac_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::common::error::AppError;

#[derive(Clone)]
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Verifica se o cargo do usuário carrega a permissão ("deals:close" etc.)
    pub async fn user_has_permission<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        slug: &str,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let has_permission = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM users u
                JOIN role_permissions rp ON rp.role_id = u.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE u.id = $1 AND p.slug = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(slug)
        .fetch_one(executor)
        .await?;

        Ok(has_permission)
    }
}
