//! Integration configuration repository.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::info;

use crate::DbResult;

#[async_trait]
pub trait ConfigRepo: Send + Sync {
    async fn get(&self, service: &str, key: &str) -> DbResult<Option<String>>;

    /// Insert or update an entry. An existing description is kept when none is given.
    async fn set(
        &self,
        service: &str,
        key: &str,
        value: &str,
        is_secret: bool,
        description: Option<&str>,
    ) -> DbResult<()>;

    /// Every non-secret entry of a service.
    async fn all_non_secret(&self, service: &str) -> DbResult<BTreeMap<String, String>>;
}

/// PostgreSQL implementation of ConfigRepo.
pub struct PgConfigRepo {
    pool: PgPool,
}

impl PgConfigRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigRepo for PgConfigRepo {
    async fn get(&self, service: &str, key: &str) -> DbResult<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as(
            "SELECT config_value FROM integration_config WHERE service = $1 AND config_key = $2",
        )
        .bind(service)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.map(|(v,)| v))
    }

    async fn set(
        &self,
        service: &str,
        key: &str,
        value: &str,
        is_secret: bool,
        description: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO integration_config (service, config_key, config_value, is_secret, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (service, config_key) DO UPDATE SET
                config_value = EXCLUDED.config_value,
                is_secret = EXCLUDED.is_secret,
                description = COALESCE(EXCLUDED.description, integration_config.description),
                updated_at = NOW()
            "#,
        )
        .bind(service)
        .bind(key)
        .bind(value)
        .bind(is_secret)
        .bind(description)
        .execute(&self.pool)
        .await?;

        info!(service, key, is_secret, "Configuration updated");
        Ok(())
    }

    async fn all_non_secret(&self, service: &str) -> DbResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT config_key, config_value FROM integration_config
            WHERE service = $1 AND is_secret = FALSE
            "#,
        )
        .bind(service)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
