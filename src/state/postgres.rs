//! PostgreSQL state store

use super::StateStore;
use crate::coordination::Cycle;
use crate::error::{CoordinatorError, CoordinatorResult};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// Cycle persistence in PostgreSQL, one row per commitment hash
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub async fn new(url: &str, max_connections: u32, min_connections: u32) -> CoordinatorResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> CoordinatorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coordinator_cycles (
                commitment_hash VARCHAR(66) PRIMARY KEY,
                cycle_id UUID NOT NULL,
                revision BIGINT NOT NULL,
                execution_state VARCHAR(20) NOT NULL,
                cycle JSONB NOT NULL,
                active BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_cycles_single_active
            ON coordinator_cycles (active) WHERE active
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn load(&self) -> CoordinatorResult<Option<Cycle>> {
        let row = sqlx::query("SELECT cycle FROM coordinator_cycles WHERE active")
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let value: serde_json::Value = r.get("cycle");
            serde_json::from_value(value)
                .map_err(|e| CoordinatorError::Storage(format!("corrupt cycle row: {}", e)))
        })
        .transpose()
    }

    async fn save(&self, cycle: &Cycle) -> CoordinatorResult<()> {
        let commitment = format!("{:?}", cycle.commitment);
        let value =
            serde_json::to_value(cycle).map_err(|e| CoordinatorError::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE coordinator_cycles SET active = FALSE WHERE active AND commitment_hash <> $1")
            .bind(&commitment)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO coordinator_cycles
                (commitment_hash, cycle_id, revision, execution_state, cycle, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (commitment_hash)
            DO UPDATE SET cycle_id = $2, revision = $3, execution_state = $4,
                          cycle = $5, active = TRUE, updated_at = NOW()
            "#,
        )
        .bind(&commitment)
        .bind(cycle.id)
        .bind(cycle.revision as i64)
        .bind(cycle.state.name())
        .bind(value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Saved cycle {} at revision {}", cycle.id, cycle.revision);
        Ok(())
    }

    async fn health_check(&self) -> CoordinatorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
