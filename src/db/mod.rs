//! Bridge transfer persistence
//!
//! Every state transition rewrites the whole record in one statement, so a
//! reader never observes a half-applied transition.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod memory;
pub mod models;

pub use memory::MemoryTransferStore;
pub use models::BridgeTransferRow;

use crate::error::BridgeError;
use crate::orchestrator::state::{BridgeState, BridgeTransfer};

/// Durable home of [`BridgeTransfer`] records
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert or replace the record atomically
    async fn save(&self, transfer: &BridgeTransfer) -> Result<(), BridgeError>;

    async fn get(&self, request_id: &str) -> Result<Option<BridgeTransfer>, BridgeError>;

    /// Records currently in any of `states`, oldest first
    async fn list_in_states(
        &self,
        states: &[BridgeState],
    ) -> Result<Vec<BridgeTransfer>, BridgeError>;
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// SQL SELECT columns for bridge_transfers (casting NUMERIC to TEXT)
const TRANSFER_SELECT: &str = r#"request_id, source_network, destination_network,
    amount::TEXT as amount, decimals, recipient, state, burn_tx_id, message_hash,
    message_bytes, attestation, attestation_issued_at, mint_tx_id, failure_kind,
    failure_message, funds_burned, created_at, updated_at"#;

/// Postgres-backed [`TransferStore`]
#[derive(Debug, Clone)]
pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and migrate
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn save(&self, transfer: &BridgeTransfer) -> Result<(), BridgeError> {
        let row = BridgeTransferRow::from(transfer);

        sqlx::query(
            r#"
            INSERT INTO bridge_transfers (request_id, source_network, destination_network,
                amount, decimals, recipient, state, burn_tx_id, message_hash, message_bytes,
                attestation, attestation_issued_at, mint_tx_id, failure_kind, failure_message,
                funds_burned, created_at, updated_at)
            VALUES ($1, $2, $3, $4::NUMERIC, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18)
            ON CONFLICT (request_id) DO UPDATE SET
                state = EXCLUDED.state,
                burn_tx_id = EXCLUDED.burn_tx_id,
                message_hash = EXCLUDED.message_hash,
                message_bytes = EXCLUDED.message_bytes,
                attestation = EXCLUDED.attestation,
                attestation_issued_at = EXCLUDED.attestation_issued_at,
                mint_tx_id = EXCLUDED.mint_tx_id,
                failure_kind = EXCLUDED.failure_kind,
                failure_message = EXCLUDED.failure_message,
                funds_burned = EXCLUDED.funds_burned,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&row.request_id)
        .bind(&row.source_network)
        .bind(&row.destination_network)
        .bind(&row.amount)
        .bind(row.decimals)
        .bind(&row.recipient)
        .bind(row.state)
        .bind(&row.burn_tx_id)
        .bind(&row.message_hash)
        .bind(&row.message_bytes)
        .bind(&row.attestation)
        .bind(row.attestation_issued_at)
        .bind(&row.mint_tx_id)
        .bind(&row.failure_kind)
        .bind(&row.failure_message)
        .bind(row.funds_burned)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            BridgeError::Storage(format!("failed to save transfer {}: {e}", row.request_id))
        })?;

        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<BridgeTransfer>, BridgeError> {
        let query = format!(
            "SELECT {} FROM bridge_transfers WHERE request_id = $1",
            TRANSFER_SELECT
        );
        let row = sqlx::query_as::<_, BridgeTransferRow>(&query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to get transfer {request_id}: {e}")))?;

        row.map(BridgeTransfer::try_from).transpose()
    }

    async fn list_in_states(
        &self,
        states: &[BridgeState],
    ) -> Result<Vec<BridgeTransfer>, BridgeError> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            "SELECT {} FROM bridge_transfers WHERE state = ANY($1) ORDER BY created_at",
            TRANSFER_SELECT
        );
        let rows = sqlx::query_as::<_, BridgeTransferRow>(&query)
            .bind(&states)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to list transfers: {e}")))?;

        rows.into_iter().map(BridgeTransfer::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_burn_receipt, sample_intent};

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_store_upsert_and_list() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgTransferStore::connect(&url).await.unwrap();

        let request_id = uuid::Uuid::new_v4().to_string();
        let mut transfer = BridgeTransfer::initiate(request_id.clone(), sample_intent());
        store.save(&transfer).await.unwrap();

        transfer.record_burn(sample_burn_receipt()).unwrap();
        store.save(&transfer).await.unwrap();

        let loaded = store.get(&request_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, BridgeState::Burned);
        assert_eq!(loaded.burn_tx_id, transfer.burn_tx_id);

        let pending = store.list_in_states(&[BridgeState::Burned]).await.unwrap();
        assert!(pending.iter().any(|t| t.request_id == request_id));
    }
}
