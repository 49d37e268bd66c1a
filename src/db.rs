use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row, types::Json};

use crate::{
    domain::Settings,
    error::StoreError,
    store::{
        BALANCE_STREAM, ResultSink, SETTINGS_DATASOURCE, SettingsStore, TRANSACTIONS_STREAM,
    },
};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

struct Datasource {
    id: &'static str,
    description: &'static str,
    store_type: &'static str,
}

const DATASOURCES: [Datasource; 3] = [
    Datasource {
        id: BALANCE_STREAM,
        description: "TrueLayer user Balance data",
        store_type: "ts",
    },
    Datasource {
        id: TRANSACTIONS_STREAM,
        description: "TrueLayer user Transactions data",
        store_type: "ts",
    },
    Datasource {
        id: SETTINGS_DATASOURCE,
        description: "TrueLayer driver settings",
        store_type: "kv",
    },
];

/// Creates the tables if needed and registers the driver's data sources.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS datasources (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                content_type TEXT NOT NULL,
                vendor TEXT NOT NULL,
                datasource_type TEXT NOT NULL,
                store_type TEXT NOT NULL
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS driver_settings (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS datasource_records (
                id BIGSERIAL PRIMARY KEY,
                datasource_id TEXT NOT NULL REFERENCES datasources (id),
                payload JSONB NOT NULL,
                written_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        ",
    )
    .execute(pool)
    .await?;

    for datasource in DATASOURCES.iter() {
        sqlx::query(
            "
                INSERT INTO datasources (
                    id,
                    description,
                    content_type,
                    vendor,
                    datasource_type,
                    store_type
                ) VALUES ($1, $2, 'application/json', 'Databox Inc.', $1, $3)
                ON CONFLICT (id)
                DO UPDATE SET
                    description = EXCLUDED.description,
                    store_type = EXCLUDED.store_type
            ",
        )
        .bind(datasource.id)
        .bind(datasource.description)
        .bind(datasource.store_type)
        .execute(pool)
        .await
        .inspect_err(|err| {
            tracing::error!("Error registering data source id={}: {}", datasource.id, err)
        })?;
    }

    tracing::info!("Registered {} data sources", DATASOURCES.len());
    Ok(())
}

pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        PgSettingsStore { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn read(&self, key: &str) -> Result<Option<Settings>, StoreError> {
        let row = sqlx::query(
            "
                SELECT value FROM driver_settings
                WHERE key = $1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let Json(settings) = row.try_get::<Json<Settings>, &str>("value")?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, settings: &Settings) -> Result<(), StoreError> {
        sqlx::query(
            "
                INSERT INTO driver_settings (
                    key,
                    value,
                    updated_at
                ) VALUES ($1, $2, now())
                ON CONFLICT (key)
                DO UPDATE SET
                    value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(key)
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct PgResultSink {
    pool: PgPool,
}

impl PgResultSink {
    pub fn new(pool: PgPool) -> Self {
        PgResultSink { pool }
    }
}

#[async_trait]
impl ResultSink for PgResultSink {
    async fn write(&self, stream_key: &str, payload: &Value) -> Result<(), StoreError> {
        sqlx::query(
            "
                INSERT INTO datasource_records (
                    datasource_id,
                    payload
                ) VALUES ($1, $2)
            ",
        )
        .bind(stream_key)
        .bind(Json(payload))
        .execute(&self.pool)
        .await
        .inspect_err(|err| {
            tracing::error!("Failed to write record to stream_key={}: {}", stream_key, err)
        })?;

        Ok(())
    }
}
