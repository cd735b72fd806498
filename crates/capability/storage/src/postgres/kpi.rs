//! Postgres KPI 写入实现
//!
//! 单连接（非连接池）：连接的建立与重建由 `StorageConnection` 负责。

use crate::error::StorageError;
use crate::traits::{KpiStore, StoreConnector};
use domain::KpiReading;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

const INSERT_KPI_PREFIX: &str =
    "insert into kpis (k_equipment, k_timestamp, k_name, k_unit, k_value) ";

/// 一块读数合并为一条多行 insert；`k_timestamp` 按 UTC 存储，不受会话时区影响。
fn insert_chunk_query<'a>(
    equipment: &'a str,
    timestamp_ms: i64,
    readings: &'a [KpiReading],
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(INSERT_KPI_PREFIX);
    builder.push_values(readings, |mut row, reading| {
        row.push_bind(equipment)
            .push("to_timestamp(")
            .push_bind_unseparated(timestamp_ms as f64)
            .push_unseparated(" / 1000.0) at time zone 'UTC'")
            .push_bind(reading.name.as_str())
            .push_bind(reading.unit_id)
            .push_bind(&reading.value);
    });
    builder
}

/// Postgres 连接工厂。
#[derive(Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    target: String,
}

impl PgConnector {
    /// `database_url` 不含凭据，用户与口令单独传入。
    pub fn new(database_url: &str, username: &str, password: &str) -> Result<Self, StorageError> {
        let options = PgConnectOptions::from_str(database_url)?
            .username(username)
            .password(password);
        Ok(Self {
            options,
            target: format!("{database_url} as {username}"),
        })
    }
}

#[async_trait::async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> Result<Arc<dyn KpiStore>, StorageError> {
        let connection = PgConnection::connect_with(&self.options).await?;
        Ok(Arc::new(PgKpiStore::new(connection)))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

pub struct PgKpiStore {
    connection: Mutex<PgConnection>,
}

impl PgKpiStore {
    pub fn new(connection: PgConnection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }
}

#[async_trait::async_trait]
impl KpiStore for PgKpiStore {
    async fn insert_chunk(
        &self,
        equipment: &str,
        timestamp_ms: i64,
        readings: &[KpiReading],
    ) -> Result<(), StorageError> {
        if readings.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.lock().await;
        // 失败时 tx 被丢弃并回滚，整块不落库。
        let mut tx = connection.begin().await?;
        let mut query = insert_chunk_query(equipment, timestamp_ms, readings);
        query.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut connection = self.connection.lock().await;
        connection
            .ping()
            .await
            .map_err(|err| StorageError::connection(err.to_string()))
    }
}
