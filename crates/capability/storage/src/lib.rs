//! # KPI Storage 模块
//!
//! 提供 KPI 读数的持久化能力。
//!
//! ## 架构
//!
//! 1. **接口抽象层** (`traits.rs`)：`KpiStore`（已建立的连接）与 `StoreConnector`（建立连接）
//! 2. **错误处理层** (`error.rs`)：`StorageError` 区分连接失败与数据拒绝；`WriteError`
//! 3. **重连策略** (`backoff.rs`)：1 秒起步、翻倍、180 秒封顶
//! 4. **连接管理层** (`connection.rs`)：`StorageConnection` 状态机、重连调度、分块写入
//! 5. **写入报告** (`report.rs`)：逐块记录提交/失败
//! 6. **实现层**：
//!    - `postgres/`：PostgreSQL 单连接实现（生产环境）
//!    - `in_memory/`：内存实现（测试，可注入故障）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use kpi_storage::{PgConnector, StorageConnection};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let connector = PgConnector::new("postgres://localhost:5432/kpi", "bridge", "secret")?;
//! let storage = Arc::new(StorageConnection::new(Arc::new(connector)));
//! let cancel = CancellationToken::new();
//! let scheduler = storage.connect_with_retry(cancel.clone());
//!
//! if storage.is_live() {
//!     let report = storage.write_batch("pump-1", 1_690_000_000_000, &readings).await?;
//!     println!("written={} failed={}", report.written(), report.failed());
//! }
//!
//! cancel.cancel();
//! scheduler.await?;
//! ```

pub mod backoff;
pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod report;
pub mod traits;

pub use backoff::*;
pub use connection::*;
pub use error::*;
pub use report::*;
pub use traits::*;

pub use in_memory::{InMemoryConnector, InMemoryKpiStore, KpiRow};
pub use postgres::{PgConnector, PgKpiStore};
