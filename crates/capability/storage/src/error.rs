//! 存储层错误类型
//!
//! 区分两类失败：
//! - 连接失败（I/O、TLS、协议、连接已关闭）：连接需要重建
//! - 数据拒绝（约束冲突等数据库错误）：连接仍可用，仅该块失败

/// 存储错误类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Connection,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    /// 数据层拒绝。
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Rejected,
            message: message.into(),
        }
    }

    /// 连接层失败。
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    pub fn is_connection_lost(&self) -> bool {
        self.kind == StorageErrorKind::Connection
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if is_connection_error(&err) {
            Self::connection(err.to_string())
        } else {
            Self::new(err.to_string())
        }
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE 08xxx: connection exception；57P0x: 服务端关闭/重启
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || code.starts_with("57P0"))
            .unwrap_or(false),
        _ => false,
    }
}

/// 批量写入错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// 当前没有可用连接，未执行任何写入。
    #[error("store not connected")]
    NotConnected,
}
