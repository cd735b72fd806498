//! 桥接服务运行配置加载。
//!
//! 必填项缺失或非法时返回 [`ConfigError`]，进程应在建立任何连接前退出。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

const DEFAULT_MQTT_PORT: u16 = 1883;

/// 桥接服务运行配置。
#[derive(Clone)]
pub struct BridgeConfig {
    pub postgres_db_domain: String,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_password: String,
    pub mqtt_client_id: String,
    pub mqtt_broker_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic_filter: String,
    pub mqtt_keep_alive_seconds: u64,
    pub mqtt_channel_capacity: usize,
    /// 存储连接探活间隔，0 表示关闭探活。
    pub store_liveness_interval_seconds: u64,
}

impl BridgeConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key 查找函数读取配置（测试时无需改动进程环境）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let postgres_db_domain = read_required(&lookup, "POSTGRES_DB_DOMAIN")?;
        let postgres_db = read_required(&lookup, "POSTGRES_DB")?;
        let postgres_user = read_required(&lookup, "POSTGRES_USER")?;
        let postgres_password = read_required(&lookup, "POSTGRES_PW")?;
        let mqtt_client_id = read_required(&lookup, "MQTT_CLIENT_ID")?;
        let mqtt_broker_url = read_required(&lookup, "MQTT_MSG_BROKER_URL")?;
        let (mqtt_host, mqtt_port) = parse_broker_url(&mqtt_broker_url)?;
        let mqtt_topic_filter = read_optional(&lookup, "MQTT_TOPIC_FILTER")
            .unwrap_or_else(|| "#".to_string());
        let mqtt_keep_alive_seconds =
            read_u64_with_default(&lookup, "MQTT_KEEP_ALIVE_SECONDS", 30)?;
        let mqtt_channel_capacity =
            read_u64_with_default(&lookup, "MQTT_CHANNEL_CAPACITY", 64)?.max(1) as usize;
        let store_liveness_interval_seconds =
            read_u64_with_default(&lookup, "STORE_LIVENESS_INTERVAL_SECONDS", 30)?;

        Ok(Self {
            postgres_db_domain,
            postgres_db,
            postgres_user,
            postgres_password,
            mqtt_client_id,
            mqtt_broker_url,
            mqtt_host,
            mqtt_port,
            mqtt_topic_filter,
            mqtt_keep_alive_seconds,
            mqtt_channel_capacity,
            store_liveness_interval_seconds,
        })
    }

    /// 不含凭据的 PostgreSQL 连接地址，用户与口令单独传给驱动。
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}/{}",
            self.postgres_db_domain.trim_end_matches('/'),
            self.postgres_db
        )
    }

    pub fn store_liveness_interval(&self) -> Option<Duration> {
        match self.store_liveness_interval_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("postgres_db_domain", &self.postgres_db_domain)
            .field("postgres_db", &self.postgres_db)
            .field("postgres_user", &self.postgres_user)
            .field("postgres_password", &"***")
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_broker_url", &self.mqtt_broker_url)
            .field("mqtt_topic_filter", &self.mqtt_topic_filter)
            .field("mqtt_keep_alive_seconds", &self.mqtt_keep_alive_seconds)
            .field("mqtt_channel_capacity", &self.mqtt_channel_capacity)
            .field(
                "store_liveness_interval_seconds",
                &self.store_liveness_interval_seconds,
            )
            .finish()
    }
}

/// 解析 Broker 地址：`tcp://host[:port]` 或 `mqtt://host[:port]`，也接受无 scheme 的 `host[:port]`。
pub fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::Invalid("MQTT_MSG_BROKER_URL".to_string(), url.to_string());
    let trimmed = url.trim();
    let rest = match trimmed.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() || rest.contains('/') {
        return Err(invalid());
    }
    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), port))
        }
        None => Ok((rest.to_string(), DEFAULT_MQTT_PORT)),
    }
}

fn read_required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_u64_with_default<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}
