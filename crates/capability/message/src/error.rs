/// 结构校验错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// 报文不是 JSON，归入解析失败处理。
    #[error("payload is not json: {0}")]
    NotJson(String),
    #[error("payload violates kpi message schema: {}", .0.join("; "))]
    Violations(Vec<String>),
}

impl ValidationError {
    pub fn violations(&self) -> &[String] {
        match self {
            ValidationError::Violations(items) => items,
            ValidationError::NotJson(_) => &[],
        }
    }
}

/// 解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed json: {0}")]
    Json(String),
    #[error("unexpected structure: {0}")]
    Structure(String),
    #[error("kpis must not be empty")]
    EmptyReadings,
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(String),
    #[error("unit out of range at kpis[{index}]: {value}")]
    UnitOutOfRange { index: usize, value: String },
    #[error("value at kpis[{index}] is not an exact decimal: {value} ({reason})")]
    Decimal {
        index: usize,
        value: String,
        reason: String,
    },
}
