//! KPI 报文结构校验。
//!
//! 约束：
//! - 顶层为对象，必填 `sourceId`（string）、`timestamp`（integer，毫秒）、`kpis`（非空数组）
//! - `kpis` 每项为对象，必填 `name`（string）、`unit`（integer）、`value`（number）
//!
//! 收集全部违规项后统一返回，不在第一处违规时中止。

use crate::error::ValidationError;
use serde_json::{Map, Value};

/// 校验原始报文。
pub fn validate(payload: &[u8]) -> Result<(), ValidationError> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|err| ValidationError::NotJson(err.to_string()))?;
    validate_document(&document)
}

/// 校验已解码的 JSON 文档。
pub fn validate_document(document: &Value) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    let Some(root) = document.as_object() else {
        violations.push(format!("$: expected object, found {}", kind_of(document)));
        return Err(ValidationError::Violations(violations));
    };

    require(root, "$", "sourceId", Kind::String, &mut violations);
    require(root, "$", "timestamp", Kind::Integer, &mut violations);

    match root.get("kpis") {
        None => violations.push("$.kpis: required field missing".to_string()),
        Some(Value::Array(items)) if items.is_empty() => {
            violations.push("$.kpis: must contain at least one item".to_string())
        }
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                let path = format!("$.kpis[{index}]");
                let Some(kpi) = item.as_object() else {
                    violations.push(format!("{path}: expected object, found {}", kind_of(item)));
                    continue;
                };
                require(kpi, &path, "name", Kind::String, &mut violations);
                require(kpi, &path, "unit", Kind::Integer, &mut violations);
                require(kpi, &path, "value", Kind::Number, &mut violations);
            }
        }
        Some(other) => violations.push(format!("$.kpis: expected array, found {}", kind_of(other))),
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Violations(violations))
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    String,
    Integer,
    Number,
}

impl Kind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::Integer => value.is_i64() || value.is_u64(),
            Kind::Number => value.is_number(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Number => "number",
        }
    }
}

fn require(
    object: &Map<String, Value>,
    path: &str,
    field: &str,
    kind: Kind,
    violations: &mut Vec<String>,
) {
    match object.get(field) {
        None => violations.push(format!("{path}.{field}: required field missing")),
        Some(value) if !kind.matches(value) => violations.push(format!(
            "{path}.{field}: expected {}, found {}",
            kind.as_str(),
            kind_of(value)
        )),
        Some(_) => {}
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_i64() || number.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
