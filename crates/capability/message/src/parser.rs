//! KPI 报文解析与序列化。
//!
//! `value` 直接取 JSON 数字的字面量构造 [`BigDecimal`]，不经过 `f64`，
//! 精度与标度不设上限；只有指数超出 `i64` 的字面量视为解析失败。

use crate::error::ParseError;
use domain::{KpiMessage, KpiReading};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use serde_json::error::Category;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    source_id: String,
    timestamp: Number,
    kpis: Vec<WireKpi>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireKpi {
    name: String,
    unit: Number,
    value: Number,
}

/// 解析原始报文。
pub fn parse(payload: &[u8]) -> Result<KpiMessage, ParseError> {
    let wire: WireMessage = serde_json::from_slice(payload).map_err(|err| match err.classify() {
        Category::Data => ParseError::Structure(err.to_string()),
        Category::Io | Category::Syntax | Category::Eof => ParseError::Json(err.to_string()),
    })?;

    if wire.kpis.is_empty() {
        return Err(ParseError::EmptyReadings);
    }
    let timestamp_ms = wire
        .timestamp
        .as_i64()
        .ok_or_else(|| ParseError::TimestampOutOfRange(wire.timestamp.to_string()))?;

    let mut readings = Vec::with_capacity(wire.kpis.len());
    for (index, kpi) in wire.kpis.into_iter().enumerate() {
        let unit_id = kpi
            .unit
            .as_i64()
            .and_then(|unit| i32::try_from(unit).ok())
            .ok_or_else(|| ParseError::UnitOutOfRange {
                index,
                value: kpi.unit.to_string(),
            })?;
        let value = decimal_from_number(index, &kpi.value)?;
        readings.push(KpiReading {
            name: kpi.name,
            unit_id,
            value,
        });
    }

    Ok(KpiMessage {
        source_id: wire.source_id,
        timestamp_ms,
        readings,
    })
}

/// 将报文序列化为入站格式（`parse` 的逆操作）。
pub fn to_payload(message: &KpiMessage) -> Result<Vec<u8>, ParseError> {
    let mut kpis = Vec::with_capacity(message.readings.len());
    for (index, reading) in message.readings.iter().enumerate() {
        let literal = reading.value.to_string();
        let value = Number::from_str(&literal).map_err(|err| ParseError::Decimal {
            index,
            value: literal.clone(),
            reason: err.to_string(),
        })?;
        kpis.push(WireKpi {
            name: reading.name.clone(),
            unit: Number::from(reading.unit_id),
            value,
        });
    }
    let wire = WireMessage {
        source_id: message.source_id.clone(),
        timestamp: Number::from(message.timestamp_ms),
        kpis,
    };
    serde_json::to_vec(&wire).map_err(|err| ParseError::Structure(err.to_string()))
}

fn decimal_from_number(index: usize, number: &Number) -> Result<BigDecimal, ParseError> {
    let literal = number.to_string();
    BigDecimal::from_str(&literal).map_err(|err| ParseError::Decimal {
        index,
        value: literal,
        reason: err.to_string(),
    })
}
