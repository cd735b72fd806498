use bigdecimal::BigDecimal;

/// 单个 KPI 读数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiReading {
    pub name: String,
    /// 单位编号，取值范围由存储侧的枚举表约定。
    pub unit_id: i32,
    pub value: BigDecimal,
}

impl KpiReading {
    pub fn new(name: impl Into<String>, unit_id: i32, value: BigDecimal) -> Self {
        Self {
            name: name.into(),
            unit_id,
            value,
        }
    }
}

/// 一条入站 KPI 报文（一个采集端在某一时刻的读数集合）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiMessage {
    /// 上报端（设备/客户端）标识，写入 `k_equipment`。
    pub source_id: String,
    pub timestamp_ms: i64,
    /// 保持报文中的顺序，决定块内写入顺序。
    pub readings: Vec<KpiReading>,
}
