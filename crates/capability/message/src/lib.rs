//! KPI 报文：结构校验与解析。
//!
//! 入站报文格式：
//!
//! ```json
//! {"sourceId":"pump-1","timestamp":1690000000000,"kpis":[{"name":"temp","unit":1,"value":72.5}]}
//! ```
//!
//! 采集链路上先 [`validate`] 再 [`parse`]；`parse` 仍会独立处理解码失败。

pub mod error;
pub mod parser;
pub mod schema;

pub use error::{ParseError, ValidationError};
pub use parser::{parse, to_payload};
pub use schema::validate;
