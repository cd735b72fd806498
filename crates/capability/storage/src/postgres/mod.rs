//! # PostgreSQL 存储实现模块
//!
//! ## 数据库模式要求
//!
//! ```sql
//! create table kpis (
//!     k_equipment text      not null,
//!     k_timestamp timestamp not null,
//!     k_name      text      not null,
//!     k_unit      integer   not null,
//!     k_value     numeric   not null
//! );
//! ```
//!
//! `k_timestamp` 存 UTC 时间；`k_unit` 为存储侧约定的枚举编号；`k_value` 使用 numeric 保证任意精度。
//! 幂等性（重复投递去重）由表上的约束决定，写入侧不处理。
//!
//! ## 事务
//!
//! 每个块一个事务，块之间互不影响。

pub mod kpi;

pub use kpi::*;
