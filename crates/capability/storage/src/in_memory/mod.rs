//! 内存存储实现模块
//!
//! 仅用于测试和本地演示。

pub mod kpi;

pub use kpi::*;
