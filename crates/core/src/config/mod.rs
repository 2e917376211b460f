//! 配置管理
//!
//! 加载顺序：内置默认值 → TOML配置文件 → `JOBFLOW_` 前缀的环境变量。
//! 每个配置段都提供 `validate()`，配置无效时启动失败。

pub mod models;

pub use models::*;
