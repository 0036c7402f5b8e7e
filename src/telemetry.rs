//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志初始化。

use tracing_subscriber::EnvFilter;

/// 初始化日志输出
///
/// 日志级别由 `RUST_LOG` 控制，缺省为 `info`。
/// 重复调用或应用层已经设置过全局 subscriber 时不做任何事
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
