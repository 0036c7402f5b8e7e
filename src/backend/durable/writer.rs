//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了写后批量刷新的调度器：写入停止一段静默期后统一刷新一次。

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 防抖刷新调度器
///
/// 每次 [`schedule`](Self::schedule) 都会重新开始静默期计时，静默期结束后执行一次刷新。
/// 已经开始的刷新不会被取消；停止时会再执行最后一次刷新
pub struct FlushScheduler {
    /// 刷新触发器
    trigger: Arc<Notify>,
    /// 停止信号
    cancel: CancellationToken,
    /// 后台任务句柄
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// 启动调度器
    ///
    /// # 参数
    ///
    /// * `name` - 用于日志的名称
    /// * `quiet` - 静默期
    /// * `flush` - 刷新操作
    pub fn start<F, Fut>(name: String, quiet: Duration, flush: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task_trigger = trigger.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            'worker: loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break 'worker,
                    _ = task_trigger.notified() => {}
                }

                // 静默期内每来一次写入就重新计时
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(quiet) => break,
                        _ = task_trigger.notified() => continue,
                        _ = task_cancel.cancelled() => break 'worker,
                    }
                }

                flush().await;
            }

            flush().await;
            debug!("flush scheduler stopped: {}", name);
        });

        Self {
            trigger,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// 请求一次刷新
    pub fn schedule(&self) {
        self.trigger.notify_one();
    }

    /// 停止调度器，等待最后一次刷新完成
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("flush scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
