//! 心跳任务
//!
//! 按固定间隔刷新实例的 TTL 检查，直到取消令牌被触发。
//! 单次刷新失败只记录日志，不提前重试，由下一次 tick 自然补上。

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::LifecycleTimings;
use crate::discovery::backend::DiscoveryBackend;
use crate::discovery::descriptor::HealthStatus;
use crate::error::RegistryError;

/// 心跳任务
pub struct Heartbeat {
    backend: Arc<dyn DiscoveryBackend>,
    service_id: String,
    timings: LifecycleTimings,
}

impl Heartbeat {
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        service_id: impl Into<String>,
        timings: LifecycleTimings,
    ) -> Self {
        Self {
            backend,
            service_id: service_id.into(),
            timings,
        }
    }

    /// 在后台启动心跳任务
    ///
    /// 第一次刷新发生在启动一个间隔之后（注册本身已将状态置为 passing）
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// 运行心跳循环，直到 `cancel` 被触发
    ///
    /// 定时器与取消信号谁先就绪谁生效；已经发出的刷新请求会执行完毕
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.timings.heartbeat_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let tolerated_misses = self.timings.tolerated_misses();
        let mut consecutive_failures: u32 = 0;

        debug!(
            service_id = %self.service_id,
            interval_secs = period.as_secs_f64(),
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(service_id = %self.service_id, "🛑 Heartbeat task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.backend.refresh_liveness(&self.service_id, HealthStatus::Passing).await {
                        Ok(()) => {
                            if consecutive_failures > 0 {
                                info!(
                                    service_id = %self.service_id,
                                    failures = consecutive_failures,
                                    "✅ Heartbeat recovered"
                                );
                            } else {
                                debug!(service_id = %self.service_id, "💓 Heartbeat sent");
                            }
                            consecutive_failures = 0;
                        }
                        Err(source) => {
                            consecutive_failures = consecutive_failures.saturating_add(1);
                            let err = RegistryError::HeartbeatRefresh {
                                service_id: self.service_id.clone(),
                                source,
                            };
                            if consecutive_failures > tolerated_misses {
                                error!(
                                    service_id = %self.service_id,
                                    failures = consecutive_failures,
                                    error = %err,
                                    "❌ Heartbeat failures exceed the TTL window, backend will mark the service unhealthy"
                                );
                            } else {
                                warn!(
                                    service_id = %self.service_id,
                                    failures = consecutive_failures,
                                    error = %err,
                                    "⚠️ Failed to send heartbeat"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
