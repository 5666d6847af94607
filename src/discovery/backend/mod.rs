//! 服务发现后端抽象和实现

pub mod consul;
pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

use crate::discovery::descriptor::{HealthStatus, ServiceDescriptor};
use crate::error::BackendResult;

pub use consul::ConsulBackend;
pub use memory::InMemoryBackend;

/// 服务发现后端 trait
///
/// 生命周期控制器只通过这三个操作与后端交互；
/// 后端客户端在调用方与心跳任务之间共享，实现必须是 `Send + Sync`
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// 注册服务实例
    ///
    /// # 参数
    /// * `descriptor` - 服务描述符
    /// * `ttl` - TTL 检查窗口，超过该时间未收到刷新即视为不健康
    /// * `initial_status` - 初始健康状态
    async fn register_service(
        &self,
        descriptor: &ServiceDescriptor,
        ttl: Duration,
        initial_status: HealthStatus,
    ) -> BackendResult<()>;

    /// 刷新存活状态（重置 TTL 倒计时）
    ///
    /// 重复调用除重置 TTL 外不应有其他副作用
    async fn refresh_liveness(&self, service_id: &str, status: HealthStatus) -> BackendResult<()>;

    /// 注销服务实例
    ///
    /// 服务已不存在时不得返回错误
    async fn deregister_service(&self, service_id: &str) -> BackendResult<()>;
}
