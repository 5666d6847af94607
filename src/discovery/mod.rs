//! 服务注册生命周期模块
//!
//! 管理单个服务实例在注册中心中的存在：注册、心跳续期与注销。
//! 后端通过 [`DiscoveryBackend`] 抽象，目前提供 Consul 与内存两种实现。

pub mod backend;
pub mod descriptor;
pub mod factory;
pub mod heartbeat;
pub mod registrar;

pub use backend::{ConsulBackend, DiscoveryBackend, InMemoryBackend};
pub use descriptor::{HealthStatus, ServiceDescriptor};
pub use factory::RegistrarFactory;
pub use heartbeat::Heartbeat;
pub use registrar::{LifecycleState, ServiceLifecycle, ServiceRegistrar};
