//! Flare Service Registrar
//!
//! 管理单个服务实例在服务发现注册中心中的生命周期：
//! 注册（TTL 健康检查）、后台心跳续期，以及关闭时注销。
//!
//! ```rust,no_run
//! use flare_service_registrar::ServiceRegistrar;
//!
//! # async fn example() -> flare_service_registrar::Result<()> {
//! let registrar = ServiceRegistrar::new("orders", 8080, "127.0.0.1:8500")?;
//! registrar.register().await?;
//! // ... 服务运行 ...
//! registrar.unregister().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod telemetry;

// Re-exports
pub use config::{LifecycleTimings, RegistrarConfig};
pub use discovery::{
    ConsulBackend, DiscoveryBackend, HealthStatus, Heartbeat, InMemoryBackend, LifecycleState,
    RegistrarFactory, ServiceDescriptor, ServiceLifecycle, ServiceRegistrar,
};
pub use error::{BackendError, ErrorCode, RegistryError, Result};
pub use telemetry::{TelemetryFormat, init_tracing};
