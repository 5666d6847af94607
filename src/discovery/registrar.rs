//! 服务注册器（生命周期控制器）
//!
//! 负责单个服务实例在注册中心中的完整生命周期：
//! - 注册：提交描述符，TTL 检查初始状态为 passing，成功后启动心跳任务
//! - 心跳：后台任务定期刷新 TTL，绑定到注册器持有的取消令牌
//! - 注销：触发取消令牌并从注册中心移除实例
//!
//! 状态只能单向推进：`Created` → `Registered` → `Terminated`。
//! 已注销的注册器不能再次注册，需要新建实例（会生成新的 ID）。

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LifecycleTimings, RegistrarConfig};
use crate::discovery::backend::{ConsulBackend, DiscoveryBackend};
use crate::discovery::descriptor::{HealthStatus, ServiceDescriptor};
use crate::discovery::heartbeat::Heartbeat;
use crate::error::{RegistryError, Result};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 已创建，尚未注册
    Created,
    /// 已注册，心跳任务运行中
    Registered,
    /// 已注销（终态）
    Terminated,
}

/// 服务生命周期接口
///
/// 调用方只依赖这个接口；目前唯一的实现是 [`ServiceRegistrar`]
#[async_trait]
pub trait ServiceLifecycle: Send + Sync {
    /// 注册服务并启动心跳
    async fn register(&self) -> Result<()>;

    /// 停止心跳并注销服务
    async fn unregister(&self) -> Result<()>;

    /// 实例 ID
    fn service_id(&self) -> &str;
}

struct Lifecycle {
    state: LifecycleState,
    heartbeat: Option<JoinHandle<()>>,
}

/// 服务注册器
pub struct ServiceRegistrar {
    descriptor: ServiceDescriptor,
    backend: Arc<dyn DiscoveryBackend>,
    timings: LifecycleTimings,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceRegistrar {
    /// 创建注册器，后端为给定地址的 Consul agent
    ///
    /// # 参数
    /// * `name` - 逻辑服务名
    /// * `port` - 服务端口
    /// * `backend_address` - Consul agent 地址（如 `127.0.0.1:8500`）
    ///
    /// 地址无法构建客户端时返回 `RegistryError::Construction`
    pub fn new(name: impl Into<String>, port: u16, backend_address: &str) -> Result<Self> {
        let backend = ConsulBackend::new(backend_address)?;
        Ok(Self::with_backend(name, port, Arc::new(backend)))
    }

    /// 使用已有的后端创建注册器
    pub fn with_backend(
        name: impl Into<String>,
        port: u16,
        backend: Arc<dyn DiscoveryBackend>,
    ) -> Self {
        Self {
            descriptor: ServiceDescriptor::new(name, port),
            backend,
            timings: LifecycleTimings::default(),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Created,
                heartbeat: None,
            }),
        }
    }

    /// 根据配置创建注册器（Consul 后端）
    pub fn from_config(config: &RegistrarConfig) -> Result<Self> {
        let timings = config.timings()?;
        let backend = ConsulBackend::builder(&config.backend.address)
            .token(config.backend.token.clone())
            .request_timeout(config.request_timeout())
            .build()?;

        Ok(
            Self::with_backend(config.service.name.clone(), config.service.port, Arc::new(backend))
                .with_timings(timings),
        )
    }

    /// 设置 TTL 与心跳间隔
    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn service_id(&self) -> &str {
        self.descriptor.id()
    }

    pub fn timings(&self) -> LifecycleTimings {
        self.timings
    }

    /// 当前生命周期状态
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state
    }

    /// 注销时会被取消的子令牌，调用方可以用它感知关闭
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// 心跳任务是否已经退出（从未启动也视为已退出）
    pub async fn heartbeat_stopped(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .heartbeat
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// 注册服务
    ///
    /// 成功后启动心跳任务；后端失败时返回 `RegistryError::Registration`，
    /// 不启动心跳，状态保持 `Created`。
    /// 已注册时返回 `AlreadyRegistered`，已注销时返回 `Terminated`。
    /// 注册请求进行中触发注销时放弃等待后端，返回 `Terminated`。
    pub async fn register(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.state {
            LifecycleState::Created => {}
            LifecycleState::Registered => {
                return Err(RegistryError::AlreadyRegistered {
                    service_id: self.descriptor.id().to_string(),
                });
            }
            LifecycleState::Terminated => return Err(self.terminated()),
        }

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(
                    service_id = %self.descriptor.id(),
                    "Registration abandoned, service is being unregistered"
                );
                return Err(self.terminated());
            }
            outcome = self
                .backend
                .register_service(&self.descriptor, self.timings.ttl(), HealthStatus::Passing) => outcome,
        };

        if let Err(source) = outcome {
            warn!(
                service_id = %self.descriptor.id(),
                service_name = %self.descriptor.name(),
                error = %source,
                "⚠️ Failed to register service"
            );
            return Err(RegistryError::Registration {
                service_id: self.descriptor.id().to_string(),
                source,
            });
        }

        // 注销可能与后端注册同时完成，此时不再启动心跳
        if self.cancel.is_cancelled() {
            return Err(self.terminated());
        }

        let heartbeat = Heartbeat::new(self.backend.clone(), self.descriptor.id(), self.timings)
            .spawn(self.cancel.clone());
        lifecycle.heartbeat = Some(heartbeat);
        lifecycle.state = LifecycleState::Registered;

        info!(
            service_id = %self.descriptor.id(),
            service_name = %self.descriptor.name(),
            port = self.descriptor.port(),
            ttl_secs = self.timings.ttl().as_secs_f64(),
            "✅ Service registered"
        );
        Ok(())
    }

    /// 注销服务
    ///
    /// 先触发取消令牌，再调用后端注销；不等待心跳任务真正退出。
    /// 未注册时调用同样安全（不会产生任何心跳）。重复调用为空操作。
    /// 后端注销失败时返回 `RegistryError::Deregistration`，已发出的取消不会回滚。
    pub async fn unregister(&self) -> Result<()> {
        // 取消先于加锁：进行中的注册会因此释放锁
        self.cancel.cancel();
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state == LifecycleState::Terminated {
                debug!(service_id = %self.descriptor.id(), "Service already unregistered");
                return Ok(());
            }
            lifecycle.state = LifecycleState::Terminated;
        }

        let service_id = self.descriptor.id();
        match self.backend.deregister_service(service_id).await {
            Ok(()) => {
                info!(service_id = %service_id, "✅ Service unregistered");
                Ok(())
            }
            Err(source) => {
                warn!(
                    service_id = %service_id,
                    error = %source,
                    "⚠️ Failed to unregister service"
                );
                Err(RegistryError::Deregistration {
                    service_id: service_id.to_string(),
                    source,
                })
            }
        }
    }

    fn terminated(&self) -> RegistryError {
        RegistryError::Terminated {
            service_id: self.descriptor.id().to_string(),
        }
    }
}

#[async_trait]
impl ServiceLifecycle for ServiceRegistrar {
    async fn register(&self) -> Result<()> {
        ServiceRegistrar::register(self).await
    }

    async fn unregister(&self) -> Result<()> {
        ServiceRegistrar::unregister(self).await
    }

    fn service_id(&self) -> &str {
        self.descriptor.id()
    }
}

impl Drop for ServiceRegistrar {
    fn drop(&mut self) {
        let state = self.lifecycle.get_mut().state;
        // 无论是否显式注销，心跳任务都随注册器一起停止
        self.cancel.cancel();

        if state != LifecycleState::Registered {
            return;
        }

        // 未显式调用 unregister：尽力在后台注销
        let service_id = self.descriptor.id().to_string();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = self.backend.clone();
            handle.spawn(async move {
                match backend.deregister_service(&service_id).await {
                    Ok(()) => info!(service_id = %service_id, "✅ Service unregistered (from Drop)"),
                    Err(e) => warn!(
                        service_id = %service_id,
                        error = %e,
                        "⚠️ Failed to unregister service (from Drop)"
                    ),
                }
            });
        } else {
            warn!(
                service_id = %service_id,
                "⚠️ Cannot unregister service: tokio runtime not available, record expires with its TTL"
            );
        }
    }
}
