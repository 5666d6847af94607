//! 内存服务发现后端
//!
//! 模拟 TTL 检查语义的进程内注册表，用于测试和本地开发：
//! 记录每次调用、支持故障注入与调用挂起，并按 tokio 时钟判定 TTL 是否过期
//! （配合 `tokio::time::pause` 可以确定性地推进时间）

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::DiscoveryBackend;
use crate::discovery::descriptor::{HealthStatus, ServiceDescriptor};
use crate::error::{BackendError, BackendResult};

/// 后端调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Register {
        service_id: String,
        name: String,
        port: u16,
        ttl: Duration,
        status: HealthStatus,
    },
    Refresh {
        service_id: String,
        status: HealthStatus,
        at: Instant,
    },
    Deregister {
        service_id: String,
    },
}

/// 已注册服务的快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    pub descriptor: ServiceDescriptor,
    pub ttl: Duration,
    pub status: HealthStatus,
    pub last_refresh: Instant,
    /// 两次成功刷新之间出现过的最长间隔
    pub longest_gap: Duration,
}

impl RegisteredService {
    /// 当前时刻后端可见的健康状态（TTL 过期即为 critical）
    pub fn health_at(&self, now: Instant) -> HealthStatus {
        if now.saturating_duration_since(self.last_refresh) > self.ttl {
            HealthStatus::Critical
        } else {
            self.status
        }
    }

    /// 注册以来 TTL 是否曾经过期
    pub fn ttl_ever_lapsed(&self, now: Instant) -> bool {
        let current_gap = now.saturating_duration_since(self.last_refresh);
        self.longest_gap.max(current_gap) > self.ttl
    }
}

/// 调用闸门
///
/// 放开之前，被拦截的调用停在后端内部不返回；闸门被丢弃等同于放开
#[derive(Debug)]
pub struct CallGate {
    open: watch::Sender<bool>,
}

impl CallGate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (open, rx) = watch::channel(false);
        (Self { open }, rx)
    }

    /// 放行所有被拦截的调用
    pub fn release(&self) {
        self.open.send_replace(true);
    }
}

async fn pass(gate: Option<watch::Receiver<bool>>) {
    if let Some(mut gate) = gate {
        // 发送端被丢弃时 wait_for 返回错误，同样放行
        let _ = gate.wait_for(|open| *open).await;
    }
}

#[derive(Default)]
struct State {
    services: HashMap<String, RegisteredService>,
    calls: Vec<BackendCall>,
    register_failures: VecDeque<String>,
    refresh_failures: VecDeque<String>,
    deregister_failures: VecDeque<String>,
    register_gate: Option<watch::Receiver<bool>>,
    refresh_gate: Option<watch::Receiver<bool>>,
    pending_refreshes: usize,
}

/// 内存服务发现后端
///
/// 克隆共享同一份状态
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // 锁内不会 panic，中毒时直接取回数据
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 下一次注册调用失败
    pub fn fail_next_register(&self, reason: impl Into<String>) {
        self.lock().register_failures.push_back(reason.into());
    }

    /// 接下来 `count` 次刷新调用失败
    pub fn fail_next_refreshes(&self, count: usize, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.lock();
        state
            .refresh_failures
            .extend(std::iter::repeat(reason).take(count));
    }

    /// 下一次注销调用失败
    pub fn fail_next_deregister(&self, reason: impl Into<String>) {
        self.lock().deregister_failures.push_back(reason.into());
    }

    /// 拦截之后的注册调用，直到闸门放开
    pub fn hold_registers(&self) -> CallGate {
        let (gate, rx) = CallGate::new();
        self.lock().register_gate = Some(rx);
        gate
    }

    /// 拦截之后的刷新调用，直到闸门放开
    pub fn hold_refreshes(&self) -> CallGate {
        let (gate, rx) = CallGate::new();
        self.lock().refresh_gate = Some(rx);
        gate
    }

    /// 已记录但尚未返回的刷新调用数
    pub fn pending_refreshes(&self) -> usize {
        self.lock().pending_refreshes
    }

    /// 全部调用记录（按发生顺序）
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn register_count(&self, service_id: &str) -> usize {
        self.count(|call| matches!(call, BackendCall::Register { service_id: id, .. } if id == service_id))
    }

    pub fn refresh_count(&self, service_id: &str) -> usize {
        self.count(|call| matches!(call, BackendCall::Refresh { service_id: id, .. } if id == service_id))
    }

    pub fn deregister_count(&self, service_id: &str) -> usize {
        self.count(|call| matches!(call, BackendCall::Deregister { service_id: id } if id == service_id))
    }

    fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&BackendCall) -> bool,
    {
        self.lock().calls.iter().filter(|&call| predicate(call)).count()
    }

    /// 获取已注册服务快照
    pub fn service(&self, service_id: &str) -> Option<RegisteredService> {
        self.lock().services.get(service_id).cloned()
    }

    /// 当前后端可见的健康状态；未注册返回 None
    pub fn health(&self, service_id: &str) -> Option<HealthStatus> {
        let now = Instant::now();
        self.service(service_id).map(|service| service.health_at(now))
    }

    pub fn is_registered(&self, service_id: &str) -> bool {
        self.lock().services.contains_key(service_id)
    }
}

#[async_trait]
impl DiscoveryBackend for InMemoryBackend {
    async fn register_service(
        &self,
        descriptor: &ServiceDescriptor,
        ttl: Duration,
        initial_status: HealthStatus,
    ) -> BackendResult<()> {
        let gate = {
            let mut state = self.lock();
            state.calls.push(BackendCall::Register {
                service_id: descriptor.id().to_string(),
                name: descriptor.name().to_string(),
                port: descriptor.port(),
                ttl,
                status: initial_status,
            });
            state.register_gate.clone()
        };
        pass(gate).await;

        let mut state = self.lock();
        if let Some(reason) = state.register_failures.pop_front() {
            return Err(BackendError::Unavailable(reason));
        }

        state.services.insert(
            descriptor.id().to_string(),
            RegisteredService {
                descriptor: descriptor.clone(),
                ttl,
                status: initial_status,
                last_refresh: Instant::now(),
                longest_gap: Duration::ZERO,
            },
        );
        debug!(service_id = %descriptor.id(), "In-memory service registered");
        Ok(())
    }

    async fn refresh_liveness(&self, service_id: &str, status: HealthStatus) -> BackendResult<()> {
        let gate = {
            let mut state = self.lock();
            state.calls.push(BackendCall::Refresh {
                service_id: service_id.to_string(),
                status,
                at: Instant::now(),
            });
            state.pending_refreshes += 1;
            state.refresh_gate.clone()
        };
        pass(gate).await;

        let now = Instant::now();
        let mut state = self.lock();
        state.pending_refreshes -= 1;
        if let Some(reason) = state.refresh_failures.pop_front() {
            return Err(BackendError::Unavailable(reason));
        }

        let service = state.services.get_mut(service_id).ok_or_else(|| BackendError::Status {
            status: 404,
            body: format!("unknown check service:{}", service_id),
        })?;
        let gap = now.saturating_duration_since(service.last_refresh);
        service.longest_gap = service.longest_gap.max(gap);
        service.last_refresh = now;
        service.status = status;
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Deregister {
            service_id: service_id.to_string(),
        });
        if let Some(reason) = state.deregister_failures.pop_front() {
            return Err(BackendError::Unavailable(reason));
        }

        // 不存在的服务同样视为注销成功
        if state.services.remove(service_id).is_some() {
            debug!(service_id = %service_id, "In-memory service deregistered");
        }
        Ok(())
    }
}
