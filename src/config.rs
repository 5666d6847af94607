use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RegistryError, Result};

/// 默认 TTL：15 秒
pub const DEFAULT_TTL_SECS: u64 = 15;

/// 默认心跳间隔：10 秒（TTL 内允许丢失一次心跳）
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// TTL 下限：Consul 的 TTL 检查以秒为粒度才有意义
pub const MIN_TTL: Duration = Duration::from_secs(1);

/// TTL 上限：一天
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 默认 Consul agent 地址
pub const DEFAULT_BACKEND_ADDRESS: &str = "127.0.0.1:8500";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrarConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_address")]
    pub address: String,
    /// Consul ACL token，通过 `X-Consul-Token` 请求头发送
    pub token: Option<String>,
    /// 单次后端请求超时（秒）；不设置则沿用 HTTP 客户端默认行为（不超时）
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: default_backend_address(),
            token: None,
            request_timeout_secs: None,
        }
    }
}

fn default_backend_address() -> String {
    DEFAULT_BACKEND_ADDRESS.to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

/// 生命周期时间参数
///
/// 心跳间隔必须严格小于 TTL，否则每次心跳之间 TTL 都会过期；
/// TTL 限定在 [`MIN_TTL`] 到 [`MAX_TTL`] 之间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    ttl: Duration,
    heartbeat_interval: Duration,
}

impl LifecycleTimings {
    pub fn new(ttl: Duration, heartbeat_interval: Duration) -> Result<Self> {
        if ttl < MIN_TTL || ttl > MAX_TTL {
            return Err(RegistryError::configuration(format!(
                "TTL ({}s) must be between {}s and {}s",
                ttl.as_secs_f64(),
                MIN_TTL.as_secs(),
                MAX_TTL.as_secs()
            )));
        }
        if heartbeat_interval.is_zero() {
            return Err(RegistryError::configuration(
                "heartbeat interval must be greater than zero",
            ));
        }
        if heartbeat_interval >= ttl {
            return Err(RegistryError::configuration(format!(
                "heartbeat interval ({}s) must be shorter than the TTL ({}s)",
                heartbeat_interval.as_secs_f64(),
                ttl.as_secs_f64()
            )));
        }
        Ok(Self {
            ttl,
            heartbeat_interval,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// TTL 窗口内可容忍的连续心跳失败次数
    pub fn tolerated_misses(&self) -> u32 {
        let ticks = self.ttl.as_millis() / self.heartbeat_interval.as_millis().max(1);
        u32::try_from(ticks.saturating_sub(1)).unwrap_or(u32::MAX)
    }
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        }
    }
}

impl TryFrom<LifecycleConfig> for LifecycleTimings {
    type Error = RegistryError;

    fn try_from(config: LifecycleConfig) -> Result<Self> {
        LifecycleTimings::new(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.heartbeat_interval_secs),
        )
    }
}

impl RegistrarConfig {
    pub fn new(name: impl Into<String>, port: u16, backend_address: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig {
                name: name.into(),
                port,
            },
            backend: BackendConfig {
                address: backend_address.into(),
                ..Default::default()
            },
            lifecycle: LifecycleConfig::default(),
        }
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::configuration(format!("cannot read {}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RegistrarConfig = toml::from_str(content)
            .map_err(|e| RegistryError::configuration(format!("cannot parse config: {}", e)))?;
        config.timings()?;
        Ok(config)
    }

    /// 使用环境变量覆盖配置
    ///
    /// - `CONSUL_HTTP_ADDR`: 后端地址
    /// - `CONSUL_HTTP_TOKEN`: ACL token
    /// - `CONSUL_TTL_SECONDS`: TTL（秒）
    /// - `SERVICE_HEARTBEAT_INTERVAL`: 心跳间隔（秒）
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("CONSUL_HTTP_ADDR") {
            self.backend.address = address;
        }
        if let Some(token) = lookup("CONSUL_HTTP_TOKEN") {
            self.backend.token = Some(token);
        }
        if let Some(ttl) = lookup("CONSUL_TTL_SECONDS") {
            self.lifecycle.ttl_secs = parse_secs("CONSUL_TTL_SECONDS", &ttl)?;
        }
        if let Some(interval) = lookup("SERVICE_HEARTBEAT_INTERVAL") {
            self.lifecycle.heartbeat_interval_secs =
                parse_secs("SERVICE_HEARTBEAT_INTERVAL", &interval)?;
        }
        self.timings()?;
        Ok(self)
    }

    pub fn timings(&self) -> Result<LifecycleTimings> {
        LifecycleTimings::try_from(self.lifecycle)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.backend.request_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| RegistryError::configuration(format!("{}='{}': {}", key, value, e)))
}
