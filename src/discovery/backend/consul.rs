//! Consul 服务发现后端
//!
//! 通过 Consul agent HTTP API 完成注册、TTL 刷新与注销

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::DiscoveryBackend;
use crate::discovery::descriptor::{check_id_for, HealthStatus, ServiceDescriptor};
use crate::error::{BackendError, BackendResult, RegistryError, Result};

/// TTL 刷新时附带的检查输出
const HEARTBEAT_OUTPUT: &str = "heartbeat";

/// Consul 服务发现后端
#[derive(Debug, Clone)]
pub struct ConsulBackend {
    http_client: HttpClient,
    base_url: Url,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    port: u16,
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "CheckID")]
    check_id: String,
    #[serde(rename = "TTL")]
    ttl: String,
    status: HealthStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckUpdate<'a> {
    status: HealthStatus,
    output: &'a str,
}

impl ConsulBackend {
    /// 创建新的 Consul 后端
    ///
    /// 地址可以是 `host:port`（默认 http）或完整的 `http(s)://host:port` URL
    pub fn new(address: &str) -> Result<Self> {
        Self::builder(address).build()
    }

    pub fn builder(address: &str) -> ConsulBackendBuilder {
        ConsulBackendBuilder {
            address: address.to_string(),
            token: None,
            request_timeout: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Unavailable(format!("invalid endpoint {}: {}", path, e)))
    }

    fn put(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http_client.put(url);
        match &self.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }
}

/// Consul 后端构建器
pub struct ConsulBackendBuilder {
    address: String,
    token: Option<String>,
    request_timeout: Option<Duration>,
}

impl ConsulBackendBuilder {
    /// 设置 ACL token
    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// 设置单次请求超时；不设置时请求不会超时
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ConsulBackend> {
        let base_url = parse_agent_address(&self.address)?;

        let mut builder = HttpClient::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(|e| RegistryError::Construction {
            address: self.address.clone(),
            reason: e.to_string(),
        })?;

        Ok(ConsulBackend {
            http_client,
            base_url,
            token: self.token,
        })
    }
}

fn parse_agent_address(address: &str) -> Result<Url> {
    let construction_error = |reason: String| RegistryError::Construction {
        address: address.to_string(),
        reason,
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(construction_error("address is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| construction_error(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(construction_error(format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(construction_error("address has no host".to_string()));
    }
    Ok(url)
}

/// 将非 2xx 响应转换为错误
async fn ensure_success(response: reqwest::Response) -> BackendResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

fn format_ttl(ttl: Duration) -> String {
    let nanos = ttl.subsec_nanos();
    if nanos == 0 {
        format!("{}s", ttl.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", ttl.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", ttl.as_micros())
    } else {
        format!("{}ns", ttl.as_nanos())
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulBackend {
    async fn register_service(
        &self,
        descriptor: &ServiceDescriptor,
        ttl: Duration,
        initial_status: HealthStatus,
    ) -> BackendResult<()> {
        let registration = AgentServiceRegistration {
            id: descriptor.id(),
            name: descriptor.name(),
            port: descriptor.port(),
            check: AgentServiceCheck {
                check_id: descriptor.check_id(),
                ttl: format_ttl(ttl),
                status: initial_status,
            },
        };

        let url = self.endpoint("v1/agent/service/register")?;
        let response = self.put(url).json(&registration).send().await?;
        ensure_success(response).await?;

        info!(
            service_id = %descriptor.id(),
            service_name = %descriptor.name(),
            port = descriptor.port(),
            "Service registered with Consul"
        );
        Ok(())
    }

    async fn refresh_liveness(&self, service_id: &str, status: HealthStatus) -> BackendResult<()> {
        let url = self.endpoint(&format!("v1/agent/check/update/{}", check_id_for(service_id)))?;
        let update = CheckUpdate {
            status,
            output: HEARTBEAT_OUTPUT,
        };
        let response = self.put(url).json(&update).send().await?;
        ensure_success(response).await?;

        debug!(service_id = %service_id, status = %status, "Consul TTL check updated");
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> BackendResult<()> {
        let url = self.endpoint(&format!("v1/agent/service/deregister/{}", service_id))?;
        let response = self.put(url).send().await?;

        // 服务已不存在：Consul 返回 404，视为注销成功
        if response.status() == StatusCode::NOT_FOUND {
            debug!(service_id = %service_id, "Service already absent from Consul");
            return Ok(());
        }
        ensure_success(response).await?;

        info!(service_id = %service_id, "Service deregistered from Consul");
        Ok(())
    }
}
