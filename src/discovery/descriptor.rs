//! 服务描述符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务描述符
///
/// 注册实例的不可变身份：ID 在创建时生成一次，之后不再改变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// 实例 ID（UUID v4，全局唯一）
    id: String,

    /// 逻辑服务名（如 "orders"）
    name: String,

    /// 服务端口
    port: u16,
}

impl ServiceDescriptor {
    /// 创建新的服务描述符，生成新的实例 ID
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            port,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// TTL 检查 ID，格式为 "service:<id>"
    pub fn check_id(&self) -> String {
        check_id_for(&self.id)
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.name, self.id, self.port)
    }
}

/// 根据实例 ID 计算 TTL 检查 ID
pub fn check_id_for(service_id: &str) -> String {
    format!("service:{}", service_id)
}

/// 健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
