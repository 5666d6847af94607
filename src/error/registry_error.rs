//! 服务注册统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// 发现后端调用错误
///
/// 由 `DiscoveryBackend` 的各个实现返回，生命周期控制器再将其包装为 `RegistryError`
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP 传输错误（连接失败、超时等）
    #[error("request to discovery backend failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 后端返回非 2xx 状态码
    #[error("discovery backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// 后端不可用（内存后端的故障注入也使用此变体）
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),
}

/// 服务注册统一错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 无法根据给定地址构建后端客户端
    #[error("cannot construct discovery client for '{address}': {reason}")]
    Construction { address: String, reason: String },

    /// 初始注册失败，心跳任务未启动
    #[error("cannot register service '{service_id}': {source}")]
    Registration {
        service_id: String,
        #[source]
        source: BackendError,
    },

    /// 单次心跳刷新失败（只记录日志，不返回给调用方）
    #[error("cannot refresh liveness of service '{service_id}': {source}")]
    HeartbeatRefresh {
        service_id: String,
        #[source]
        source: BackendError,
    },

    /// 注销失败；已发出的取消不会回滚
    #[error("cannot deregister service '{service_id}': {source}")]
    Deregistration {
        service_id: String,
        #[source]
        source: BackendError,
    },

    /// 重复注册
    #[error("service '{service_id}' is already registered")]
    AlreadyRegistered { service_id: String },

    /// 已注销的实例不可再次注册，需要新建实例（新 ID）
    #[error("service '{service_id}' has been unregistered and cannot be registered again")]
    Terminated { service_id: String },

    /// 配置错误
    #[error("invalid registrar configuration: {0}")]
    Configuration(String),
}

impl RegistryError {
    /// 创建配置错误
    pub fn configuration(msg: impl Into<String>) -> Self {
        RegistryError::Configuration(msg.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::Construction { .. } => ErrorCode::ConnectionFailed,
            RegistryError::Registration { .. } => ErrorCode::RegistrationFailed,
            RegistryError::HeartbeatRefresh { .. } => ErrorCode::HeartbeatFailed,
            RegistryError::Deregistration { .. } => ErrorCode::DeregistrationFailed,
            RegistryError::AlreadyRegistered { .. } | RegistryError::Terminated { .. } => {
                ErrorCode::InvalidState
            }
            RegistryError::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// 判断是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RegistryError>;
