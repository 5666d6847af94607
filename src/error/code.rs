//! 错误代码定义
//!
//! 错误代码按类别分组：
//! - 1000-1999: 连接相关错误
//! - 6000-6999: 系统/配置相关错误
//! - 7000-7999: 注册生命周期相关错误

use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务注册错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 连接相关错误 (1000-1999)
    // ============================================================
    ConnectionFailed = 1000,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    ConfigurationError = 6003,

    // ============================================================
    // 注册生命周期相关错误 (7000-7999)
    // ============================================================
    RegistrationFailed = 7000,
    HeartbeatFailed = 7001,
    DeregistrationFailed = 7002,
    InvalidState = 7003,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorCode::HeartbeatFailed => "HEARTBEAT_FAILED",
            ErrorCode::DeregistrationFailed => "DEREGISTRATION_FAILED",
            ErrorCode::InvalidState => "INVALID_STATE",
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 心跳失败由下一次 tick 自然重试，不在此列
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RegistrationFailed | ErrorCode::DeregistrationFailed
        )
    }
}
