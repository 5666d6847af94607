//! 服务注册错误处理模块
//!
//! 提供统一的错误类型、错误代码分类，以及后端调用错误

pub mod code;
pub mod registry_error;

// 重新导出公共类型
pub use code::ErrorCode;
pub use registry_error::{BackendError, RegistryError, Result};

/// 后端调用结果类型
pub type BackendResult<T> = std::result::Result<T, BackendError>;
