//! 服务注册器工厂
//!
//! 提供快速构建方法，返回只暴露生命周期接口的注册器

use crate::config::RegistrarConfig;
use crate::discovery::registrar::{ServiceLifecycle, ServiceRegistrar};
use crate::error::Result;

/// 服务注册器工厂
pub struct RegistrarFactory;

impl RegistrarFactory {
    /// 使用默认配置创建注册器（Consul 后端，TTL 15 秒，心跳 10 秒）
    ///
    /// # 参数
    /// * `name` - 逻辑服务名
    /// * `port` - 服务端口
    /// * `backend_address` - Consul agent 地址
    pub fn create(
        name: impl Into<String>,
        port: u16,
        backend_address: &str,
    ) -> Result<Box<dyn ServiceLifecycle>> {
        Ok(Box::new(ServiceRegistrar::new(name, port, backend_address)?))
    }

    /// 从配置创建注册器
    pub fn from_config(config: &RegistrarConfig) -> Result<Box<dyn ServiceLifecycle>> {
        Ok(Box::new(ServiceRegistrar::from_config(config)?))
    }

    /// 从 TOML 配置文件创建注册器，环境变量优先于文件内容
    ///
    /// 支持的环境变量见 [`RegistrarConfig::with_env_overrides`]
    pub fn from_config_file(path: &str) -> Result<Box<dyn ServiceLifecycle>> {
        let config = RegistrarConfig::load_from_file(path)?.with_env_overrides()?;
        Self::from_config(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;

    #[test]
    fn create_generates_distinct_identities() {
        let a = RegistrarFactory::create("orders", 8080, "127.0.0.1:8500").unwrap();
        let b = RegistrarFactory::create("orders", 8080, "127.0.0.1:8500").unwrap();
        assert_ne!(a.service_id(), b.service_id());
    }

    #[test]
    fn from_config_validates_timings() {
        let mut config = RegistrarConfig::new("orders", 8080, "127.0.0.1:8500");
        config.lifecycle.heartbeat_interval_secs = 20;

        let err = RegistrarFactory::from_config(&config).err();
        assert!(matches!(err, Some(RegistryError::Configuration(_))));
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let err = RegistrarFactory::from_config_file("/nonexistent/registrar.toml").err();
        assert!(matches!(err, Some(RegistryError::Configuration(_))));
    }
}
