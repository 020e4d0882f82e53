//! 后端驱动选择

use rustni_core::error::Result;
use rustni_core::traits::Driver;

/// 创建默认驱动实例的工厂函数
#[cfg(feature = "simulation")]
pub fn create_driver() -> Result<Box<dyn Driver>> {
    Ok(Box::new(rustni_simulation::SimDriver::new()))
}

/// 创建默认驱动实例的工厂函数
///
/// 没有启用任何后端 feature 时总是失败
#[cfg(not(feature = "simulation"))]
pub fn create_driver() -> Result<Box<dyn Driver>> {
    Err(rustni_core::error::SensorError::DeviceOpen {
        uri: String::new(),
        reason: "No backend enabled. Please check Cargo features.".into(),
    })
}
