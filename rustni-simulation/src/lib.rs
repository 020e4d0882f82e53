//! RustNI 软件仿真后端
//!
//! 在没有硬件的环境里跑通整条采集管线：每路流一个工作线程，按
//! 配置的帧率合成确定性的深度/彩色/红外帧，驱动注册的回调。
//! 通知语义与硬件 SDK 一致：回调在后端线程上运行，`stop` 返回后
//! 保证不会再有回调。

pub mod device;
pub mod stream;

use rustni_core::error::{Result, SensorError};
use rustni_core::pixel_format::FourCC;
use rustni_core::traits::{Device, DeviceInfo, Driver, VideoMode};

use device::SimDevice;

/// 仿真设备的固定 URI
pub const SIM_URI: &str = "sim://0";

/// 仿真参数
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub depth_mode: VideoMode,
    pub color_mode: VideoMode,
    pub ir_mode: VideoMode,

    /// 深度样本量程 (交付到 RawFrame 的 min/max)
    pub depth_min: u16,
    pub depth_max: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            depth_mode: VideoMode {
                width: 320,
                height: 240,
                fps: 30,
                format: FourCC::Z16.into(),
            },
            color_mode: VideoMode {
                width: 320,
                height: 240,
                fps: 30,
                format: FourCC::RGB3.into(),
            },
            ir_mode: VideoMode {
                width: 320,
                height: 240,
                fps: 30,
                format: FourCC::Y16.into(),
            },
            depth_min: 0,
            depth_max: 10_000,
        }
    }
}

/// 仿真驱动
#[derive(Debug, Clone, Default)]
pub struct SimDriver {
    config: SimConfig,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定制仿真参数 (分辨率、帧率、量程)
    pub fn with_config(config: SimConfig) -> Self {
        Self { config }
    }
}

impl Driver for SimDriver {
    fn name(&self) -> &str {
        "Simulation"
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![SimDevice::device_info()])
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Device>> {
        if uri != SIM_URI {
            return Err(SensorError::DeviceOpen {
                uri: uri.to_string(),
                reason: "no such simulated device".into(),
            });
        }
        tracing::info!(target: "rustni::sim", "Simulated device opened: {}", uri);
        Ok(Box::new(SimDevice::new(self.config.clone())))
    }
}
