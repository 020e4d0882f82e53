//! 仿真设备

use rustni_core::error::{Result, SensorError};
use rustni_core::traits::{Device, DeviceCapabilities, DeviceInfo, StreamKind, VideoStream};

use crate::stream::SimStream;
use crate::{SimConfig, SIM_URI};

/// 仿真设备：每种流至多创建一路
#[derive(Debug)]
pub struct SimDevice {
    info: DeviceInfo,
    config: SimConfig,
    created: Vec<StreamKind>,
    registration: bool,
}

impl SimDevice {
    pub(crate) fn new(config: SimConfig) -> Self {
        Self {
            info: Self::device_info(),
            config,
            created: Vec::new(),
            registration: false,
        }
    }

    pub(crate) fn device_info() -> DeviceInfo {
        DeviceInfo {
            name: "Simulated Depth Sensor".into(),
            uri: SIM_URI.into(),
            vendor: "RustNI".into(),
            backend: "Simulation".into(),
        }
    }

    /// 深度-彩色对齐是否开启
    pub fn registration_enabled(&self) -> bool {
        self.registration
    }
}

impl Device for SimDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::MIRROR
            | DeviceCapabilities::DEPTH_COLOR_REGISTRATION
            | DeviceCapabilities::INFRARED
    }

    fn create_stream(&mut self, kind: StreamKind) -> Result<Box<dyn VideoStream>> {
        if self.created.contains(&kind) {
            return Err(SensorError::StreamCreate {
                kind,
                reason: "stream already created".into(),
            });
        }
        self.created.push(kind);

        let mode = match kind {
            StreamKind::Depth => self.config.depth_mode,
            StreamKind::Color => self.config.color_mode,
            StreamKind::Infrared => self.config.ir_mode,
        };
        Ok(Box::new(SimStream::new(
            kind,
            mode,
            self.config.depth_min,
            self.config.depth_max,
        )))
    }

    fn set_depth_color_registration(&mut self, enable: bool) -> Result<()> {
        // 仿真帧本来就是同视点合成的，记录标志即可
        self.registration = enable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimDriver;
    use rustni_core::traits::Driver;

    #[test]
    fn open_rejects_unknown_uri() {
        let driver = SimDriver::new();
        assert!(driver.open("sim://42").is_err());
        assert!(driver.open(SIM_URI).is_ok());
    }

    #[test]
    fn duplicate_stream_creation_fails() {
        let driver = SimDriver::new();
        let mut device = driver.open(SIM_URI).unwrap();
        device.create_stream(StreamKind::Depth).unwrap();
        let err = device.create_stream(StreamKind::Depth).unwrap_err();
        assert!(matches!(err, SensorError::StreamCreate { .. }));
    }

    #[test]
    fn listed_device_matches_open_uri() {
        let driver = SimDriver::new();
        let devices = driver.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(driver.open(&devices[0].uri).is_ok());
    }
}
