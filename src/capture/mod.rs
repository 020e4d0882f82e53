//! 采集会话：打开设备、为每路流装配监听器、向消费者提供最新帧
//!
//! 生产者在后端线程上通过回调推帧；消费者线程随时调用
//! `check_new_*_frame` / `*_image`，两侧只在缓冲池的短临界区相遇。
//! 消费者不保证看到每一帧：后到的帧覆盖"最新"槽位 (latest-wins)。

pub mod backend;
mod listener;
mod process;

use std::sync::Arc;

use rustni_core::builder::CaptureConfig;
use rustni_core::error::Result;
use rustni_core::frame::FrameHandle;
use rustni_core::telemetry::TelemetrySnapshot;
use rustni_core::traits::{Device, DeviceInfo, Driver, StreamKind, VideoMode, VideoStream};

use listener::{boundary_callback, ColorListener, DepthListener, FrameSink, IrListener};

/// 最新深度帧：16-bit 全量程灰度
pub type DepthFrame = FrameHandle<u16>;
/// 最新彩色帧：紧凑 RGB888
pub type ColorFrame = FrameHandle<u8>;
/// 最新红外帧：8-bit 灰度
pub type IrFrame = FrameHandle<u8>;

/// 一路流与它的监听器
struct StreamUnit<L> {
    stream: Box<dyn VideoStream>,
    listener: Arc<L>,
}

impl<L: FrameSink> StreamUnit<L> {
    fn build(
        device: &mut dyn Device,
        kind: StreamKind,
        mode_override: Option<VideoMode>,
        make: impl FnOnce(VideoMode) -> Result<L>,
    ) -> Result<Self> {
        let mut stream = device.create_stream(kind)?;
        if let Some(mode) = mode_override {
            stream.set_mode(mode)?;
        }
        // 监听器按最终生效的模式建池，并在这里校验像素格式：
        // 格式不符在启动前就失败，而不是默默转换
        let listener = Arc::new(make(stream.mode())?);
        Ok(Self { stream, listener })
    }

    fn start(&mut self, mirror: bool) -> Result<()> {
        self.stream.set_mirror(mirror)?;
        self.stream.set_frame_callback(boundary_callback(&self.listener));
        self.stream.start()
    }

    fn stop(&mut self) {
        // stop 返回后保证没有回调在途，注销才是安全的
        self.stream.stop();
        self.stream.clear_frame_callback();
    }
}

/// 一台设备上的采集会话
pub struct Capture {
    device: Box<dyn Device>,
    depth: Option<StreamUnit<DepthListener>>,
    color: Option<StreamUnit<ColorListener>>,
    ir: Option<StreamUnit<IrListener>>,
    mirror: bool,
    running: bool,
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("depth_enabled", &self.depth.is_some())
            .field("color_enabled", &self.color.is_some())
            .field("ir_enabled", &self.ir.is_some())
            .field("mirror", &self.mirror)
            .field("running", &self.running)
            .finish()
    }
}

impl Capture {
    /// 打开 uri 指定的设备并按配置创建各流 (不启动)
    pub fn open(driver: &dyn Driver, uri: &str, config: &CaptureConfig) -> Result<Self> {
        let mut device = driver.open(uri)?;

        let depth = if config.depth_enabled {
            Some(StreamUnit::build(
                device.as_mut(),
                StreamKind::Depth,
                config.depth_mode,
                DepthListener::new,
            )?)
        } else {
            None
        };

        let color = if config.color_enabled {
            Some(StreamUnit::build(
                device.as_mut(),
                StreamKind::Color,
                config.color_mode,
                ColorListener::new,
            )?)
        } else {
            None
        };

        let ir = if config.ir_enabled {
            Some(StreamUnit::build(
                device.as_mut(),
                StreamKind::Infrared,
                config.ir_mode,
                IrListener::new,
            )?)
        } else {
            None
        };

        if config.depth_color_registration {
            device.set_depth_color_registration(true)?;
        }

        Ok(Self {
            device,
            depth,
            color,
            ir,
            mirror: config.mirror,
            running: false,
        })
    }

    /// 用默认后端打开设备
    pub fn open_default(uri: &str, config: &CaptureConfig) -> Result<Self> {
        let driver = backend::create_driver()?;
        Self::open(driver.as_ref(), uri, config)
    }

    /// 启动所有已创建的流
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if let Some(unit) = &mut self.depth {
            unit.start(self.mirror)?;
        }
        if let Some(unit) = &mut self.color {
            unit.start(self.mirror)?;
        }
        if let Some(unit) = &mut self.ir {
            unit.start(self.mirror)?;
        }
        self.running = true;
        tracing::info!(
            target: "rustni::capture",
            "Capture started on '{}'",
            self.device.info().uri
        );
        Ok(())
    }

    /// 停止所有流。返回后保证不会再有帧回调运行。
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(unit) = &mut self.depth {
            unit.stop();
        }
        if let Some(unit) = &mut self.color {
            unit.stop();
        }
        if let Some(unit) = &mut self.ir {
            unit.stop();
        }
        self.running = false;
        tracing::info!(
            target: "rustni::capture",
            "Capture stopped on '{}'",
            self.device.info().uri
        );
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.device.info()
    }

    // --- 新帧标志 ---

    /// 自上次调用以来是否有新的深度帧。读取并清除标志。
    pub fn check_new_depth_frame(&self) -> bool {
        self.depth
            .as_ref()
            .is_some_and(|unit| unit.listener.check_new_frame())
    }

    /// 自上次调用以来是否有新的彩色帧。读取并清除标志。
    pub fn check_new_color_frame(&self) -> bool {
        self.color
            .as_ref()
            .is_some_and(|unit| unit.listener.check_new_frame())
    }

    /// 自上次调用以来是否有新的红外帧。读取并清除标志。
    pub fn check_new_ir_frame(&self) -> bool {
        self.ir
            .as_ref()
            .is_some_and(|unit| unit.listener.check_new_frame())
    }

    // --- 最新帧 ---

    /// 最新深度帧。第一帧发布前返回 None。
    pub fn depth_image(&self) -> Option<DepthFrame> {
        self.depth.as_ref().and_then(|unit| unit.listener.image())
    }

    /// 最新彩色帧。第一帧发布前返回 None。
    pub fn color_image(&self) -> Option<ColorFrame> {
        self.color.as_ref().and_then(|unit| unit.listener.image())
    }

    /// 最新红外帧。第一帧发布前返回 None。
    pub fn ir_image(&self) -> Option<IrFrame> {
        self.ir.as_ref().and_then(|unit| unit.listener.image())
    }

    // --- 深度处理开关 (下一帧生效) ---

    /// 深度直方图均衡模式，代替线性重标定
    pub fn set_depth_histogram(&self, enable: bool) {
        if let Some(unit) = &self.depth {
            unit.listener.set_histogram(enable);
        }
    }

    pub fn depth_histogram_enabled(&self) -> bool {
        self.depth
            .as_ref()
            .is_some_and(|unit| unit.listener.histogram_enabled())
    }

    /// 深度输出反相
    pub fn set_depth_inverted(&self, enable: bool) {
        if let Some(unit) = &self.depth {
            unit.listener.set_inverted(enable);
        }
    }

    pub fn depth_inverted(&self) -> bool {
        self.depth
            .as_ref()
            .is_some_and(|unit| unit.listener.inverted())
    }

    // --- 流模式与遥测 ---

    pub fn depth_stream_mode(&self) -> Option<VideoMode> {
        self.depth.as_ref().map(|unit| unit.stream.mode())
    }

    pub fn color_stream_mode(&self) -> Option<VideoMode> {
        self.color.as_ref().map(|unit| unit.stream.mode())
    }

    pub fn ir_stream_mode(&self) -> Option<VideoMode> {
        self.ir.as_ref().map(|unit| unit.stream.mode())
    }

    pub fn depth_telemetry(&self) -> TelemetrySnapshot {
        self.depth
            .as_ref()
            .map(|unit| unit.listener.telemetry().snapshot())
            .unwrap_or_default()
    }

    pub fn color_telemetry(&self) -> TelemetrySnapshot {
        self.color
            .as_ref()
            .map(|unit| unit.listener.telemetry().snapshot())
            .unwrap_or_default()
    }

    pub fn ir_telemetry(&self) -> TelemetrySnapshot {
        self.ir
            .as_ref()
            .map(|unit| unit.listener.telemetry().snapshot())
            .unwrap_or_default()
    }
}

// 析构时停流，保证回调不会打进已销毁的监听器
impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}
