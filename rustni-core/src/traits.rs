use std::fmt;

use bitflags::bitflags;

use crate::error::Result;
use crate::frame::RawFrame;
use crate::pixel_format::PixelFormat;

// --- 基础类型定义 ---

/// 一路传感器数据流的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Depth => "depth",
            Self::Color => "color",
            Self::Infrared => "infrared",
        };
        write!(f, "{}", name)
    }
}

/// 设备基本信息
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// 对用户友好的显示名称 (e.g. "PrimeSense Carmine")
    pub name: String,

    /// 唯一设备 URI (e.g. "sim://0" 或 USB 总线路径)
    /// 用于 Driver::open 的参数
    pub uri: String,

    /// 厂商名
    pub vendor: String,

    /// 后端类型标识 (e.g. "Simulation")
    pub backend: String,
}

bitflags! {
    /// 设备能力集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCapabilities: u32 {
        /// 支持镜像输出
        const MIRROR = 1 << 0;
        /// 支持深度图对齐到彩色视点
        const DEPTH_COLOR_REGISTRATION = 1 << 1;
        /// 提供红外流
        const INFRARED = 1 << 2;
    }
}

/// 一路流的视频模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
}

/// 新帧回调。后端在自己的线程上调用；RawFrame 借用后端内部缓冲，
/// 只在本次调用期间有效。
pub type FrameCallback = Box<dyn FnMut(RawFrame<'_>) + Send>;

// --- 核心 Trait 定义 ---

/// 1. 驱动入口：设备枚举与打开
pub trait Driver: Send + Sync {
    /// 后端标识 (e.g. "Simulation")
    fn name(&self) -> &str;

    /// 扫描总线，返回设备列表（含唯一 URI）
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// 按 URI 打开设备
    fn open(&self, uri: &str) -> Result<Box<dyn Device>>;
}

/// 2. 已打开的物理设备
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn capabilities(&self) -> DeviceCapabilities;

    /// 创建一路流。每种流至多一路。
    fn create_stream(&mut self, kind: StreamKind) -> Result<Box<dyn VideoStream>>;

    /// 深度图对齐到彩色视点
    fn set_depth_color_registration(&mut self, enable: bool) -> Result<()>;
}

/// 3. 数据面：一路流
///
/// 回调注册代替了硬件 SDK 的监听器基类继承，后端线程模型
/// (每流独立回调线程，或单线程轮询后依次分发) 对上层不可见。
pub trait VideoStream: Send + Sync {
    fn kind(&self) -> StreamKind;

    fn mode(&self) -> VideoMode;

    /// 更换视频模式。必须在 start 之前调用。
    fn set_mode(&mut self, mode: VideoMode) -> Result<()>;

    /// 注册新帧回调。必须在 start 之前调用。
    fn set_frame_callback(&mut self, callback: FrameCallback);

    /// 注销回调。必须在 stop 之后调用。
    fn clear_frame_callback(&mut self);

    /// 启动采集
    fn start(&mut self) -> Result<()>;

    /// 停止采集。返回时保证不会再有回调被调用。
    fn stop(&mut self);

    /// 镜像输出。必须在 start 之前调用。
    fn set_mirror(&mut self, mirror: bool) -> Result<()>;
}

impl std::fmt::Debug for dyn VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("kind", &self.kind())
            .field("mode", &self.mode())
            .finish()
    }
}
