// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod buffer;
pub mod builder;
pub mod error;
pub mod frame;
pub mod pixel_format;
pub mod telemetry;
pub mod traits;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::buffer::{BufferIndex, BufferPool, BufferRef};
    pub use crate::builder::CaptureConfig;
    pub use crate::error::{Result, SensorError};
    pub use crate::frame::{FrameHandle, ImageTarget, RawFrame, RowOrder};
    pub use crate::pixel_format::{FourCC, PixelFormat};
    pub use crate::traits::{Device, Driver, StreamKind, VideoMode, VideoStream};
}

// 重新导出依赖中的关键类型，避免用户版本冲突
pub use bytemuck;

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
