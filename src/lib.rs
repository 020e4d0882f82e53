pub mod capture;

// Re-export 核心 crate，方便用户访问底层类型
pub use rustni_core;

/// 预置模块，用户可以通过 `use rustni::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::capture::{Capture, ColorFrame, DepthFrame, IrFrame};
    pub use rustni_core::builder::CaptureConfig;
    pub use rustni_core::error::{Result, SensorError};
    pub use rustni_core::frame::{FrameHandle, ImageTarget, RowOrder};
    pub use rustni_core::pixel_format::{FourCC, PixelFormat};
    pub use rustni_core::traits::{Driver, StreamKind, VideoMode};
}
