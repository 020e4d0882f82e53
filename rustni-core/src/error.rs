use thiserror::Error;

use crate::pixel_format::PixelFormat;
use crate::traits::StreamKind;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to open device '{uri}': {reason}")]
    DeviceOpen { uri: String, reason: String },

    #[error("Failed to create {kind} stream: {reason}")]
    StreamCreate { kind: StreamKind, reason: String },

    #[error("Failed to start {kind} stream: {reason}")]
    StreamStart { kind: StreamKind, reason: String },

    #[error("Unsupported {kind} pixel format: {format}")]
    UnsupportedPixelFormat {
        kind: StreamKind,
        format: PixelFormat,
    },

    #[error("Failed to read {kind} frame: {reason}")]
    FrameRead { kind: StreamKind, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SensorError>;
