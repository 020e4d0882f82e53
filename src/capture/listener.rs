//! 各流的帧监听器：后端新帧回调的目标
//!
//! 每路物理流一个监听器实例，各自持有自己的缓冲池和处理状态。
//! 校验全部在触碰缓冲池之前完成，因此
//! deref_active → acquire_free → fill → publish 序列不会中途失败。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rustni_core::buffer::{BufferPool, Sample};
use rustni_core::error::{Result, SensorError};
use rustni_core::frame::{FrameHandle, RawFrame};
use rustni_core::pixel_format::FourCC;
use rustni_core::telemetry::StreamTelemetry;
use rustni_core::traits::{FrameCallback, StreamKind, VideoMode};

use super::process::{self, DepthHistogram};

/// 回调边界看到的监听器共性
pub(crate) trait FrameSink: Send + Sync + 'static {
    fn kind(&self) -> StreamKind;

    fn telemetry(&self) -> &StreamTelemetry;

    /// 处理一帧：校验、转换、发布
    fn handle_frame(&self, frame: &RawFrame<'_>) -> Result<()>;
}

/// 回调边界：错误在这里被拦截并记录，坏帧被丢弃，"新帧"标志
/// 保持不变，会话继续运行。错误不会穿出后端的调用栈。
pub(crate) fn boundary_callback<L: FrameSink>(listener: &Arc<L>) -> FrameCallback {
    let listener = Arc::clone(listener);
    Box::new(move |frame: RawFrame<'_>| {
        if let Err(err) = listener.handle_frame(&frame) {
            listener.telemetry().record_dropped();
            tracing::error!(
                target: "rustni::capture",
                "Dropping {} frame #{}: {}",
                listener.kind(),
                frame.sequence,
                err
            );
        }
    })
}

/// 缓冲池 + 新帧标志：三个监听器共用的发布机制
struct StreamBuffers<T: Sample> {
    pool: Arc<BufferPool<T>>,
    width: u32,
    height: u32,
    new_frame: AtomicBool,
    telemetry: StreamTelemetry,
}

impl<T: Sample> StreamBuffers<T> {
    fn new(width: u32, height: u32, samples_per_frame: usize) -> Self {
        Self {
            pool: Arc::new(BufferPool::new(samples_per_frame)),
            width,
            height,
            new_frame: AtomicBool::new(false),
            telemetry: StreamTelemetry::default(),
        }
    }

    /// 发布一帧：释放上一帧、取空闲缓冲、写入、置为活动、举旗
    fn publish_with(&self, write: impl FnOnce(&mut [T])) {
        self.pool.deref_active();
        let index = self.pool.acquire_free();
        self.pool.fill(index, write);
        self.pool.publish(index);
        self.new_frame.store(true, Ordering::Release);
        self.telemetry.record_published();
    }

    /// 原子地读取并清除新帧标志，可从任意线程调用
    fn check_new_frame(&self) -> bool {
        self.new_frame.swap(false, Ordering::AcqRel)
    }

    fn image(&self, channels: u32) -> Option<FrameHandle<T>> {
        let buf = self.pool.retain_active()?;
        Some(FrameHandle::new(buf, self.width, self.height, channels))
    }

    fn check_geometry(&self, frame: &RawFrame<'_>, kind: StreamKind) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(SensorError::FrameRead {
                kind,
                reason: format!(
                    "geometry mismatch: frame is {}x{}, stream configured {}x{}",
                    frame.width, frame.height, self.width, self.height
                ),
            });
        }
        Ok(())
    }
}

/// 逐行校验原始帧可按样本类型读取；之后的转换不再失败
fn collect_rows<'a, T: Sample>(frame: &RawFrame<'a>, kind: StreamKind) -> Result<Vec<&'a [T]>> {
    (0..frame.height)
        .map(|y| {
            frame.samples_row::<T>(y).ok_or_else(|| SensorError::FrameRead {
                kind,
                reason: format!("row {} is out of bounds or misaligned", y),
            })
        })
        .collect()
}

/// 深度流监听器
///
/// 线性重标定与直方图均衡二选一，反相可叠加；均为运行时开关，
/// 下一帧生效。
pub(crate) struct DepthListener {
    bufs: StreamBuffers<u16>,
    invert: AtomicBool,
    equalize: AtomicBool,
    /// 全 16-bit 域的直方图表，跨帧复用分配
    histogram: Mutex<DepthHistogram>,
}

impl DepthListener {
    pub(crate) fn new(mode: VideoMode) -> Result<Self> {
        if !mode.format.is_depth() {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Depth,
                format: mode.format,
            });
        }
        let samples = (mode.width * mode.height) as usize;
        Ok(Self {
            bufs: StreamBuffers::new(mode.width, mode.height, samples),
            invert: AtomicBool::new(false),
            equalize: AtomicBool::new(false),
            histogram: Mutex::new(DepthHistogram::new()),
        })
    }

    pub(crate) fn check_new_frame(&self) -> bool {
        self.bufs.check_new_frame()
    }

    pub(crate) fn image(&self) -> Option<FrameHandle<u16>> {
        self.bufs.image(1)
    }

    pub(crate) fn set_inverted(&self, enable: bool) {
        self.invert.store(enable, Ordering::Relaxed);
    }

    pub(crate) fn inverted(&self) -> bool {
        self.invert.load(Ordering::Relaxed)
    }

    pub(crate) fn set_histogram(&self, enable: bool) {
        self.equalize.store(enable, Ordering::Relaxed);
    }

    pub(crate) fn histogram_enabled(&self) -> bool {
        self.equalize.load(Ordering::Relaxed)
    }
}

impl FrameSink for DepthListener {
    fn kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn telemetry(&self) -> &StreamTelemetry {
        &self.bufs.telemetry
    }

    fn handle_frame(&self, frame: &RawFrame<'_>) -> Result<()> {
        if frame.format != FourCC::Z16 && frame.format != FourCC::Z100 {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Depth,
                format: frame.format,
            });
        }
        self.bufs.check_geometry(frame, StreamKind::Depth)?;
        let rows = collect_rows::<u16>(frame, StreamKind::Depth)?;

        let invert = self.invert.load(Ordering::Relaxed);
        if self.equalize.load(Ordering::Relaxed) {
            let mut histogram = self.histogram.lock().unwrap_or_else(PoisonError::into_inner);
            histogram.rebuild(&rows);
            self.bufs
                .publish_with(|dst| histogram.remap(&rows, dst, invert));
        } else {
            let (min, max) = (frame.min_sample, frame.max_sample);
            self.bufs
                .publish_with(|dst| process::rescale_depth(&rows, dst, min, max, invert));
        }
        Ok(())
    }
}

/// 彩色流监听器：RGB888 按行拷贝，源步长可能大于目标步长
pub(crate) struct ColorListener {
    bufs: StreamBuffers<u8>,
}

impl ColorListener {
    pub(crate) fn new(mode: VideoMode) -> Result<Self> {
        if mode.format != FourCC::RGB3 {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Color,
                format: mode.format,
            });
        }
        let samples = (mode.width * mode.height * 3) as usize;
        Ok(Self {
            bufs: StreamBuffers::new(mode.width, mode.height, samples),
        })
    }

    pub(crate) fn check_new_frame(&self) -> bool {
        self.bufs.check_new_frame()
    }

    pub(crate) fn image(&self) -> Option<FrameHandle<u8>> {
        self.bufs.image(3)
    }
}

impl FrameSink for ColorListener {
    fn kind(&self) -> StreamKind {
        StreamKind::Color
    }

    fn telemetry(&self) -> &StreamTelemetry {
        &self.bufs.telemetry
    }

    fn handle_frame(&self, frame: &RawFrame<'_>) -> Result<()> {
        if frame.format != FourCC::RGB3 {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Color,
                format: frame.format,
            });
        }
        self.bufs.check_geometry(frame, StreamKind::Color)?;
        let rows = collect_rows::<u8>(frame, StreamKind::Color)?;

        self.bufs.publish_with(|dst| process::copy_rows(&rows, dst));
        Ok(())
    }
}

/// 红外流监听器：16-bit 原始样本压到 8-bit 灰度
pub(crate) struct IrListener {
    bufs: StreamBuffers<u8>,
}

impl IrListener {
    pub(crate) fn new(mode: VideoMode) -> Result<Self> {
        if mode.format != FourCC::Y16 && mode.format != FourCC::GREY {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Infrared,
                format: mode.format,
            });
        }
        let samples = (mode.width * mode.height) as usize;
        Ok(Self {
            bufs: StreamBuffers::new(mode.width, mode.height, samples),
        })
    }

    pub(crate) fn check_new_frame(&self) -> bool {
        self.bufs.check_new_frame()
    }

    pub(crate) fn image(&self) -> Option<FrameHandle<u8>> {
        self.bufs.image(1)
    }
}

impl FrameSink for IrListener {
    fn kind(&self) -> StreamKind {
        StreamKind::Infrared
    }

    fn telemetry(&self) -> &StreamTelemetry {
        &self.bufs.telemetry
    }

    fn handle_frame(&self, frame: &RawFrame<'_>) -> Result<()> {
        self.bufs.check_geometry(frame, StreamKind::Infrared)?;
        if frame.format == FourCC::Y16 {
            let rows = collect_rows::<u16>(frame, StreamKind::Infrared)?;
            self.bufs
                .publish_with(|dst| process::downconvert_ir(&rows, dst));
        } else if frame.format == FourCC::GREY {
            let rows = collect_rows::<u8>(frame, StreamKind::Infrared)?;
            self.bufs.publish_with(|dst| process::copy_rows(&rows, dst));
        } else {
            return Err(SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Infrared,
                format: frame.format,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustni_core::bytemuck;
    use rustni_core::pixel_format::PixelFormat;

    fn depth_mode(width: u32, height: u32) -> VideoMode {
        VideoMode {
            width,
            height,
            fps: 30,
            format: FourCC::Z16.into(),
        }
    }

    /// 用 u16 向量搭一个紧凑深度帧
    fn depth_frame<'a>(samples: &'a [u16], width: u32, height: u32) -> RawFrame<'a> {
        RawFrame {
            data: bytemuck::cast_slice(samples),
            width,
            height,
            stride: width as usize * 2,
            format: FourCC::Z16.into(),
            sequence: 1,
            timestamp_us: 0,
            min_sample: 100,
            max_sample: 200,
        }
    }

    #[test]
    fn depth_frame_is_rescaled_and_published() {
        let listener = DepthListener::new(depth_mode(3, 1)).unwrap();
        let samples = [100u16, 150, 200];
        listener.handle_frame(&depth_frame(&samples, 3, 1)).unwrap();

        let image = listener.image().unwrap();
        assert_eq!(image.data(), &[0, 0x7FFF, 0xFFFF]);
        assert_eq!((image.width(), image.height()), (3, 1));
    }

    #[test]
    fn check_new_frame_clears_flag() {
        let listener = DepthListener::new(depth_mode(2, 1)).unwrap();
        assert!(!listener.check_new_frame());

        let samples = [100u16, 200];
        listener.handle_frame(&depth_frame(&samples, 2, 1)).unwrap();
        assert!(listener.check_new_frame());
        assert!(!listener.check_new_frame());

        listener.handle_frame(&depth_frame(&samples, 2, 1)).unwrap();
        assert!(listener.check_new_frame());
    }

    #[test]
    fn depth_rejects_unexpected_pixel_format() {
        let listener = DepthListener::new(depth_mode(2, 1)).unwrap();
        let samples = [1u16, 2];
        let mut frame = depth_frame(&samples, 2, 1);
        frame.format = FourCC::YUYV.into();

        let err = listener.handle_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            SensorError::UnsupportedPixelFormat {
                kind: StreamKind::Depth,
                ..
            }
        ));
        // 坏帧不举旗
        assert!(!listener.check_new_frame());
        assert!(listener.image().is_none());
    }

    #[test]
    fn depth_rejects_geometry_mismatch() {
        let listener = DepthListener::new(depth_mode(4, 4)).unwrap();
        let samples = [1u16, 2];
        let err = listener.handle_frame(&depth_frame(&samples, 2, 1)).unwrap_err();
        assert!(matches!(err, SensorError::FrameRead { .. }));
    }

    #[test]
    fn listener_creation_rejects_non_depth_mode() {
        let mode = VideoMode {
            width: 2,
            height: 2,
            fps: 30,
            format: FourCC::RGB3.into(),
        };
        assert!(DepthListener::new(mode).is_err());
    }

    #[test]
    fn histogram_mode_replaces_linear_rescale() {
        let listener = DepthListener::new(depth_mode(4, 1)).unwrap();
        listener.set_histogram(true);

        let samples = [5u16, 5, 9, 9];
        listener.handle_frame(&depth_frame(&samples, 4, 1)).unwrap();

        let image = listener.image().unwrap();
        assert_eq!(image.data(), &[0x7FFF, 0x7FFF, 0xFFFF, 0xFFFF]);
    }

    #[test]
    fn invert_toggle_takes_effect_next_frame() {
        let listener = DepthListener::new(depth_mode(1, 1)).unwrap();
        let samples = [200u16];
        listener.handle_frame(&depth_frame(&samples, 1, 1)).unwrap();
        assert_eq!(listener.image().unwrap().data(), &[0xFFFF]);

        listener.set_inverted(true);
        listener.handle_frame(&depth_frame(&samples, 1, 1)).unwrap();
        assert_eq!(listener.image().unwrap().data(), &[0]);
    }

    #[test]
    fn boundary_callback_drops_bad_frames_and_counts() {
        let listener = Arc::new(DepthListener::new(depth_mode(2, 1)).unwrap());
        let mut callback = boundary_callback(&listener);

        let good = [100u16, 200];
        callback(depth_frame(&good, 2, 1));
        // 几何不符的坏帧
        let bad = [1u16, 2, 3];
        callback(depth_frame(&bad, 3, 1));

        let stats = listener.telemetry().snapshot();
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.frames_dropped, 1);
        // 坏帧没有覆盖好帧
        assert!(listener.check_new_frame());
        assert_eq!(listener.image().unwrap().width(), 2);
    }

    #[test]
    fn color_copy_honors_source_stride() {
        let mode = VideoMode {
            width: 2,
            height: 2,
            fps: 30,
            format: FourCC::RGB3.into(),
        };
        let listener = ColorListener::new(mode).unwrap();

        // 每行 6 字节有效数据 + 2 字节 padding
        let data: Vec<u8> = vec![
            1, 2, 3, 4, 5, 6, 0xAA, 0xAA, //
            7, 8, 9, 10, 11, 12, 0xAA, 0xAA,
        ];
        let frame = RawFrame {
            data: &data,
            width: 2,
            height: 2,
            stride: 8,
            format: FourCC::RGB3.into(),
            sequence: 1,
            timestamp_us: 0,
            min_sample: 0,
            max_sample: 255,
        };
        listener.handle_frame(&frame).unwrap();

        let image = listener.image().unwrap();
        assert_eq!(image.data(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(image.channels(), 3);
    }

    #[test]
    fn ir_downconverts_to_gray8() {
        let mode = VideoMode {
            width: 3,
            height: 1,
            fps: 30,
            format: FourCC::Y16.into(),
        };
        let listener = IrListener::new(mode).unwrap();

        let samples = [40u16, 1023, 4000];
        let frame = RawFrame {
            data: bytemuck::cast_slice(&samples),
            width: 3,
            height: 1,
            stride: 6,
            format: FourCC::Y16.into(),
            sequence: 1,
            timestamp_us: 0,
            min_sample: 0,
            max_sample: 1023,
        };
        listener.handle_frame(&frame).unwrap();

        let image = listener.image().unwrap();
        assert_eq!(image.data(), &[10, 255, 255]);
    }

    #[test]
    fn consumer_keeps_old_frame_while_new_ones_publish() {
        let listener = DepthListener::new(depth_mode(2, 1)).unwrap();
        let first = [100u16, 200];
        listener.handle_frame(&depth_frame(&first, 2, 1)).unwrap();
        let held = listener.image().unwrap();

        let second = [200u16, 100];
        listener.handle_frame(&depth_frame(&second, 2, 1)).unwrap();

        // 旧句柄数据不被新帧覆盖
        assert_eq!(held.data(), &[0, 0xFFFF]);
        assert_eq!(listener.image().unwrap().data(), &[0xFFFF, 0]);
    }

    #[test]
    fn unknown_format_displays_reasonably() {
        let format = PixelFormat::Unknown(0xDEAD_BEEF);
        assert_eq!(format.to_string(), "unknown(0xdeadbeef)");
    }
}
