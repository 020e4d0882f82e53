//! 仿真流：一个工作线程按帧节拍合成帧并驱动回调

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use rustni_core::bytemuck;
use rustni_core::error::{Result, SensorError};
use rustni_core::frame::RawFrame;
use rustni_core::traits::{FrameCallback, StreamKind, VideoMode, VideoStream};

/// 发给工作线程的指令。等待指令的超时兼做帧节拍。
enum Command {
    Stop,
}

struct Worker {
    cmd_tx: Sender<Command>,
    handle: JoinHandle<()>,
}

struct State {
    mode: VideoMode,
    mirror: bool,
    callback: Option<FrameCallback>,
}

struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 一路仿真流
pub struct SimStream {
    kind: StreamKind,
    shared: Arc<Shared>,
    worker: Option<Worker>,
    depth_min: u16,
    depth_max: u16,
}

impl SimStream {
    pub(crate) fn new(kind: StreamKind, mode: VideoMode, depth_min: u16, depth_max: u16) -> Self {
        Self {
            kind,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    mode,
                    mirror: false,
                    callback: None,
                }),
            }),
            worker: None,
            depth_min,
            depth_max,
        }
    }
}

impl VideoStream for SimStream {
    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn mode(&self) -> VideoMode {
        self.shared.lock().mode
    }

    fn set_mode(&mut self, mode: VideoMode) -> Result<()> {
        if self.worker.is_some() {
            return Err(SensorError::Io(std::io::Error::other(
                "cannot change mode on a running stream",
            )));
        }
        self.shared.lock().mode = mode;
        Ok(())
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.shared.lock().callback = Some(callback);
    }

    fn clear_frame_callback(&mut self) {
        self.shared.lock().callback = None;
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (mode, mirror) = {
            let state = self.shared.lock();
            (state.mode, state.mirror)
        };
        if mode.fps == 0 || mode.width == 0 || mode.height == 0 {
            return Err(SensorError::StreamStart {
                kind: self.kind,
                reason: format!(
                    "invalid mode {}x{} @ {} fps",
                    mode.width, mode.height, mode.fps
                ),
            });
        }
        let period = Duration::from_micros(1_000_000 / mode.fps as u64);
        let (cmd_tx, cmd_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let kind = self.kind;
        let depth_range = (self.depth_min, self.depth_max);
        let handle = std::thread::Builder::new()
            .name(format!("rustni-sim-{}", kind))
            .spawn(move || {
                let mut producer = Producer {
                    shared,
                    kind,
                    mode,
                    mirror,
                    depth_range,
                    period,
                    sequence: 0,
                    scratch16: Vec::new(),
                    scratch8: Vec::new(),
                };
                loop {
                    match cmd_rx.recv_timeout(period) {
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => producer.tick(),
                    }
                }
            })
            .map_err(SensorError::Io)?;

        tracing::debug!(
            target: "rustni::sim",
            "{} stream started: {}x{} @ {} fps",
            self.kind, mode.width, mode.height, mode.fps
        );
        self.worker = Some(Worker { cmd_tx, handle });
        Ok(())
    }

    fn stop(&mut self) {
        // 阻塞到工作线程退出为止，之后保证没有回调在途
        if let Some(worker) = self.worker.take() {
            let _ = worker.cmd_tx.send(Command::Stop);
            let _ = worker.handle.join();
            tracing::debug!(target: "rustni::sim", "{} stream stopped", self.kind);
        }
    }

    fn set_mirror(&mut self, mirror: bool) -> Result<()> {
        self.shared.lock().mirror = mirror;
        Ok(())
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 工作线程侧的帧生产者
struct Producer {
    shared: Arc<Shared>,
    kind: StreamKind,
    mode: VideoMode,
    mirror: bool,
    depth_range: (u16, u16),
    period: Duration,
    sequence: u64,
    scratch16: Vec<u16>,
    scratch8: Vec<u8>,
}

impl Producer {
    /// 合成一帧并交付给注册的回调
    fn tick(&mut self) {
        self.sequence += 1;
        let (width, height) = (self.mode.width as usize, self.mode.height as usize);
        let (data, stride, min_sample, max_sample): (&[u8], usize, u16, u16) = match self.kind {
            StreamKind::Depth => {
                let (min, max) = self.depth_range;
                synth_depth(
                    &mut self.scratch16,
                    width,
                    height,
                    min,
                    max,
                    self.sequence,
                    self.mirror,
                );
                (bytemuck::cast_slice(&self.scratch16), width * 2, min, max)
            }
            StreamKind::Color => {
                synth_color(&mut self.scratch8, width, height, self.sequence, self.mirror);
                (&self.scratch8, width * 3, 0, 255)
            }
            StreamKind::Infrared => {
                synth_ir(&mut self.scratch16, width, height, self.sequence, self.mirror);
                (bytemuck::cast_slice(&self.scratch16), width * 2, 0, 1023)
            }
        };

        let mut state = self.shared.lock();
        if let Some(callback) = state.callback.as_mut() {
            callback(RawFrame {
                data,
                width: self.mode.width,
                height: self.mode.height,
                stride,
                format: self.mode.format,
                sequence: self.sequence,
                timestamp_us: self.sequence * self.period.as_micros() as u64,
                min_sample,
                max_sample,
            });
        }
    }
}

/// 确定性深度图样：对角渐变随帧号滚动，x % 16 == 0 处留零值带
/// ("无数据")。非带样本落在 (min, max] 内，永不为 0。
fn synth_depth(
    dst: &mut Vec<u16>,
    width: usize,
    height: usize,
    min: u16,
    max: u16,
    sequence: u64,
    mirror: bool,
) {
    let range = max.saturating_sub(min).max(1) as u64;
    dst.clear();
    dst.reserve(width * height);
    for y in 0..height {
        for x in 0..width {
            let xx = if mirror { width - 1 - x } else { x };
            let value = if xx % 16 == 0 {
                0
            } else {
                let phase = (xx as u64 * 3 + y as u64 * 5 + sequence * 7) % range;
                min + 1 + phase as u16
            };
            dst.push(value);
        }
    }
}

/// 确定性彩色图样：R/G 编码坐标，B 编码帧号
fn synth_color(dst: &mut Vec<u8>, width: usize, height: usize, sequence: u64, mirror: bool) {
    dst.clear();
    dst.reserve(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let xx = if mirror { width - 1 - x } else { x };
            dst.push(xx as u8);
            dst.push(y as u8);
            dst.push(sequence as u8);
        }
    }
}

/// 确定性红外图样：10-bit 量程内滚动
fn synth_ir(dst: &mut Vec<u16>, width: usize, height: usize, sequence: u64, mirror: bool) {
    dst.clear();
    dst.reserve(width * height);
    for y in 0..height {
        for x in 0..width {
            let xx = if mirror { width - 1 - x } else { x };
            dst.push(((xx * y) as u64 + sequence) as u16 % 1024);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustni_core::pixel_format::FourCC;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fast_mode(format: FourCC) -> VideoMode {
        VideoMode {
            width: 32,
            height: 16,
            fps: 200,
            format: format.into(),
        }
    }

    #[test]
    fn delivers_frames_and_stop_quiesces() {
        let mut stream = SimStream::new(StreamKind::Depth, fast_mode(FourCC::Z16), 0, 10_000);
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        stream.set_frame_callback(Box::new(move |frame: RawFrame<'_>| {
            assert_eq!(frame.width, 32);
            assert_eq!(frame.height, 16);
            assert_eq!(frame.stride, 64);
            assert!(frame.format.is_depth());
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        stream.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        stream.stop();
        let delivered = count.load(Ordering::SeqCst);
        assert!(delivered > 0, "no frames delivered in 100ms at 200 fps");

        // stop 返回后不再有回调
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), delivered);
    }

    #[test]
    fn set_mode_rejected_while_running() {
        let mut stream = SimStream::new(StreamKind::Color, fast_mode(FourCC::RGB3), 0, 0);
        stream.start().unwrap();
        assert!(stream.set_mode(fast_mode(FourCC::RGB3)).is_err());
        stream.stop();
        assert!(stream.set_mode(fast_mode(FourCC::RGB3)).is_ok());
    }

    #[test]
    fn zero_fps_mode_fails_to_start() {
        let mut mode = fast_mode(FourCC::Z16);
        mode.fps = 0;
        let mut stream = SimStream::new(StreamKind::Depth, mode, 0, 10_000);
        assert!(matches!(
            stream.start(),
            Err(SensorError::StreamStart { .. })
        ));
    }

    #[test]
    fn depth_pattern_keeps_zero_band_and_stays_in_range() {
        let mut samples = Vec::new();
        synth_depth(&mut samples, 32, 4, 500, 600, 3, false);
        assert_eq!(samples.len(), 32 * 4);
        for y in 0..4 {
            let row = &samples[y * 32..][..32];
            assert_eq!(row[0], 0);
            assert_eq!(row[16], 0);
            for (x, &v) in row.iter().enumerate() {
                if x % 16 != 0 {
                    assert!(v > 500 && v <= 600, "sample {} out of range", v);
                }
            }
        }
    }

    #[test]
    fn mirror_flips_zero_band() {
        let mut samples = Vec::new();
        synth_depth(&mut samples, 32, 1, 0, 1000, 1, true);
        // x = 31 映射到 xx = 0 → 零值带
        assert_eq!(samples[31], 0);
        assert_ne!(samples[0], 0);
    }
}
