use std::ops::Deref;

use bytemuck::Pod;

use crate::buffer::{BufferRef, Sample};
use crate::pixel_format::PixelFormat;

/// 后端回调交付的原始帧视图
///
/// 数据借用后端内部缓冲，只在回调期间有效。行与行之间可能有
/// padding (stride > width * bpp)，按行访问。
#[derive(Debug)]
pub struct RawFrame<'a> {
    /// 原始图像数据
    pub data: &'a [u8],

    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    /// 跨距/步长 (Bytes per line)
    pub stride: usize,

    /// 像素格式
    pub format: PixelFormat,

    /// 帧序号 (用于丢帧统计)
    pub sequence: u64,

    /// 后端时间戳 (微秒)
    pub timestamp_us: u64,

    /// 本流样本的有效下界 (深度流：离传感器最近的可测值)
    pub min_sample: u16,

    /// 样本有效上界
    pub max_sample: u16,
}

impl<'a> RawFrame<'a> {
    /// 第 y 行的原始字节，不含行尾 padding。
    /// 几何参数与数据长度不符时返回 None。
    pub fn row_bytes(&self, y: u32) -> Option<&'a [u8]> {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        if len == 0 {
            return None;
        }
        self.data.get(start..start + len)
    }

    /// 把第 y 行重解释为样本切片。
    /// 越界或对齐不满足时返回 None。
    pub fn samples_row<T: Pod>(&self, y: u32) -> Option<&'a [T]> {
        let bytes = self.row_bytes(y)?;
        bytemuck::try_cast_slice(bytes).ok()
    }
}

/// 消费者回调期望的行序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

/// 帧数据的接收端 (纹理上传、图像编码器等)
pub trait ImageTarget<T> {
    /// 期望的行序，默认自上而下
    fn row_order(&self) -> RowOrder {
        RowOrder::TopDown
    }

    /// 是否要求水平翻转
    fn flip_horizontal(&self) -> bool {
        false
    }

    /// 接收第 y 行。y 是目标侧行号，样本已按要求排好
    fn set_row(&mut self, y: u32, row: &[T]);
}

/// 消费者持有的一帧只读视图
///
/// 尺寸在获取时刻快照。析构时对底层缓冲恰好释放一次引用
/// (所有退出路径，包括 `load` panic)；通过 Arc 保证缓冲池
/// 活得比句柄久，会话先行销毁也不影响读取。
#[derive(Debug)]
pub struct FrameHandle<T: Sample> {
    buf: BufferRef<T>,
    width: u32,
    height: u32,
    channels: u32,
}

impl<T: Sample> FrameHandle<T> {
    pub fn new(buf: BufferRef<T>, width: u32, height: u32, channels: u32) -> Self {
        debug_assert!(channels > 0);
        debug_assert!(buf.len() >= (width * height * channels) as usize);
        Self {
            buf,
            width,
            height,
            channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 每像素样本数 (深度/灰度 1，RGB 3)
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// 全部样本，行优先，无 padding
    pub fn data(&self) -> &[T] {
        &self.buf
    }

    /// 第 y 行的样本
    pub fn row(&self, y: u32) -> &[T] {
        let row_len = (self.width * self.channels) as usize;
        &self.buf[y as usize * row_len..][..row_len]
    }

    /// 按目标要求的行序和翻转逐行交付
    pub fn load(&self, target: &mut dyn ImageTarget<T>) {
        let mut scratch = Vec::new();
        for y in 0..self.height {
            let src_y = match target.row_order() {
                RowOrder::TopDown => y,
                RowOrder::BottomUp => self.height - 1 - y,
            };
            let row = self.row(src_y);
            if target.flip_horizontal() {
                scratch.clear();
                scratch.extend(
                    row.chunks_exact(self.channels as usize)
                        .rev()
                        .flatten()
                        .copied(),
                );
                target.set_row(y, &scratch);
            } else {
                target.set_row(y, row);
            }
        }
    }
}

impl<T: Sample> Deref for FrameHandle<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data()
    }
}
