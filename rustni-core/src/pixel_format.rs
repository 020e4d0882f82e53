use std::fmt::{self, Display};

/// 四字符代码 (Four Character Code)，视频工业标准
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// 常用像素格式定义
impl FourCC {
    // --- Depth Formats ---
    /// 16-bit 深度，1mm 单位 (Z16)
    pub const Z16: Self = Self::new(b'Z', b'1', b'6', b' ');
    /// 16-bit 深度，100µm 单位
    /// 没有工业标准编码，这里沿用部分深度相机固件的私有定义
    pub const Z100: Self = Self::new(b'Z', b'1', b'0', b'0');

    // --- Color Formats ---
    /// RGB24 (R-G-B 顺序)
    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');
    /// YUYV 4:2:2 - 部分传感器的原始彩色输出，本库不做解码
    pub const YUYV: Self = Self::new(b'Y', b'U', b'Y', b'V');

    // --- Infrared / Gray Formats ---
    /// 8-bit 灰度
    pub const GREY: Self = Self::new(b'G', b'R', b'E', b'Y');
    /// 16-bit 灰度 (红外原始数据，通常只有低 10 位有效)
    pub const Y16: Self = Self::new(b'Y', b'1', b'6', b' ');
}

/// 像素格式的高级枚举，包含元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    /// 已知的标准格式
    Known(FourCC),
    /// 驱动返回了库不认识的私有格式
    Unknown(u32),
}

impl PixelFormat {
    /// 判断是否为深度格式
    pub fn is_depth(&self) -> bool {
        match self {
            Self::Known(cc) => matches!(*cc, FourCC::Z16 | FourCC::Z100),
            _ => false,
        }
    }

    /// 深度样本的物理单位 (微米)，非深度格式返回 None
    pub fn depth_unit_um(&self) -> Option<u32> {
        match self {
            Self::Known(cc) => match *cc {
                FourCC::Z16 => Some(1000),
                FourCC::Z100 => Some(100),
                _ => None,
            },
            _ => None,
        }
    }

    /// 估算每像素比特数 (Bits Per Pixel)，用于计算行宽
    pub fn bpp_estimate(&self) -> u32 {
        match self {
            Self::Known(cc) => match *cc {
                FourCC::Z16 | FourCC::Z100 | FourCC::Y16 | FourCC::YUYV => 16,
                FourCC::RGB3 => 24,
                FourCC::GREY => 8,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// 每像素字节数，未知格式返回 0
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bpp_estimate() / 8) as usize
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(cc) => write!(f, "{}", cc),
            Self::Unknown(val) => write!(f, "unknown(0x{:08x})", val),
        }
    }
}

impl From<u32> for PixelFormat {
    fn from(val: u32) -> Self {
        Self::Known(FourCC(val))
    }
}

impl From<FourCC> for PixelFormat {
    fn from(cc: FourCC) -> Self {
        Self::Known(cc)
    }
}

impl PartialEq<PixelFormat> for FourCC {
    fn eq(&self, other: &PixelFormat) -> bool {
        match other {
            PixelFormat::Known(cc) => self == cc,
            PixelFormat::Unknown(val) => self.0 == *val,
        }
    }
}

// 反向比较也加上
impl PartialEq<FourCC> for PixelFormat {
    fn eq(&self, other: &FourCC) -> bool {
        match self {
            PixelFormat::Known(cc) => cc == other,
            PixelFormat::Unknown(val) => *val == other.0,
        }
    }
}
