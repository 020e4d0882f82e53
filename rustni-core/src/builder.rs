use crate::traits::VideoMode;

/// 采集会话配置
///
/// 默认开启深度和彩色流，红外关闭。模式覆盖为 None 时采用后端的
/// 默认模式。
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureConfig {
    pub depth_enabled: bool,
    pub color_enabled: bool,
    pub ir_enabled: bool,

    /// 各流的模式覆盖
    pub depth_mode: Option<VideoMode>,
    pub color_mode: Option<VideoMode>,
    pub ir_mode: Option<VideoMode>,

    /// 镜像输出
    pub mirror: bool,

    /// 深度图对齐到彩色视点
    pub depth_color_registration: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self {
            depth_enabled: true,
            color_enabled: true,
            ir_enabled: false,
            depth_mode: None,
            color_mode: None,
            ir_mode: None,
            mirror: false,
            depth_color_registration: false,
        }
    }

    pub fn enable_depth(mut self, enable: bool) -> Self {
        self.depth_enabled = enable;
        self
    }

    pub fn enable_color(mut self, enable: bool) -> Self {
        self.color_enabled = enable;
        self
    }

    pub fn enable_ir(mut self, enable: bool) -> Self {
        self.ir_enabled = enable;
        self
    }

    /// 深度流模式覆盖
    pub fn depth_mode(mut self, mode: VideoMode) -> Self {
        self.depth_mode = Some(mode);
        self
    }

    /// 彩色流模式覆盖
    pub fn color_mode(mut self, mode: VideoMode) -> Self {
        self.color_mode = Some(mode);
        self
    }

    /// 红外流模式覆盖
    pub fn ir_mode(mut self, mode: VideoMode) -> Self {
        self.ir_mode = Some(mode);
        self
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn depth_color_registration(mut self, enable: bool) -> Self {
        self.depth_color_registration = enable;
        self
    }

    /// 导出配置快照 (用于持久化)
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| std::io::Error::other(e).into())
    }

    /// 从持久化快照恢复配置
    #[cfg(feature = "serialize")]
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json).map_err(|e| std::io::Error::other(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_typical_session() {
        let config = CaptureConfig::new();
        assert!(config.depth_enabled);
        assert!(config.color_enabled);
        assert!(!config.ir_enabled);
        assert!(!config.mirror);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn json_round_trip_keeps_mode_override() {
        use crate::pixel_format::FourCC;

        let config = CaptureConfig::new()
            .enable_ir(true)
            .depth_mode(VideoMode {
                width: 640,
                height: 480,
                fps: 30,
                format: FourCC::Z16.into(),
            })
            .mirror(true);

        let json = config.to_json().unwrap();
        let restored = CaptureConfig::from_json(&json).unwrap();
        assert_eq!(restored.depth_mode, config.depth_mode);
        assert!(restored.ir_enabled);
        assert!(restored.mirror);
    }
}
