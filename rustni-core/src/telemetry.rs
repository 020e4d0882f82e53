use std::sync::atomic::{AtomicU64, Ordering};

/// 单路流的健康计数器
///
/// 由监听器在回调线程上累加，消费者线程随时读取快照。
/// 这些数据不随每一帧交付，只用于诊断。
#[derive(Debug, Default)]
pub struct StreamTelemetry {
    /// 成功处理并发布的帧数
    frames_published: AtomicU64,

    /// 被丢弃的帧数 (像素格式不符、几何不符、读取失败)
    frames_dropped: AtomicU64,
}

impl StreamTelemetry {
    pub fn record_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// 某一时刻的计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub frames_published: u64,
    pub frames_dropped: u64,
}
