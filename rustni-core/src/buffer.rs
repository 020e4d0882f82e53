//! 单路流的帧缓冲池
//!
//! 生产者 (后端回调线程) 持续覆盖"最新帧"，任意多个消费者同时继续
//! 读取仍被引用的旧帧，两侧互不阻塞也不撕裂。缓冲在池的生命周期内
//! 只回收不释放，总量只增不减。

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};

/// 缓冲样本类型：u8 (彩色/灰度) 或 u16 (深度/红外原始值)
pub trait Sample: Pod + Send + Sync {}
impl<T: Pod + Send + Sync> Sample for T {}

/// 池内缓冲的稳定标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferIndex(usize);

struct Slot<T> {
    data: Arc<[T]>,
    /// 引用计数，0 表示空闲可回收
    refs: usize,
}

struct PoolInner<T> {
    slots: Vec<Slot<T>>,
    /// 当前"最新完整帧"。第一帧发布前为 None
    active: Option<usize>,
}

/// 固定容量缓冲的引用计数池
///
/// 每个池自带一把非递归锁，所有公开操作恰好加锁一次。
/// 生产侧约定的调用顺序 (每帧一轮):
/// `deref_active` → `acquire_free` → `fill` → `publish`；
/// 消费侧随时 `retain_active`，句柄析构时自动释放。
pub struct BufferPool<T> {
    inner: Mutex<PoolInner<T>>,
    /// 每个缓冲的样本数，构造时确定
    allocation_size: usize,
}

impl<T> fmt::Debug for BufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("BufferPool")
            .field("allocation_size", &self.allocation_size)
            .field("buffers", &inner.slots.len())
            .field("active", &inner.active)
            .finish()
    }
}

impl<T: Sample> BufferPool<T> {
    pub fn new(allocation_size: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: Vec::new(),
                active: None,
            }),
            allocation_size,
        }
    }

    /// 每个缓冲的样本数
    pub fn allocation_size(&self) -> usize {
        self.allocation_size
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<T>> {
        // 某个回调线程带锁 panic 不应拖垮整个会话
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 取一个空闲缓冲供写入，引用计数置 1。
    ///
    /// 活动缓冲永远不会被取出，即使它的计数在交接瞬间为 0。
    /// 没有空闲缓冲时扩池。
    pub fn acquire_free(&self) -> BufferIndex {
        let mut inner = self.lock();
        let active = inner.active;
        let free = inner
            .slots
            .iter()
            .enumerate()
            .position(|(i, slot)| {
                slot.refs == 0 && Some(i) != active && Arc::strong_count(&slot.data) == 1
            });
        if let Some(i) = free {
            inner.slots[i].refs = 1;
            return BufferIndex(i);
        }
        // 没有空闲缓冲 - 分配一个新的
        let data: Arc<[T]> = vec![T::zeroed(); self.allocation_size].into();
        inner.slots.push(Slot { data, refs: 1 });
        tracing::trace!(
            target: "rustni::pool",
            "pool grew to {} buffers ({} samples each)",
            inner.slots.len(),
            self.allocation_size
        );
        BufferIndex(inner.slots.len() - 1)
    }

    /// 在锁内对已取得的缓冲执行写入
    ///
    /// 缓冲必须由 `acquire_free` 独占持有 (计数 1，且不是活动缓冲)，
    /// 违反约定按致命错误处理。
    pub fn fill<R>(&self, index: BufferIndex, write: impl FnOnce(&mut [T]) -> R) -> R {
        let mut inner = self.lock();
        debug_assert_ne!(inner.active, Some(index.0), "filling the active buffer");
        let slot = &mut inner.slots[index.0];
        debug_assert_eq!(slot.refs, 1, "filling a buffer that is not exclusively held");
        // refs == 1 且无句柄在外时 Arc 必然独占
        let data = Arc::get_mut(&mut slot.data).expect("buffer has outstanding readers");
        write(data)
    }

    /// 把缓冲发布为新的活动缓冲。
    ///
    /// 不改动引用计数：调用方已经通过 `acquire_free` 持有计数 1，
    /// 并应事先对上一个活动缓冲调用过 `deref_active`。
    pub fn publish(&self, index: BufferIndex) {
        let mut inner = self.lock();
        debug_assert!(inner.slots[index.0].refs >= 1, "publishing a free buffer");
        inner.active = Some(index.0);
    }

    /// 生产者释放对即将过期帧的持有。第一帧发布前是空操作。
    pub fn deref_active(&self) {
        let mut inner = self.lock();
        if let Some(i) = inner.active {
            let slot = &mut inner.slots[i];
            assert!(slot.refs > 0, "active buffer released more times than retained");
            slot.refs -= 1;
        }
    }

    /// 消费者取一个带计数的"当前最新帧"引用。
    /// 第一帧发布前返回 None。
    pub fn retain_active(self: &Arc<Self>) -> Option<BufferRef<T>> {
        let mut inner = self.lock();
        let index = inner.active?;
        let slot = &mut inner.slots[index];
        slot.refs += 1;
        Some(BufferRef {
            data: Some(Arc::clone(&slot.data)),
            pool: Arc::clone(self),
            index: BufferIndex(index),
        })
    }

    /// BufferRef 析构时调用。数据克隆被带回锁内销毁，
    /// 保证计数为 0 的缓冲必然没有在外的读者。
    fn release(&self, index: BufferIndex, data: Arc<[T]>) {
        let mut inner = self.lock();
        let slot = &mut inner.slots[index.0];
        assert!(slot.refs > 0, "buffer released more times than retained");
        slot.refs -= 1;
        drop(data);
    }

    // --- 诊断接口 (测试与遥测) ---

    /// 已分配的缓冲总数 (只增不减)
    pub fn buffer_count(&self) -> usize {
        self.lock().slots.len()
    }

    /// 指定缓冲的当前引用计数
    pub fn ref_count(&self, index: BufferIndex) -> usize {
        self.lock().slots[index.0].refs
    }

    /// 当前活动缓冲
    pub fn active_index(&self) -> Option<BufferIndex> {
        self.lock().active.map(BufferIndex)
    }
}

/// 对池内单个缓冲的带计数只读引用
///
/// 析构时恰好释放一次 (所有退出路径，包括 panic 展开)；
/// 持有 `Arc<BufferPool>`，保证池活得比引用久。
pub struct BufferRef<T: Sample> {
    /// Some 直到析构
    data: Option<Arc<[T]>>,
    pool: Arc<BufferPool<T>>,
    index: BufferIndex,
}

impl<T: Sample> BufferRef<T> {
    pub fn index(&self) -> BufferIndex {
        self.index
    }

    pub fn pool(&self) -> &Arc<BufferPool<T>> {
        &self.pool
    }
}

impl<T: Sample> Deref for BufferRef<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_deref().expect("buffer reference already released")
    }
}

impl<T: Sample> Clone for BufferRef<T> {
    fn clone(&self) -> Self {
        let mut inner = self.pool.lock();
        inner.slots[self.index.0].refs += 1;
        drop(inner);
        Self {
            data: self.data.clone(),
            pool: Arc::clone(&self.pool),
            index: self.index,
        }
    }
}

impl<T: Sample> Drop for BufferRef<T> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(self.index, data);
        }
    }
}

impl<T: Sample> fmt::Debug for BufferRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRef")
            .field("index", &self.index)
            .field("len", &self.deref().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> Arc<BufferPool<u16>> {
        Arc::new(BufferPool::new(n))
    }

    /// 发布一帧填充了 value 的缓冲，返回它的索引
    fn publish_frame(p: &Arc<BufferPool<u16>>, value: u16) -> BufferIndex {
        p.deref_active();
        let index = p.acquire_free();
        p.fill(index, |data| data.fill(value));
        p.publish(index);
        index
    }

    #[test]
    fn first_acquire_allocates_exactly_one() {
        let p = pool(16);
        assert_eq!(p.buffer_count(), 0);
        let index = p.acquire_free();
        assert_eq!(p.buffer_count(), 1);
        assert_eq!(p.ref_count(index), 1);
    }

    #[test]
    fn retain_before_first_publish_returns_none() {
        let p = pool(16);
        assert!(p.retain_active().is_none());
        // 已取得但尚未发布的缓冲同样不可见
        let _index = p.acquire_free();
        assert!(p.retain_active().is_none());
    }

    #[test]
    fn retain_release_round_trip() {
        let p = pool(16);
        let index = publish_frame(&p, 7);

        let handles: Vec<_> = (0..3).map(|_| p.retain_active().unwrap()).collect();
        assert_eq!(p.ref_count(index), 4);
        for h in &handles {
            assert_eq!(h[0], 7);
        }

        drop(handles);
        assert_eq!(p.ref_count(index), 1);
        assert_eq!(p.active_index(), Some(index));
    }

    #[test]
    fn cloned_reference_counts_separately() {
        let p = pool(16);
        let index = publish_frame(&p, 1);

        let a = p.retain_active().unwrap();
        let b = a.clone();
        assert_eq!(p.ref_count(index), 3);
        drop(a);
        assert_eq!(p.ref_count(index), 2);
        drop(b);
        assert_eq!(p.ref_count(index), 1);
    }

    #[test]
    fn active_buffer_never_recycled() {
        let p = pool(16);
        let first = publish_frame(&p, 1);

        // 下一帧开始：生产者先放手，活动缓冲计数瞬时归零
        p.deref_active();
        assert_eq!(p.ref_count(first), 0);
        let second = p.acquire_free();
        assert_ne!(first, second, "the active buffer must not be handed out");
        p.fill(second, |data| data.fill(2));
        p.publish(second);

        // first 不再活动且无人引用，第三帧回收它
        p.deref_active();
        let third = p.acquire_free();
        assert_eq!(third, first);
        assert_eq!(p.buffer_count(), 2);
    }

    #[test]
    fn consumer_handle_pins_old_frame_across_publishes() {
        let p = pool(8);
        publish_frame(&p, 10);
        let old = p.retain_active().unwrap();

        publish_frame(&p, 20);
        publish_frame(&p, 30);

        // 旧句柄看到的仍是当时的数据
        assert!(old.iter().all(|&v| v == 10));
        // 被句柄钉住的缓冲不可回收，池被迫扩到第三个
        assert_eq!(p.buffer_count(), 3);

        drop(old);
        // 释放后第四帧可以复用它，不再扩池
        publish_frame(&p, 40);
        assert_eq!(p.buffer_count(), 3);
    }

    #[test]
    #[should_panic(expected = "released more times than retained")]
    fn producer_over_release_asserts() {
        let p = pool(4);
        publish_frame(&p, 1);
        p.deref_active();
        p.deref_active();
    }

    #[test]
    fn concurrent_producer_and_consumers() {
        let p = pool(256);
        publish_frame(&p, 0);

        std::thread::scope(|scope| {
            let producer = {
                let p = &p;
                scope.spawn(move || {
                    for seq in 1..=200u16 {
                        publish_frame(p, seq);
                    }
                })
            };

            for _ in 0..2 {
                let p = &p;
                scope.spawn(move || {
                    for _ in 0..500 {
                        let frame = p.retain_active().unwrap();
                        // 同一缓冲内所有样本一致：读到撕裂的帧会在这里暴露
                        let first = frame[0];
                        assert!(frame.iter().all(|&v| v == first));
                    }
                });
            }

            producer.join().unwrap();
        });

        // 所有句柄释放后，活动缓冲计数回到生产者的那一份
        let active = p.active_index().unwrap();
        assert_eq!(p.ref_count(active), 1);
    }
}
