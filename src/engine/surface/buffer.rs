use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dpi::PhysicalSize;

use crate::engine::fence::{Fence, FenceStatus, ScopedFd};
use crate::engine::platform::{BufferHandle, SurfaceControlBackend};

/// ### English
/// One producer buffer exported to the pipeline.
///
/// Construction takes a platform reference on the native buffer and `Drop` gives it back, so
/// the handle stays valid for as long as any `Arc` clone is alive (front buffer, pending slot,
/// transaction resource table, release queue).
///
/// Returning the buffer to its producer is a separate, explicit step ([`ExportedBuffer::mark_returned`]).
///
/// ### 中文
/// 导出到管线的一块生产者 buffer。
///
/// 构造时对原生 buffer 加一次平台引用，`Drop` 时归还，因此只要任一 `Arc` 克隆仍存活
/// （front buffer、pending 槽、事务资源表、释放队列），句柄都保持有效。
///
/// 将 buffer 交还给生产者是独立且显式的一步（[`ExportedBuffer::mark_returned`]）。
pub struct ExportedBuffer {
    backend: Arc<dyn SurfaceControlBackend>,
    handle: BufferHandle,
    pool_id: u32,
    buffer_id: u32,
    size: PhysicalSize<u32>,
    release_fence: Mutex<Option<ScopedFd>>,
    returned: AtomicBool,
}

impl ExportedBuffer {
    pub fn new(
        backend: Arc<dyn SurfaceControlBackend>,
        handle: BufferHandle,
        pool_id: u32,
        buffer_id: u32,
    ) -> Arc<Self> {
        backend.acquire_buffer(handle);
        let size = backend.describe_buffer(handle);
        Arc::new(Self {
            backend,
            handle,
            pool_id,
            buffer_id,
            size,
            release_fence: Mutex::new(None),
            returned: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    #[inline]
    pub fn pool_id(&self) -> u32 {
        self.pool_id
    }

    #[inline]
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// ### English
    /// Stores the compositor's release fence, replacing (and closing) any previous one.
    ///
    /// ### 中文
    /// 保存合成器给出的 release fence，替换（并关闭）之前的 fence。
    pub fn set_release_fence(&self, fence: Option<ScopedFd>) {
        *self.release_fence.lock().unwrap_or_else(PoisonError::into_inner) = fence;
    }

    pub fn take_release_fence(&self) -> Option<ScopedFd> {
        self.release_fence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// ### English
    /// Signal state of the stored release fence; `Invalid` when there is none.
    ///
    /// ### 中文
    /// 已保存 release fence 的 signal 状态；没有 fence 时为 `Invalid`。
    pub fn release_fence_status(&self) -> FenceStatus {
        let fence = self.release_fence.lock().unwrap_or_else(PoisonError::into_inner);
        Fence::status_of(fence.as_ref())
    }

    /// ### English
    /// Flags the buffer as handed back to its producer. Returns `true` only for the first call.
    ///
    /// ### 中文
    /// 将 buffer 标记为已交还生产者。仅第一次调用返回 `true`。
    pub fn mark_returned(&self) -> bool {
        !self.returned.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for ExportedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedBuffer")
            .field("handle", &self.handle)
            .field("pool_id", &self.pool_id)
            .field("buffer_id", &self.buffer_id)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Drop for ExportedBuffer {
    fn drop(&mut self) {
        self.backend.release_buffer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeBackend, pipe_fence, signal};

    #[test]
    fn holds_one_platform_reference_while_alive() {
        let backend = FakeBackend::new();
        let handle = backend.new_buffer(640, 480);
        let buffer = ExportedBuffer::new(backend.clone(), handle, 7, 3);
        assert_eq!(backend.buffer_refs(handle), 1);
        assert_eq!((buffer.width(), buffer.height()), (640, 480));
        assert_eq!((buffer.pool_id(), buffer.buffer_id()), (7, 3));

        let clone = buffer.clone();
        drop(buffer);
        assert_eq!(backend.buffer_refs(handle), 1);
        drop(clone);
        assert_eq!(backend.buffer_refs(handle), 0);
    }

    #[test]
    fn returned_only_once() {
        let backend = FakeBackend::new();
        let buffer = ExportedBuffer::new(backend.clone(), backend.new_buffer(1, 1), 0, 0);
        assert!(buffer.mark_returned());
        assert!(!buffer.mark_returned());
        assert!(!buffer.mark_returned());
    }

    #[test]
    fn release_fence_status_follows_fence() {
        let backend = FakeBackend::new();
        let buffer = ExportedBuffer::new(backend.clone(), backend.new_buffer(1, 1), 0, 0);
        assert_eq!(buffer.release_fence_status(), FenceStatus::Invalid);

        let (fence, writer) = pipe_fence();
        buffer.set_release_fence(Some(fence));
        assert_eq!(buffer.release_fence_status(), FenceStatus::NotSignaled);
        signal(&writer);
        assert_eq!(buffer.release_fence_status(), FenceStatus::Signaled);

        assert!(buffer.take_release_fence().is_some());
        assert_eq!(buffer.release_fence_status(), FenceStatus::Invalid);
    }
}
