//! ### English
//! Renderer contract and its two compositor-backed implementations.
//!
//! Every method runs on the owner thread. Producer notifications are collected while the
//! renderer state is locked and dispatched after the lock is dropped, so a producer may call
//! back into the presenter from inside `release_buffer` or `frame_complete`.
//!
//! ### 中文
//! 渲染器契约及其两种基于合成器的实现。
//!
//! 所有方法都在属主线程执行。生产者通知在持有渲染器状态锁时收集，并在释放锁之后派发，
//! 因此生产者可以在 `release_buffer` 或 `frame_complete` 内部回调 presenter。

mod surface_control;
mod transaction_only;

use std::sync::Arc;

use dpi::PhysicalSize;
use tracing::trace;

use crate::engine::fence::ScopedFd;
use crate::engine::platform::WindowHandle;
use crate::engine::surface::ExportedBuffer;

pub use surface_control::RendererSurfaceControl;
pub use transaction_only::RendererASurfaceTransaction;

/// ### English
/// The producer side of the pipeline (the view backend that rendered the buffers).
///
/// ### 中文
/// 管线的生产者一侧（渲染这些 buffer 的 view backend）。
pub trait ViewBackend: Send + Sync {
    /// ### English
    /// `buffer` may be reused. `release_fence`, when present, signals once the compositor
    /// stopped reading it; ownership of the fence passes to the callee.
    ///
    /// ### 中文
    /// `buffer` 可以被复用。`release_fence`（若有）在合成器停止读取后 signal；
    /// fence 的所有权转交给被调用方。
    fn release_buffer(&self, buffer: &ExportedBuffer, release_fence: Option<ScopedFd>);

    /// ### English
    /// The producer may start rendering its next frame.
    ///
    /// ### 中文
    /// 生产者可以开始渲染下一帧。
    fn frame_complete(&self);
}

/// ### English
/// Presentation contract shared by every renderer variant.
///
/// ### 中文
/// 所有渲染器变体共享的呈现契约。
pub trait Renderer: Send {
    fn size(&self) -> PhysicalSize<u32>;

    fn width(&self) -> u32 {
        self.size().width
    }

    fn height(&self) -> u32 {
        self.size().height
    }

    fn on_surface_created(&self, window: WindowHandle);

    fn on_surface_changed(&self, format: i32, width: u32, height: u32);

    fn on_surface_redraw_needed(&self);

    fn on_surface_destroyed(&self);

    /// ### English
    /// Takes a freshly rendered buffer; the compositor waits on `fence` before reading it.
    ///
    /// ### 中文
    /// 接收一块刚渲染完成的 buffer；合成器在读取前会等待 `fence`。
    fn commit_buffer(&self, buffer: Arc<ExportedBuffer>, fence: Option<ScopedFd>);
}

/// ### English
/// Notification owed to the producer, deferred until the renderer state is unlocked.
///
/// ### 中文
/// 欠生产者的通知，推迟到渲染器状态解锁后发送。
pub(crate) enum ProducerEvent {
    Release(Arc<ExportedBuffer>),
    FrameComplete,
}

/// ### English
/// Delivers `events` in order. A buffer is released at most once, whichever path reaches it first.
///
/// ### 中文
/// 按顺序派发 `events`。每块 buffer 至多被释放一次，以先到达的路径为准。
pub(crate) fn dispatch_producer_events(producer: &dyn ViewBackend, events: Vec<ProducerEvent>) {
    for event in events {
        match event {
            ProducerEvent::Release(buffer) => {
                if buffer.mark_returned() {
                    trace!(
                        pool_id = buffer.pool_id(),
                        buffer_id = buffer.buffer_id(),
                        "release buffer"
                    );
                    producer.release_buffer(&buffer, buffer.take_release_fence());
                }
            }
            ProducerEvent::FrameComplete => producer.frame_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeBackend, FakeProducer};

    #[test]
    fn buffer_is_released_once() {
        let backend = FakeBackend::new();
        let producer = FakeProducer::new();
        let buffer = ExportedBuffer::new(backend.clone(), backend.new_buffer(2, 2), 0, 0);

        dispatch_producer_events(
            producer.as_ref(),
            vec![
                ProducerEvent::Release(buffer.clone()),
                ProducerEvent::FrameComplete,
                ProducerEvent::Release(buffer.clone()),
            ],
        );
        assert_eq!(producer.released(), vec![buffer.handle()]);
        assert_eq!(producer.frames_completed(), 1);
    }
}
