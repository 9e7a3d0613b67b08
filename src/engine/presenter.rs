//! ### English
//! Owner-thread bundle: compositor backend, task queue and the selected renderer.
//!
//! ### 中文
//! 属主线程上的组合对象：合成器 backend、任务队列以及选定的渲染器。

use std::sync::Arc;

use dpi::PhysicalSize;
use tracing::{debug, info, trace};

use crate::engine::config::{PresenterConfig, RendererKind};
use crate::engine::dispatch::{OwnerTaskQueue, Waker};
use crate::engine::error::PresentError;
use crate::engine::fence::ScopedFd;
use crate::engine::platform::{self, BufferHandle, SurfaceControlBackend, WindowHandle};
use crate::engine::renderer::{
    Renderer, RendererASurfaceTransaction, RendererSurfaceControl, ViewBackend,
};
use crate::engine::surface::ExportedBuffer;

/// ### English
/// Frame presenter for one view.
///
/// Not thread-safe by contract: every method must be called from the owner thread, which must
/// also call [`Presenter::tick`] whenever the waker fires.
///
/// ### 中文
/// 单个 view 的帧呈现器。
///
/// 按约定非线程安全：所有方法都必须在属主线程调用；waker 触发时，属主线程还需调用
/// [`Presenter::tick`]。
pub struct Presenter {
    /// ### English
    /// Declared first so it drops before the queue it posts to.
    ///
    /// ### 中文
    /// 最先声明，使其先于其投递目标队列被 drop。
    renderer: Box<dyn Renderer>,
    kind: RendererKind,
    backend: Arc<dyn SurfaceControlBackend>,
    queue: OwnerTaskQueue,
}

impl Presenter {
    /// ### English
    /// Picks the renderer for `backend`'s capabilities and wires it to `producer`.
    /// `waker` is called whenever a compositor callback was relayed and `tick` should run.
    ///
    /// ### 中文
    /// 根据 `backend` 的能力选择渲染器，并将其连接到 `producer`。
    /// 每当有合成器回调被转投、需要执行 `tick` 时调用 `waker`。
    pub fn new(
        config: PresenterConfig,
        backend: Arc<dyn SurfaceControlBackend>,
        producer: Arc<dyn ViewBackend>,
        waker: Option<Waker>,
    ) -> Result<Self, PresentError> {
        let queue = OwnerTaskQueue::new(waker);
        let capabilities = backend.capabilities();
        let kind = config.select_renderer(capabilities);
        info!(?kind, ?capabilities, size = ?config.initial_size, "creating presenter");

        let renderer: Box<dyn Renderer> = match kind {
            RendererKind::SurfaceControl => Box::new(RendererSurfaceControl::new(
                backend.clone(),
                queue.sender(),
                producer,
                &config,
            )),
            RendererKind::TransactionOnly => Box::new(RendererASurfaceTransaction::new(
                backend.clone(),
                queue.sender(),
                producer,
                &config,
            )),
        };

        Ok(Self {
            renderer,
            kind,
            backend,
            queue,
        })
    }

    /// ### English
    /// Same as [`Presenter::new`] with the platform's compositor backend.
    ///
    /// Fails with [`PresentError::Unsupported`] where surface control is unavailable.
    ///
    /// ### 中文
    /// 与 [`Presenter::new`] 相同，但使用当前平台的合成器 backend。
    ///
    /// 在不支持 surface control 的平台上返回 [`PresentError::Unsupported`]。
    pub fn with_platform_backend(
        config: PresenterConfig,
        producer: Arc<dyn ViewBackend>,
        waker: Option<Waker>,
    ) -> Result<Self, PresentError> {
        let backend = platform::load_default_backend()?;
        Self::new(config, backend, producer, waker)
    }

    pub fn renderer_kind(&self) -> RendererKind {
        self.kind
    }

    /// ### English
    /// Size of the window surface in physical pixels.
    ///
    /// ### 中文
    /// 窗口 surface 的尺寸（物理像素）。
    pub fn size(&self) -> PhysicalSize<u32> {
        self.renderer.size()
    }

    pub fn width(&self) -> u32 {
        self.renderer.width()
    }

    pub fn height(&self) -> u32 {
        self.renderer.height()
    }

    /// ### English
    /// Runs compositor callbacks relayed to the owner thread. Returns how many ran.
    ///
    /// ### 中文
    /// 执行已转投到属主线程的合成器回调，返回执行数量。
    pub fn tick(&self) -> usize {
        self.queue.tick()
    }

    /// ### English
    /// Window-system events, forwarded to the renderer.
    ///
    /// ### 中文
    /// 窗口系统事件，转发给渲染器。
    pub fn surface_created(&self, window: WindowHandle) {
        debug!(?window, "surface created");
        self.renderer.on_surface_created(window);
    }

    pub fn surface_changed(&self, format: i32, width: u32, height: u32) {
        debug!(format, width, height, "surface changed");
        self.renderer.on_surface_changed(format, width, height);
    }

    pub fn surface_redraw_needed(&self) {
        self.renderer.on_surface_redraw_needed();
    }

    pub fn surface_destroyed(&self) {
        debug!("surface destroyed");
        self.renderer.on_surface_destroyed();
    }

    /// ### English
    /// Wraps the producer's native buffer and hands it to the renderer.
    ///
    /// ### 中文
    /// 包装生产者的原生 buffer 并交给渲染器。
    pub fn commit_buffer(
        &self,
        buffer: BufferHandle,
        pool_id: u32,
        buffer_id: u32,
        fence: Option<ScopedFd>,
    ) {
        let buffer = ExportedBuffer::new(self.backend.clone(), buffer, pool_id, buffer_id);
        trace!(
            pool_id,
            buffer_id,
            width = buffer.width(),
            height = buffer.height(),
            has_fence = fence.is_some(),
            "commit buffer"
        );
        self.renderer.commit_buffer(buffer, fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::engine::flags;
    use crate::engine::platform::{PlatformCapabilities, SurfaceStats};
    use crate::engine::testing::{AppliedOp, FakeBackend, FakeProducer};

    fn presenter(backend: &Arc<FakeBackend>, presenter_flags: u32) -> (Presenter, Arc<FakeProducer>) {
        let producer = FakeProducer::new();
        let presenter = Presenter::new(
            PresenterConfig::from_flags(presenter_flags, 64, 32),
            backend.clone(),
            producer.clone(),
            None,
        )
        .unwrap();
        (presenter, producer)
    }

    #[test]
    fn selects_renderer_from_capabilities() {
        let (p, _) = presenter(&FakeBackend::new(), 0);
        assert_eq!(p.renderer_kind(), RendererKind::SurfaceControl);

        let legacy = FakeBackend::with_capabilities(PlatformCapabilities::default());
        let (p, _) = presenter(&legacy, 0);
        assert_eq!(p.renderer_kind(), RendererKind::TransactionOnly);

        let (p, _) = presenter(
            &FakeBackend::new(),
            flags::WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY,
        );
        assert_eq!(p.renderer_kind(), RendererKind::TransactionOnly);
    }

    #[test]
    fn commit_flows_through_to_producer() {
        let backend = FakeBackend::new();
        let (p, producer) = presenter(&backend, 0);
        assert_eq!(p.size(), PhysicalSize::new(64, 32));

        p.surface_created(backend.window());
        p.surface_changed(1, 128, 64);
        assert_eq!(p.size(), PhysicalSize::new(128, 64));
        assert_eq!((p.width(), p.height()), (128, 64));

        let first = backend.new_buffer(128, 64);
        let second = backend.new_buffer(128, 64);
        p.commit_buffer(first, 0, 1, None);
        backend.fire_commit(0);
        assert_eq!(producer.frames_completed(), 0);
        assert_eq!(p.tick(), 1);
        assert_eq!(producer.frames_completed(), 1);

        p.commit_buffer(second, 0, 2, None);
        backend.fire_commit(1);
        let AppliedOp::Visibility(surface, _) = backend.applied_ops(1)[0] else {
            panic!("expected visibility op first");
        };
        backend.fire_complete(
            1,
            vec![SurfaceStats {
                surface,
                release_fence: None,
            }],
        );
        p.tick();
        assert_eq!(producer.released(), vec![first]);
    }

    #[test]
    fn waker_fires_for_relayed_callbacks() {
        let backend = FakeBackend::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let p = Presenter::new(
            PresenterConfig::default(),
            backend.clone(),
            FakeProducer::new(),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

        p.surface_created(backend.window());
        p.commit_buffer(backend.new_buffer(1, 1), 0, 0, None);
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
        backend.fire_commit(0);
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        p.tick();
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn platform_backend_unsupported_off_android() {
        let result = Presenter::with_platform_backend(
            PresenterConfig::default(),
            FakeProducer::new(),
            None,
        );
        assert!(matches!(result, Err(PresentError::Unsupported)));
    }
}
