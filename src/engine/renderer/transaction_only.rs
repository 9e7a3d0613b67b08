use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dpi::PhysicalSize;
use tracing::{debug, trace, warn};

use crate::engine::config::PresenterConfig;
use crate::engine::dispatch::OwnerTaskSender;
use crate::engine::fence::ScopedFd;
use crate::engine::platform::{SurfaceControlBackend, Visibility, WindowHandle};
use crate::engine::surface::{ExportedBuffer, Surface, Transaction};

use super::{ProducerEvent, Renderer, ViewBackend, dispatch_producer_events};

#[derive(Default)]
struct State {
    size: PhysicalSize<u32>,
    surface: Option<Arc<Surface>>,
    /// ### English
    /// Most recent buffer handed over by the producer.
    ///
    /// ### 中文
    /// 生产者最近交来的 buffer。
    exported: Option<Arc<ExportedBuffer>>,
    /// ### English
    /// Buffer of the last completed transaction, i.e. the one on screen.
    ///
    /// ### 中文
    /// 最近一次完成的事务所呈现的 buffer，即当前屏幕上的 buffer。
    locked: Option<Arc<ExportedBuffer>>,
    /// ### English
    /// Every export owes the producer one `frame_complete`.
    ///
    /// ### 中文
    /// 每次导出都欠生产者一次 `frame_complete`。
    frame_complete_owed: bool,
}

struct Inner {
    backend: Arc<dyn SurfaceControlBackend>,
    owner: OwnerTaskSender,
    producer: Arc<dyn ViewBackend>,
    surface_name: CString,
    state: Mutex<State>,
}

/// ### English
/// Single-slot renderer built on plain `ASurfaceTransaction` completion callbacks.
///
/// Every buffer is presented as soon as it arrives; there is no queue and no in-flight limit.
/// Used where commit callbacks are unavailable, or when forced through the presenter flags.
///
/// ### 中文
/// 仅依赖 `ASurfaceTransaction` 完成回调的单槽渲染器。
///
/// 每块 buffer 到达后立即呈现；没有队列，也没有在途数量限制。
/// 在 commit 回调不可用或通过 presenter 标志强制指定时使用。
pub struct RendererASurfaceTransaction {
    inner: Arc<Inner>,
}

fn same(a: Option<&Arc<ExportedBuffer>>, b: &Arc<ExportedBuffer>) -> bool {
    a.is_some_and(|a| Arc::ptr_eq(a, b))
}

impl RendererASurfaceTransaction {
    pub fn new(
        backend: Arc<dyn SurfaceControlBackend>,
        owner: OwnerTaskSender,
        producer: Arc<dyn ViewBackend>,
        config: &PresenterConfig,
    ) -> Self {
        debug!(size = ?config.initial_size, "RendererASurfaceTransaction created");
        Self {
            inner: Arc::new(Inner {
                backend,
                owner,
                producer,
                surface_name: config.surface_name.clone(),
                state: Mutex::new(State {
                    size: config.initial_size,
                    ..State::default()
                }),
            }),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_frame(
        self: &Arc<Self>,
        surface: &Arc<Surface>,
        buffer: Arc<ExportedBuffer>,
        fence: Option<ScopedFd>,
    ) {
        trace!(buffer_id = buffer.buffer_id(), "scheduling frame");
        let mut transaction = Transaction::new(self.backend.clone(), self.owner.clone());
        transaction
            .set_visibility(surface, Visibility::Show)
            .set_z_order(surface, 0)
            .set_buffer(surface, &buffer, fence);

        let weak = Arc::downgrade(self);
        transaction.set_on_complete_callback(move |_stats| {
            if let Some(inner) = weak.upgrade() {
                inner.finish_frame(buffer);
            }
        });
        transaction.apply();
    }

    fn finish_frame(&self, presented: Arc<ExportedBuffer>) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if let Some(locked) = state.locked.take() {
                if !same(state.exported.as_ref(), &locked) && !Arc::ptr_eq(&locked, &presented) {
                    events.push(ProducerEvent::Release(locked));
                }
            }
            state.locked = Some(presented);

            if std::mem::take(&mut state.frame_complete_owed) {
                events.push(ProducerEvent::FrameComplete);
            }
        }
        dispatch_producer_events(self.producer.as_ref(), events);
    }
}

impl Renderer for RendererASurfaceTransaction {
    fn size(&self) -> PhysicalSize<u32> {
        self.inner.lock().size
    }

    fn on_surface_created(&self, window: WindowHandle) {
        let surface = match Surface::from_window(
            self.inner.backend.clone(),
            window,
            &self.inner.surface_name,
        ) {
            Ok(surface) => Some(Arc::new(surface)),
            Err(err) => {
                warn!(%err, "failed to create surface control");
                None
            }
        };
        self.inner.lock().surface = surface;
    }

    fn on_surface_changed(&self, _format: i32, width: u32, height: u32) {
        self.inner.lock().size = PhysicalSize::new(width, height);
    }

    fn on_surface_redraw_needed(&self) {
        let (surface, exported) = {
            let state = self.inner.lock();
            (state.surface.clone(), state.exported.clone())
        };
        if let (Some(surface), Some(exported)) = (surface, exported) {
            self.inner.schedule_frame(&surface, exported, None);
        }
    }

    fn on_surface_destroyed(&self) {
        self.inner.lock().surface = None;
    }

    fn commit_buffer(&self, buffer: Arc<ExportedBuffer>, fence: Option<ScopedFd>) {
        let mut events = Vec::new();
        let surface = {
            let mut state = self.inner.lock();
            // A superseded export that never reached the screen is not released anywhere else.
            if let Some(previous) = state.exported.take() {
                if !same(state.locked.as_ref(), &previous) {
                    events.push(ProducerEvent::Release(previous));
                }
            }
            state.exported = Some(buffer.clone());
            state.frame_complete_owed = true;
            state.surface.clone()
        };
        dispatch_producer_events(self.inner.producer.as_ref(), events);

        if let Some(surface) = surface {
            self.inner.schedule_frame(&surface, buffer, fence);
        }
    }
}

impl Drop for RendererASurfaceTransaction {
    fn drop(&mut self) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.lock();
            let exported = state.exported.take();
            let locked = state.locked.take();
            if let Some(exported) = exported {
                if !same(locked.as_ref(), &exported) {
                    events.push(ProducerEvent::Release(exported));
                }
            }
            if let Some(locked) = locked {
                events.push(ProducerEvent::Release(locked));
            }
        }
        dispatch_producer_events(self.inner.producer.as_ref(), events);
    }
}
