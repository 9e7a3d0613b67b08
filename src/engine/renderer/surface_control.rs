use std::collections::{HashMap, VecDeque};
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dpi::PhysicalSize;
use tracing::{debug, trace, warn};

use crate::engine::config::PresenterConfig;
use crate::engine::dispatch::OwnerTaskSender;
use crate::engine::fence::ScopedFd;
use crate::engine::platform::{
    SurfaceControlBackend, SurfaceHandle, TransactionStats, Visibility, WindowHandle,
};
use crate::engine::surface::{ExportedBuffer, Surface, Transaction};

use super::{ProducerEvent, Renderer, ViewBackend, dispatch_producer_events};

/// ### English
/// What a transaction's commit acknowledges.
///
/// ### 中文
/// 事务 commit 所确认的内容类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    /// ### English
    /// A buffer the producer committed; its commit owes the producer a `frame_complete`.
    ///
    /// ### 中文
    /// 生产者提交的 buffer；其 commit 需要向生产者发送 `frame_complete`。
    NewFrame,
    /// ### English
    /// The front buffer re-presented after a surface loss.
    ///
    /// ### 中文
    /// surface 丢失后重新呈现的 front buffer。
    Refresh,
}

struct PendingCommit {
    buffer: Arc<ExportedBuffer>,
    fence: Option<ScopedFd>,
}

/// ### English
/// Surface and buffer referenced by the most recently built transaction.
///
/// ### 中文
/// 最近一次构建的事务所引用的 surface 与 buffer。
struct FrameResource {
    _surface: Arc<Surface>,
    buffer: Arc<ExportedBuffer>,
}

type FrameResources = HashMap<SurfaceHandle, FrameResource>;

/// ### English
/// Transaction waiting for the in-flight one to commit. Keeps its surface so teardown can
/// detach it.
///
/// ### 中文
/// 等待在途事务 commit 的事务。保留其 surface，便于销毁时将其摘除。
struct QueuedTransaction {
    transaction: Transaction,
    surface: Arc<Surface>,
    buffer: Arc<ExportedBuffer>,
}

#[derive(Default)]
struct State {
    size: PhysicalSize<u32>,
    surface: Option<Arc<Surface>>,
    /// ### English
    /// Last buffer known to be on screen.
    ///
    /// ### 中文
    /// 已知正在屏幕上显示的最后一块 buffer。
    front_buffer: Option<Arc<ExportedBuffer>>,
    /// ### English
    /// Buffer that arrived while there was no surface.
    ///
    /// ### 中文
    /// 无 surface 时到达的 buffer。
    pending_commit: Option<PendingCommit>,
    /// ### English
    /// Set by `on_surface_destroyed`, cleared by the next presentation; gates the front-buffer redraw.
    ///
    /// ### 中文
    /// 由 `on_surface_destroyed` 置位，下一次呈现时清除；用于控制 front buffer 重绘。
    front_redraw_pending: bool,
    current_frame_resources: FrameResources,
    pending_transactions: VecDeque<QueuedTransaction>,
    transactions_in_flight: usize,
    release_queue: VecDeque<Arc<ExportedBuffer>>,
}

struct Inner {
    backend: Arc<dyn SurfaceControlBackend>,
    owner: OwnerTaskSender,
    producer: Arc<dyn ViewBackend>,
    surface_name: CString,
    wait_for_release_fence: bool,
    state: Mutex<State>,
}

/// ### English
/// Queued surface-control renderer.
///
/// At most one transaction is in flight (applied, commit callback not yet received); later
/// frames wait in a FIFO and are applied from the commit handler. Buffers replaced on screen
/// are returned to the producer strictly in order, each only after its release fence signaled.
///
/// ### 中文
/// 排队式 surface-control 渲染器。
///
/// 任意时刻至多一个事务在途（已 apply、尚未收到 commit 回调）；后续帧在 FIFO 中等待，
/// 由 commit 处理器依次 apply。被替换下屏的 buffer 严格按顺序、且仅在其 release fence
/// signal 之后交还给生产者。
pub struct RendererSurfaceControl {
    inner: Arc<Inner>,
}

impl RendererSurfaceControl {
    pub fn new(
        backend: Arc<dyn SurfaceControlBackend>,
        owner: OwnerTaskSender,
        producer: Arc<dyn ViewBackend>,
        config: &PresenterConfig,
    ) -> Self {
        debug!(size = ?config.initial_size, "RendererSurfaceControl created");
        Self {
            inner: Arc::new(Inner {
                backend,
                owner,
                producer,
                surface_name: config.surface_name.clone(),
                wait_for_release_fence: config.wait_for_release_fence,
                state: Mutex::new(State {
                    size: config.initial_size,
                    ..State::default()
                }),
            }),
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.inner.lock().transactions_in_flight
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.inner.lock().pending_transactions.len()
    }

    #[cfg(test)]
    fn front_buffer(&self) -> Option<Arc<ExportedBuffer>> {
        self.inner.lock().front_buffer.clone()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, events: Vec<ProducerEvent>) {
        dispatch_producer_events(self.producer.as_ref(), events);
    }

    fn commit_locked(
        self: &Arc<Self>,
        state: &mut State,
        buffer: Arc<ExportedBuffer>,
        fence: Option<ScopedFd>,
        events: &mut Vec<ProducerEvent>,
    ) {
        let Some(surface) = state.surface.clone() else {
            trace!(buffer_id = buffer.buffer_id(), "no surface; deferring commit");
            if let Some(previous) = state.pending_commit.take() {
                events.push(ProducerEvent::Release(previous.buffer));
            }
            if let Some(front) = state.front_buffer.take() {
                events.push(ProducerEvent::Release(front));
            }
            state.pending_commit = Some(PendingCommit { buffer, fence });
            return;
        };

        if let Some(stale) = state.pending_commit.take() {
            if !Arc::ptr_eq(&stale.buffer, &buffer) {
                events.push(ProducerEvent::Release(stale.buffer));
            }
        }
        state.front_redraw_pending = false;

        let mut transaction = Transaction::new(self.backend.clone(), self.owner.clone());
        transaction
            .set_visibility(&surface, Visibility::Show)
            .set_z_order(&surface, 0)
            .set_buffer(&surface, &buffer, fence);

        let to_release = std::mem::take(&mut state.current_frame_resources);
        state.current_frame_resources.insert(
            surface.handle(),
            FrameResource {
                _surface: surface.clone(),
                buffer: buffer.clone(),
            },
        );

        let weak = Arc::downgrade(self);
        transaction.set_on_complete_callback(move |stats| {
            if let Some(inner) = weak.upgrade() {
                inner.on_transaction_complete(to_release, stats);
            }
        });
        transaction.set_on_commit_callback(self.commit_handler(FrameKind::NewFrame));

        if state.transactions_in_flight > 0 {
            trace!(
                queued = state.pending_transactions.len() + 1,
                "transaction in flight; queueing"
            );
            state.pending_transactions.push_back(QueuedTransaction {
                transaction,
                surface,
                buffer,
            });
        } else {
            state.transactions_in_flight += 1;
            transaction.apply();
            state.front_buffer = Some(buffer);
        }
    }

    fn commit_handler(self: &Arc<Self>, kind: FrameKind) -> impl FnOnce() + Send + 'static {
        let weak: Weak<Self> = Arc::downgrade(self);
        move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_transaction_committed(kind);
            }
        }
    }

    /// ### English
    /// Re-presents the front buffer on a new surface without a fence.
    ///
    /// ### 中文
    /// 在新的 surface 上无 fence 地重新呈现 front buffer。
    fn refresh_locked(self: &Arc<Self>, state: &mut State, surface: Arc<Surface>, front: Arc<ExportedBuffer>) {
        debug!(buffer_id = front.buffer_id(), "redrawing front buffer");
        let mut transaction = Transaction::new(self.backend.clone(), self.owner.clone());
        transaction
            .set_visibility(&surface, Visibility::Show)
            .set_z_order(&surface, 0)
            .set_buffer(&surface, &front, None)
            .set_on_commit_callback(self.commit_handler(FrameKind::Refresh));

        // The front buffer now lives on the new surface; the next commit releases it from there.
        state.current_frame_resources.clear();
        state.current_frame_resources.insert(
            surface.handle(),
            FrameResource {
                _surface: surface,
                buffer: front,
            },
        );
        state.front_redraw_pending = false;
        state.transactions_in_flight += 1;
        transaction.apply();
    }

    fn on_transaction_complete(&self, mut released: FrameResources, stats: TransactionStats) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            for surface_stats in stats.surfaces {
                match released.remove(&surface_stats.surface) {
                    Some(resource) => {
                        resource.buffer.set_release_fence(surface_stats.release_fence);
                        state.release_queue.push_back(resource.buffer);
                    }
                    None => debug!(surface = ?surface_stats.surface, "complete stats for unknown surface"),
                }
            }
            if !released.is_empty() {
                debug!(
                    count = released.len(),
                    "surfaces missing from complete stats; dropping their resources"
                );
            }
            self.drain_release_queue(&mut state, &mut events);
        }
        self.dispatch(events);
    }

    fn on_transaction_committed(&self, kind: FrameKind) {
        let mut events = Vec::new();
        if kind == FrameKind::NewFrame {
            events.push(ProducerEvent::FrameComplete);
        }
        {
            let mut state = self.lock();
            state.transactions_in_flight = state.transactions_in_flight.saturating_sub(1);
            if let Some(next) = state.pending_transactions.pop_front() {
                state.transactions_in_flight += 1;
                next.transaction.apply();
                state.front_buffer = Some(next.buffer);
            }
            self.drain_release_queue(&mut state, &mut events);
        }
        self.dispatch(events);
    }

    /// ### English
    /// Hands back buffers from the front of the release queue until one is still being read.
    ///
    /// ### 中文
    /// 从释放队列头部依次交还 buffer，直到遇到仍在被读取的 buffer 为止。
    fn drain_release_queue(&self, state: &mut State, events: &mut Vec<ProducerEvent>) {
        while let Some(head) = state.release_queue.front() {
            if self.wait_for_release_fence && !head.release_fence_status().is_released() {
                trace!(
                    pending = state.release_queue.len(),
                    "release fence not signaled; waiting"
                );
                break;
            }
            let Some(buffer) = state.release_queue.pop_front() else {
                break;
            };
            if state
                .front_buffer
                .as_ref()
                .is_some_and(|front| Arc::ptr_eq(front, &buffer))
            {
                state.front_buffer = None;
            }
            events.push(ProducerEvent::Release(buffer));
        }
    }
}

impl Renderer for RendererSurfaceControl {
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
                warn!(%err, "failed to create surface control; staying without surface");
                None
            }
        };
        self.inner.lock().surface = surface;
    }

    fn on_surface_changed(&self, _format: i32, width: u32, height: u32) {
        self.inner.lock().size = PhysicalSize::new(width, height);
    }

    fn on_surface_redraw_needed(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.lock();
            let Some(surface) = state.surface.clone() else {
                return;
            };
            if let Some(pending) = state.pending_commit.take() {
                debug!(buffer_id = pending.buffer.buffer_id(), "sending pending commit");
                self.inner
                    .commit_locked(&mut state, pending.buffer, pending.fence, &mut events);
            } else if state.front_redraw_pending && state.transactions_in_flight == 0 {
                if let Some(front) = state.front_buffer.clone() {
                    self.inner.refresh_locked(&mut state, surface, front);
                }
            }
        }
        self.inner.dispatch(events);
    }

    fn on_surface_destroyed(&self) {
        let mut state = self.inner.lock();
        state.surface = None;
        state.front_redraw_pending = true;
    }

    fn commit_buffer(&self, buffer: Arc<ExportedBuffer>, fence: Option<ScopedFd>) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.lock();
            self.inner
                .commit_locked(&mut state, buffer, fence, &mut events);
        }
        self.inner.dispatch(events);
    }
}

impl Drop for RendererSurfaceControl {
    fn drop(&mut self) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.lock();
            let queued = state.pending_transactions.len();
            if queued > 0 {
                debug!(queued, "detaching queued transactions");
            }
            // Applying them detached still fires their complete callbacks, which frees the resources.
            while let Some(QueuedTransaction {
                mut transaction,
                surface,
                buffer: _,
            }) = state.pending_transactions.pop_front()
            {
                transaction.set_parent(&surface, None);
                transaction.apply();
            }
            if let Some(pending) = state.pending_commit.take() {
                events.push(ProducerEvent::Release(pending.buffer));
            }
            if let Some(front) = state.front_buffer.take() {
                events.push(ProducerEvent::Release(front));
            }
        }
        self.inner.dispatch(events);
    }
}
