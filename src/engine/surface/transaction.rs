use std::sync::Arc;

use crate::engine::dispatch::OwnerTaskSender;
use crate::engine::fence::ScopedFd;
use crate::engine::platform::{
    CommitCallback, CompleteCallback, SurfaceControlBackend, SurfaceOp, TransactionBatch,
    TransactionStats, Visibility,
};

use super::{ExportedBuffer, Surface};

/// ### English
/// Single-use batch of surface mutations applied atomically by the compositor.
///
/// Surfaces and buffers referenced by the batch are retained until the compositor reports
/// completion. Both callbacks are relayed to the owner thread before they run, so they may
/// freely touch renderer state. Dropping an unapplied transaction sends nothing.
///
/// ### 中文
/// 由合成器原子应用的一次性 surface 变更批次。
///
/// 批次引用的 surface 与 buffer 会被保留到合成器上报完成为止。两个回调在执行前都会被转投到
/// 属主线程，因此可以直接访问渲染器状态。未 apply 就被丢弃的事务不会发送任何内容。
pub struct Transaction {
    backend: Arc<dyn SurfaceControlBackend>,
    owner: OwnerTaskSender,
    ops: Vec<SurfaceOp>,
    surfaces: Vec<Arc<Surface>>,
    buffers: Vec<Arc<ExportedBuffer>>,
    on_commit: Option<CommitCallback>,
    on_complete: Option<CompleteCallback>,
}

/// ### English
/// Objects kept alive until the compositor is done with the transaction.
///
/// ### 中文
/// 在合成器处理完事务之前需要保活的对象。
struct Retained {
    _surfaces: Vec<Arc<Surface>>,
    _buffers: Vec<Arc<ExportedBuffer>>,
}

impl Transaction {
    pub fn new(backend: Arc<dyn SurfaceControlBackend>, owner: OwnerTaskSender) -> Self {
        Self {
            backend,
            owner,
            ops: Vec::with_capacity(4),
            surfaces: Vec::new(),
            buffers: Vec::new(),
            on_commit: None,
            on_complete: None,
        }
    }

    fn retain_surface(&mut self, surface: &Arc<Surface>) {
        if !self.surfaces.iter().any(|held| Arc::ptr_eq(held, surface)) {
            self.surfaces.push(surface.clone());
        }
    }

    /// ### English
    /// Shows or hides `surface`.
    ///
    /// ### 中文
    /// 显示或隐藏 `surface`。
    pub fn set_visibility(&mut self, surface: &Arc<Surface>, visibility: Visibility) -> &mut Self {
        self.retain_surface(surface);
        self.ops.push(SurfaceOp::SetVisibility {
            surface: surface.handle(),
            visibility,
        });
        self
    }

    /// ### English
    /// Stacking order of `surface` among its siblings.
    ///
    /// ### 中文
    /// `surface` 在兄弟节点之间的层叠顺序。
    pub fn set_z_order(&mut self, surface: &Arc<Surface>, z_order: i32) -> &mut Self {
        self.retain_surface(surface);
        self.ops.push(SurfaceOp::SetZOrder {
            surface: surface.handle(),
            z_order,
        });
        self
    }

    /// ### English
    /// Attaches `buffer` to `surface`. The compositor takes ownership of `acquire_fence`.
    ///
    /// ### 中文
    /// 将 `buffer` 挂到 `surface` 上；合成器接管 `acquire_fence` 的所有权。
    pub fn set_buffer(
        &mut self,
        surface: &Arc<Surface>,
        buffer: &Arc<ExportedBuffer>,
        acquire_fence: Option<ScopedFd>,
    ) -> &mut Self {
        self.retain_surface(surface);
        if !self.buffers.iter().any(|held| Arc::ptr_eq(held, buffer)) {
            self.buffers.push(buffer.clone());
        }
        self.ops.push(SurfaceOp::SetBuffer {
            surface: surface.handle(),
            buffer: buffer.handle(),
            acquire_fence: acquire_fence.filter(ScopedFd::is_valid),
        });
        self
    }

    /// ### English
    /// Moves `surface` under `parent`; `None` detaches it from the hierarchy.
    ///
    /// ### 中文
    /// 将 `surface` 移到 `parent` 之下；`None` 表示将其从层级中摘除。
    pub fn set_parent(&mut self, surface: &Arc<Surface>, parent: Option<&Arc<Surface>>) -> &mut Self {
        self.retain_surface(surface);
        if let Some(parent) = parent {
            self.retain_surface(parent);
        }
        self.ops.push(SurfaceOp::Reparent {
            surface: surface.handle(),
            parent: parent.map(|parent| parent.handle()),
        });
        self
    }

    /// ### English
    /// Runs on the owner thread once the compositor latched the transaction.
    ///
    /// ### 中文
    /// 合成器锁存该事务后，在属主线程执行。
    pub fn set_on_commit_callback(&mut self, callback: impl FnOnce() + Send + 'static) -> &mut Self {
        self.on_commit = Some(Box::new(callback));
        self
    }

    /// ### English
    /// Runs on the owner thread once the transaction was presented, with per-surface release
    /// fences for the buffers it replaced.
    ///
    /// ### 中文
    /// 事务呈现后在属主线程执行，并携带被替换 buffer 的逐 surface release fence。
    pub fn set_on_complete_callback(
        &mut self,
        callback: impl FnOnce(TransactionStats) + Send + 'static,
    ) -> &mut Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// ### English
    /// Hands the batch to the compositor and returns immediately.
    ///
    /// A completion hook is always installed: it carries the retained objects and drops them on
    /// the owner thread after the user's complete callback (if any) ran.
    ///
    /// ### 中文
    /// 将批次交给合成器并立即返回。
    ///
    /// 总会安装一个完成钩子：它携带被保留的对象，并在用户的 complete 回调（若有）执行后于
    /// 属主线程释放它们。
    pub fn apply(self) {
        let Self {
            backend,
            owner,
            ops,
            surfaces,
            buffers,
            on_commit,
            on_complete,
        } = self;

        let on_commit = on_commit.map(|callback| {
            let owner = owner.clone();
            Box::new(move || {
                owner.post(callback);
            }) as CommitCallback
        });

        let retained = Retained {
            _surfaces: surfaces,
            _buffers: buffers,
        };
        let on_complete: CompleteCallback = Box::new(move |stats: TransactionStats| {
            owner.post(Box::new(move || {
                if let Some(callback) = on_complete {
                    callback(stats);
                }
                drop(retained);
            }));
        });

        backend.apply_transaction(TransactionBatch {
            ops,
            on_commit,
            on_complete: Some(on_complete),
        });
    }
}
