//! ### English
//! Seam between the pipeline and the platform compositor (Android `ASurfaceControl`).
//!
//! The pipeline only ever talks to [`SurfaceControlBackend`]; the NDK implementation lives in
//! `android` and is resolved at runtime, non-Android builds get a stub that reports
//! [`PresentError::Unsupported`].
//!
//! ### 中文
//! 管线与平台合成器（Android `ASurfaceControl`）之间的接缝。
//!
//! 管线只与 [`SurfaceControlBackend`] 交互；NDK 实现位于 `android` 模块并在运行时解析符号，
//! 非 Android 构建使用始终返回 [`PresentError::Unsupported`] 的占位实现。

#[cfg(target_os = "android")]
mod android;

#[cfg(not(target_os = "android"))]
mod stub;

use std::ffi::{CStr, c_void};
use std::ptr::NonNull;
use std::sync::Arc;

use dpi::PhysicalSize;

use crate::engine::error::PresentError;
use crate::engine::fence::ScopedFd;

#[cfg(target_os = "android")]
pub use android::NdkSurfaceControl;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(NonNull<c_void>);

        // Opaque NDK objects; the NDK documents them as usable from any thread.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            #[inline]
            pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map(Self)
            }

            #[inline]
            pub fn as_ptr(self) -> *mut c_void {
                self.0.as_ptr()
            }
        }
    };
}

native_handle!(
    /// ### English
    /// Native graphics buffer (`AHardwareBuffer*`).
    ///
    /// ### 中文
    /// 原生图形缓冲区（`AHardwareBuffer*`）。
    BufferHandle
);

native_handle!(
    /// ### English
    /// Platform surface control (`ASurfaceControl*`).
    ///
    /// ### 中文
    /// 平台 surface control（`ASurfaceControl*`）。
    SurfaceHandle
);

native_handle!(
    /// ### English
    /// Native window provided by the window system (`ANativeWindow*`). Not owned by the pipeline.
    ///
    /// ### 中文
    /// 由窗口系统提供的原生窗口（`ANativeWindow*`），管线不持有其所有权。
    WindowHandle
);

/// ### English
/// Mirrors `ASurfaceTransactionVisibility`.
///
/// ### 中文
/// 对应 `ASurfaceTransactionVisibility`。
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Hide = 0,
    Show = 1,
}

/// ### English
/// One recorded mutation inside a transaction batch.
///
/// ### 中文
/// 事务批次中记录的一次 surface 变更。
#[derive(Debug)]
pub enum SurfaceOp {
    SetVisibility {
        surface: SurfaceHandle,
        visibility: Visibility,
    },
    SetZOrder {
        surface: SurfaceHandle,
        z_order: i32,
    },
    /// ### English
    /// Attaches `buffer`; the compositor waits on `acquire_fence` (if any) before reading it and
    /// takes over ownership of the fence.
    ///
    /// ### 中文
    /// 挂载 `buffer`；合成器在读取前等待 `acquire_fence`（若有），并接管该 fence 的所有权。
    SetBuffer {
        surface: SurfaceHandle,
        buffer: BufferHandle,
        acquire_fence: Option<ScopedFd>,
    },
    /// ### English
    /// Moves `surface` under `parent`; `None` detaches it from the tree.
    ///
    /// ### 中文
    /// 将 `surface` 挂到 `parent` 之下；`None` 表示从树上摘除。
    Reparent {
        surface: SurfaceHandle,
        parent: Option<SurfaceHandle>,
    },
}

/// ### English
/// Per-surface completion data reported by the compositor.
///
/// ### 中文
/// 合成器上报的单个 surface 的完成数据。
#[derive(Debug)]
pub struct SurfaceStats {
    pub surface: SurfaceHandle,
    /// ### English
    /// Fence that signals once the compositor stopped reading the surface's previous buffer.
    ///
    /// ### 中文
    /// 合成器停止读取该 surface 上一块 buffer 后会 signal 的 fence。
    pub release_fence: Option<ScopedFd>,
}

#[derive(Debug, Default)]
pub struct TransactionStats {
    pub surfaces: Vec<SurfaceStats>,
}

/// ### English
/// Callback fired once the transaction state is latched (not yet on screen).
///
/// ### 中文
/// 事务状态被锁存（尚未上屏）时触发的回调。
pub type CommitCallback = Box<dyn FnOnce() + Send + 'static>;

/// ### English
/// Callback fired once the compositor fully consumed the transaction.
///
/// ### 中文
/// 合成器完全消费该事务后触发的回调。
pub type CompleteCallback = Box<dyn FnOnce(TransactionStats) + Send + 'static>;

/// ### English
/// Everything the backend needs to apply one transaction.
///
/// Backends may invoke the callbacks on any thread, each at most once, commit before complete.
///
/// ### 中文
/// backend 应用一个事务所需的全部内容。
///
/// backend 可在任意线程调用回调；每个回调至多一次，且 commit 先于 complete。
pub struct TransactionBatch {
    pub ops: Vec<SurfaceOp>,
    pub on_commit: Option<CommitCallback>,
    pub on_complete: Option<CompleteCallback>,
}

/// ### English
/// Optional platform features probed once at startup.
///
/// ### 中文
/// 启动时探测一次的可选平台特性。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// ### English
    /// `ASurfaceTransaction_setOnCommit` is available (API 31+).
    ///
    /// ### 中文
    /// `ASurfaceTransaction_setOnCommit` 可用（API 31+）。
    pub commit_callback: bool,
}

/// ### English
/// Platform compositor contract used by surfaces, buffers and transactions.
///
/// ### 中文
/// surface、buffer 与事务所依赖的平台合成器契约。
pub trait SurfaceControlBackend: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    fn create_surface(
        &self,
        parent: WindowHandle,
        debug_name: &CStr,
    ) -> Result<SurfaceHandle, PresentError>;

    fn release_surface(&self, surface: SurfaceHandle);

    fn acquire_buffer(&self, buffer: BufferHandle);

    fn release_buffer(&self, buffer: BufferHandle);

    fn describe_buffer(&self, buffer: BufferHandle) -> PhysicalSize<u32>;

    /// ### English
    /// Hands the batch to the compositor and returns immediately.
    ///
    /// ### 中文
    /// 将批次交给合成器并立即返回。
    fn apply_transaction(&self, batch: TransactionBatch);
}

/// ### English
/// Loads the compositor backend for the current platform.
///
/// ### 中文
/// 加载当前平台的合成器 backend。
pub fn load_default_backend() -> Result<Arc<dyn SurfaceControlBackend>, PresentError> {
    #[cfg(target_os = "android")]
    {
        Ok(Arc::new(android::NdkSurfaceControl::load()?))
    }

    #[cfg(not(target_os = "android"))]
    {
        stub::load()
    }
}
