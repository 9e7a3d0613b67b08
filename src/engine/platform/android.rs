//! ### English
//! NDK implementation of the compositor backend.
//!
//! Symbols are resolved from `libandroid.so` at runtime so the library still loads on devices
//! without `ASurfaceControl` (API < 29); `ASurfaceTransaction_setOnCommit` (API 31) is optional.
//!
//! ### 中文
//! 合成器 backend 的 NDK 实现。
//!
//! 在运行时从 `libandroid.so` 解析符号，因此在不支持 `ASurfaceControl`（API < 29）的设备上
//! 库仍可加载；`ASurfaceTransaction_setOnCommit`（API 31）为可选符号。

use std::ffi::{CStr, c_char, c_int, c_void};

use dpi::PhysicalSize;
use tracing::{debug, warn};

use crate::engine::error::PresentError;
use crate::engine::fence::ScopedFd;

use super::{
    BufferHandle, CommitCallback, CompleteCallback, PlatformCapabilities, SurfaceControlBackend,
    SurfaceHandle, SurfaceOp, SurfaceStats, TransactionBatch, TransactionStats, WindowHandle,
};

const LIBANDROID: &CStr = c"libandroid.so";

#[repr(C)]
struct ASurfaceControl {
    _private: [u8; 0],
}

#[repr(C)]
struct ASurfaceTransaction {
    _private: [u8; 0],
}

#[repr(C)]
struct ASurfaceTransactionStats {
    _private: [u8; 0],
}

#[repr(C)]
struct AHardwareBuffer {
    _private: [u8; 0],
}

#[repr(C)]
struct ANativeWindow {
    _private: [u8; 0],
}

/// ### English
/// Mirrors `AHardwareBuffer_Desc`.
///
/// ### 中文
/// 对应 `AHardwareBuffer_Desc`。
#[repr(C)]
#[derive(Default)]
struct AHardwareBufferDesc {
    width: u32,
    height: u32,
    layers: u32,
    format: u32,
    usage: u64,
    stride: u32,
    rfu0: u32,
    rfu1: u64,
}

type TransactionCallback = unsafe extern "C" fn(*mut c_void, *mut ASurfaceTransactionStats);

type SurfaceControlCreateFromWindow =
    unsafe extern "C" fn(*mut ANativeWindow, *const c_char) -> *mut ASurfaceControl;
type SurfaceControlRelease = unsafe extern "C" fn(*mut ASurfaceControl);
type TransactionCreate = unsafe extern "C" fn() -> *mut ASurfaceTransaction;
type TransactionDelete = unsafe extern "C" fn(*mut ASurfaceTransaction);
type TransactionApply = unsafe extern "C" fn(*mut ASurfaceTransaction);
type TransactionSetVisibility =
    unsafe extern "C" fn(*mut ASurfaceTransaction, *mut ASurfaceControl, i8);
type TransactionSetZOrder = unsafe extern "C" fn(*mut ASurfaceTransaction, *mut ASurfaceControl, i32);
type TransactionSetBuffer = unsafe extern "C" fn(
    *mut ASurfaceTransaction,
    *mut ASurfaceControl,
    *mut AHardwareBuffer,
    c_int,
);
type TransactionReparent =
    unsafe extern "C" fn(*mut ASurfaceTransaction, *mut ASurfaceControl, *mut ASurfaceControl);
type TransactionSetCallback =
    unsafe extern "C" fn(*mut ASurfaceTransaction, *mut c_void, TransactionCallback);
type StatsGetSurfaceControls = unsafe extern "C" fn(
    *mut ASurfaceTransactionStats,
    *mut *mut *mut ASurfaceControl,
    *mut usize,
);
type StatsReleaseSurfaceControls = unsafe extern "C" fn(*mut *mut ASurfaceControl);
type StatsGetPreviousReleaseFenceFd =
    unsafe extern "C" fn(*mut ASurfaceTransactionStats, *mut ASurfaceControl) -> c_int;
type HardwareBufferAcquire = unsafe extern "C" fn(*mut AHardwareBuffer);
type HardwareBufferRelease = unsafe extern "C" fn(*mut AHardwareBuffer);
type HardwareBufferDescribe = unsafe extern "C" fn(*const AHardwareBuffer, *mut AHardwareBufferDesc);

/// ### English
/// `ASurfaceControl` backend backed by a function table resolved from `libandroid.so`.
///
/// ### 中文
/// 基于从 `libandroid.so` 解析出的函数表实现的 `ASurfaceControl` backend。
pub struct NdkSurfaceControl {
    surface_control_create_from_window: SurfaceControlCreateFromWindow,
    surface_control_release: SurfaceControlRelease,
    transaction_create: TransactionCreate,
    transaction_delete: TransactionDelete,
    transaction_apply: TransactionApply,
    transaction_set_visibility: TransactionSetVisibility,
    transaction_set_z_order: TransactionSetZOrder,
    transaction_set_buffer: TransactionSetBuffer,
    transaction_reparent: TransactionReparent,
    transaction_set_on_complete: TransactionSetCallback,
    /// ### English
    /// Only present on API 31+.
    ///
    /// ### 中文
    /// 仅在 API 31+ 上存在。
    transaction_set_on_commit: Option<TransactionSetCallback>,
    stats: StatsTable,
    hardware_buffer_acquire: HardwareBufferAcquire,
    hardware_buffer_release: HardwareBufferRelease,
    hardware_buffer_describe: HardwareBufferDescribe,
}

/// ### English
/// Resolves one symbol as a function pointer of type `T`.
///
/// ### 中文
/// 将单个符号解析为 `T` 类型的函数指针。
unsafe fn lookup<T: Copy>(library: *mut c_void, name: &'static CStr) -> Option<T> {
    debug_assert_eq!(size_of::<T>(), size_of::<*mut c_void>());
    let symbol = unsafe { libc::dlsym(library, name.as_ptr()) };
    if symbol.is_null() {
        return None;
    }
    Some(unsafe { std::mem::transmute_copy::<*mut c_void, T>(&symbol) })
}

unsafe fn require<T: Copy>(library: *mut c_void, name: &'static CStr) -> Result<T, PresentError> {
    unsafe { lookup(library, name) }
        .ok_or(PresentError::SymbolMissing(name.to_str().unwrap_or("<non-utf8>")))
}

impl NdkSurfaceControl {
    /// ### English
    /// Opens `libandroid.so` and resolves the surface-control function table.
    ///
    /// The library handle is intentionally never closed: the table lives for the process.
    ///
    /// ### 中文
    /// 打开 `libandroid.so` 并解析 surface-control 函数表。
    ///
    /// 库句柄不会被关闭：函数表在整个进程生命周期内有效。
    pub fn load() -> Result<Self, PresentError> {
        let library = unsafe { libc::dlopen(LIBANDROID.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if library.is_null() {
            let reason = unsafe {
                let err = libc::dlerror();
                if err.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err).to_string_lossy().into_owned()
                }
            };
            return Err(PresentError::LibraryLoad {
                library: "libandroid.so",
                reason,
            });
        }

        let table = unsafe {
            Self {
                surface_control_create_from_window: require(
                    library,
                    c"ASurfaceControl_createFromWindow",
                )
                .map_err(|_| PresentError::Unsupported)?,
                surface_control_release: require(library, c"ASurfaceControl_release")?,
                transaction_create: require(library, c"ASurfaceTransaction_create")?,
                transaction_delete: require(library, c"ASurfaceTransaction_delete")?,
                transaction_apply: require(library, c"ASurfaceTransaction_apply")?,
                transaction_set_visibility: require(
                    library,
                    c"ASurfaceTransaction_setVisibility",
                )?,
                transaction_set_z_order: require(library, c"ASurfaceTransaction_setZOrder")?,
                transaction_set_buffer: require(library, c"ASurfaceTransaction_setBuffer")?,
                transaction_reparent: require(library, c"ASurfaceTransaction_reparent")?,
                transaction_set_on_complete: require(
                    library,
                    c"ASurfaceTransaction_setOnComplete",
                )?,
                transaction_set_on_commit: lookup(library, c"ASurfaceTransaction_setOnCommit"),
                stats: StatsTable {
                    get_surface_controls: require(
                        library,
                        c"ASurfaceTransactionStats_getASurfaceControls",
                    )?,
                    release_surface_controls: require(
                        library,
                        c"ASurfaceTransactionStats_releaseASurfaceControls",
                    )?,
                    get_previous_release_fence_fd: require(
                        library,
                        c"ASurfaceTransactionStats_getPreviousReleaseFenceFd",
                    )?,
                },
                hardware_buffer_acquire: require(library, c"AHardwareBuffer_acquire")?,
                hardware_buffer_release: require(library, c"AHardwareBuffer_release")?,
                hardware_buffer_describe: require(library, c"AHardwareBuffer_describe")?,
            }
        };

        debug!(
            commit_callback = table.transaction_set_on_commit.is_some(),
            "loaded ASurfaceControl symbols"
        );
        Ok(table)
    }
}

/// ### English
/// The `ASurfaceTransactionStats_*` entry points, copied into every completion context so the
/// trampoline does not depend on the backend outliving the transaction.
///
/// ### 中文
/// `ASurfaceTransactionStats_*` 入口函数；复制到每个完成回调上下文中，
/// 使 trampoline 不依赖 backend 比事务活得更久。
#[derive(Clone, Copy)]
struct StatsTable {
    get_surface_controls: StatsGetSurfaceControls,
    release_surface_controls: StatsReleaseSurfaceControls,
    get_previous_release_fence_fd: StatsGetPreviousReleaseFenceFd,
}

impl StatsTable {
    /// ### English
    /// Converts NDK transaction stats into owned per-surface stats.
    ///
    /// ### 中文
    /// 将 NDK 事务统计信息转换为持有所有权的逐 surface 统计。
    fn collect(self, stats: *mut ASurfaceTransactionStats) -> TransactionStats {
        let mut out = TransactionStats::default();
        if stats.is_null() {
            return out;
        }

        let mut controls: *mut *mut ASurfaceControl = std::ptr::null_mut();
        let mut count = 0usize;
        unsafe { (self.get_surface_controls)(stats, &mut controls, &mut count) };
        if controls.is_null() {
            return out;
        }

        let slice = unsafe { std::slice::from_raw_parts(controls, count) };
        out.surfaces.reserve(count);
        for &control in slice {
            let Some(surface) = SurfaceHandle::from_raw(control.cast()) else {
                continue;
            };
            let fd = unsafe { (self.get_previous_release_fence_fd)(stats, control) };
            out.surfaces.push(SurfaceStats {
                surface,
                release_fence: Some(unsafe { ScopedFd::from_raw(fd) }).filter(ScopedFd::is_valid),
            });
        }
        unsafe { (self.release_surface_controls)(controls) };
        out
    }
}

/// ### English
/// Heap context handed to the NDK for one callback; freed inside the trampoline.
///
/// ### 中文
/// 为单个回调交给 NDK 的堆上下文；在 trampoline 中释放。
struct CommitContext {
    callback: CommitCallback,
}

struct CompleteContext {
    callback: CompleteCallback,
    stats: StatsTable,
}

unsafe extern "C" fn on_commit_any_thread(context: *mut c_void, _stats: *mut ASurfaceTransactionStats) {
    let context = unsafe { *Box::from_raw(context.cast::<CommitContext>()) };
    (context.callback)();
}

unsafe extern "C" fn on_complete_any_thread(
    context: *mut c_void,
    stats: *mut ASurfaceTransactionStats,
) {
    let context = unsafe { *Box::from_raw(context.cast::<CompleteContext>()) };
    let stats = context.stats.collect(stats);
    (context.callback)(stats);
}

impl SurfaceControlBackend for NdkSurfaceControl {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            commit_callback: self.transaction_set_on_commit.is_some(),
        }
    }

    fn create_surface(
        &self,
        parent: WindowHandle,
        debug_name: &CStr,
    ) -> Result<SurfaceHandle, PresentError> {
        let control = unsafe {
            (self.surface_control_create_from_window)(parent.as_ptr().cast(), debug_name.as_ptr())
        };
        SurfaceHandle::from_raw(control.cast())
            .ok_or_else(|| PresentError::SurfaceCreation(debug_name.to_string_lossy().into_owned()))
    }

    fn release_surface(&self, surface: SurfaceHandle) {
        unsafe { (self.surface_control_release)(surface.as_ptr().cast()) };
    }

    fn acquire_buffer(&self, buffer: BufferHandle) {
        unsafe { (self.hardware_buffer_acquire)(buffer.as_ptr().cast()) };
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        unsafe { (self.hardware_buffer_release)(buffer.as_ptr().cast()) };
    }

    fn describe_buffer(&self, buffer: BufferHandle) -> PhysicalSize<u32> {
        let mut desc = AHardwareBufferDesc::default();
        unsafe { (self.hardware_buffer_describe)(buffer.as_ptr().cast_const().cast(), &mut desc) };
        PhysicalSize::new(desc.width, desc.height)
    }

    fn apply_transaction(&self, batch: TransactionBatch) {
        let transaction = unsafe { (self.transaction_create)() };
        if transaction.is_null() {
            warn!("ASurfaceTransaction_create returned NULL; dropping transaction");
            return;
        }

        for op in batch.ops {
            match op {
                SurfaceOp::SetVisibility {
                    surface,
                    visibility,
                } => unsafe {
                    (self.transaction_set_visibility)(
                        transaction,
                        surface.as_ptr().cast(),
                        visibility as i8,
                    )
                },
                SurfaceOp::SetZOrder { surface, z_order } => unsafe {
                    (self.transaction_set_z_order)(transaction, surface.as_ptr().cast(), z_order)
                },
                SurfaceOp::SetBuffer {
                    surface,
                    buffer,
                    acquire_fence,
                } => {
                    // setBuffer takes ownership of the fence fd.
                    let fence_fd = acquire_fence.map_or(-1, |mut fence| fence.release());
                    unsafe {
                        (self.transaction_set_buffer)(
                            transaction,
                            surface.as_ptr().cast(),
                            buffer.as_ptr().cast(),
                            fence_fd,
                        )
                    }
                }
                SurfaceOp::Reparent { surface, parent } => unsafe {
                    (self.transaction_reparent)(
                        transaction,
                        surface.as_ptr().cast(),
                        parent.map_or(std::ptr::null_mut(), |parent| parent.as_ptr().cast()),
                    )
                },
            }
        }

        if let Some(callback) = batch.on_commit {
            match self.transaction_set_on_commit {
                Some(set_on_commit) => {
                    let context = Box::into_raw(Box::new(CommitContext { callback }));
                    unsafe { set_on_commit(transaction, context.cast(), on_commit_any_thread) };
                }
                None => warn!("commit callback requested but ASurfaceTransaction_setOnCommit is unavailable"),
            }
        }

        if let Some(callback) = batch.on_complete {
            let context = Box::into_raw(Box::new(CompleteContext {
                callback,
                stats: self.stats,
            }));
            unsafe {
                (self.transaction_set_on_complete)(transaction, context.cast(), on_complete_any_thread)
            };
        }

        unsafe {
            (self.transaction_apply)(transaction);
            (self.transaction_delete)(transaction);
        }
    }
}
