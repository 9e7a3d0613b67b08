//! ### English
//! C ABI surface for `wpe_android_presenter`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Every presenter function must be called from the thread that created the presenter.
//! Native handles (`AHardwareBuffer*`, `ANativeWindow*`) are borrowed; file descriptors passed
//! in are owned by the callee from then on.
//!
//! ### 中文
//! `wpe_android_presenter` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 所有 presenter 函数都必须在创建该 presenter 的线程上调用。
//! 原生句柄（`AHardwareBuffer*`、`ANativeWindow*`）为借用；传入的文件描述符此后归被调用方所有。
mod abi;
#[cfg(any(target_os = "android", test))]
mod logcat;
mod logging;
mod presenter;
mod surface;

use std::ffi::c_void;

use crate::engine::{ExportedBuffer, Presenter, ScopedFd, ViewBackend};

#[repr(C)]
/// ### English
/// Opaque presenter handle.
///
/// ### 中文
/// 不透明 presenter 句柄。
pub struct WpePresenter {
    presenter: Presenter,
}

/// ### English
/// Release callback: `(user_data, AHardwareBuffer*, pool_id, buffer_id, release_fence_fd)`.
/// `release_fence_fd` is `-1` or a sync fence the callee must close.
///
/// ### 中文
/// 释放回调：`(user_data, AHardwareBuffer*, pool_id, buffer_id, release_fence_fd)`。
/// `release_fence_fd` 为 `-1` 或一个需由被调用方关闭的 sync fence。
pub type WpePresenterReleaseBufferFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    buffer: *mut c_void,
    pool_id: u32,
    buffer_id: u32,
    release_fence_fd: i32,
);

pub type WpePresenterNotifyFn = unsafe extern "C" fn(user_data: *mut c_void);

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Embedder callback table (the producer side).
///
/// `release_buffer` and `frame_complete` run on the owner thread inside presenter calls or
/// `wpe_presenter_tick`. `wake` may run on any thread; it should only schedule a tick.
///
/// ### 中文
/// 宿主回调表（生产者一侧）。
///
/// `release_buffer` 与 `frame_complete` 在属主线程上、于 presenter 调用或 `wpe_presenter_tick`
/// 内部执行。`wake` 可能在任意线程执行，只应安排一次 tick。
pub struct WpePresenterCallbacks {
    pub user_data: *mut c_void,
    pub release_buffer: Option<WpePresenterReleaseBufferFn>,
    pub frame_complete: Option<WpePresenterNotifyFn>,
    pub wake: Option<WpePresenterNotifyFn>,
}

// The embedder guarantees `user_data` may be used from the threads documented above.
unsafe impl Send for WpePresenterCallbacks {}
unsafe impl Sync for WpePresenterCallbacks {}

impl WpePresenterCallbacks {
    fn notify(&self, callback: WpePresenterNotifyFn) {
        unsafe { callback(self.user_data) };
    }
}

const WPE_PRESENTER_ABI_VERSION: u32 = 1;

/// ### English
/// [`ViewBackend`] forwarding to the embedder's callback table.
///
/// ### 中文
/// 转发到宿主回调表的 [`ViewBackend`]。
struct EmbedderProducer {
    callbacks: WpePresenterCallbacks,
}

impl ViewBackend for EmbedderProducer {
    fn release_buffer(&self, buffer: &ExportedBuffer, release_fence: Option<ScopedFd>) {
        let fence_fd = release_fence.map_or(-1, |mut fence| fence.release());
        match self.callbacks.release_buffer {
            Some(release) => unsafe {
                release(
                    self.callbacks.user_data,
                    buffer.handle().as_ptr(),
                    buffer.pool_id(),
                    buffer.buffer_id(),
                    fence_fd,
                )
            },
            None => {
                if fence_fd >= 0 {
                    drop(unsafe { ScopedFd::from_raw(fence_fd) });
                }
            }
        }
    }

    fn frame_complete(&self) {
        if let Some(frame_complete) = self.callbacks.frame_complete {
            self.callbacks.notify(frame_complete);
        }
    }
}
