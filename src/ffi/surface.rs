//! ### English
//! C ABI bindings for window-surface events and buffer commits.
//!
//! ### 中文
//! 窗口 surface 事件与 buffer 提交相关的 C ABI 绑定。

use std::ffi::c_void;

use tracing::warn;

use super::WpePresenter;
use crate::engine::{BufferHandle, PresentError, ScopedFd, WindowHandle};

#[unsafe(no_mangle)]
/// ### English
/// The window system created `window` (`ANativeWindow*`). Returns `false` for NULL arguments.
///
/// The window is borrowed; the caller keeps its own reference.
///
/// ### 中文
/// 窗口系统创建了 `window`（`ANativeWindow*`）。参数为 NULL 时返回 `false`。
///
/// 窗口为借用，调用方保留自己的引用。
pub unsafe extern "C" fn wpe_presenter_surface_created(
    presenter: *mut WpePresenter,
    window: *mut c_void,
) -> bool {
    if presenter.is_null() {
        return false;
    }
    let Some(window) = WindowHandle::from_raw(window) else {
        warn!(error = %PresentError::NullHandle("window"), "wpe_presenter_surface_created");
        return false;
    };
    unsafe { (*presenter).presenter.surface_created(window) };
    true
}

#[unsafe(no_mangle)]
/// ### English
/// The window was resized; only the stored size changes.
///
/// ### 中文
/// 窗口尺寸变化；仅更新保存的尺寸。
pub unsafe extern "C" fn wpe_presenter_surface_changed(
    presenter: *mut WpePresenter,
    format: i32,
    width: u32,
    height: u32,
) {
    if presenter.is_null() {
        return;
    }
    unsafe { (*presenter).presenter.surface_changed(format, width, height) };
}

#[unsafe(no_mangle)]
/// ### English
/// The window needs its content again (e.g. after being re-created).
///
/// ### 中文
/// 窗口需要重新显示内容（例如被重新创建之后）。
pub unsafe extern "C" fn wpe_presenter_surface_redraw_needed(presenter: *mut WpePresenter) {
    if presenter.is_null() {
        return;
    }
    unsafe { (*presenter).presenter.surface_redraw_needed() };
}

#[unsafe(no_mangle)]
/// ### English
/// The window is going away. Later commits are held until a new surface is created.
///
/// ### 中文
/// 窗口即将销毁。之后的提交会被暂存，直到新的 surface 创建。
pub unsafe extern "C" fn wpe_presenter_surface_destroyed(presenter: *mut WpePresenter) {
    if presenter.is_null() {
        return;
    }
    unsafe { (*presenter).presenter.surface_destroyed() };
}

#[unsafe(no_mangle)]
/// ### English
/// Commits one rendered buffer (`AHardwareBuffer*`).
///
/// `fence_fd` is `-1` or a sync fence signaling render completion; it is always consumed, even
/// when this returns `false`. The buffer comes back later through `release_buffer` with the same
/// `pool_id`/`buffer_id`.
///
/// ### 中文
/// 提交一块已渲染的 buffer（`AHardwareBuffer*`）。
///
/// `fence_fd` 为 `-1` 或表示渲染完成的 sync fence；无论返回值如何都会被接管。
/// 该 buffer 之后会通过 `release_buffer` 以相同的 `pool_id`/`buffer_id` 交还。
pub unsafe extern "C" fn wpe_presenter_commit_buffer(
    presenter: *mut WpePresenter,
    buffer: *mut c_void,
    pool_id: u32,
    buffer_id: u32,
    fence_fd: i32,
) -> bool {
    let fence = unsafe { ScopedFd::from_raw(fence_fd) };
    if presenter.is_null() {
        return false;
    }
    let Some(buffer) = BufferHandle::from_raw(buffer) else {
        warn!(error = %PresentError::NullHandle("buffer"), pool_id, buffer_id, "wpe_presenter_commit_buffer");
        return false;
    };

    let fence = Some(fence).filter(ScopedFd::is_valid);
    unsafe { (*presenter).presenter.commit_buffer(buffer, pool_id, buffer_id, fence) };
    true
}
