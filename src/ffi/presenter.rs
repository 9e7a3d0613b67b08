//! ### English
//! C ABI bindings for presenter lifecycle (create/destroy/tick).
//!
//! ### 中文
//! presenter 生命周期相关的 C ABI 绑定（create/destroy/tick）。

use std::sync::Arc;

use tracing::warn;

use super::{EmbedderProducer, WpePresenter, WpePresenterCallbacks};
use crate::engine::{PresentError, Presenter, PresenterConfig, Waker};

#[unsafe(no_mangle)]
/// ### English
/// Creates a presenter on the calling thread, which becomes its owner thread.
///
/// `flags` is a bitmask of `WPE_PRESENTER_FLAG_*`. `width`/`height` are the initial size
/// (0 is clamped to 1). `callbacks` is copied; it must not be NULL.
///
/// Returns NULL when surface control is unavailable (API < 29 or not Android); the embedder
/// should fall back to its GL renderer in that case.
///
/// ### 中文
/// 在调用线程上创建 presenter，该线程即成为其属主线程。
///
/// `flags` 为 `WPE_PRESENTER_FLAG_*` 位掩码。`width`/`height` 为初始尺寸（0 会被修正为 1）。
/// `callbacks` 会被复制，不能为 NULL。
///
/// 在不支持 surface control 时（API < 29 或非 Android）返回 NULL；此时宿主应回退到 GL 渲染器。
pub unsafe extern "C" fn wpe_presenter_create(
    flags: u32,
    width: u32,
    height: u32,
    callbacks: *const WpePresenterCallbacks,
) -> *mut WpePresenter {
    if callbacks.is_null() {
        warn!(error = %PresentError::NullHandle("callbacks"), "wpe_presenter_create");
        return std::ptr::null_mut();
    }
    let callbacks = unsafe { *callbacks };

    let waker: Option<Waker> = callbacks
        .wake
        .map(|wake| Arc::new(move || callbacks.notify(wake)) as Waker);
    let producer = Arc::new(EmbedderProducer { callbacks });

    match Presenter::with_platform_backend(
        PresenterConfig::from_flags(flags, width, height),
        producer,
        waker,
    ) {
        Ok(presenter) => Box::into_raw(Box::new(WpePresenter { presenter })),
        Err(err) => {
            warn!(%err, "wpe_presenter_create failed");
            std::ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a presenter created by `wpe_presenter_create`.
///
/// Buffers still held (pending or on screen) are handed back through `release_buffer` before
/// this returns. Compositor callbacks that arrive later are ignored.
///
/// ### 中文
/// 销毁由 `wpe_presenter_create` 创建的 presenter。
///
/// 仍被持有的 buffer（待提交或正在显示）会在返回前通过 `release_buffer` 交还。
/// 之后到达的合成器回调会被忽略。
pub unsafe extern "C" fn wpe_presenter_destroy(presenter: *mut WpePresenter) {
    if presenter.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(presenter));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Runs compositor callbacks relayed to the owner thread. Returns how many ran.
///
/// Call it whenever `wake` fired (e.g. from the native looper).
///
/// ### 中文
/// 执行已转投到属主线程的合成器回调，返回执行数量。
///
/// 每当 `wake` 触发后调用（例如在 native looper 中）。
pub unsafe extern "C" fn wpe_presenter_tick(presenter: *mut WpePresenter) -> u32 {
    if presenter.is_null() {
        return 0;
    }
    let ran = unsafe { (*presenter).presenter.tick() };
    u32::try_from(ran).unwrap_or(u32::MAX)
}

#[unsafe(no_mangle)]
/// ### English
/// Current width in physical pixels (0 for NULL).
///
/// ### 中文
/// 当前宽度（物理像素；NULL 时返回 0）。
pub unsafe extern "C" fn wpe_presenter_width(presenter: *const WpePresenter) -> u32 {
    if presenter.is_null() {
        return 0;
    }
    unsafe { (*presenter).presenter.width() }
}

#[unsafe(no_mangle)]
/// ### English
/// Current height in physical pixels (0 for NULL).
///
/// ### 中文
/// 当前高度（物理像素；NULL 时返回 0）。
pub unsafe extern "C" fn wpe_presenter_height(presenter: *const WpePresenter) -> u32 {
    if presenter.is_null() {
        return 0;
    }
    unsafe { (*presenter).presenter.height() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    use crate::engine::testing::{FakeBackend, FakeProducer};

    #[test]
    fn create_rejects_null_callbacks() {
        let presenter = unsafe { wpe_presenter_create(0, 16, 16, ptr::null()) };
        assert!(presenter.is_null());
    }

    #[cfg(not(target_os = "android"))]
    #[test]
    fn create_returns_null_without_surface_control() {
        let callbacks = WpePresenterCallbacks {
            user_data: ptr::null_mut(),
            release_buffer: None,
            frame_complete: None,
            wake: None,
        };
        let presenter = unsafe { wpe_presenter_create(0, 16, 16, &callbacks) };
        assert!(presenter.is_null());
    }

    #[test]
    fn null_presenter_is_ignored() {
        unsafe {
            wpe_presenter_destroy(ptr::null_mut());
            assert_eq!(wpe_presenter_tick(ptr::null_mut()), 0);
            assert_eq!(wpe_presenter_width(ptr::null()), 0);
            assert_eq!(wpe_presenter_height(ptr::null()), 0);
        }
    }

    #[test]
    fn size_and_tick_go_through_the_handle() {
        let backend = FakeBackend::new();
        let presenter = Presenter::new(
            PresenterConfig::from_flags(0, 0, 480),
            backend.clone(),
            FakeProducer::new(),
            None,
        )
        .unwrap();
        let handle = Box::into_raw(Box::new(WpePresenter { presenter }));

        unsafe {
            assert_eq!(wpe_presenter_width(handle), 1);
            assert_eq!(wpe_presenter_height(handle), 480);

            (*handle).presenter.surface_created(backend.window());
            (*handle)
                .presenter
                .commit_buffer(backend.new_buffer(1, 480), 0, 0, None);
            assert_eq!(wpe_presenter_tick(handle), 0);
            backend.fire_commit(0);
            assert_eq!(wpe_presenter_tick(handle), 1);

            wpe_presenter_destroy(handle);
        }
    }
}
