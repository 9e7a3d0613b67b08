use crate::engine::flags;

#[unsafe(no_mangle)]
/// ### English
/// Returns the C ABI version.
///
/// ### 中文
/// 返回 C ABI 版本号。
pub extern "C" fn wpe_presenter_abi_version() -> u32 {
    super::WPE_PRESENTER_ABI_VERSION
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY`.
///
/// ### 中文
/// 返回 `WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY`。
pub extern "C" fn wpe_presenter_flag_force_transaction_only() -> u32 {
    flags::WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT`.
///
/// ### 中文
/// 返回 `WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT`。
pub extern "C" fn wpe_presenter_flag_unsafe_no_release_fence_wait() -> u32 {
    flags::WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT
}
