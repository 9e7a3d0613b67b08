//! ### English
//! Bitflags controlling optional presenter behaviors.
//!
//! These are passed through the C ABI as a `u32` bitmask.
//!
//! ### 中文
//! 控制 presenter 可选行为的位标志（bitflags）。
//!
//! 通过 C ABI 以 `u32` 位掩码传入。

/// ### English
/// Always use the single-slot `ASurfaceTransaction` renderer, even when the queued
/// surface-control renderer is available.
///
/// ### 中文
/// 始终使用单槽 `ASurfaceTransaction` 渲染器，即使排队式 surface-control 渲染器可用。
pub const WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY: u32 = 1 << 0;

/// ### English
/// Unsafe mode: hand released buffers back to the producer without checking their release fences.
///
/// The release fence is still forwarded with `release_buffer`, so a producer that waits on it
/// before reusing the buffer stays correct.
///
/// ### 中文
/// 不安全模式：将 buffer 交还生产者时不检查其 release fence。
///
/// release fence 仍会随 `release_buffer` 一并转交，因此在复用前自行等待该 fence 的生产者仍然正确。
pub const WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT: u32 = 1 << 1;

pub(crate) const WPE_PRESENTER_KNOWN_FLAGS: u32 =
    WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY | WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT;
