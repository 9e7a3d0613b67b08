//! ### English
//! Presenter configuration decoded from the C ABI flags.
//!
//! ### 中文
//! 由 C ABI 标志解码得到的 presenter 配置。

use std::ffi::CString;

use dpi::PhysicalSize;
use tracing::warn;

use crate::engine::flags;
use crate::engine::platform::PlatformCapabilities;

/// ### English
/// Renderer implementation chosen once at construction.
///
/// ### 中文
/// 在构造时一次性选定的渲染器实现。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererKind {
    /// ### English
    /// Queued renderer: at most one transaction in flight, fence-gated FIFO release.
    ///
    /// ### 中文
    /// 排队式渲染器：至多一个在途事务，按 fence 控制的 FIFO 释放。
    SurfaceControl,
    /// ### English
    /// Single-slot renderer: every frame is applied immediately.
    ///
    /// ### 中文
    /// 单槽渲染器：每一帧都立即 apply。
    TransactionOnly,
}

/// ### English
/// Construction-time settings of a presenter.
///
/// ### 中文
/// presenter 构造时的设置。
#[derive(Clone, Debug)]
pub struct PresenterConfig {
    /// ### English
    /// Size reported before the first `surface_changed`; never zero.
    ///
    /// ### 中文
    /// 首次 `surface_changed` 之前上报的尺寸；不会为 0。
    pub initial_size: PhysicalSize<u32>,
    pub force_transaction_only: bool,
    /// ### English
    /// Whether the release queue waits for release fences (cleared by
    /// `WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT`).
    ///
    /// ### 中文
    /// 释放队列是否等待 release fence（由 `WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT` 关闭）。
    pub wait_for_release_fence: bool,
    /// ### English
    /// Debug name given to every surface control the renderer creates.
    ///
    /// ### 中文
    /// 渲染器创建的每个 surface control 的调试名。
    pub surface_name: CString,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self::from_flags(0, 1, 1)
    }
}

impl PresenterConfig {
    pub fn from_flags(presenter_flags: u32, width: u32, height: u32) -> Self {
        let unknown = presenter_flags & !flags::WPE_PRESENTER_KNOWN_FLAGS;
        if unknown != 0 {
            warn!(unknown, "ignoring unknown presenter flags");
        }

        Self {
            initial_size: PhysicalSize::new(width.max(1), height.max(1)),
            force_transaction_only: (presenter_flags
                & flags::WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY)
                != 0,
            wait_for_release_fence: (presenter_flags
                & flags::WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT)
                == 0,
            surface_name: c"WPEPresenterSurface".to_owned(),
        }
    }

    /// ### English
    /// Picks the renderer for a backend with `capabilities`.
    ///
    /// The queued renderer relies on commit callbacks for backpressure; without them it would
    /// never leave `InFlight`.
    ///
    /// ### 中文
    /// 根据 backend 的 `capabilities` 选择渲染器。
    ///
    /// 排队式渲染器依赖 commit 回调实现背压；没有该回调时它将永远停留在 `InFlight`。
    pub fn select_renderer(&self, capabilities: PlatformCapabilities) -> RendererKind {
        if self.force_transaction_only || !capabilities.commit_callback {
            RendererKind::TransactionOnly
        } else {
            RendererKind::SurfaceControl
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_clamped() {
        let config = PresenterConfig::from_flags(0, 0, 720);
        assert_eq!(config.initial_size, PhysicalSize::new(1, 720));
    }

    #[test]
    fn flags_decode() {
        let config = PresenterConfig::from_flags(0, 10, 10);
        assert!(!config.force_transaction_only);
        assert!(config.wait_for_release_fence);

        let config = PresenterConfig::from_flags(
            flags::WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY
                | flags::WPE_PRESENTER_FLAG_UNSAFE_NO_RELEASE_FENCE_WAIT
                | (1 << 31),
            10,
            10,
        );
        assert!(config.force_transaction_only);
        assert!(!config.wait_for_release_fence);
    }

    #[test]
    fn renderer_selection() {
        let with_commit = PlatformCapabilities {
            commit_callback: true,
        };
        let without_commit = PlatformCapabilities::default();

        let config = PresenterConfig::default();
        assert_eq!(config.select_renderer(with_commit), RendererKind::SurfaceControl);
        assert_eq!(config.select_renderer(without_commit), RendererKind::TransactionOnly);

        let forced =
            PresenterConfig::from_flags(flags::WPE_PRESENTER_FLAG_FORCE_TRANSACTION_ONLY, 1, 1);
        assert_eq!(forced.select_renderer(with_commit), RendererKind::TransactionOnly);
    }
}
