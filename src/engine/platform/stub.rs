//! ### English
//! Non-Android placeholder for the compositor backend.
//!
//! ### 中文
//! 合成器 backend 的非 Android 占位实现。

use std::sync::Arc;

use tracing::warn;

use crate::engine::error::PresentError;

use super::SurfaceControlBackend;

/// ### English
/// Always fails: surface control only exists on Android.
///
/// ### 中文
/// 总是返回错误：surface control 只存在于 Android。
pub(super) fn load() -> Result<Arc<dyn SurfaceControlBackend>, PresentError> {
    warn!("surface control backend requested on a non-Android target");
    Err(PresentError::Unsupported)
}
