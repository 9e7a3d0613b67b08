//! ### English
//! Compositor-facing objects: the surface, exported buffers and transactions.
//!
//! ### 中文
//! 面向合成器的对象：surface、导出的 buffer 与事务。

mod buffer;
mod transaction;

use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::error::PresentError;
use crate::engine::platform::{SurfaceControlBackend, SurfaceHandle, WindowHandle};

pub use buffer::ExportedBuffer;
pub use transaction::Transaction;

/// ### English
/// Owns one platform surface control created as a child of a native window.
///
/// Not `Clone`; share it through `Arc` when transactions need to keep it alive.
///
/// ### 中文
/// 持有一个作为原生窗口子节点创建的平台 surface control。
///
/// 不可 `Clone`；事务需要保活时通过 `Arc` 共享。
pub struct Surface {
    backend: Arc<dyn SurfaceControlBackend>,
    handle: SurfaceHandle,
}

impl Surface {
    pub fn from_window(
        backend: Arc<dyn SurfaceControlBackend>,
        window: WindowHandle,
        debug_name: &CStr,
    ) -> Result<Self, PresentError> {
        let handle = backend.create_surface(window, debug_name)?;
        debug!(?handle, ?window, "surface control created");
        Ok(Self { backend, handle })
    }

    #[inline]
    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Surface").field(&self.handle).finish()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        debug!(handle = ?self.handle, "surface control released");
        self.backend.release_surface(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeBackend;

    #[test]
    fn releases_handle_on_drop() {
        let backend = FakeBackend::new();
        let surface = Surface::from_window(backend.clone(), backend.window(), c"test").unwrap();
        let handle = surface.handle();
        assert!(backend.surface_alive(handle));
        drop(surface);
        assert!(!backend.surface_alive(handle));
    }

    #[test]
    fn creation_failure_is_reported() {
        let backend = FakeBackend::new();
        backend.fail_surface_creation(true);
        let err = Surface::from_window(backend.clone(), backend.window(), c"broken").unwrap_err();
        assert!(matches!(err, PresentError::SurfaceCreation(name) if name == "broken"));
    }
}
