//! ### English
//! Presentation pipeline internals (platform seam, fences, surfaces, renderers, owner-thread queue).
//!
//! ### 中文
//! 呈现管线内部模块（平台接缝、fence、surface、渲染器、属主线程队列等）。
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fence;
pub mod flags;
pub mod platform;
pub mod presenter;
pub mod renderer;
pub mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{PresenterConfig, RendererKind};
pub use dispatch::{OwnerTask, OwnerTaskQueue, OwnerTaskSender, Waker};
pub use error::PresentError;
pub use fence::{Fence, FenceStatus, ScopedFd};
pub use platform::{BufferHandle, SurfaceHandle, WindowHandle};
pub use presenter::Presenter;
pub use renderer::{Renderer, RendererASurfaceTransaction, RendererSurfaceControl, ViewBackend};
pub use surface::{ExportedBuffer, Surface, Transaction};
