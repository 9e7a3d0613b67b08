/// ### English
/// `wpe_android_presenter` crate root.
/// Exposes the C ABI via `ffi`; the presentation pipeline lives under `engine` and is also
/// usable directly from Rust.
///
/// ### 中文
/// `wpe_android_presenter` 的 crate 根。
/// 通过 `ffi` 导出 C ABI；呈现管线位于 `engine` 模块，也可直接从 Rust 使用。
pub mod engine;
mod ffi;

pub use engine::{
    ExportedBuffer, PresentError, Presenter, PresenterConfig, Renderer, RendererKind, ScopedFd,
    ViewBackend,
};
pub use ffi::{WpePresenter, WpePresenterCallbacks};
