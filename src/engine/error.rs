//! ### English
//! Error type shared by the presentation pipeline.
//!
//! Renderer operations themselves never fail (missing surfaces and unreadable fences are states,
//! not errors); only the calls that reach into the platform return `PresentError`.
//!
//! ### 中文
//! 呈现管线共用的错误类型。
//!
//! Renderer 操作本身不会失败（没有 surface、fence 不可读都视为状态而非错误）；
//! 只有直接调用平台接口的函数才会返回 `PresentError`。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresentError {
    /// ### English
    /// The platform has no surface-control support (pre API 29, or not Android at all).
    ///
    /// ### 中文
    /// 平台不支持 surface-control（API 29 以下，或非 Android 平台）。
    #[error("surface control is not supported on this platform")]
    Unsupported,

    /// ### English
    /// `dlopen` failed; `reason` is the `dlerror` text.
    ///
    /// ### 中文
    /// `dlopen` 失败；`reason` 为 `dlerror` 返回的文本。
    #[error("failed to load {library}: {reason}")]
    LibraryLoad { library: &'static str, reason: String },

    /// ### English
    /// A mandatory NDK entry point could not be resolved.
    ///
    /// ### 中文
    /// 无法解析某个必需的 NDK 入口函数。
    #[error("required symbol `{0}` is missing")]
    SymbolMissing(&'static str),

    /// ### English
    /// The compositor refused to create a surface control with this debug name.
    ///
    /// ### 中文
    /// 合成器拒绝以该调试名创建 surface control。
    #[error("failed to create surface control `{0}`")]
    SurfaceCreation(String),

    /// ### English
    /// A native handle passed through the C ABI was NULL.
    ///
    /// ### 中文
    /// 通过 C ABI 传入的原生句柄为 NULL。
    #[error("{0} handle is NULL")]
    NullHandle(&'static str),

    /// ### English
    /// The presenter owning the task queue is gone.
    ///
    /// ### 中文
    /// 持有任务队列的 presenter 已销毁。
    #[error("owner task queue is closed")]
    QueueClosed,
}
