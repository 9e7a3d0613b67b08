use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "WPE_PRESENTER_LOG";

#[unsafe(no_mangle)]
/// ### English
/// Installs the global `tracing` subscriber, filtered by `WPE_PRESENTER_LOG` (default `info`).
/// Events go to logcat on Android and to stderr elsewhere. Returns `false` if a global
/// subscriber was already installed.
///
/// ### 中文
/// 安装全局 `tracing` subscriber，过滤规则取自 `WPE_PRESENTER_LOG`（默认 `info`）。
/// 在 Android 上输出到 logcat，其他平台输出到 stderr。若已安装全局 subscriber 则返回 `false`。
pub extern "C" fn wpe_presenter_init_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(target_os = "android")]
    let registry = registry.with(super::logcat::LogcatLayer::new());

    #[cfg(not(target_os = "android"))]
    let registry = registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    registry.try_init().is_ok()
}
