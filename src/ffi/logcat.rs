//! ### English
//! `tracing` layer writing events to the Android log (logcat).
//!
//! ### 中文
//! 将事件写入 Android 日志（logcat）的 `tracing` layer。

use std::ffi::{CStr, CString, c_int};
use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// ### English
/// `android_LogPriority` values.
///
/// ### 中文
/// `android_LogPriority` 取值。
const ANDROID_LOG_VERBOSE: c_int = 2;
const ANDROID_LOG_DEBUG: c_int = 3;
const ANDROID_LOG_INFO: c_int = 4;
const ANDROID_LOG_WARN: c_int = 5;
const ANDROID_LOG_ERROR: c_int = 6;

#[cfg(target_os = "android")]
const LOG_TAG: &CStr = c"WPEPresenter";

#[cfg(target_os = "android")]
#[link(name = "log")]
unsafe extern "C" {
    fn __android_log_write(
        priority: c_int,
        tag: *const std::ffi::c_char,
        text: *const std::ffi::c_char,
    ) -> c_int;
}

fn priority(level: &Level) -> c_int {
    match *level {
        Level::TRACE => ANDROID_LOG_VERBOSE,
        Level::DEBUG => ANDROID_LOG_DEBUG,
        Level::INFO => ANDROID_LOG_INFO,
        Level::WARN => ANDROID_LOG_WARN,
        Level::ERROR => ANDROID_LOG_ERROR,
    }
}

/// ### English
/// Collects the event message and its `key=value` fields into one line.
///
/// ### 中文
/// 将事件消息及其 `key=value` 字段拼成一行。
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl LineVisitor {
    fn into_line(self, target: &str) -> CString {
        let mut line = format!("{target}: {}{}", self.message, self.fields);
        line.retain(|c| c != '\0');
        CString::new(line).unwrap_or_default()
    }
}

/// ### English
/// Formats every event as `target: message key=value...` and hands it to `sink` with the
/// matching log priority.
///
/// ### 中文
/// 将每个事件格式化为 `target: message key=value...`，并连同对应的日志优先级交给 `sink`。
pub(super) struct LogcatLayer {
    sink: fn(c_int, &CStr),
}

impl LogcatLayer {
    #[cfg(target_os = "android")]
    pub(super) fn new() -> Self {
        Self {
            sink: write_logcat,
        }
    }
}

#[cfg(target_os = "android")]
fn write_logcat(priority: c_int, line: &CStr) {
    unsafe { __android_log_write(priority, LOG_TAG.as_ptr(), line.as_ptr()) };
}

impl<S: Subscriber> Layer<S> for LogcatLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        (self.sink)(priority(metadata.level()), &visitor.into_line(metadata.target()));
    }
}
