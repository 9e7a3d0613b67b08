use std::fmt;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// ### English
/// Exclusive owner of one OS file descriptor (a sync fence in practice).
///
/// The descriptor is closed on drop unless ownership was handed off with [`ScopedFd::release`].
/// Negative descriptors are accepted and mean "no fence".
///
/// ### 中文
/// 独占持有一个系统文件描述符（实际用途为 sync fence）。
///
/// 除非通过 [`ScopedFd::release`] 移交所有权，否则在 drop 时关闭该描述符。
/// 负数描述符可被接受，表示“没有 fence”。
#[derive(Default)]
pub struct ScopedFd {
    fd: Option<OwnedFd>,
}

impl ScopedFd {
    /// ### English
    /// Takes ownership of `fd`. Returns an empty handle when `fd < 0`.
    ///
    /// # Safety
    /// `fd` must be an open descriptor that nothing else will close.
    ///
    /// ### 中文
    /// 接管 `fd` 的所有权；`fd < 0` 时返回空句柄。
    ///
    /// # Safety
    /// `fd` 必须是已打开、且不会被其他地方关闭的描述符。
    pub unsafe fn from_raw(fd: RawFd) -> Self {
        if fd < 0 {
            return Self::default();
        }
        Self {
            fd: Some(unsafe { OwnedFd::from_raw_fd(fd) }),
        }
    }

    /// ### English
    /// Whether a descriptor is held.
    ///
    /// ### 中文
    /// 是否持有描述符。
    pub fn is_valid(&self) -> bool {
        self.fd.is_some()
    }

    /// ### English
    /// Raw descriptor, or `-1` when empty. Ownership is kept.
    ///
    /// ### 中文
    /// 返回原始描述符（为空时返回 `-1`），不转移所有权。
    pub fn get(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    /// ### English
    /// Gives up ownership and returns the raw descriptor (`-1` when empty).
    /// The caller becomes responsible for closing it.
    ///
    /// ### 中文
    /// 放弃所有权并返回原始描述符（为空时为 `-1`），由调用方负责关闭。
    pub fn release(&mut self) -> RawFd {
        self.fd.take().map_or(-1, IntoRawFd::into_raw_fd)
    }
}

impl fmt::Debug for ScopedFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopedFd").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{pipe_fence, reader_closed};

    #[test]
    fn negative_descriptor_is_empty() {
        let fd = unsafe { ScopedFd::from_raw(-1) };
        assert!(!fd.is_valid());
        assert_eq!(fd.get(), -1);
    }

    #[test]
    fn drop_closes_descriptor() {
        let (fence, writer) = pipe_fence();
        assert!(fence.is_valid());
        drop(fence);
        assert!(reader_closed(&writer));
    }

    #[test]
    fn release_hands_over_ownership() {
        let (mut fence, writer) = pipe_fence();
        let raw = fence.release();
        assert!(!fence.is_valid());
        assert_eq!(fence.get(), -1);
        drop(fence);
        assert!(!reader_closed(&writer));
        unsafe { libc::close(raw) };
    }
}
