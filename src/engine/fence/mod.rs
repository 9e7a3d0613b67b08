//! ### English
//! Sync-fence helpers: an owning fd wrapper and a non-blocking signal query.
//!
//! ### 中文
//! Sync fence 辅助工具：持有所有权的 fd 封装，以及非阻塞的 signal 状态查询。

mod scoped_fd;

use std::os::fd::RawFd;

pub use scoped_fd::ScopedFd;

/// ### English
/// Signal state of a fence.
///
/// ### 中文
/// fence 的 signal 状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    /// ### English
    /// The descriptor is missing or unreadable. Callers treat it as signaled: a fence that cannot
    /// be read cannot prove the buffer is still in use.
    ///
    /// ### 中文
    /// 描述符缺失或不可读。调用方应视为已 signal：无法读取的 fence 无法证明 buffer 仍在使用。
    Invalid,
    NotSignaled,
    Signaled,
}

impl FenceStatus {
    /// ### English
    /// Whether a buffer guarded by this fence may be handed back to its producer.
    ///
    /// ### 中文
    /// 受此 fence 保护的 buffer 是否可以交还给生产者。
    #[inline]
    pub fn is_released(self) -> bool {
        self != FenceStatus::NotSignaled
    }
}

/// ### English
/// Stateless fence query.
///
/// ### 中文
/// 无状态的 fence 查询。
pub struct Fence;

impl Fence {
    /// ### English
    /// Returns the current state of the sync fence `fd` without blocking.
    ///
    /// Sync files report `POLLIN` once every fence point in them has signaled, so a zero-timeout
    /// `poll` is enough.
    ///
    /// ### 中文
    /// 非阻塞地返回 sync fence `fd` 的当前状态。
    ///
    /// sync file 在其全部 fence 点 signal 后会上报 `POLLIN`，因此零超时 `poll` 即可。
    pub fn status(fd: RawFd) -> FenceStatus {
        if fd < 0 {
            return FenceStatus::Invalid;
        }

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
            if ret < 0 {
                if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return FenceStatus::Invalid;
            }
            if ret == 0 {
                return FenceStatus::NotSignaled;
            }
            break;
        }

        if pfd.revents & (libc::POLLNVAL | libc::POLLERR) != 0 {
            return FenceStatus::Invalid;
        }
        if pfd.revents & libc::POLLIN != 0 {
            FenceStatus::Signaled
        } else {
            FenceStatus::NotSignaled
        }
    }

    /// ### English
    /// Same as [`Fence::status`] for an optional owned fence; `None` counts as `Invalid`.
    ///
    /// ### 中文
    /// 与 [`Fence::status`] 相同，但作用于可选的 fence；`None` 视为 `Invalid`。
    pub fn status_of(fence: Option<&ScopedFd>) -> FenceStatus {
        fence.map_or(FenceStatus::Invalid, |fence| Self::status(fence.get()))
    }
}
